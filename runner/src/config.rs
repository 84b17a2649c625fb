use serde::{Deserialize, Serialize};
use std::{
    env,
    ffi::OsString,
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::Io(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Failed to access file")]
    Io(#[from] Error),
    #[error("Config is not valid YAML")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("No username found")]
    EmptyUsername,
    #[error("Failed to retrieve hostname")]
    Hostname(#[from] nix::Error),
    #[error("Hostname is not valid UTF-8: {0:?}")]
    NonUnicodeHostname(OsString),
    #[error("Config failed preflight checks")]
    FailedPreflight,
}

/// Settings of the runner itself. The config file handed to workers is a
/// separate file and is never parsed here.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default = "default_dir")]
    pub rootdir: PathBuf,
    #[serde(default = "default_dir")]
    pub rundir: PathBuf,
    // emitted verbatim in front of the group, i.e., `bin/<group>`
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,
    // host value that means "run on this machine"
    #[serde(default = "default_local_host")]
    pub local_host: String,
    #[serde(default = "default_remote_shell")]
    pub remote_shell: String,
    #[serde(default)]
    pub remote_args: Vec<String>,
    // forwarded into every dispatched command line
    #[serde(default = "default_propagate_env")]
    pub propagate_env: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_ms: u64,
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            rootdir: default_dir(),
            rundir: default_dir(),
            bin_dir: default_bin_dir(),
            local_host: default_local_host(),
            remote_shell: default_remote_shell(),
            remote_args: Vec::new(),
            propagate_env: default_propagate_env(),
            poll_interval_ms: default_poll_interval(),
            dispatch_timeout_ms: default_dispatch_timeout(),
            wait_timeout_ms: None,
        }
    }
}

impl RunnerConfig {
    /// load a runner config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        if !path.is_file() {
            return Err(ConfigErrors::FileNotFound(path.to_path_buf()));
        }

        let config = serde_yaml::from_reader(File::open(path)?)?;
        debug!("Loaded runner config from {}", path.to_string_lossy());

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn preflight_checks(&self) -> Result<(), ConfigErrors> {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.poll_interval_ms == 0 {
            error!("poll_interval_ms cannot be 0, waiting would spin without pause");
            contains_error = true;
        }

        if self.dispatch_timeout_ms == 0 {
            error!("dispatch_timeout_ms cannot be 0, every dispatch would time out");
            contains_error = true;
        }

        if self.local_host.trim().is_empty() {
            error!("local_host must name the host value used for local execution");
            contains_error = true;
        }

        if self.remote_shell.trim().is_empty() {
            error!("remote_shell must name a remote execution program, e.g., `ssh`");
            contains_error = true;
        }

        if self.propagate_env.is_empty() {
            warn!("propagate_env is empty, workers will only see the environment of the remote login");
        }

        if !self.rootdir.join(&self.rundir).is_dir() {
            warn!(
                "Run directory {} does not exist yet",
                self.rootdir.join(&self.rundir).to_string_lossy()
            );
        }

        if contains_error {
            Err(ConfigErrors::FailedPreflight)
        } else {
            Ok(())
        }
    }
}

/// Process-wide facts the components need, captured once and passed in
/// explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    pub username: String,
    // canonical network name of this machine, compared against pid file hostnames
    pub hostname: String,
    // (name, value) pairs forwarded into dispatched command lines
    pub env: Vec<(String, String)>,
}

impl Context {
    pub fn new(
        username: impl Into<String>,
        hostname: impl Into<String>,
        env: Vec<(String, String)>,
    ) -> Result<Self, ConfigErrors> {
        let username = username.into();

        if username.trim().is_empty() {
            return Err(ConfigErrors::EmptyUsername);
        }

        Ok(Self {
            username,
            hostname: hostname.into(),
            env,
        })
    }

    /// capture username, hostname and the variables named in `propagate`
    /// from the current process
    pub fn detect(propagate: &[String]) -> Result<Self, ConfigErrors> {
        Self::new(current_username()?, local_hostname()?, propagated_env(propagate))
    }
}

/// read every named variable from the environment, unset ones are skipped
pub fn propagated_env(names: &[String]) -> Vec<(String, String)> {
    names
        .iter()
        .filter_map(|name| match env::var(name) {
            Ok(value) => Some((name.clone(), value)),
            Err(error) => {
                debug!("Not propagating {name}: {error}");
                None
            }
        })
        .collect()
}

pub fn local_hostname() -> Result<String, ConfigErrors> {
    match nix::unistd::gethostname() {
        Ok(hostname) => hostname
            .into_string()
            .map_err(ConfigErrors::NonUnicodeHostname),
        Err(error) => {
            error!(error = ?error, "Failed to retrieve hostname: {error}");

            Err(ConfigErrors::Hostname(error))
        }
    }
}

fn current_username() -> Result<String, ConfigErrors> {
    for key in ["LOGNAME", "USER", "LNAME", "USERNAME"] {
        if let Ok(name) = env::var(key) {
            if !name.is_empty() {
                return Ok(name);
            }
        }
    }

    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(ConfigErrors::EmptyUsername),
        Err(error) => {
            error!(error = ?error, "Failed to look up the current user: {error}");

            Err(ConfigErrors::EmptyUsername)
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("bin")
}

fn default_local_host() -> String {
    "local".to_string()
}

fn default_remote_shell() -> String {
    "ssh".to_string()
}

fn default_propagate_env() -> Vec<String> {
    ["PATH", "LD_LIBRARY_PATH", "PYTHONPATH"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_dispatch_timeout() -> u64 {
    30_000
}
