//! Every path the launcher, the waiter, the terminator and the workers agree
//! on. Nothing here touches the filesystem, the names are derived from the
//! group and index alone so any side can compute them without reading what
//! the other side wrote.

use crate::config::RunnerConfig;
use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
};
use tracing::warn;

pub const LOG_DIR: &str = "logs";
pub const PID_DIR: &str = "pids";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const FINISHED_EXTENSION: &str = "finished";
pub const PID_EXTENSION: &str = "pid";

/// one job slot of a launched batch
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId {
    pub group: String,
    pub index: usize,
}

impl JobId {
    pub fn new(group: impl Into<String>, index: usize) -> Self {
        Self {
            group: group.into(),
            index,
        }
    }

    /// `<group>-s<index>` with the index zero padded to four digits,
    /// shared by the finished marker and the pid file
    pub fn stem(&self) -> String {
        format!("{}-s{:04}", self.group, self.index)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group={} idx={}", self.group, self.index)
    }
}

/// Groups become both a path component and a program name
pub fn is_valid_group(group: &str) -> bool {
    !group.is_empty()
        && group != "."
        && group != ".."
        && !group.contains('/')
        && !group.chars().any(char::is_whitespace)
}

/// `path` anchored at the current directory. Dispatched shells run in the
/// root directory, so every path put on a command line has to be absolute.
pub fn absolute(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(absolute) => absolute,
        Err(error) => {
            warn!("Failed to resolve {}: {error}", path.to_string_lossy());

            path.to_path_buf()
        }
    }
}

/// base name without its last extension, the key used to match pid files
/// against finished markers
pub fn file_stem(path: &Path) -> Option<&OsStr> {
    path.file_stem()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLayout {
    rootdir: PathBuf,
    run_dir: PathBuf,
    bin_dir: PathBuf,
}

impl RunLayout {
    pub fn new(
        rootdir: impl Into<PathBuf>,
        rundir: impl AsRef<Path>,
        bin_dir: impl Into<PathBuf>,
    ) -> Self {
        let rootdir = absolute(&rootdir.into());
        let run_dir = rootdir.join(rundir);

        Self {
            rootdir,
            run_dir,
            bin_dir: bin_dir.into(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(&config.rootdir, &config.rundir, &config.bin_dir)
    }

    pub fn rootdir(&self) -> &Path {
        &self.rootdir
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn log_dir(&self) -> PathBuf {
        self.run_dir.join(LOG_DIR)
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.run_dir.join(PID_DIR)
    }

    pub fn default_config_file(&self) -> PathBuf {
        self.run_dir.join(DEFAULT_CONFIG_FILE)
    }

    /// combined stdout and stderr of one job
    pub fn log_file(&self, job: &JobId) -> PathBuf {
        self.log_dir().join(format!("{}_{}.log", job.group, job.index))
    }

    pub fn finished_file(&self, job: &JobId) -> PathBuf {
        self.log_dir()
            .join(format!("{}.{FINISHED_EXTENSION}", job.stem()))
    }

    pub fn pid_file(&self, job: &JobId) -> PathBuf {
        self.pid_dir()
            .join(format!("{}.{PID_EXTENSION}", job.stem()))
    }

    /// program as it appears on the command line, relative to the directory
    /// the dispatching shell runs in
    pub fn program(&self, group: &str) -> PathBuf {
        self.bin_dir.join(group)
    }

    /// program as seen from this machine, for local sanity checks
    pub fn local_program(&self, group: &str) -> PathBuf {
        self.rootdir.join(self.program(group))
    }
}
