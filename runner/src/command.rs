use crate::config::RunnerConfig;
use itertools::Itertools;
use shell_words::quote;
use std::{fmt, path::PathBuf};

/// Remote execution transport, `<program> <args..> <host> <command>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteShell {
    pub program: String,
    pub args: Vec<String>,
}

impl RemoteShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            program: config.remote_shell.clone(),
            args: config.remote_args.clone(),
        }
    }
}

impl Default for RemoteShell {
    fn default() -> Self {
        Self::new("ssh")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Remote {
    shell: RemoteShell,
    host: String,
}

/// A single shell command line as it is handed to `sh -c`.
///
/// The environment prefix, program and arguments form the command that
/// runs on the target host. When the line is wrapped for a remote host the
/// whole command is passed as one quoted word to the remote shell, while the
/// output redirection and backgrounding stay on the dispatching side and
/// apply to the transport process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    env: Vec<(String, String)>,
    program: String,
    args: Vec<String>,
    output: Option<PathBuf>,
    background: bool,
    remote: Option<Remote>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            env: Vec::new(),
            program: program.into(),
            args: Vec::new(),
            output: None,
            background: false,
            remote: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// send stdout and stderr to `path`
    pub fn redirect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn remote(mut self, shell: &RemoteShell, host: impl Into<String>) -> Self {
        self.remote = Some(Remote {
            shell: shell.clone(),
            host: host.into(),
        });
        self
    }

    /// target host, `None` for lines that run on this machine
    pub fn host(&self) -> Option<&str> {
        self.remote.as_ref().map(|remote| remote.host.as_str())
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// the command as the target host runs it, without transport,
    /// redirection or backgrounding
    fn inner(&self) -> String {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={}", quote(value)))
            .chain(
                std::iter::once(&self.program)
                    .chain(self.args.iter())
                    .map(|word| quote(word).into_owned()),
            )
            .join(" ")
    }

    pub fn render(&self) -> String {
        let mut line = match &self.remote {
            Some(remote) => std::iter::once(remote.shell.program.as_str())
                .chain(remote.shell.args.iter().map(String::as_str))
                .chain(std::iter::once(remote.host.as_str()))
                .map(|word| quote(word).into_owned())
                .chain(std::iter::once(quote(&self.inner()).into_owned()))
                .join(" "),
            None => self.inner(),
        };

        if let Some(output) = &self.output {
            line.push_str(&format!(" >{} 2>&1", quote(&output.to_string_lossy())));
        }

        if self.background {
            line.push_str(" &");
        }

        line
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
