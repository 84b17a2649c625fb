mod dry;
mod local;

pub use dry::DryExecutor;
pub use local::LocalExecutor;

use crate::{command::CommandLine, config::RunnerConfig};
use std::{fmt, io, process::ExitStatus, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn shell for `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for shell running `{command}`")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Dispatch of `{command}` did not return within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Exit status of the dispatching shell, not of the job it started
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchStatus {
    // `None` if the shell was terminated by a signal
    pub code: Option<i32>,
}

impl DispatchStatus {
    pub const SUCCESS: Self = Self { code: Some(0) };

    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for DispatchStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("signal"),
        }
    }
}

/// All ways of dispatching a command line
#[derive(Debug)]
pub enum Executors {
    Local(LocalExecutor),
    Dry(DryExecutor),
}

impl Executors {
    pub fn load(config: &RunnerConfig, dry_run: bool) -> Self {
        if dry_run {
            Self::Dry(DryExecutor::new())
        } else {
            Self::Local(LocalExecutor::load(config))
        }
    }

    pub fn execute(&mut self, command: &CommandLine) -> Result<DispatchStatus, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(command),
            Self::Dry(executor) => executor.execute(command),
        }
    }

    /// rendered command lines seen so far, only tracked by the dry executor
    pub fn executed(&self) -> &[String] {
        match self {
            Self::Local(_) => &[],
            Self::Dry(executor) => executor.executed(),
        }
    }
}
