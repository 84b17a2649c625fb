use super::{DispatchStatus, ExecutorError};
use crate::{command::CommandLine, config::RunnerConfig, layout::RunLayout};
use std::{
    path::PathBuf,
    process::{Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Executor that hands each command line to `sh -c` on this machine
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    working_dir: PathBuf,
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout,
        }
    }

    /// runs in the resolved root directory, the same one the layout's paths
    /// are derived from
    pub fn load(config: &RunnerConfig) -> Self {
        Self::new(
            RunLayout::from_config(config).rootdir(),
            config.dispatch_timeout(),
        )
    }

    /// run the line and wait for the shell, a backgrounded line returns as
    /// soon as the shell accepted it
    #[instrument(skip(self), level = "debug")]
    pub fn execute(&self, command: &CommandLine) -> Result<DispatchStatus, ExecutorError> {
        let line = command.render();
        let start = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: line.clone(),
                source,
            })?;

        match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => {
                debug!(
                    "Dispatched in {} ns | status: {}",
                    start.elapsed().as_nanos(),
                    status
                );

                Ok(status.into())
            }
            Ok(None) => {
                // shell hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!(error = ?error, "Failed to kill stuck dispatch shell");
                }
                let _ = child.wait();

                Err(ExecutorError::Timeout {
                    command: line,
                    timeout: self.timeout,
                })
            }
            Err(source) => Err(ExecutorError::Wait {
                command: line,
                source,
            }),
        }
    }
}
