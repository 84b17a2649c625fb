use crate::{
    command::{CommandLine, RemoteShell},
    config::{check_executable, Context, RunnerConfig},
    executors::{DispatchStatus, ExecutorError, Executors},
    layout::{absolute, is_valid_group, JobId, RunLayout},
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Config file {0:?} does not exist")]
    MissingConfigFile(PathBuf),
    #[error("Group {0:?} is not usable as a program name")]
    InvalidGroup(String),
    #[error("Problem launching group={group} idx={index} cmd={command} res={status}")]
    Dispatch {
        group: String,
        index: usize,
        command: String,
        status: DispatchStatus,
    },
    #[error("Failed to dispatch group={group} idx={index}")]
    Executor {
        group: String,
        index: usize,
        #[source]
        source: ExecutorError,
    },
}

/// What was dispatched for one job slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRecord {
    pub group: String,
    pub index: usize,
    pub command: String,
    pub host: String,
}

impl LaunchRecord {
    pub fn job(&self) -> JobId {
        JobId::new(self.group.clone(), self.index)
    }
}

/// Dispatches one command line per host and remembers what it launched
#[derive(Debug)]
pub struct Launcher {
    layout: RunLayout,
    context: Context,
    remote: RemoteShell,
    local_host: String,
    executor: Executors,
    launched: Vec<LaunchRecord>,
}

impl Launcher {
    pub fn new(config: &RunnerConfig, context: Context, executor: Executors) -> Self {
        Self {
            layout: RunLayout::from_config(config),
            context,
            remote: RemoteShell::from_config(config),
            local_host: config.local_host.clone(),
            executor,
            launched: Vec::new(),
        }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn executor(&self) -> &Executors {
        &self.executor
    }

    /// every job launched so far, in dispatch order
    pub fn records(&self) -> &[LaunchRecord] {
        &self.launched
    }

    /// finished markers of every launched job, in dispatch order
    pub fn finished_files(&self) -> Vec<PathBuf> {
        self.launched
            .iter()
            .map(|record| self.layout.finished_file(&record.job()))
            .collect()
    }

    pub fn is_local(&self, host: &str) -> bool {
        host == self.local_host
    }

    /// `<env..> bin/<group> <config_file> <index> >logs/<group>_<index>.log 2>&1 &`,
    /// wrapped in the remote shell unless `host` is the local host value
    pub fn command_for(&self, job: &JobId, host: &str, config_file: &Path) -> CommandLine {
        let command = CommandLine::new(self.layout.program(&job.group).to_string_lossy())
            .envs(self.context.env.iter().cloned())
            .arg(config_file.to_string_lossy())
            .arg(job.index.to_string())
            .redirect_output(self.layout.log_file(job))
            .background();

        if self.is_local(host) {
            command
        } else {
            command.remote(&self.remote, host)
        }
    }

    /// Launch one `group` job per entry of `hosts`, the position in `hosts`
    /// is the job index. Aborts on the first dispatch that the shell or the
    /// remote transport rejects, jobs dispatched before stay running.
    #[instrument(skip(self, hosts, config_file), fields(user = %self.context.username))]
    pub fn launch<S: AsRef<str>>(
        &mut self,
        group: &str,
        hosts: &[S],
        config_file: Option<&Path>,
    ) -> Result<(), LaunchError> {
        if !is_valid_group(group) {
            error!("Group {group:?} must be a non-empty file name without whitespace");

            return Err(LaunchError::InvalidGroup(group.to_string()));
        }

        let config_file = config_file
            .map(absolute)
            .unwrap_or_else(|| self.layout.default_config_file());

        if !config_file.exists() {
            error!("Config file {} does not exist", config_file.to_string_lossy());

            return Err(LaunchError::MissingConfigFile(config_file));
        }

        if hosts.is_empty() {
            warn!("No hosts given for group={group}, nothing to launch");
        }

        if hosts.iter().any(|host| self.is_local(host.as_ref())) {
            let program = self.layout.local_program(group);

            match check_executable(&program) {
                Ok(true) => {}
                Ok(false) => warn!(
                    "Program {} is not executable, this might cause problems",
                    program.to_string_lossy()
                ),
                Err(e) => warn!(
                    "Failed to determine if {} is an executable: {e}",
                    program.to_string_lossy()
                ),
            }
        }

        for (index, host) in hosts.iter().enumerate() {
            let host = host.as_ref();
            let job = JobId::new(group, index);
            let command = self.command_for(&job, host, &config_file);
            let line = command.render();

            info!("launching: group={group} idx={index} -- {line}");

            let result = self.executor.execute(&command);

            self.launched.push(LaunchRecord {
                group: group.to_string(),
                index,
                command: line.clone(),
                host: host.to_string(),
            });

            match result {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    error!("problem launching group={group} idx={index} cmd={line} res={status}");

                    return Err(LaunchError::Dispatch {
                        group: group.to_string(),
                        index,
                        command: line,
                        status,
                    });
                }
                Err(source) => {
                    error!(error = ?source, "Failed to dispatch group={group} idx={index}");

                    return Err(LaunchError::Executor {
                        group: group.to_string(),
                        index,
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}
