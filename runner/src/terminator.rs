use crate::{
    command::{CommandLine, RemoteShell},
    config::{Context, RunnerConfig},
    executors::{DispatchStatus, Executors},
    layout::{file_stem, RunLayout, PID_EXTENSION},
    pidfile::{read_pid_file, PidFileError, PidRecord},
};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum TerminateError {
    #[error("pid_dir doesn't exist: {0:?}")]
    MissingPidDir(PathBuf),
    #[error("Pid file glob was invalid")]
    InvalidGlob(#[from] globset::Error),
    #[error("Malformed pid file {path:?}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: PidFileError,
    },
}

/// Result of one kill attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillOutcome {
    pub path: PathBuf,
    pub record: PidRecord,
    pub command: String,
    // `None` if the kill could not be dispatched at all
    pub status: Option<DispatchStatus>,
}

impl KillOutcome {
    pub fn success(&self) -> bool {
        self.status.map_or(false, |status| status.success())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    pub outcomes: Vec<KillOutcome>,
}

impl KillReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Rediscovers running jobs from their pid files and kills them
#[derive(Debug)]
pub struct Terminator {
    layout: RunLayout,
    context: Context,
    remote: RemoteShell,
    executor: Executors,
}

/// keep only files whose stem matches the stem of an entry in `subset`
fn filter_based_on<P: AsRef<Path>>(files: Vec<PathBuf>, subset: Option<&[P]>) -> Vec<PathBuf> {
    let Some(subset) = subset else {
        return files;
    };

    let stems: BTreeSet<&OsStr> = subset
        .iter()
        .filter_map(|path| file_stem(path.as_ref()))
        .collect();

    files
        .into_iter()
        .filter(|file| file_stem(file).map_or(false, |stem| stems.contains(stem)))
        .collect()
}

impl Terminator {
    pub fn new(config: &RunnerConfig, context: Context, executor: Executors) -> Self {
        Self {
            layout: RunLayout::from_config(config),
            context,
            remote: RemoteShell::from_config(config),
            executor,
        }
    }

    pub fn executor(&self) -> &Executors {
        &self.executor
    }

    /// every `*.pid` file directly inside the pid directory, symlinks to
    /// files included, sorted
    pub fn pid_files(&self) -> Result<Vec<PathBuf>, TerminateError> {
        let pid_dir = self.layout.pid_dir();

        if !pid_dir.is_dir() {
            return Err(TerminateError::MissingPidDir(pid_dir));
        }

        let glob = GlobBuilder::new(&format!("*.{PID_EXTENSION}"))
            .literal_separator(true)
            .build()?
            .compile_matcher();

        Ok(WalkBuilder::new(&pid_dir)
            .standard_filters(false)
            .hidden(true)
            .follow_links(true)
            .max_depth(Some(1))
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to list pid file: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
            .map(DirEntry::into_path)
            .filter(|path| path.file_name().map_or(false, |name| glob.is_match(name)))
            .sorted()
            .collect_vec())
    }

    /// `kill -9 <pid>`, wrapped in the remote shell unless the record's
    /// hostname is this machine
    pub fn kill_command(&self, record: &PidRecord) -> CommandLine {
        let command = CommandLine::new("kill")
            .arg("-9")
            .arg(record.pid.to_string());

        if record.hostname == self.context.hostname {
            command
        } else {
            command.remote(&self.remote, &record.hostname)
        }
    }

    /// Kill every job with a pid file, or only those whose file stem matches
    /// an entry of `subset` (e.g., the finished markers still waited for).
    ///
    /// Every pid file is parsed before the first kill is sent, a malformed
    /// file fails the whole call. Failed kills are reported and skipped.
    #[instrument(skip(self, subset))]
    pub fn kill_all<P: AsRef<Path>>(
        &mut self,
        subset: Option<&[P]>,
    ) -> Result<KillReport, TerminateError> {
        let pid_dir = self.layout.pid_dir();
        let pid_files = self.pid_files()?;

        if pid_files.is_empty() {
            info!("no pid files found in {}", pid_dir.to_string_lossy());

            return Ok(KillReport::default());
        }

        let pid_files = filter_based_on(pid_files, subset);
        info!(
            "{} pid files will be used, from dir {}",
            pid_files.len(),
            pid_dir.to_string_lossy()
        );

        let records = pid_files
            .into_iter()
            .map(|path| match read_pid_file(&path) {
                Ok(record) => Ok((path, record)),
                Err(source) => Err(TerminateError::PidFile { path, source }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = KillReport::default();

        for (path, record) in records {
            let command = self.kill_command(&record);
            let line = command.render();

            info!(
                "group={} idx={} hostname={} pid={} -- attempting kill with {line}",
                record.group, record.index, record.hostname, record.pid
            );

            let status = match self.executor.execute(&command) {
                Ok(status) => {
                    if status.success() {
                        info!("   success");
                    } else {
                        warn!("   *FAIL* res={status}");
                    }

                    Some(status)
                }
                Err(error) => {
                    warn!(error = ?error, "   *FAIL* {error}");

                    None
                }
            };

            report.outcomes.push(KillOutcome {
                path,
                record,
                command: line,
                status,
            });
        }

        Ok(report)
    }
}
