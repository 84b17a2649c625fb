use crate::{config::RunnerConfig, launcher::LaunchRecord, layout::RunLayout};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Log directory {0:?} does not exist")]
    MissingLogDir(PathBuf),
}

/// Time source of the poll loop
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Shared flag to stop a running wait from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut { pending: Vec<PathBuf> },
    Cancelled { pending: Vec<PathBuf> },
}

impl WaitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// finished markers that never showed up
    pub fn pending(&self) -> &[PathBuf] {
        match self {
            Self::Completed => &[],
            Self::TimedOut { pending } | Self::Cancelled { pending } => pending,
        }
    }
}

/// Polls the log directory until every launched job left its finished marker
#[derive(Debug, Clone)]
pub struct Waiter<C = SystemClock> {
    layout: RunLayout,
    poll_interval: Duration,
    deadline: Option<Duration>,
    cancel: Option<CancelToken>,
    clock: C,
}

impl Waiter<SystemClock> {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            layout: RunLayout::from_config(config),
            poll_interval: config.poll_interval(),
            deadline: config.wait_timeout(),
            cancel: None,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> Waiter<C> {
    pub fn with_clock<D: Clock>(self, clock: D) -> Waiter<D> {
        Waiter {
            layout: self.layout,
            poll_interval: self.poll_interval,
            deadline: self.deadline,
            cancel: self.cancel,
            clock,
        }
    }

    /// give up once `deadline` has passed since the wait started
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// finished markers for `records`, duplicates are reported and collapsed
    pub fn wait_set(&self, records: &[LaunchRecord]) -> BTreeSet<PathBuf> {
        let mut waiting_for = BTreeSet::new();

        for record in records {
            let finished = self.layout.finished_file(&record.job());

            if !waiting_for.insert(finished.clone()) {
                warn!(
                    "wait - finished file already in list: {}",
                    finished.to_string_lossy()
                );
            }
        }

        waiting_for
    }

    /// Block until the finished marker of every record exists. Without a
    /// deadline or cancel token this only returns once all jobs are done.
    #[instrument(skip(self, records), fields(jobs = records.len()))]
    pub fn wait(&self, records: &[LaunchRecord]) -> Result<WaitOutcome, WaitError> {
        let log_dir = self.layout.log_dir();

        if !log_dir.is_dir() {
            error!("Log directory {} does not exist", log_dir.to_string_lossy());

            return Err(WaitError::MissingLogDir(log_dir));
        }

        let mut waiting_for = self.wait_set(records);

        if waiting_for.is_empty() {
            info!("wait - no jobs to wait for");

            return Ok(WaitOutcome::Completed);
        }

        info!("wait - waiting for {} jobs", waiting_for.len());
        debug!(?waiting_for);

        let start = self.clock.now();

        loop {
            waiting_for.retain(|finished| {
                if finished.exists() {
                    info!(
                        "wait - done: {}",
                        finished
                            .file_name()
                            .unwrap_or(finished.as_os_str())
                            .to_string_lossy()
                    );
                    false
                } else {
                    true
                }
            });

            if waiting_for.is_empty() {
                info!("wait - all jobs done");

                return Ok(WaitOutcome::Completed);
            }

            if self.cancel.as_ref().map_or(false, CancelToken::is_cancelled) {
                warn!("wait - cancelled with {} jobs pending", waiting_for.len());

                return Ok(WaitOutcome::Cancelled {
                    pending: waiting_for.into_iter().collect(),
                });
            }

            let mut pause = self.poll_interval;

            if let Some(deadline) = self.deadline {
                let elapsed = self.clock.now().saturating_duration_since(start);

                if elapsed >= deadline {
                    warn!(
                        "wait - timed out after {elapsed:?} with {} jobs pending",
                        waiting_for.len()
                    );

                    return Ok(WaitOutcome::TimedOut {
                        pending: waiting_for.into_iter().collect(),
                    });
                }

                pause = pause.min(deadline - elapsed);
            }

            trace!("wait - {} jobs pending, sleeping {pause:?}", waiting_for.len());
            self.clock.sleep(pause);
        }
    }
}
