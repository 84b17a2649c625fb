use super::{DispatchStatus, ExecutorError};
use crate::command::CommandLine;
use std::collections::VecDeque;
use tracing::info;

/// Executor that only records command lines, used for `--dry-run` and tests
#[derive(Debug, Default)]
pub struct DryExecutor {
    executed: Vec<String>,
    // statuses returned by the next dispatches, success once exhausted
    scripted: VecDeque<DispatchStatus>,
}

impl DryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// return `statuses` for the next dispatches, in order
    pub fn with_statuses(statuses: impl IntoIterator<Item = DispatchStatus>) -> Self {
        Self {
            executed: Vec::new(),
            scripted: statuses.into_iter().collect(),
        }
    }

    pub fn execute(&mut self, command: &CommandLine) -> Result<DispatchStatus, ExecutorError> {
        let line = command.render();
        info!("[dry-run] {line}");

        self.executed.push(line);

        Ok(self.scripted.pop_front().unwrap_or(DispatchStatus::SUCCESS))
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}
