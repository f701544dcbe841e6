//! Execution status records for asynchronously dispatched commands

use crate::message::Command;
use crate::result::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of a tracked command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CommandStatus {
    fn rank(self) -> u8 {
        match self {
            CommandStatus::Pending => 0,
            CommandStatus::Running => 1,
            CommandStatus::Completed | CommandStatus::Failed => 2,
        }
    }

    /// Completed or failed
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// Progress record created by `CommandBus::execute_async`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub command_id: Uuid,
    pub command_type: String,
    pub status: CommandStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ExecutionStatus {
    pub(crate) fn pending(command: &Command) -> Self {
        Self {
            command_id: command.id(),
            command_type: command.command_type().to_string(),
            status: CommandStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            error: None,
        }
    }

    /// Move forward in the lifecycle; a transition that would regress (or
    /// leave a terminal state) is ignored and reported as `false`.
    fn advance(&mut self, next: CommandStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn mark_running(&mut self) -> bool {
        self.advance(CommandStatus::Running)
    }

    pub(crate) fn settle(&mut self, outcome: &ExecutionResult) -> bool {
        let next = if outcome.success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        if !self.advance(next) {
            return false;
        }
        self.end_time = Some(Utc::now());
        self.result = outcome.data.clone();
        self.error = outcome.error.clone();
        true
    }

    /// Terminal and finished before `cutoff`
    pub(crate) fn expired_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.end_time.is_some_and(|end| end <= cutoff)
    }
}
