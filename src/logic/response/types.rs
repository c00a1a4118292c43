//! Response Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of one mitigation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub subject: String,
    pub enforcer: String,
    pub status: ActionStatus,
    pub message: String,
    pub timestamp: i64,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// Status of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Success,
    Failed,
}

impl ActionStatus {
    /// Status string written to the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "Success",
            ActionStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("invalid subject {subject:?}: not an IP address")]
    InvalidSubject { subject: String },

    #[error("command '{command}' failed ({exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("command '{command}' timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("failed to run '{command}': {message}")]
    Spawn { command: String, message: String },
}
