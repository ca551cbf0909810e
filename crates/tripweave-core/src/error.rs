use thiserror::Error;

use crate::types::AgentRole;

#[derive(Debug, Error)]
pub enum TripweaveError {
    // Tool errors
    #[error("Tool call failed: {tool}: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // Reasoning provider errors
    #[error("Reasoning request failed: {0}")]
    Reasoning(String),

    #[error("Reasoning response parse error: {0}")]
    ReasoningParse(String),

    // Task errors
    #[error("Task {role} timed out after {timeout_secs}s")]
    TaskTimeout { role: AgentRole, timeout_secs: u64 },

    #[error("Task {role} failed: {reason}")]
    TaskFailed { role: AgentRole, reason: String },

    // Request errors
    #[error("Invalid travel request: missing {}", .0.join(", "))]
    InvalidRequest(Vec<String>),

    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is sealed: {0}")]
    SessionSealed(String),

    #[error("Session {0} has not reached a terminal status")]
    NotTerminal(String),

    #[error("Session persistence failed: {0}")]
    Persistence(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TripweaveError {
    /// Whether a retry of the same task attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TripweaveError::ToolFailure { .. }
                | TripweaveError::ToolTimeout { .. }
                | TripweaveError::Reasoning(_)
                | TripweaveError::ReasoningParse(_)
                | TripweaveError::TaskTimeout { .. }
        )
    }

    /// Whether the error must abort the whole run rather than a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TripweaveError::Persistence(_) | TripweaveError::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TripweaveError>;
