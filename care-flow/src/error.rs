use thiserror::Error;

/// Errors surfaced by the workflow core
#[derive(Error, Debug)]
pub enum FlowError {
    /// Start was attempted without an active patient case
    #[error("No patient case: enter patient case information first")]
    MissingCase,

    /// Start was attempted without an authenticated user
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The analysis or report backend failed
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// A report was requested before any step completed
    #[error("No results ready: run an analysis before requesting a report")]
    EmptyReport,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// The human-readable message recorded on every step when a run fails.
    pub fn step_message(&self) -> String {
        match self {
            FlowError::RemoteCall(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
