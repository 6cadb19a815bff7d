//! Error types for the DR engine.
//!
//! Validation failures are not errors: they travel as `Problem` data.
//! Only genuine remote, IO or state faults use `DrError`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrError {
    #[error("Metadata session error on {storage}: {message}")]
    Session { storage: String, message: String },

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Remote task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Remote task {task} did not finish within {secs}s")]
    Timeout { task: String, secs: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0} blocking problem(s) outstanding; resolve them before recovery")]
    BlockingProblems(usize),

    #[error("Prechecks have not been run for the selected metadata units")]
    ChecksNotRun,

    #[error("Problem is not fixable: {0}")]
    NotFixable(String),

    #[error("Invalid recovery state transition for {object}: {from} -> {to}")]
    InvalidTransition {
        object: String,
        from: String,
        to: String,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DrError {
    pub fn session(storage: impl ToString, message: impl Into<String>) -> Self {
        DrError::Session {
            storage: storage.to_string(),
            message: message.into(),
        }
    }

    /// Stable numeric code for CLI exit status and machine-readable reports.
    pub fn code(&self) -> i32 {
        match self {
            DrError::Session { .. } => -32010,
            DrError::Remote(_) => -32011,
            DrError::TaskFailed { .. } => -32012,
            DrError::Timeout { .. } => -32013,
            DrError::Cancelled => -32014,
            DrError::BlockingProblems(_) => -32020,
            DrError::ChecksNotRun => -32021,
            DrError::NotFixable(_) => -32022,
            DrError::InvalidTransition { .. } => -32023,
            DrError::InvalidOperation(_) => -32024,
            DrError::Config(_) => -32030,
            DrError::Io(_) => -32006,
            DrError::Json(_) => -32700,
            DrError::Internal(_) => -32603,
        }
    }
}

// Converted to strings so the error stays `Clone` and can be carried in events.
impl From<std::io::Error> for DrError {
    fn from(e: std::io::Error) -> Self {
        DrError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DrError {
    fn from(e: serde_json::Error) -> Self {
        DrError::Json(e.to_string())
    }
}

impl From<toml::de::Error> for DrError {
    fn from(e: toml::de::Error) -> Self {
        DrError::Config(e.to_string())
    }
}

pub type DrResult<T> = Result<T, DrError>;
