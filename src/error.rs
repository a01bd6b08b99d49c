// src/error.rs

use std::fmt;

/// Engine error enum surfaced to the embedding request layer.
/// Each failed operation leaves stored state untouched.
#[derive(Debug)]
pub enum EngineError {
    /// Assessment, module, attempt or progress row absent or inactive.
    NotFound(String),

    /// Submit targeted an attempt that doesn't exist, isn't owned by the
    /// caller, or is already closed.
    InvalidAttempt(String),

    /// Module start blocked; carries the unsatisfied prerequisite module ids.
    PrerequisitesNotMet(Vec<i64>),

    /// Unparsable or invalid caller payload.
    MalformedInput(String),

    /// Caller lacks the administer capability.
    Forbidden(String),

    /// Lost a concurrent-start race, cycle-introducing module edit, or
    /// hard delete of referenced content.
    Conflict(String),

    /// Underlying store failure.
    Database(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for EngineError {}

/// Converts `sqlx::Error` into `EngineError::Database`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::MalformedInput(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::MalformedInput(err.to_string())
    }
}
