//! Error types shared by every stage of the space construction.

use thiserror::Error;

/// Main error type for building a semantic space
#[derive(Error, Debug)]
pub enum SpaceError {
    /// Invalid or contradictory parameters, always raised before any processing
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a document, the corpus or an auxiliary list failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The run configuration could not be parsed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The decomposition could not be computed or is unusable
    #[error("solver error: {0}")]
    Solver(String),

    /// Components were wired or called in the wrong order
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for space operations
pub type SpaceResult<T> = Result<T, SpaceError>;

impl SpaceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn solver(msg: impl Into<String>) -> Self {
        Self::Solver(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
