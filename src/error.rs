//! Error types shared by every optimizer component.

use thiserror::Error;

/// Errors raised by the optimization core and its ambient collaborators.
#[derive(Error, Debug)]
pub enum OptError {
    /// Parameter-space text has the wrong shape or invalid values
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Topology/grid mismatch or invalid control parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation barrier was asked to pass with results still missing
    #[error("Evaluation incomplete for generation {generation}: {} individual(s) missing (first: {:?})", .missing.len(), .missing.first())]
    EvaluationIncomplete { generation: usize, missing: Vec<usize> },

    /// Position/velocity/parameter-space shapes disagree
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: String, found: String },

    /// Individual, point or parameter index outside its range
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Driver transition requested from the wrong state
    #[error("Invalid driver state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl OptError {
    pub(crate) fn shape(expected: impl std::fmt::Display, found: impl std::fmt::Display) -> Self {
        OptError::DimensionMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OptError>;
