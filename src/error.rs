//! Error types for the sorrel library.

use thiserror::Error;

/// The error type for all sorrel operations.
#[derive(Error, Debug)]
pub enum SorrelError {
    /// An I/O error. Fatal for the operation in progress; never retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error (manifest, registry).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A configuration or precondition violation (e.g. reducing unsorted
    /// chunks, binary search on an unsorted file). Fatal, raised immediately.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An index file that cannot be decoded (truncated body, bad block sizes).
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// A malformed boolean query. Recoverable at the query boundary.
    #[error("syntax error at position {position}: unexpected token '{token}'")]
    Syntax { token: String, position: usize },

    /// A structurally invalid parse tree reached the evaluator. Should not
    /// occur if grammar and evaluator agree; recoverable at the query boundary.
    #[error("interpretation error: {0}")]
    Interpretation(String),
}

impl SorrelError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        SorrelError::Config(message.into())
    }

    /// Create a corrupt-index error.
    pub fn corrupt<S: Into<String>>(message: S) -> Self {
        SorrelError::CorruptIndex(message.into())
    }

    /// Create an interpretation error.
    pub fn interpretation<S: Into<String>>(message: S) -> Self {
        SorrelError::Interpretation(message.into())
    }
}

/// Result type alias using `SorrelError`.
pub type Result<T> = std::result::Result<T, SorrelError>;
