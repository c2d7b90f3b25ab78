//! # Error Types
//!
//! Fatal errors raised by the library. Data problems found while processing a
//! batch (a bad record, a dropped span, a repaired tag) are *not* errors: they
//! are collected as [`crate::report::Issue`]s and the batch keeps going.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for legal-ner operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A file or directory could not be read or written.
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record is missing required fields or has the wrong shape.
    #[error("{0}")]
    MalformedRecord(String),

    /// A span is structurally valid but its offsets are not.
    #[error("{0}")]
    InvalidSpan(String),

    /// Entity code outside the closed label set.
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    /// Tag string that is not `O`, `B-<TYPE>` or `I-<TYPE>`.
    #[error("Invalid tag '{0}'")]
    InvalidTag(String),

    /// Two documents of one corpus share an id.
    #[error("Duplicate document id '{0}'")]
    DuplicateId(String),

    #[error("Invalid split ratios: {0}")]
    InvalidRatios(String),

    /// Gold and predicted sequences disagree in length.
    #[error("Length mismatch in '{id}': expected {expected} tags, got {actual}")]
    LengthMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid scores: {0}")]
    InvalidScores(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedRecord(msg.into())
    }

    pub fn invalid_span(msg: impl Into<String>) -> Self {
        Error::InvalidSpan(msg.into())
    }
}
