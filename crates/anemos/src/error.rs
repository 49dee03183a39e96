//! Error and Result types for Anemos operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for Anemos operations.
pub type Result<T> = std::result::Result<T, AnemosError>;

/// The error type for storage, coordination and query operations.
#[derive(Debug, Error)]
pub enum AnemosError {
    /// Row/column shape mismatch or a malformed table descriptor.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Unknown table, variable or model code.
    #[error("Not found: {kind} `{code}`")]
    NotFound {
        /// What kind of object was looked up.
        kind: &'static str,
        /// The code that was not found.
        code: String,
    },

    /// Invalid numeric range, e.g. histogram bounds or row indices.
    #[error("Range error: {0}")]
    Range(String),

    /// Internal coordinator invariant violation.
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// A transform could not be evaluated.
    #[error("Transform error: {0}")]
    Transform(String),

    /// The request object or one of its parameters is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A generic expression failed to parse.
    #[error("Expression error at position {position}: {message}")]
    Expression {
        /// Byte offset of the offending token.
        position: usize,
        /// Description of the problem.
        message: String,
    },

    /// Invalid magic bytes in a column file header.
    #[error("Invalid magic bytes: expected ACOL, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported column file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Chunk checksum does not match the stored value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Descriptor (de)serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AnemosError {
    /// Shorthand for an unknown table code.
    pub fn table_not_found(code: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "table",
            code: code.into(),
        }
    }

    /// Returns the stable tag reported in answer error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schemaError",
            Self::NotFound { .. } => "notFoundError",
            Self::Range(_) => "rangeError",
            Self::Coordinator(_) => "coordinatorError",
            Self::Transform(_) => "transformError",
            Self::InvalidRequest(_) => "invalidRequest",
            Self::Expression { .. } => "expressionError",
            Self::InvalidMagic(_) | Self::UnsupportedVersion(_) | Self::ChecksumMismatch { .. } => {
                "corruptionError"
            }
            Self::IoError(_) => "ioError",
            Self::JsonError(_) => "jsonError",
        }
    }
}
