//! Error types for gjam-tx
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gjam-tx
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage medium not mounted or not reachable; checked before any open
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Sample source could not be opened (missing or unreadable file)
    #[error("Failed to open sample source {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sample source failed mid-stream
    #[error("Sample source read failed: {0}")]
    SourceRead(#[source] std::io::Error),

    /// Radio / transmit path errors
    #[error("Radio error: {0}")]
    Radio(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid operator input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors outside the sample source
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from gjam-common
    #[error(transparent)]
    Common(#[from] gjam_common::Error),
}

/// Convenience Result type using gjam-tx Error
pub type Result<T> = std::result::Result<T, Error>;
