//! Error types for telesplit.

use std::path::PathBuf;

use thiserror::Error;

/// telesplit error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Log file has no parent directory: {0}")]
    InvalidDir(PathBuf),
}
