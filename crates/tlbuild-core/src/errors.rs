use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read file '{path}'")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid project configuration '{path}': {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error("Operation was canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, BuildError>;
