use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to acquire lock for {0}")]
    CacheLock(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShellError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShellError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable, camelCase name of the variant as reported across the bridge.
    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::Io { .. } => "io",
            ShellError::NotFound { .. } => "notFound",
            ShellError::InvalidRequest(_) => "invalidRequest",
            ShellError::Storage(_) | ShellError::Json(_) => "storage",
            ShellError::Configuration(_) | ShellError::CacheLock(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
