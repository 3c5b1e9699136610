use std::path::PathBuf;

/// Errors that can occur when reading or writing model files.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{path} has version {found}, expected at least {expected}")]
    Outdated {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("Invalid data: {message}")]
    ValidationError { message: String },
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError {
            message: msg.into(),
        }
    }
}
