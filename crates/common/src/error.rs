//! Error types shared across kinetrace crates.

use std::path::PathBuf;

/// Top-level error type for kinetrace operations.
#[derive(Debug, thiserror::Error)]
pub enum KinetraceError {
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Detector error: {message}")]
    Detector { message: String },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    #[error("Tracking error: {message}")]
    Tracking { message: String },

    #[error("Curve error: {message}")]
    Curve { message: String },

    #[error("Model error: {message}")]
    Model { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The reference class never showed up confidently in the detection log.
    #[error("No reference found in {frames} analyzed frames")]
    NoReferenceFound { frames: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using KinetraceError.
pub type KinetraceResult<T> = Result<T, KinetraceError>;

impl KinetraceError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn detector(msg: impl Into<String>) -> Self {
        Self::Detector {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking {
            message: msg.into(),
        }
    }

    pub fn curve(msg: impl Into<String>) -> Self {
        Self::Curve {
            message: msg.into(),
        }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error came from a cooperative stop request rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
