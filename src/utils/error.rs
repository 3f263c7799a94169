//! Error Handling Module
//!
//! Defines the error type shared by every part of the HSSAN library.
//! Uses thiserror for ergonomic error definitions.
//!
//! Only `Decode`, `ModelNotReady` and `Prediction` ever reach a caller of the
//! inference pipeline. `ArtifactLoad` is absorbed by the model lifecycle,
//! which falls back to a freshly constructed network.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for HSSAN operations
#[derive(Error, Debug)]
pub enum HssanError {
    /// The input bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Inference was requested before the model lifecycle finished
    #[error("Model not loaded")]
    ModelNotReady,

    /// A persisted model is missing, corrupt or incompatible
    #[error("Failed to load model artifact '{path}': {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },

    /// The forward pass failed (shape mismatch, backend panic, non-finite output)
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Invalid construction parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HssanError {
    /// Build an artifact failure for `path`
    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HssanError::ArtifactLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is caused by the caller's input
    pub fn is_client_fault(&self) -> bool {
        matches!(self, HssanError::Decode(_))
    }
}

impl From<serde_json::Error> for HssanError {
    fn from(err: serde_json::Error) -> Self {
        HssanError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for HssanError {
    fn from(err: bincode::Error) -> Self {
        HssanError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for HssanError {
    fn from(err: image::ImageError) -> Self {
        HssanError::Decode(err.to_string())
    }
}

/// Convenience Result type for HSSAN operations
pub type Result<T> = std::result::Result<T, HssanError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Turn any error into an artifact failure for `path`
    fn artifact_context(self, path: &std::path::Path) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn artifact_context(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| HssanError::artifact(path, e.to_string()))
    }
}
