//! Error types for Easel.

use std::path::PathBuf;

use thiserror::Error;

/// Easel error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Requested model is absent from the catalog
    #[error("Model '{0}' not found; possibly it was moved, renamed, or deleted")]
    ModelNotFound(String),

    /// Ran out of rename candidates for an output path
    #[error("No free path found near {0:?}")]
    PathCollision(PathBuf),
}

/// Result type alias for Easel operations.
pub type Result<T> = std::result::Result<T, Error>;
