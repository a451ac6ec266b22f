use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the retinopathy analyzer
#[derive(Error, Debug)]
pub enum RetinopathyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input image is missing, corrupt or in an unsupported format
    #[error("Image unreadable at {path}: {source}")]
    ImageUnreadable {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Learned-model load or forward pass failed. Recovered internally by
    /// falling back to the heuristic classifier.
    #[error("Model inference failed: {0}")]
    ModelInferenceFailed(String),

    /// Any other failure inside segmentation, lesion detection or overlay output
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing deadline exceeded after {stage} ({elapsed_ms} ms)")]
    DeadlineExceeded {
        stage: &'static str,
        elapsed_ms: u128,
    },

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, RetinopathyError>;
