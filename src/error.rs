use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the policy pipeline
#[derive(Error, Debug)]
pub enum TradegymError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Market data errors
    #[error("Invalid market data: {0}")]
    Data(String),

    // Environment errors
    #[error("Episode finished: call reset() before stepping again")]
    EpisodeFinished,

    // Artifact errors
    #[error("Policy artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("Policy artifact corrupt at {path}: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },

    // Optimizer errors
    #[error("Optimizer failed: {0}")]
    Optimizer(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TradegymError
pub type Result<T> = std::result::Result<T, TradegymError>;
