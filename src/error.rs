use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Main error type for caseindex
#[derive(Error, Debug)]
pub enum CaseIndexError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// No persisted partition for the key (index or metadata file missing)
    #[error("Partition not found: {key}")]
    PartitionNotFound { key: String },

    /// Persisted partition exists but failed validation
    #[error("Corrupt partition {key}: {reason}")]
    CorruptPartition { key: String, reason: String },

    /// Case store call failed. Never retried by the engine.
    #[error("Case store unavailable: {0}")]
    StoreUnavailable(String),

    /// Extraction text lacks the markers the rule parser needs
    #[error("Malformed extraction output: {input:?}")]
    MalformedExtraction { input: String },

    /// Rejected query arguments
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// ANN index construction or search failures
    #[error("Index error: {0}")]
    Index(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for CaseIndexError {
    fn from(e: rusqlite::Error) -> Self {
        CaseIndexError::StoreUnavailable(e.to_string())
    }
}

impl From<r2d2::Error> for CaseIndexError {
    fn from(e: r2d2::Error) -> Self {
        CaseIndexError::StoreUnavailable(format!("connection pool: {}", e))
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for caseindex operations
pub type Result<T> = std::result::Result<T, CaseIndexError>;
