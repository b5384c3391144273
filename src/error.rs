use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;
use crate::index::{KeywordIndexError, VectorIndexError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Ragline
#[derive(Error, Debug)]
pub enum RaglineError {
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

    /// Document content was empty or whitespace-only
    #[error("Document content is empty")]
    EmptyInput,

    /// Chunk size / overlap combination cannot produce chunks
    #[error("Invalid chunk parameters: chunk_size={chunk_size}, overlap={overlap} (need chunk_size > 0 and overlap < chunk_size)")]
    InvalidChunkParams { chunk_size: usize, overlap: usize },

    /// Upstream embedding provider failure
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[from] EmbeddingError),

    /// Upstream text-generation provider failure
    #[error("Generation provider error: {0}")]
    GenerationProvider(#[from] GenerationError),

    /// Chunk id already present in the index (or twice in one batch)
    #[error("Duplicate chunk id: {id}")]
    DuplicateId { id: u64 },

    /// Delete with an empty filter and no confirmation
    #[error("Refusing to delete with an empty filter; pass confirm=true to wipe the collection")]
    UnsafeDelete,

    /// Search issued before anything was loaded
    #[error("Index not initialized: add documents before searching")]
    IndexNotInitialized,

    /// Invalid search query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid tool request arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding dimension does not match the index
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    /// Keyword index errors
    #[error("Keyword index error: {0}")]
    KeywordIndex(#[from] KeywordIndexError),

    /// Session related errors
    #[error("Session error: {0}")]
    Session(String),

    /// Session not found
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

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

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RaglineError {
    /// Name of the pipeline stage that failed, used when reporting tool failures
    pub fn stage(&self) -> &'static str {
        match self {
            Self::EmptyInput | Self::InvalidChunkParams { .. } => "chunking",
            Self::EmbeddingProvider(_) => "embedding",
            Self::GenerationProvider(_) => "generation",
            Self::DuplicateId { .. }
            | Self::UnsafeDelete
            | Self::DimensionMismatch { .. }
            | Self::VectorIndex(_)
            | Self::KeywordIndex(_)
            | Self::Database(_)
            | Self::Pool(_) => "indexing",
            Self::IndexNotInitialized | Self::InvalidQuery(_) => "retrieval",
            Self::InvalidRequest(_) => "request",
            Self::Config(_)
            | Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::InvalidConfigValue { .. } => "config",
            Self::Session(_) | Self::SessionNotFound { .. } => "session",
            Self::Io { .. }
            | Self::Toml(_)
            | Self::TomlSerialization(_)
            | Self::Json { .. }
            | Self::Other(_) => "io",
        }
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

/// Result type for Ragline operations
pub type Result<T> = std::result::Result<T, RaglineError>;
