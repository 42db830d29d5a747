use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::index::{KeywordIndexError, VectorIndexError};
use crate::inference::InferenceError;
use crate::retrieval::{FusionError, RetrievalError};

/// Main error type for Verity
#[derive(Error, Debug)]
pub enum VerityError {
    /// Embedding or inference function unreachable or erroring
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// A stage timeout or the total budget was hit
    #[error("Budget exceeded in {stage} after {budget_ms}ms")]
    BudgetExceeded { stage: String, budget_ms: u64 },

    /// No evidence available. Legitimate input to aggregation, surfaced only by
    /// callers that require a populated corpus.
    #[error("Evidence index is empty")]
    IndexEmpty,

    /// Internal invariant violation (mismatched batch lengths, illegal state
    /// transition, closed worker pool). Never recovered.
    #[error("Orchestration fault: {0}")]
    OrchestrationFault(String),

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

impl VerityError {
    /// Whether the orchestrator may absorb this error into a degraded verdict
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VerityError::ModelUnavailable(_)
                | VerityError::BudgetExceeded { .. }
                | VerityError::IndexEmpty
        )
    }

    pub fn fault(message: impl Into<String>) -> Self {
        VerityError::OrchestrationFault(message.into())
    }
}

impl From<EmbeddingError> for VerityError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::ModelUnavailable(reason) => VerityError::ModelUnavailable(reason),
            EmbeddingError::InitializationError(reason) => VerityError::ModelUnavailable(reason),
            other => VerityError::OrchestrationFault(other.to_string()),
        }
    }
}

impl From<InferenceError> for VerityError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelUnavailable(reason) => VerityError::ModelUnavailable(reason),
            InferenceError::InitializationError(reason) => VerityError::ModelUnavailable(reason),
            InferenceError::MalformedOutput { .. } => VerityError::ModelUnavailable(err.to_string()),
            other => VerityError::OrchestrationFault(other.to_string()),
        }
    }
}

impl From<VectorIndexError> for VerityError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::EmptyCorpus => VerityError::IndexEmpty,
            other => VerityError::OrchestrationFault(other.to_string()),
        }
    }
}

impl From<KeywordIndexError> for VerityError {
    fn from(err: KeywordIndexError) -> Self {
        VerityError::OrchestrationFault(err.to_string())
    }
}

impl From<FusionError> for VerityError {
    fn from(err: FusionError) -> Self {
        VerityError::Config(err.to_string())
    }
}

impl From<RetrievalError> for VerityError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Embedding(e) => e.into(),
            RetrievalError::VectorIndex(e) => e.into(),
            RetrievalError::KeywordIndex(e) => e.into(),
            RetrievalError::Fusion(e) => e.into(),
            RetrievalError::TaskFailed(reason) => VerityError::OrchestrationFault(reason),
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

/// Result type for Verity operations
pub type Result<T> = std::result::Result<T, VerityError>;
