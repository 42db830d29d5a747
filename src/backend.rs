//! Startup selection of the embedding and inference backends
//!
//! The configured model backend is tried first. When it cannot be initialized
//! the deterministic fallback is used instead, unless the section is `strict`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{EmbeddingConfig, InferenceConfig};
use crate::embedding::{EmbeddingFunction, FastEmbedFunction, HashingEmbedding};
use crate::error::{Result, VerityError};
use crate::inference::{CrossEncoderInference, HeuristicInference, InferenceFunction};

/// Pick the embedding function for `config`
pub fn select_embedding(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingFunction>> {
    select_embedding_with(config, FastEmbedFunction::new)
}

/// Same as `select_embedding` with an injectable model constructor
pub fn select_embedding_with<F, E>(
    config: &EmbeddingConfig,
    load_model: F,
) -> Result<Arc<dyn EmbeddingFunction>>
where
    F: FnOnce(&str) -> std::result::Result<E, crate::embedding::EmbeddingError>,
    E: EmbeddingFunction + 'static,
{
    if config.backend == HashingEmbedding::NAME {
        info!("Using hashing embeddings ({} dims)", config.dimension);
        return Ok(Arc::new(HashingEmbedding::new(config.dimension)));
    }

    match load_model(&config.model) {
        Ok(function) => {
            info!(
                model = %config.model,
                dimension = function.dimension(),
                "Using model embeddings"
            );
            Ok(Arc::new(function))
        }
        Err(e) if config.strict => Err(VerityError::ModelUnavailable(format!(
            "embedding backend '{}' failed to start: {}",
            config.backend, e
        ))),
        Err(e) => {
            warn!(
                error = %e,
                "Embedding model unavailable, falling back to hashing embeddings ({} dims)",
                config.dimension
            );
            Ok(Arc::new(HashingEmbedding::new(config.dimension)))
        }
    }
}

/// Pick the inference function for `config`
pub fn select_inference(config: &InferenceConfig) -> Result<Arc<dyn InferenceFunction>> {
    select_inference_with(config, CrossEncoderInference::new)
}

/// Same as `select_inference` with an injectable model constructor
pub fn select_inference_with<F, I>(
    config: &InferenceConfig,
    load_model: F,
) -> Result<Arc<dyn InferenceFunction>>
where
    F: FnOnce(&str) -> std::result::Result<I, crate::inference::InferenceError>,
    I: InferenceFunction + 'static,
{
    if config.backend == HeuristicInference::NAME {
        info!("Using heuristic inference");
        return Ok(Arc::new(HeuristicInference::new()?));
    }

    match load_model(&config.model) {
        Ok(function) => {
            info!(model = %config.model, "Using cross-encoder inference");
            Ok(Arc::new(function))
        }
        Err(e) if config.strict => Err(VerityError::ModelUnavailable(format!(
            "inference backend '{}' failed to start: {}",
            config.backend, e
        ))),
        Err(e) => {
            warn!(error = %e, "Cross-encoder unavailable, falling back to heuristic inference");
            Ok(Arc::new(HeuristicInference::new()?))
        }
    }
}
