//! Hybrid retrieval combining vector and keyword search

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::embedding::{EmbeddingError, EmbeddingGateway};
use crate::index::{IndexGeneration, IndexHandle, KeywordIndexError, VectorIndexError};
use crate::retrieval::{deduplicate_results, fuse, rank, FusionConfig, FusionError};
use crate::types::{Claim, RetrievalResult};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector search failed: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("Keyword search failed: {0}")]
    KeywordIndex(#[from] KeywordIndexError),

    #[error("Invalid fusion configuration: {0}")]
    Fusion(#[from] FusionError),

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

/// Fuses the vector and lexical rankings of the live index generation
pub struct HybridRetriever {
    gateway: EmbeddingGateway,
    indexes: Arc<IndexHandle>,
    fusion: FusionConfig,
    candidate_multiplier: usize,
}

impl HybridRetriever {
    /// Create a new hybrid retriever
    ///
    /// Each sub-query fetches `top_k * candidate_multiplier` candidates.
    pub fn new(
        gateway: EmbeddingGateway,
        indexes: Arc<IndexHandle>,
        fusion: FusionConfig,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            gateway,
            indexes,
            fusion,
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    pub fn fusion_config(&self) -> &FusionConfig {
        &self.fusion
    }

    /// The generation new retrievals run against
    pub fn generation(&self) -> Arc<IndexGeneration> {
        self.indexes.load()
    }

    /// Embed the claim and retrieve against the live generation
    pub async fn retrieve(
        &self,
        claim: &Claim,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let vector = self.gateway.embed_one(claim.text()).await?;
        self.retrieve_with_vector(claim.text(), vector, top_k).await
    }

    /// Retrieve with an already computed query vector
    pub async fn retrieve_with_vector(
        &self,
        text: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        self.retrieve_from(self.indexes.load(), text, vector, top_k)
            .await
    }

    /// Retrieve from a specific generation
    ///
    /// Both sub-queries run concurrently on the blocking pool. Results whose
    /// evidence is missing from `generation` are dropped.
    pub async fn retrieve_from(
        &self,
        generation: Arc<IndexGeneration>,
        text: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        if top_k == 0 || generation.is_empty() {
            return Ok(Vec::new());
        }

        let limit = top_k.saturating_mul(self.candidate_multiplier);

        let vector_generation = Arc::clone(&generation);
        let lexical_generation = Arc::clone(&generation);
        let query_text = text.to_string();

        let (vector_hits, lexical_hits) = tokio::join!(
            tokio::task::spawn_blocking(move || {
                vector_generation.vector_index().query(&vector, limit)
            }),
            tokio::task::spawn_blocking(move || {
                lexical_generation.keyword_index().search(&query_text, limit)
            })
        );

        let vector_hits: Vec<_> = vector_hits
            .map_err(|e| RetrievalError::TaskFailed(e.to_string()))??
            .into_iter()
            .map(|r| (r.id, r.score))
            .collect();
        let lexical_hits: Vec<_> = lexical_hits
            .map_err(|e| RetrievalError::TaskFailed(e.to_string()))??
            .into_iter()
            .map(|r| (r.id, r.score))
            .collect();

        debug!(
            "Retrieved {} vector and {} lexical candidates (generation v{})",
            vector_hits.len(),
            lexical_hits.len(),
            generation.version()
        );

        let mut fused = deduplicate_results(fuse(&vector_hits, &lexical_hits, &self.fusion));
        fused.retain(|r| generation.contains(&r.evidence_id));

        Ok(rank(fused, top_k))
    }
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("gateway", &self.gateway)
            .field("fusion", &self.fusion)
            .field("candidate_multiplier", &self.candidate_multiplier)
            .finish()
    }
}
