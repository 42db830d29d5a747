/// Batching gateway in front of the embedding function
use super::{EmbeddingError, EmbeddingFunction};
use crate::store::InMemoryEvidenceStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns texts into vectors through an injected `EmbeddingFunction`
///
/// Input is split into groups of `batch_size`, one function call per group,
/// and outputs are concatenated in input order. Any failing group fails the
/// whole call; nothing is retried here.
#[derive(Clone)]
pub struct EmbeddingGateway {
    function: Arc<dyn EmbeddingFunction>,
    batch_size: usize,
}

impl EmbeddingGateway {
    /// Create a new gateway
    ///
    /// # Arguments
    /// * `function` - Embedding function (shared, read-only)
    /// * `batch_size` - Number of texts per function call (minimum 1)
    pub fn new(function: Arc<dyn EmbeddingFunction>, batch_size: usize) -> Self {
        Self {
            function,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.function.dimension()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn model_name(&self) -> &str {
        self.function.model_name()
    }

    /// Embed `texts`, returning one vector per text in the same order
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.function.dimension();
        let mut vectors = Vec::with_capacity(texts.len());

        for group in texts.chunks(self.batch_size) {
            let function = Arc::clone(&self.function);
            let owned = group.to_vec();

            let embedded = tokio::task::spawn_blocking(move || function.embed(&owned))
                .await
                .map_err(|e| {
                    EmbeddingError::ModelUnavailable(format!("embedding task aborted: {}", e))
                })??;

            if embedded.len() != group.len() {
                return Err(EmbeddingError::BatchMismatch {
                    expected: group.len(),
                    actual: embedded.len(),
                });
            }

            if let Some(bad) = embedded.iter().find(|v| v.len() != dimension) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: bad.len(),
                });
            }

            debug!("Embedded group of {} texts", group.len());
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::BatchMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Embed every stored item that has no embedding yet
    ///
    /// Ingestion shim for corpora loaded without vectors. Returns the number of
    /// items embedded.
    pub async fn embed_missing(
        &self,
        store: &mut InMemoryEvidenceStore,
    ) -> Result<usize, EmbeddingError> {
        let start = std::time::Instant::now();
        let ids = store.unembedded_ids();
        if ids.is_empty() {
            return Ok(0);
        }

        info!("Embedding {} evidence items", ids.len());

        let texts: Vec<String> = ids
            .iter()
            .filter_map(|id| store.get(id).map(|item| item.text.clone()))
            .collect();
        let vectors = self.embed(&texts).await?;

        for (id, vector) in ids.iter().zip(vectors) {
            store.set_embedding(id, vector);
        }

        info!(
            "Embedding complete: {} items, {}ms",
            ids.len(),
            start.elapsed().as_millis()
        );

        Ok(ids.len())
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("model", &self.function.model_name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::types::EvidenceItem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text's length into the first component and counts calls
    struct CountingFunction {
        calls: AtomicUsize,
    }

    impl EmbeddingFunction for CountingFunction {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct DroppingFunction;

    impl EmbeddingFunction for DroppingFunction {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0]).collect())
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "dropping"
        }
    }

    struct FailingFunction;

    impl EmbeddingFunction for FailingFunction {
        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ModelUnavailable("runtime offline".to_string()))
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_order_preserved_across_groups() {
        let function = Arc::new(CountingFunction {
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(function.clone(), 3);

        let texts: Vec<String> = (1..=8).map(|n| "x".repeat(n)).collect();
        let vectors = gateway.embed(&texts).await.unwrap();

        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(function.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input_skips_function() {
        let function = Arc::new(CountingFunction {
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(function.clone(), 4);

        assert!(gateway.embed(&[]).await.unwrap().is_empty());
        assert_eq!(function.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_reported() {
        let gateway = EmbeddingGateway::new(Arc::new(DroppingFunction), 8);
        let err = gateway
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::BatchMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_failure_yields_no_partial_results() {
        let gateway = EmbeddingGateway::new(Arc::new(FailingFunction), 1);
        let result = gateway.embed(&["a".to_string(), "b".to_string()]).await;
        assert!(matches!(result, Err(EmbeddingError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn test_embed_missing_fills_store() {
        let gateway = EmbeddingGateway::new(Arc::new(HashingEmbedding::new(32)), 2);
        let mut store = InMemoryEvidenceStore::from_items(vec![
            EvidenceItem::new("a", "alpha text", "test", vec![]),
            EvidenceItem::new("b", "beta text", "test", vec![1.0; 32]),
            EvidenceItem::new("c", "gamma text", "test", vec![]),
        ]);

        let embedded = gateway.embed_missing(&mut store).await.unwrap();
        assert_eq!(embedded, 2);
        assert!(store.unembedded_ids().is_empty());
        assert_eq!(store.get(&"b".into()).unwrap().embedding, vec![1.0; 32]);
    }
}
