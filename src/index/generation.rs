/// Immutable index snapshots and the handle that swaps them
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::keyword_index::KeywordIndex;
use super::vector_index::{IvfParams, VectorIndex};
use crate::error::{Result, VerityError};
use crate::store::EvidenceStore;
use crate::types::{EvidenceId, EvidenceItem};

/// How a generation is built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub dimension: usize,
    /// Fixed partition count; sized from the corpus when unset
    pub partition_count: Option<usize>,
    /// Fixed search breadth; a fifth of the partitions when unset
    pub search_breadth: Option<usize>,
    pub kmeans_iterations: usize,
    /// Fuzzy lexical matching
    pub fuzzy: bool,
}

impl IndexSettings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            partition_count: None,
            search_breadth: None,
            kmeans_iterations: 10,
            fuzzy: true,
        }
    }

    /// IVF parameters for a corpus of `corpus_size` vectors
    pub fn params_for(&self, corpus_size: usize) -> IvfParams {
        let heuristic = match self.partition_count {
            Some(partitions) => IvfParams::new(
                partitions,
                ((0.2 * partitions as f64).round() as usize).max(1),
            ),
            None => IvfParams::heuristic(corpus_size),
        };
        IvfParams::new(
            heuristic.partition_count,
            self.search_breadth.unwrap_or(heuristic.search_breadth),
        )
        .clamped(corpus_size)
    }
}

/// One consistent snapshot of both indexes and the evidence they point at
#[derive(Debug)]
pub struct IndexGeneration {
    version: u64,
    vector: VectorIndex,
    lexical: KeywordIndex,
    evidence: AHashMap<EvidenceId, EvidenceItem>,
}

impl IndexGeneration {
    /// Build a generation from everything in `store`
    ///
    /// Items without an embedding of the configured dimension are kept for
    /// lexical matching only.
    pub fn build(store: &dyn EvidenceStore, settings: &IndexSettings) -> Result<Self> {
        let start = Instant::now();
        let items: Vec<EvidenceItem> = store.all().collect();

        let mut vectors = Vec::with_capacity(items.len());
        let mut ids = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for item in &items {
            if item.embedding.len() == settings.dimension {
                vectors.push(item.embedding.clone());
                ids.push(item.id.clone());
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(
                "{} evidence items lack a {}-dim embedding and are lexical-only",
                skipped, settings.dimension
            );
        }

        let params = settings.params_for(vectors.len());
        let vector = VectorIndex::build(
            settings.dimension,
            &vectors,
            &ids,
            params,
            settings.kmeans_iterations,
        )?;
        let lexical = KeywordIndex::build(&items, settings.fuzzy)?;

        let evidence = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect::<AHashMap<_, _>>();

        info!(
            "Built index generation: {} evidence, {} vectors, {} partitions ({}ms)",
            evidence.len(),
            vector.len(),
            vector.partition_count(),
            start.elapsed().as_millis()
        );

        Ok(Self {
            version: 0,
            vector,
            lexical,
            evidence,
        })
    }

    /// A generation with no evidence
    pub fn empty(dimension: usize) -> Result<Self> {
        Ok(Self {
            version: 0,
            vector: VectorIndex::empty(dimension),
            lexical: KeywordIndex::empty()?,
            evidence: AHashMap::new(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn vector_index(&self) -> &VectorIndex {
        &self.vector
    }

    pub fn keyword_index(&self) -> &KeywordIndex {
        &self.lexical
    }

    pub fn get(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.evidence.get(id)
    }

    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.evidence.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.evidence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
    }
}

/// Shared pointer to the live generation
///
/// Readers clone the `Arc` and drop the lock immediately; a publish swaps the
/// pointer and leaves in-flight readers on the generation they loaded.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<IndexGeneration>>,
}

impl IndexHandle {
    pub fn new(generation: IndexGeneration) -> Self {
        let mut generation = generation;
        generation.version = 1;
        Self {
            current: RwLock::new(Arc::new(generation)),
        }
    }

    pub fn empty(dimension: usize) -> Result<Self> {
        Ok(Self::new(IndexGeneration::empty(dimension)?))
    }

    /// The live generation
    pub fn load(&self) -> Arc<IndexGeneration> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Make `generation` live and return the one it replaced
    pub fn publish(&self, generation: IndexGeneration) -> Arc<IndexGeneration> {
        let mut generation = generation;
        let mut current = self.current.write();
        generation.version = current.version + 1;
        info!("Publishing index generation v{}", generation.version);
        std::mem::replace(&mut *current, Arc::new(generation))
    }

    /// Build a new generation on the blocking pool, then publish it
    pub async fn rebuild(
        &self,
        store: Arc<dyn EvidenceStore>,
        settings: IndexSettings,
    ) -> Result<Arc<IndexGeneration>> {
        let generation =
            tokio::task::spawn_blocking(move || IndexGeneration::build(store.as_ref(), &settings))
                .await
                .map_err(|e| VerityError::fault(format!("index build task failed: {}", e)))??;
        Ok(self.publish(generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEvidenceStore;

    fn store() -> InMemoryEvidenceStore {
        InMemoryEvidenceStore::from_items(vec![
            EvidenceItem::new("a", "water boils at 100 degrees", "test", vec![1.0, 0.0]),
            EvidenceItem::new("b", "ice melts at 0 degrees", "test", vec![0.0, 1.0]),
            EvidenceItem::new("c", "no vector for this one", "test", vec![]),
        ])
    }

    #[test]
    fn test_build_includes_lexical_only_items() {
        let generation = IndexGeneration::build(&store(), &IndexSettings::new(2)).unwrap();
        assert_eq!(generation.len(), 3);
        assert_eq!(generation.vector_index().len(), 2);
        assert_eq!(generation.keyword_index().len(), 3);
        assert!(generation.contains(&"c".into()));
    }

    #[test]
    fn test_params_overrides() {
        let mut settings = IndexSettings::new(2);
        assert_eq!(settings.params_for(100), IvfParams::heuristic(100));

        settings.search_breadth = Some(7);
        assert_eq!(settings.params_for(100), IvfParams::new(50, 7));

        settings.partition_count = Some(20);
        settings.search_breadth = None;
        assert_eq!(settings.params_for(100), IvfParams::new(20, 4));
        assert_eq!(settings.params_for(5), IvfParams::new(5, 4));
    }

    #[test]
    fn test_empty_store_builds_empty_generation() {
        let empty = InMemoryEvidenceStore::new();
        let generation = IndexGeneration::build(&empty, &IndexSettings::new(4)).unwrap();
        assert!(generation.is_empty());
        assert!(generation.vector_index().is_empty());
    }

    #[test]
    fn test_publish_bumps_version_and_keeps_old_alive() {
        let handle = IndexHandle::empty(2).unwrap();
        assert_eq!(handle.version(), 1);

        let in_flight = handle.load();
        let generation = IndexGeneration::build(&store(), &IndexSettings::new(2)).unwrap();
        let previous = handle.publish(generation);

        assert_eq!(handle.version(), 2);
        assert_eq!(previous.version(), 1);
        assert!(in_flight.is_empty());
        assert_eq!(handle.load().len(), 3);
    }

    #[tokio::test]
    async fn test_rebuild_publishes() {
        let handle = IndexHandle::empty(2).unwrap();
        let store: Arc<dyn EvidenceStore> = Arc::new(store());

        handle.rebuild(store, IndexSettings::new(2)).await.unwrap();
        assert_eq!(handle.version(), 2);
        assert_eq!(handle.load().vector_index().len(), 2);
    }
}
