//! Hybrid retrieval over real vector and keyword indexes

mod common;

use std::sync::Arc;

use common::{corpus, exact_settings, DIM};
use verity::embedding::{EmbeddingGateway, HashingEmbedding};
use verity::index::{IndexGeneration, IndexHandle, IndexSettings};
use verity::retrieval::{FusionConfig, HybridRetriever, NormalizationMethod};
use verity::store::EvidenceStore;
use verity::types::{Claim, EvidenceItem};

const MOUNTAINS: &[(&str, &str)] = &[
    ("everest", "Mount Everest is the highest mountain above sea level"),
    ("k2", "K2 is the second highest mountain on earth"),
    ("alps", "Mont Blanc is the highest peak of the Alps"),
];

fn retriever(handle: Arc<IndexHandle>, fusion: FusionConfig) -> HybridRetriever {
    let gateway = EmbeddingGateway::new(Arc::new(HashingEmbedding::new(DIM)), 8);
    HybridRetriever::new(gateway, handle, fusion, 3)
}

/// Mountains plus one item that only keyword search can see
fn mixed_generation(settings: &IndexSettings) -> IndexGeneration {
    let mut store = corpus(MOUNTAINS);
    store.insert(EvidenceItem::new(
        "kili",
        "Kilimanjaro summit elevation is 5895 metres",
        "test",
        vec![],
    ));
    IndexGeneration::build(&store, settings).unwrap()
}

#[tokio::test]
async fn test_lexical_only_evidence_is_retrieved() {
    let handle = Arc::new(IndexHandle::new(mixed_generation(&exact_settings())));
    let retriever = retriever(handle, FusionConfig::default());

    let results = retriever
        .retrieve(&Claim::new("Kilimanjaro summit elevation"), 10)
        .await
        .unwrap();

    let kili = results
        .iter()
        .find(|r| r.evidence_id.as_str() == "kili")
        .expect("keyword hit missing");
    assert_eq!(kili.vector_score, 0.0);
    assert_eq!(kili.lexical_score, 1.0);
    assert!((kili.fused_score - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_fuzzy_matching_tolerates_typos() {
    let fuzzy = Arc::new(IndexHandle::new(mixed_generation(&exact_settings())));
    let results = retriever(fuzzy, FusionConfig::default())
        .retrieve(&Claim::new("kilimanjaru"), 10)
        .await
        .unwrap();
    assert!(results.iter().any(|r| r.evidence_id.as_str() == "kili"));

    let strict_settings = IndexSettings {
        fuzzy: false,
        ..exact_settings()
    };
    let strict = Arc::new(IndexHandle::new(mixed_generation(&strict_settings)));
    let results = retriever(strict, FusionConfig::default())
        .retrieve(&Claim::new("kilimanjaru"), 10)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.evidence_id.as_str() != "kili"));
}

#[tokio::test]
async fn test_vector_only_weighting() {
    let handle = Arc::new(IndexHandle::new(common::generation(MOUNTAINS)));
    let fusion = FusionConfig::new(1.0, NormalizationMethod::MinMax, 60.0).unwrap();

    let results = retriever(handle, fusion)
        .retrieve(&Claim::new("the highest mountain"), 10)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.fused_score, result.vector_score);
    }
}

#[tokio::test]
async fn test_reciprocal_rank_normalization() {
    let handle = Arc::new(IndexHandle::new(common::generation(MOUNTAINS)));
    let fusion = FusionConfig::new(0.5, NormalizationMethod::ReciprocalRank, 60.0).unwrap();

    let results = retriever(handle, fusion)
        .retrieve(&Claim::new("highest mountain above sea level"), 10)
        .await
        .unwrap();

    assert!(!results.is_empty());
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.rank, i + 1);
        assert!((0.0..=1.0).contains(&result.fused_score));
        assert!((0.0..=1.0).contains(&result.vector_score));
        assert!((0.0..=1.0).contains(&result.lexical_score));
    }
    for pair in results.windows(2) {
        assert!(pair[0].fused_score >= pair[1].fused_score);
    }
}

#[tokio::test]
async fn test_top_k_truncates() {
    let handle = Arc::new(IndexHandle::new(common::generation(MOUNTAINS)));
    let results = retriever(handle, FusionConfig::default())
        .retrieve(&Claim::new("highest mountain"), 2)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[1].rank, 2);

    let ids: std::collections::HashSet<_> = results.iter().map(|r| &r.evidence_id).collect();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_rebuild_makes_new_evidence_visible() {
    let handle = Arc::new(IndexHandle::new(common::generation(MOUNTAINS)));
    let retriever = retriever(Arc::clone(&handle), FusionConfig::default());
    let claim = Claim::new("Denali is the tallest peak in North America");

    let before = retriever.retrieve(&claim, 10).await.unwrap();
    assert!(before.iter().all(|r| r.evidence_id.as_str() != "denali"));

    let mut items: Vec<(&str, &str)> = MOUNTAINS.to_vec();
    items.push(("denali", "Denali is the tallest peak in North America"));
    let store: Arc<dyn EvidenceStore> = Arc::new(corpus(&items));

    let previous = handle.rebuild(store, exact_settings()).await.unwrap();
    assert_eq!(previous.version(), 1);
    assert_eq!(handle.version(), 2);

    let after = retriever.retrieve(&claim, 10).await.unwrap();
    assert_eq!(after[0].evidence_id.as_str(), "denali");
}

#[tokio::test]
async fn test_empty_generation_returns_nothing() {
    let handle = Arc::new(IndexHandle::empty(DIM).unwrap());
    let results = retriever(handle, FusionConfig::default())
        .retrieve(&Claim::new("anything at all"), 10)
        .await
        .unwrap();
    assert!(results.is_empty());
}
