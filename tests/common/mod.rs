//! Shared fixtures: scripted model doubles and an orchestrator builder
#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use verity::aggregation::{AggregationConfig, VerdictAggregator};
use verity::embedding::{EmbeddingError, EmbeddingFunction, EmbeddingGateway, HashingEmbedding};
use verity::index::{IndexGeneration, IndexHandle, IndexSettings};
use verity::inference::{InferenceError, InferenceFunction, InferenceScorer, InferenceTriple};
use verity::pipeline::{PipelineConfig, PipelineOrchestrator};
use verity::retrieval::{FusionConfig, HybridRetriever};
use verity::store::InMemoryEvidenceStore;
use verity::types::EvidenceItem;

pub const DIM: usize = 64;

pub const ENTAIL: InferenceTriple = (0.9, 0.05, 0.05);
pub const CONTRADICT: InferenceTriple = (0.05, 0.05, 0.9);
pub const NEUTRAL: InferenceTriple = (0.1, 0.8, 0.1);

/// Decides from markers in the evidence text: "confirmed" entails,
/// "disproved" contradicts, anything else is neutral
#[derive(Debug, Default)]
pub struct ScriptedInference {
    pub calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn triple(evidence: &str) -> InferenceTriple {
        if evidence.contains("confirmed") {
            ENTAIL
        } else if evidence.contains("disproved") {
            CONTRADICT
        } else {
            NEUTRAL
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceFunction for ScriptedInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(pairs.iter().map(|(_, e)| Self::triple(e)).collect())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Decides from the claim: "true" entails, "false" contradicts
#[derive(Debug, Default)]
pub struct ClaimOracle;

impl InferenceFunction for ClaimOracle {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        Ok(pairs
            .iter()
            .map(|(claim, _)| {
                if claim.contains("true") {
                    ENTAIL
                } else if claim.contains("false") {
                    CONTRADICT
                } else {
                    NEUTRAL
                }
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "oracle"
    }
}

/// Unavailable for the first `failures` calls, scripted afterwards
#[derive(Debug)]
pub struct FlakyInference {
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyInference {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceFunction for FlakyInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(InferenceError::ModelUnavailable("warming up".to_string()));
        }
        Ok(pairs
            .iter()
            .map(|(_, e)| ScriptedInference::triple(e))
            .collect())
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

/// Sleeps whenever a pair's evidence contains "stalls"
#[derive(Debug)]
pub struct StallingInference {
    pub delay: Duration,
}

impl InferenceFunction for StallingInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        if pairs.iter().any(|(_, e)| e.contains("stalls")) {
            std::thread::sleep(self.delay);
        }
        Ok(pairs
            .iter()
            .map(|(_, e)| ScriptedInference::triple(e))
            .collect())
    }

    fn model_name(&self) -> &str {
        "stalling"
    }
}

/// Always returns one triple too few
#[derive(Debug, Default)]
pub struct ShortInference;

impl InferenceFunction for ShortInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        Ok(vec![NEUTRAL; pairs.len().saturating_sub(1)])
    }

    fn model_name(&self) -> &str {
        "short"
    }
}

/// Short output for claims mentioning "fault"; sleeps `delay` on every other claim
#[derive(Debug)]
pub struct FaultOrStallInference {
    pub delay: Duration,
}

impl InferenceFunction for FaultOrStallInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        if pairs.iter().any(|(c, _)| c.contains("fault")) {
            return ShortInference.classify(pairs);
        }
        std::thread::sleep(self.delay);
        Ok(vec![NEUTRAL; pairs.len()])
    }

    fn model_name(&self) -> &str {
        "fault-or-stall"
    }
}

/// Signals `entered`, then blocks until released, then answers like `ScriptedInference`
pub struct GatedInference {
    pub entered: Arc<Notify>,
    pub release: Mutex<Receiver<()>>,
}

impl InferenceFunction for GatedInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        self.entered.notify_one();
        let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
        Ok(pairs
            .iter()
            .map(|(_, e)| ScriptedInference::triple(e))
            .collect())
    }

    fn model_name(&self) -> &str {
        "gated"
    }
}

/// Embedding model that is never reachable
#[derive(Debug, Default)]
pub struct UnreachableEmbedding;

impl EmbeddingFunction for UnreachableEmbedding {
    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ModelUnavailable("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

/// Evidence embedded with the hashing embedder
pub fn corpus(items: &[(&str, &str)]) -> InMemoryEvidenceStore {
    let embedder = HashingEmbedding::new(DIM);
    InMemoryEvidenceStore::from_items(items.iter().map(|(id, text)| {
        let vector = embedder
            .embed(&[text.to_string()])
            .unwrap()
            .pop()
            .unwrap();
        EvidenceItem::new(*id, *text, "test", vector)
    }))
}

/// One partition, so vector search is exact
pub fn exact_settings() -> IndexSettings {
    IndexSettings {
        partition_count: Some(1),
        ..IndexSettings::new(DIM)
    }
}

pub fn generation(items: &[(&str, &str)]) -> IndexGeneration {
    IndexGeneration::build(&corpus(items), &exact_settings()).unwrap()
}

/// Orchestrator wiring with swappable model doubles
pub struct Harness {
    pub embedding: Arc<dyn EmbeddingFunction>,
    pub inference: Arc<dyn InferenceFunction>,
    pub pipeline: PipelineConfig,
    pub aggregation: AggregationConfig,
    pub inference_batch_size: usize,
}

impl Harness {
    pub fn new(inference: Arc<dyn InferenceFunction>) -> Self {
        Self {
            embedding: Arc::new(HashingEmbedding::new(DIM)),
            inference,
            pipeline: PipelineConfig::default(),
            aggregation: AggregationConfig::default(),
            inference_batch_size: 16,
        }
    }

    pub fn build(self, handle: Arc<IndexHandle>) -> Arc<PipelineOrchestrator> {
        let retriever = HybridRetriever::new(
            EmbeddingGateway::new(self.embedding, 8),
            handle,
            FusionConfig::default(),
            3,
        );
        let scorer = InferenceScorer::new(self.inference, self.inference_batch_size, 1024);

        Arc::new(PipelineOrchestrator::new(
            retriever,
            scorer,
            VerdictAggregator::new(self.aggregation),
            self.pipeline,
        ))
    }

    pub fn build_over(self, items: &[(&str, &str)]) -> Arc<PipelineOrchestrator> {
        self.build(Arc::new(IndexHandle::new(generation(items))))
    }
}
