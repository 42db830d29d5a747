//! Verity - Claim verification against an evidence corpus
//!
//! A claim is embedded, matched against stored evidence with hybrid vector and
//! keyword retrieval, scored pairwise for entailment, neutrality and
//! contradiction, and aggregated into a verdict with a confidence. Every claim
//! runs under a latency budget and degrades to a best-effort verdict instead of
//! failing when a model is slow or unavailable.

pub mod aggregation;
pub mod backend;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod inference;
pub mod pipeline;
pub mod retrieval;
pub mod store;
pub mod text;
pub mod types;

pub use aggregation::{aggregate, AggregationConfig, ConflictTieBreak, VerdictAggregator};
pub use error::{Result, VerityError};
pub use pipeline::{PipelineConfig, PipelineOrchestrator, PipelineStage};
pub use types::{
    Claim, EvidenceId, EvidenceItem, InferenceScore, RetrievalResult, Verdict, VerificationResult,
};
