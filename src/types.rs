//! Shared data model for the verification pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::pipeline::{Degradation, PipelineStage};

/// Tolerance for the `entailment + neutral + contradiction == 1.0` invariant
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// A natural-language claim submitted for verification
///
/// Fields are private so a claim cannot change once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    id: Uuid,
    text: String,
}

impl Claim {
    /// Create a claim with a fresh random id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), text)
    }

    pub fn with_id(id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Opaque evidence identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(String);

impl EvidenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EvidenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EvidenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A stored piece of evidence with its ingestion-time embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub text: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    /// Empty when the corpus has not been embedded yet
    #[serde(default)]
    pub embedding: Vec<f32>,
}

fn default_source_type() -> String {
    "unknown".to_string()
}

impl EvidenceItem {
    pub fn new(
        id: impl Into<EvidenceId>,
        text: impl Into<String>,
        source_type: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_type: source_type.into(),
            embedding,
        }
    }

    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// One fused retrieval hit for a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub evidence_id: EvidenceId,
    /// Normalized vector component (0.0 when absent from the vector ranking)
    pub vector_score: f32,
    /// Normalized lexical component (0.0 when absent from the lexical ranking)
    pub lexical_score: f32,
    pub fused_score: f32,
    /// 1-based position in the fused ranking
    pub rank: usize,
}

/// Three-way semantic inference scores for one (claim, evidence) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceScore {
    pub evidence_id: EvidenceId,
    pub entailment: f32,
    pub neutral: f32,
    pub contradiction: f32,
}

impl InferenceScore {
    pub fn new(
        evidence_id: impl Into<EvidenceId>,
        entailment: f32,
        neutral: f32,
        contradiction: f32,
    ) -> Self {
        Self {
            evidence_id: evidence_id.into(),
            entailment,
            neutral,
            contradiction,
        }
    }

    pub fn total(&self) -> f32 {
        self.entailment + self.neutral + self.contradiction
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= PROBABILITY_TOLERANCE
    }

    /// The stronger of the two decisive probabilities
    pub fn decisiveness(&self) -> f32 {
        self.entailment.max(self.contradiction)
    }
}

/// Final claim classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Supported,
    Refuted,
    Insufficient,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Supported => "SUPPORTED",
            Verdict::Refuted => "REFUTED",
            Verdict::Insufficient => "INSUFFICIENT",
        };
        f.write_str(s)
    }
}

/// Outcome of verifying one claim, owned by the caller once returned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub claim_id: Uuid,
    pub verdict: Verdict,
    /// Always within [0, 1]
    pub confidence: f32,
    pub per_evidence: Vec<InferenceScore>,
    pub elapsed_ms: u64,
    /// Present when a stage failed or timed out and the run was degraded
    pub degradation: Option<Degradation>,
    /// Pipeline states visited, in order
    pub stage_trace: Vec<PipelineStage>,
}

impl VerificationResult {
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}
