//! Per-claim state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::error::VerityError;

/// Pipeline state of one claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Pending,
    Embedding,
    Retrieving,
    Scoring,
    Aggregating,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// Whether `self -> next` is a legal transition
    ///
    /// Each working stage may jump straight to AGGREGATING (degraded run), and
    /// every non-terminal state may fail.
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Embedding) => true,
            (Embedding, Retrieving | Aggregating) => true,
            (Retrieving, Scoring | Aggregating) => true,
            (Scoring, Aggregating) => true,
            (Aggregating, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Pending => "PENDING",
            PipelineStage::Embedding => "EMBEDDING",
            PipelineStage::Retrieving => "RETRIEVING",
            PipelineStage::Scoring => "SCORING",
            PipelineStage::Aggregating => "AGGREGATING",
            PipelineStage::Done => "DONE",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    ModelUnavailable,
    BudgetExceeded,
    IndexEmpty,
}

/// Why and where a run stopped gathering evidence early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: PipelineStage,
    pub kind: DegradationKind,
    pub reason: String,
}

impl Degradation {
    /// Classify a recoverable error; `None` for errors that must fail the run
    pub fn from_error(stage: PipelineStage, err: &VerityError) -> Option<Self> {
        let kind = match err {
            VerityError::ModelUnavailable(_) => DegradationKind::ModelUnavailable,
            VerityError::BudgetExceeded { .. } => DegradationKind::BudgetExceeded,
            VerityError::IndexEmpty => DegradationKind::IndexEmpty,
            _ => return None,
        };

        Some(Self {
            stage,
            kind,
            reason: err.to_string(),
        })
    }
}

/// Tracks one claim's walk through the stages
#[derive(Debug, Clone)]
pub struct ClaimRun {
    claim_id: Uuid,
    stage: PipelineStage,
    trace: Vec<PipelineStage>,
    degradation: Option<Degradation>,
}

impl ClaimRun {
    pub fn new(claim_id: Uuid) -> Self {
        Self {
            claim_id,
            stage: PipelineStage::Pending,
            trace: vec![PipelineStage::Pending],
            degradation: None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: PipelineStage) -> Result<(), VerityError> {
        if !self.stage.can_transition_to(next) {
            return Err(VerityError::fault(format!(
                "illegal transition {} -> {} for claim {}",
                self.stage, next, self.claim_id
            )));
        }

        debug!("claim {}: {} -> {}", self.claim_id, self.stage, next);
        self.stage = next;
        self.trace.push(next);
        Ok(())
    }

    /// Record a degradation at the current stage
    pub fn degrade(&mut self, degradation: Degradation) {
        self.degradation = Some(degradation);
    }

    /// Move to FAILED if not already terminal
    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = PipelineStage::Failed;
            self.trace.push(PipelineStage::Failed);
        }
    }

    pub fn degradation(&self) -> Option<&Degradation> {
        self.degradation.as_ref()
    }

    pub fn into_parts(self) -> (Vec<PipelineStage>, Option<Degradation>) {
        (self.trace, self.degradation)
    }
}
