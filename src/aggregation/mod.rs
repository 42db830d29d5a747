//! Verdict aggregation
//!
//! Per-evidence inference scores are reduced to one verdict and a confidence.
//! Evidence counts as supporting when its entailment probability reaches the
//! threshold and as refuting when its contradiction probability does (both
//! inclusive). One-sided evidence decides directly; two-sided evidence goes
//! through the conflict rule and is discounted by the conflict penalty; no
//! decisive evidence at all is INSUFFICIENT.
//!
//! Everything here is a pure function of its input.

use serde::{Deserialize, Serialize};

use crate::types::{InferenceScore, Verdict};

/// How a conflict with equal supporting and refuting counts is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictTieBreak {
    /// Side with the higher mean probability; an exact tie is INSUFFICIENT
    #[default]
    MeanProbability,
    PreferRefuted,
    PreferSupported,
    /// Always INSUFFICIENT
    Insufficient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Minimum probability for evidence to count as decisive (inclusive)
    pub confidence_threshold: f32,
    /// Multiplier applied to the winning side's confidence on conflict
    pub conflict_penalty: f32,
    pub tie_break: ConflictTieBreak,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            conflict_penalty: 0.5,
            tie_break: ConflictTieBreak::MeanProbability,
        }
    }
}

/// Applies the aggregation rules with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct VerdictAggregator {
    config: AggregationConfig,
}

impl VerdictAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn aggregate(&self, scores: &[InferenceScore]) -> (Verdict, f32) {
        if scores.is_empty() {
            return (Verdict::Insufficient, 0.0);
        }

        let threshold = self.config.confidence_threshold;
        let supporting: Vec<f32> = scores
            .iter()
            .map(|s| s.entailment)
            .filter(|p| *p >= threshold)
            .collect();
        let refuting: Vec<f32> = scores
            .iter()
            .map(|s| s.contradiction)
            .filter(|p| *p >= threshold)
            .collect();

        let (verdict, confidence) = match (supporting.is_empty(), refuting.is_empty()) {
            (false, true) => (Verdict::Supported, mean(&supporting)),
            (true, false) => (Verdict::Refuted, mean(&refuting)),
            (false, false) => self.resolve_conflict(scores, &supporting, &refuting),
            (true, true) => insufficient(scores),
        };

        (verdict, clamp_unit(confidence))
    }

    fn resolve_conflict(
        &self,
        scores: &[InferenceScore],
        supporting: &[f32],
        refuting: &[f32],
    ) -> (Verdict, f32) {
        let penalty = self.config.conflict_penalty;
        let support_mean = mean(supporting);
        let refute_mean = mean(refuting);
        let supported = (Verdict::Supported, support_mean * penalty);
        let refuted = (Verdict::Refuted, refute_mean * penalty);

        if supporting.len() > refuting.len() {
            return supported;
        }
        if refuting.len() > supporting.len() {
            return refuted;
        }

        match self.config.tie_break {
            ConflictTieBreak::MeanProbability if support_mean > refute_mean => supported,
            ConflictTieBreak::MeanProbability if refute_mean > support_mean => refuted,
            ConflictTieBreak::MeanProbability => insufficient(scores),
            ConflictTieBreak::PreferRefuted => refuted,
            ConflictTieBreak::PreferSupported => supported,
            ConflictTieBreak::Insufficient => insufficient(scores),
        }
    }
}

/// Aggregate with the default conflict penalty and tie-break
pub fn aggregate(scores: &[InferenceScore], confidence_threshold: f32) -> (Verdict, f32) {
    VerdictAggregator::new(AggregationConfig {
        confidence_threshold,
        ..AggregationConfig::default()
    })
    .aggregate(scores)
}

/// `1 - mean(max(entailment, contradiction))`: distance from being decisive
fn insufficient(scores: &[InferenceScore]) -> (Verdict, f32) {
    let decisiveness: Vec<f32> = scores.iter().map(InferenceScore::decisiveness).collect();
    (Verdict::Insufficient, 1.0 - mean(&decisiveness))
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
