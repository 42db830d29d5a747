//! Score normalization and linear fusion of the vector and lexical rankings

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::types::{EvidenceId, RetrievalResult};

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid fusion weight: alpha must be within [0, 1], got {0}")]
    InvalidWeights(f32),

    #[error("Invalid RRF constant: k must be positive, got {0}")]
    InvalidRrfK(f32),
}

/// How each ranking is mapped into [0, 1] before fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// `(s - min) / (max - min)`, or 1.0 for every member when `max == min`
    #[default]
    MinMax,
    /// `(k + 1) / (k + rank)`, so rank 1 maps to 1.0
    ReciprocalRank,
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Weight of the vector component; lexical gets `1 - alpha`
    pub alpha: f32,

    pub normalization: NormalizationMethod,

    /// RRF K constant (typically 60)
    pub rrf_k: f32,
}

impl FusionConfig {
    pub fn new(
        alpha: f32,
        normalization: NormalizationMethod,
        rrf_k: f32,
    ) -> Result<Self, FusionError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(FusionError::InvalidWeights(alpha));
        }
        if rrf_k.is_nan() || rrf_k <= 0.0 {
            return Err(FusionError::InvalidRrfK(rrf_k));
        }

        Ok(Self {
            alpha,
            normalization,
            rrf_k,
        })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            normalization: NormalizationMethod::MinMax,
            rrf_k: 60.0,
        }
    }
}

/// Map a ranking (best first) into [0, 1]
pub fn normalize(
    ranking: &[(EvidenceId, f32)],
    method: NormalizationMethod,
    rrf_k: f32,
) -> Vec<(EvidenceId, f32)> {
    match method {
        NormalizationMethod::MinMax => {
            let min = ranking.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
            let max = ranking
                .iter()
                .map(|(_, s)| *s)
                .fold(f32::NEG_INFINITY, f32::max);
            let span = max - min;

            ranking
                .iter()
                .map(|(id, s)| {
                    let norm = if span > 0.0 { (s - min) / span } else { 1.0 };
                    (id.clone(), norm)
                })
                .collect()
        }
        NormalizationMethod::ReciprocalRank => ranking
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (id.clone(), (rrf_k + 1.0) / (rrf_k + i as f32 + 1.0)))
            .collect(),
    }
}

/// Fuse two raw rankings into unsorted, unranked results
///
/// `fused = alpha * vector + (1 - alpha) * lexical` over normalized scores; a
/// candidate missing from one ranking gets 0 for that component.
pub fn fuse(
    vector: &[(EvidenceId, f32)],
    lexical: &[(EvidenceId, f32)],
    config: &FusionConfig,
) -> Vec<RetrievalResult> {
    let mut components: AHashMap<EvidenceId, (f32, f32)> = AHashMap::new();

    for (id, score) in normalize(vector, config.normalization, config.rrf_k) {
        let entry = components.entry(id).or_insert((0.0, 0.0));
        entry.0 = entry.0.max(score);
    }
    for (id, score) in normalize(lexical, config.normalization, config.rrf_k) {
        let entry = components.entry(id).or_insert((0.0, 0.0));
        entry.1 = entry.1.max(score);
    }

    components
        .into_iter()
        .map(|(id, (v, l))| RetrievalResult {
            evidence_id: id,
            vector_score: v,
            lexical_score: l,
            fused_score: config.alpha * v + (1.0 - config.alpha) * l,
            rank: 0,
        })
        .collect()
}

/// Sort by fused score (ties by id), keep `top_k`, assign 1-based ranks
pub fn rank(mut results: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.evidence_id.cmp(&b.evidence_id))
    });
    results.truncate(top_k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(pairs: &[(&str, f32)]) -> Vec<(EvidenceId, f32)> {
        pairs.iter().map(|(id, s)| (EvidenceId::from(*id), *s)).collect()
    }

    fn find<'a>(results: &'a [RetrievalResult], id: &str) -> &'a RetrievalResult {
        results
            .iter()
            .find(|r| r.evidence_id.as_str() == id)
            .unwrap()
    }

    #[test]
    fn test_min_max_normalization() {
        let norm = normalize(
            &ranking(&[("a", 0.9), ("b", 0.5), ("c", 0.1)]),
            NormalizationMethod::MinMax,
            60.0,
        );
        assert!((norm[0].1 - 1.0).abs() < 1e-6);
        assert!((norm[1].1 - 0.5).abs() < 1e-6);
        assert!(norm[2].1.abs() < 1e-6);
    }

    #[test]
    fn test_min_max_constant_scores_map_to_one() {
        let norm = normalize(
            &ranking(&[("a", 3.0), ("b", 3.0)]),
            NormalizationMethod::MinMax,
            60.0,
        );
        assert!(norm.iter().all(|(_, s)| *s == 1.0));
    }

    #[test]
    fn test_reciprocal_rank_normalization() {
        let norm = normalize(
            &ranking(&[("a", 10.0), ("b", 9.0)]),
            NormalizationMethod::ReciprocalRank,
            60.0,
        );
        assert_eq!(norm[0].1, 1.0);
        assert!((norm[1].1 - 61.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_component_is_zero() {
        let config = FusionConfig::default();
        let fused = fuse(
            &ranking(&[("v", 0.9), ("both", 0.1)]),
            &ranking(&[("both", 5.0), ("l", 1.0)]),
            &config,
        );

        assert_eq!(fused.len(), 3);
        let v = find(&fused, "v");
        assert_eq!(v.lexical_score, 0.0);
        assert!((v.fused_score - 0.7).abs() < 1e-6);

        let l = find(&fused, "l");
        assert_eq!(l.vector_score, 0.0);
        assert!(l.fused_score.abs() < 1e-6);

        let both = find(&fused, "both");
        assert!((both.fused_score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_fused_score_monotone_in_components() {
        let config = FusionConfig::default();
        let fused = fuse(
            &ranking(&[("a", 0.9), ("b", 0.5), ("c", 0.1)]),
            &ranking(&[("a", 2.0), ("b", 1.0), ("c", 0.0)]),
            &config,
        );
        let ranked = rank(fused, 10);
        let ids: Vec<&str> = ranked.iter().map(|r| r.evidence_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rank_breaks_ties_by_id_and_truncates() {
        let config = FusionConfig::default();
        let fused = fuse(&ranking(&[("z", 1.0), ("m", 1.0), ("a", 1.0)]), &[], &config);
        let ranked = rank(fused, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].evidence_id.as_str(), "a");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].evidence_id.as_str(), "m");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(FusionConfig::new(1.5, NormalizationMethod::MinMax, 60.0).is_err());
        assert!(FusionConfig::new(0.5, NormalizationMethod::MinMax, 0.0).is_err());
        assert!(FusionConfig::new(0.0, NormalizationMethod::ReciprocalRank, 60.0).is_ok());
    }

    #[test]
    fn test_both_empty() {
        let fused = fuse(&[], &[], &FusionConfig::default());
        assert!(rank(fused, 5).is_empty());
    }
}
