/// Batched (claim, evidence) scoring through the inference function
use std::sync::Arc;
use tracing::debug;

use super::{InferenceError, InferenceFunction, InferenceTriple};
use crate::text::truncate_chars;
use crate::types::{Claim, EvidenceItem, InferenceScore, PROBABILITY_TOLERANCE};

/// Turns evidence into per-item inference scores
///
/// Pairs are sent in groups of `batch_size`; group boundaries never change a
/// score. Evidence text is cut to its first `max_evidence_chars` characters
/// before classification.
#[derive(Clone)]
pub struct InferenceScorer {
    function: Arc<dyn InferenceFunction>,
    batch_size: usize,
    max_evidence_chars: usize,
}

impl InferenceScorer {
    pub fn new(
        function: Arc<dyn InferenceFunction>,
        batch_size: usize,
        max_evidence_chars: usize,
    ) -> Self {
        Self {
            function,
            batch_size: batch_size.max(1),
            max_evidence_chars: max_evidence_chars.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_evidence_chars(&self) -> usize {
        self.max_evidence_chars
    }

    pub fn model_name(&self) -> &str {
        self.function.model_name()
    }

    /// Split evidence into the groups `score_batch` expects
    pub fn batches<'a>(&self, evidence: &'a [EvidenceItem]) -> std::slice::Chunks<'a, EvidenceItem> {
        evidence.chunks(self.batch_size)
    }

    /// Score every evidence item against the claim, in input order
    pub async fn score(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
    ) -> Result<Vec<InferenceScore>, InferenceError> {
        let mut scores = Vec::with_capacity(evidence.len());
        for group in self.batches(evidence) {
            scores.extend(self.score_batch(claim.text(), group).await?);
        }
        Ok(scores)
    }

    /// Score one group with a single function call
    pub async fn score_batch(
        &self,
        claim_text: &str,
        group: &[EvidenceItem],
    ) -> Result<Vec<InferenceScore>, InferenceError> {
        if group.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = group
            .iter()
            .map(|item| {
                (
                    claim_text.to_string(),
                    truncate_chars(&item.text, self.max_evidence_chars).to_string(),
                )
            })
            .collect();

        let function = Arc::clone(&self.function);
        let triples = tokio::task::spawn_blocking(move || function.classify(&pairs))
            .await
            .map_err(|e| {
                InferenceError::ModelUnavailable(format!("inference task aborted: {}", e))
            })??;

        if triples.len() != group.len() {
            return Err(InferenceError::BatchMismatch {
                expected: group.len(),
                actual: triples.len(),
            });
        }

        debug!("Scored group of {} pairs", group.len());

        group
            .iter()
            .zip(triples)
            .enumerate()
            .map(|(index, (item, triple))| validate(index, item, triple))
            .collect()
    }
}

/// Check a triple and renormalize it if its sum drifted
fn validate(
    index: usize,
    item: &EvidenceItem,
    (entailment, neutral, contradiction): InferenceTriple,
) -> Result<InferenceScore, InferenceError> {
    let malformed = |reason: &str| InferenceError::MalformedOutput {
        index,
        reason: reason.to_string(),
    };

    let components = [entailment, neutral, contradiction];
    if components.iter().any(|p| !p.is_finite()) {
        return Err(malformed("non-finite probability"));
    }
    if components.iter().any(|p| *p < 0.0) {
        return Err(malformed("negative probability"));
    }

    let total = entailment + neutral + contradiction;
    if total <= 0.0 {
        return Err(malformed("probabilities sum to zero"));
    }

    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        Ok(InferenceScore::new(
            item.id.clone(),
            entailment / total,
            neutral / total,
            contradiction / total,
        ))
    } else {
        Ok(InferenceScore::new(
            item.id.clone(),
            entailment,
            neutral,
            contradiction,
        ))
    }
}

impl std::fmt::Debug for InferenceScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceScorer")
            .field("model", &self.function.model_name())
            .field("batch_size", &self.batch_size)
            .field("max_evidence_chars", &self.max_evidence_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::HeuristicInference;
    use parking_lot::Mutex;

    /// Records the evidence text it was given and returns scripted triples
    struct Scripted {
        triple: InferenceTriple,
        seen: Mutex<Vec<String>>,
    }

    impl InferenceFunction for Scripted {
        fn classify(
            &self,
            pairs: &[(String, String)],
        ) -> Result<Vec<InferenceTriple>, InferenceError> {
            self.seen
                .lock()
                .extend(pairs.iter().map(|(_, evidence)| evidence.clone()));
            Ok(vec![self.triple; pairs.len()])
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Short;

    impl InferenceFunction for Short {
        fn classify(
            &self,
            pairs: &[(String, String)],
        ) -> Result<Vec<InferenceTriple>, InferenceError> {
            Ok(vec![(1.0, 0.0, 0.0); pairs.len().saturating_sub(1)])
        }

        fn model_name(&self) -> &str {
            "short"
        }
    }

    fn evidence(n: usize) -> Vec<EvidenceItem> {
        (0..n)
            .map(|i| {
                EvidenceItem::new(
                    format!("e{}", i),
                    format!("water boils at {} degrees", 90 + i * 5),
                    "test",
                    vec![],
                )
            })
            .collect()
    }

    fn scripted(triple: InferenceTriple) -> Arc<Scripted> {
        Arc::new(Scripted {
            triple,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_batch_size_does_not_change_scores() {
        let function = Arc::new(HeuristicInference::new().unwrap());
        let claim = Claim::new("water boils at 100 degrees");
        let items = evidence(7);

        let one = InferenceScorer::new(function.clone(), 1, 1024)
            .score(&claim, &items)
            .await
            .unwrap();
        let many = InferenceScorer::new(function, 3, 1024)
            .score(&claim, &items)
            .await
            .unwrap();

        assert_eq!(one, many);
        let ids: Vec<&str> = one.iter().map(|s| s.evidence_id.as_str()).collect();
        assert_eq!(ids, vec!["e0", "e1", "e2", "e3", "e4", "e5", "e6"]);
    }

    #[tokio::test]
    async fn test_evidence_is_truncated_by_chars() {
        let function = scripted((0.2, 0.6, 0.2));
        let scorer = InferenceScorer::new(function.clone(), 4, 5);
        let items = vec![EvidenceItem::new("x", "héllo wörld", "test", vec![])];

        scorer.score(&Claim::new("claim"), &items).await.unwrap();
        assert_eq!(function.seen.lock().as_slice(), ["héllo".to_string()]);
    }

    #[tokio::test]
    async fn test_drifting_sum_is_renormalized() {
        let scorer = InferenceScorer::new(scripted((2.0, 1.0, 1.0)), 4, 100);
        let scores = scorer
            .score(&Claim::new("claim"), &evidence(2))
            .await
            .unwrap();

        assert!(scores.iter().all(|s| s.is_normalized()));
        assert!((scores[0].entailment - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_malformed_triple_is_rejected() {
        for triple in [(f32::NAN, 0.5, 0.5), (-0.1, 0.6, 0.5), (0.0, 0.0, 0.0)] {
            let scorer = InferenceScorer::new(scripted(triple), 4, 100);
            let err = scorer
                .score(&Claim::new("claim"), &evidence(1))
                .await
                .unwrap_err();
            assert!(matches!(err, InferenceError::MalformedOutput { .. }));
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_is_reported() {
        let scorer = InferenceScorer::new(Arc::new(Short), 4, 100);
        let err = scorer
            .score(&Claim::new("claim"), &evidence(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::BatchMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_evidence() {
        let scorer = InferenceScorer::new(scripted((1.0, 0.0, 0.0)), 4, 100);
        assert!(scorer
            .score(&Claim::new("claim"), &[])
            .await
            .unwrap()
            .is_empty());
    }
}
