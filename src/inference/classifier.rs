/// Inference function trait and its heuristic and cross-encoder implementations
use ahash::{AHashMap, AHashSet};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

use crate::text::tokenize;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Classifier initialization failed: {0}")]
    InitializationError(String),

    #[error("Classifier unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Malformed classifier output for pair {index}: {reason}")]
    MalformedOutput { index: usize, reason: String },

    #[error("Score count mismatch: expected {expected}, got {actual}")]
    BatchMismatch { expected: usize, actual: usize },
}

/// `(entailment, neutral, contradiction)` for one pair
pub type InferenceTriple = (f32, f32, f32);

/// External pairwise inference function
///
/// Each pair is `(claim, evidence)`. Output has one triple per pair, in input
/// order. Implementations are synchronous; the scorer runs them on the
/// blocking pool.
pub trait InferenceFunction: Send + Sync {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError>;

    fn model_name(&self) -> &str;
}

/// Upper bound on either decisive probability, so neutral never reaches zero
const MAX_DECISIVE: f32 = 0.98;
/// Content words must be at least this long
const MIN_CONTENT_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "are", "was", "were", "for", "with", "that", "this", "from", "has", "have",
    "had", "its", "his", "her", "their", "they", "been", "being", "into", "than", "then", "also",
    "which", "who", "whom", "what", "when", "where", "will", "would", "can", "could", "does",
    "did", "not", "never", "none", "nor", "without",
];

/// Lexical signals shared by both shipped classifiers
#[derive(Debug)]
struct PolarityCues {
    negation: Regex,
    number: Regex,
    stopwords: AHashSet<&'static str>,
}

/// What the cues say about one pair
#[derive(Debug, Clone, Copy, PartialEq)]
struct PairSignals {
    /// Fraction of the claim's content words found in the evidence
    coverage: f32,
    /// Negation parity differs, or the numbers disagree
    conflict: bool,
}

impl PolarityCues {
    fn new() -> Result<Self, InferenceError> {
        let negation = Regex::new(r"\b(?:not|no|never|none|neither|nor|cannot|without)\b|n't\b")
            .map_err(|e| InferenceError::InitializationError(e.to_string()))?;
        let number = Regex::new(r"\d+(?:\.\d+)?")
            .map_err(|e| InferenceError::InitializationError(e.to_string()))?;

        Ok(Self {
            negation,
            number,
            stopwords: STOPWORDS.iter().copied().collect(),
        })
    }

    fn content_words(&self, text: &str) -> AHashSet<String> {
        tokenize(text)
            .into_iter()
            .filter(|t| t.chars().count() >= MIN_CONTENT_LEN)
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .filter(|t| !self.stopwords.contains(t.as_str()))
            .collect()
    }

    fn numbers<'t>(&self, text: &'t str) -> AHashSet<&'t str> {
        self.number.find_iter(text).map(|m| m.as_str()).collect()
    }

    fn negated(&self, text: &str) -> bool {
        self.negation.find_iter(&text.to_lowercase()).count() % 2 == 1
    }

    fn signals(&self, claim: &str, evidence: &str) -> PairSignals {
        let claim_words = self.content_words(claim);
        let evidence_words = self.content_words(evidence);

        let coverage = if claim_words.is_empty() {
            0.0
        } else {
            claim_words.intersection(&evidence_words).count() as f32 / claim_words.len() as f32
        };

        let claim_numbers = self.numbers(claim);
        let evidence_numbers = self.numbers(evidence);
        let numeric_conflict = !claim_numbers.is_empty()
            && !evidence_numbers.is_empty()
            && claim_numbers.is_disjoint(&evidence_numbers);

        PairSignals {
            coverage,
            conflict: numeric_conflict || self.negated(claim) != self.negated(evidence),
        }
    }
}

/// Turn a relevance in [0, 1] and a polarity into a normalized triple
fn polarized(relevance: f32, conflict: bool) -> InferenceTriple {
    let decisive = relevance.clamp(0.0, 1.0) * MAX_DECISIVE;
    if conflict {
        (0.0, 1.0 - decisive, decisive)
    } else {
        (decisive, 1.0 - decisive, 0.0)
    }
}

/// Deterministic lexical inference proxy
///
/// Relevance is the share of the claim's content words the evidence repeats.
/// A negation-parity difference or disjoint numbers flip the decisive mass
/// from entailment to contradiction; the rest is neutral.
#[derive(Debug)]
pub struct HeuristicInference {
    cues: PolarityCues,
}

impl HeuristicInference {
    pub const NAME: &'static str = "heuristic";

    pub fn new() -> Result<Self, InferenceError> {
        Ok(Self {
            cues: PolarityCues::new()?,
        })
    }
}

impl InferenceFunction for HeuristicInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        Ok(pairs
            .iter()
            .map(|(claim, evidence)| {
                let signals = self.cues.signals(claim, evidence);
                polarized(signals.coverage, signals.conflict)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        Self::NAME
    }
}

/// Cross-encoder relevance with heuristic polarity
///
/// A fastembed reranker scores how strongly the evidence bears on the claim;
/// the polarity cues decide which side that mass lands on.
pub struct CrossEncoderInference {
    model: Arc<TextRerank>,
    model_name: String,
    cues: PolarityCues,
}

impl CrossEncoderInference {
    /// Create a cross-encoder classifier
    ///
    /// Supported: bge-reranker-base, jina-reranker-v1-turbo-en. Downloaded on
    /// first use.
    pub fn new(model_name: &str) -> Result<Self, InferenceError> {
        let reranker_model = match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => {
                return Err(InferenceError::InitializationError(format!(
                    "Unsupported reranker: {}. Supported: bge-reranker-base, jina-reranker-v1-turbo-en",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(false);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| InferenceError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            cues: PolarityCues::new()?,
        })
    }

    pub fn with_default_model() -> Result<Self, InferenceError> {
        Self::new("bge-reranker-base")
    }

    /// Sigmoid relevance for every pair, one reranker call per distinct claim
    fn relevance(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, InferenceError> {
        let mut relevance = vec![None; pairs.len()];

        for (claim, members) in group_by_claim(pairs) {
            let documents: Vec<&str> = members.iter().map(|&i| pairs[i].1.as_str()).collect();
            let results = self
                .model
                .rerank(claim, documents, false, None)
                .map_err(|e| InferenceError::ModelUnavailable(e.to_string()))?;

            let scores = results.into_iter().map(|r| (r.index, r.score));
            scatter_scores(&members, scores, &mut relevance)?;
        }

        relevance
            .into_iter()
            .map(|logit| {
                logit
                    .map(|l| 1.0 / (1.0 + (-l).exp()))
                    .ok_or(InferenceError::BatchMismatch {
                        expected: pairs.len(),
                        actual: 0,
                    })
            })
            .collect()
    }
}

/// Pair indices grouped by claim text, groups in first-seen order
fn group_by_claim(pairs: &[(String, String)]) -> Vec<(&str, Vec<usize>)> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut positions: AHashMap<&str, usize> = AHashMap::new();

    for (i, (claim, _)) in pairs.iter().enumerate() {
        let slot = *positions.entry(claim.as_str()).or_insert_with(|| {
            groups.push((claim.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(i);
    }
    groups
}

/// Write `(document index, score)` results of one group back to pair positions
///
/// Reranker output is sorted by score, so `document index` is what ties a
/// score to its pair. Every member must receive exactly one score.
fn scatter_scores(
    members: &[usize],
    scores: impl Iterator<Item = (usize, f32)>,
    out: &mut [Option<f32>],
) -> Result<(), InferenceError> {
    let mut placed = 0usize;
    for (document, score) in scores {
        let pair = members.get(document).copied();
        match pair.and_then(|pair| out.get_mut(pair)) {
            Some(slot @ None) => *slot = Some(score),
            _ => {
                return Err(InferenceError::BatchMismatch {
                    expected: members.len(),
                    actual: placed + 1,
                })
            }
        }
        placed += 1;
    }

    if placed != members.len() {
        return Err(InferenceError::BatchMismatch {
            expected: members.len(),
            actual: placed,
        });
    }
    Ok(())
}

impl InferenceFunction for CrossEncoderInference {
    fn classify(&self, pairs: &[(String, String)]) -> Result<Vec<InferenceTriple>, InferenceError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let relevance = self.relevance(pairs)?;
        Ok(pairs
            .iter()
            .zip(relevance)
            .map(|((claim, evidence), relevance)| {
                polarized(relevance, self.cues.signals(claim, evidence).conflict)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
