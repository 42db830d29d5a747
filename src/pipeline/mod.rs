//! Claim verification orchestration
//!
//! Each claim walks PENDING → EMBEDDING → RETRIEVING → SCORING → AGGREGATING →
//! DONE. Every working stage runs under `min(stage timeout, remaining budget)`.
//! A timeout or an unavailable model ends evidence gathering early and the
//! claim is aggregated from whatever was scored so far; only orchestration
//! faults fail a claim.

mod state;

pub use state::{ClaimRun, Degradation, DegradationKind, PipelineStage};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::aggregation::VerdictAggregator;
use crate::error::{Result, VerityError};
use crate::index::IndexGeneration;
use crate::inference::InferenceScorer;
use crate::retrieval::HybridRetriever;
use crate::types::{Claim, EvidenceItem, InferenceScore, VerificationResult};

/// Runtime limits for the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub total_budget: Duration,
    pub embedding_timeout: Duration,
    pub retrieval_timeout: Duration,
    pub scoring_timeout: Duration,
    /// Claims allowed to run at once
    pub max_concurrent_claims: usize,
    /// Extra attempts after a `ModelUnavailable` inside one stage
    pub model_retries: usize,
    /// Evidence items retrieved per claim
    pub top_k: usize,
}

impl PipelineConfig {
    /// Sum of the embedding, retrieval and scoring timeouts
    pub fn stage_timeout_sum(&self) -> Duration {
        self.embedding_timeout
            .saturating_add(self.retrieval_timeout)
            .saturating_add(self.scoring_timeout)
    }

    pub fn stages_fit_budget(&self) -> bool {
        self.stage_timeout_sum() <= self.total_budget
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_budget: Duration::from_secs(60),
            embedding_timeout: Duration::from_secs(10),
            retrieval_timeout: Duration::from_secs(10),
            scoring_timeout: Duration::from_secs(40),
            max_concurrent_claims: 8,
            model_retries: 1,
            top_k: 10,
        }
    }
}

/// Wall-clock budget for one claim
#[derive(Debug, Clone, Copy)]
struct StageBudget {
    started: Instant,
    total: Duration,
}

impl StageBudget {
    fn start(total: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started.elapsed())
    }

    /// Deadline for a stage, or `BudgetExceeded` if nothing is left
    fn stage_deadline(
        &self,
        stage: PipelineStage,
        timeout: Duration,
    ) -> Result<(tokio::time::Instant, Duration)> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(VerityError::BudgetExceeded {
                stage: stage.to_string(),
                budget_ms: self.total.as_millis() as u64,
            });
        }
        let limit = timeout.min(remaining);
        Ok((tokio::time::Instant::now() + limit, limit))
    }
}

/// Runs claims through embedding, retrieval, scoring and aggregation
pub struct PipelineOrchestrator {
    retriever: HybridRetriever,
    scorer: InferenceScorer,
    aggregator: VerdictAggregator,
    config: PipelineConfig,
    workers: Arc<Semaphore>,
}

impl PipelineOrchestrator {
    pub fn new(
        retriever: HybridRetriever,
        scorer: InferenceScorer,
        aggregator: VerdictAggregator,
        config: PipelineConfig,
    ) -> Self {
        if !config.stages_fit_budget() {
            warn!(
                "Stage timeouts add up to {}ms but the total budget is {}ms; later stages will be cut short",
                config.stage_timeout_sum().as_millis(),
                config.total_budget.as_millis()
            );
        }

        let workers = Arc::new(Semaphore::new(config.max_concurrent_claims.max(1)));
        Self {
            retriever,
            scorer,
            aggregator,
            config,
            workers,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Verify one claim
    ///
    /// Recoverable failures produce a degraded result; only an
    /// `OrchestrationFault` is returned as an error.
    pub async fn verify_claim(&self, claim_text: &str) -> Result<VerificationResult> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| VerityError::fault(format!("worker pool closed: {}", e)))?;

        self.run(Claim::new(claim_text)).await
    }

    /// Verify many claims concurrently, results in input order
    ///
    /// Fails as a whole only on an orchestration fault in any claim.
    pub async fn verify_batch(
        self: Arc<Self>,
        claim_texts: Vec<String>,
    ) -> Result<Vec<VerificationResult>> {
        let start = Instant::now();
        let count = claim_texts.len();

        // Dropping the set on an early return aborts the claims still running
        let mut tasks = JoinSet::new();
        for (position, text) in claim_texts.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self);
            tasks.spawn(async move { (position, orchestrator.verify_claim(&text).await) });
        }

        let mut slots: Vec<Option<VerificationResult>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (position, result) =
                joined.map_err(|e| VerityError::fault(format!("claim task failed: {}", e)))?;
            match result {
                Ok(result) => slots[position] = Some(result),
                Err(e) => {
                    error!("Claim {} of {} faulted: {}", position + 1, count, e);
                    return Err(e);
                }
            }
        }

        let results = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VerityError::fault("claim task vanished from batch"))?;

        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        info!(
            "Verified {} claims ({} degraded) in {}ms",
            count,
            degraded,
            start.elapsed().as_millis()
        );

        Ok(results)
    }

    async fn run(&self, claim: Claim) -> Result<VerificationResult> {
        let started = Instant::now();
        let budget = StageBudget::start(self.config.total_budget);
        let mut run = ClaimRun::new(claim.id());
        let mut scores = Vec::new();

        match self.gather(&claim, &budget, &mut run, &mut scores).await {
            Ok(()) => {}
            Err(err) => match Degradation::from_error(run.stage(), &err) {
                Some(degradation) => {
                    warn!(
                        "claim {} degraded in {}: {} ({} scores kept)",
                        claim.id(),
                        degradation.stage,
                        degradation.reason,
                        scores.len()
                    );
                    run.degrade(degradation);
                }
                None => {
                    error!("claim {} failed in {}: {}", claim.id(), run.stage(), err);
                    run.fail();
                    return Err(err);
                }
            },
        }

        run.advance(PipelineStage::Aggregating)?;
        let (verdict, confidence) = self.aggregator.aggregate(&scores);
        run.advance(PipelineStage::Done)?;

        let (stage_trace, degradation) = run.into_parts();
        Ok(VerificationResult {
            claim_id: claim.id(),
            verdict,
            confidence,
            per_evidence: scores,
            elapsed_ms: started.elapsed().as_millis() as u64,
            degradation,
            stage_trace,
        })
    }

    /// EMBEDDING, RETRIEVING and SCORING; scores land in `scores` as batches finish
    async fn gather(
        &self,
        claim: &Claim,
        budget: &StageBudget,
        run: &mut ClaimRun,
        scores: &mut Vec<InferenceScore>,
    ) -> Result<()> {
        let text = claim.text();

        run.advance(PipelineStage::Embedding)?;
        let (deadline, limit) =
            budget.stage_deadline(PipelineStage::Embedding, self.config.embedding_timeout)?;
        let gateway = self.retriever.gateway();
        let vector = self
            .within(PipelineStage::Embedding, deadline, limit, || async move {
                gateway.embed_one(text).await.map_err(VerityError::from)
            })
            .await?;

        run.advance(PipelineStage::Retrieving)?;
        let (deadline, limit) =
            budget.stage_deadline(PipelineStage::Retrieving, self.config.retrieval_timeout)?;
        let generation = self.retriever.generation();
        let retriever = &self.retriever;
        let top_k = self.config.top_k;
        let results = self
            .within(PipelineStage::Retrieving, deadline, limit, || {
                let generation = Arc::clone(&generation);
                let vector = vector.clone();
                async move {
                    retriever
                        .retrieve_from(generation, text, vector, top_k)
                        .await
                        .map_err(VerityError::from)
                }
            })
            .await?;

        run.advance(PipelineStage::Scoring)?;
        let evidence = resolve(&generation, &results);
        let (deadline, limit) =
            budget.stage_deadline(PipelineStage::Scoring, self.config.scoring_timeout)?;
        let scorer = &self.scorer;
        for group in scorer.batches(&evidence) {
            let batch = self
                .within(PipelineStage::Scoring, deadline, limit, || async move {
                    scorer
                        .score_batch(text, group)
                        .await
                        .map_err(VerityError::from)
                })
                .await?;
            scores.extend(batch);
        }

        Ok(())
    }

    /// Run `op` until `deadline`, retrying `ModelUnavailable` up to the
    /// configured number of times
    async fn within<T, F, Fut>(
        &self,
        stage: PipelineStage,
        deadline: tokio::time::Instant,
        limit: Duration,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout_at(deadline, op()).await {
                Err(_) => {
                    return Err(VerityError::BudgetExceeded {
                        stage: stage.to_string(),
                        budget_ms: limit.as_millis() as u64,
                    })
                }
                Ok(Err(VerityError::ModelUnavailable(reason)))
                    if attempt < self.config.model_retries =>
                {
                    attempt += 1;
                    warn!(
                        "{} model unavailable ({}), retry {}/{}",
                        stage, reason, attempt, self.config.model_retries
                    );
                }
                Ok(outcome) => return outcome,
            }
        }
    }
}

/// Evidence items for retrieval results, in rank order
fn resolve(
    generation: &IndexGeneration,
    results: &[crate::types::RetrievalResult],
) -> Vec<EvidenceItem> {
    results
        .iter()
        .filter_map(|r| generation.get(&r.evidence_id).cloned())
        .collect()
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("retriever", &self.retriever)
            .field("scorer", &self.scorer)
            .field("config", &self.config)
            .finish()
    }
}
