/// Grid search over IVF parameters against exact ground truth
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::vector_index::{IvfParams, VectorIndex, VectorIndexError};
use crate::types::EvidenceId;

/// Breadth fractions of the partition count tried per grid row
const BREADTH_FRACTIONS: [f64; 5] = [0.05, 0.1, 0.2, 0.4, 1.0];
/// Partition count multipliers applied to the heuristic
const PARTITION_MULTIPLIERS: [f64; 3] = [0.5, 1.0, 2.0];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Minimum top-1 recall a configuration must reach
    pub recall_floor: f64,
    /// Number of held-out queries sampled from the corpus
    pub query_count: usize,
    /// Lloyd iterations per candidate build
    pub kmeans_iterations: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            recall_floor: 0.95,
            query_count: 100,
            kmeans_iterations: 10,
        }
    }
}

/// One measured grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningPoint {
    pub params: IvfParams,
    /// Fraction of queries whose approximate top-1 equals the exact top-1
    pub recall: f64,
    /// Mean query latency in microseconds
    pub mean_latency_us: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningReport {
    pub points: Vec<TuningPoint>,
    pub selected: TuningPoint,
    /// False when no point reached the floor and the best-recall point was taken
    pub floor_met: bool,
    pub corpus_size: usize,
    pub query_count: usize,
}

/// Sweeps (partition count, search breadth) and picks the fastest point
/// meeting the recall floor
#[derive(Debug, Clone, Default)]
pub struct IndexTuner {
    config: TuningConfig,
}

impl IndexTuner {
    pub fn new(config: TuningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Candidate parameters for a corpus, grouped by partition count
    ///
    /// Duplicates left after clamping are removed; order is ascending by
    /// partition count then breadth.
    pub fn grid(corpus_size: usize) -> Vec<IvfParams> {
        let start = IvfParams::heuristic(corpus_size);
        let mut grid = Vec::new();

        for multiplier in PARTITION_MULTIPLIERS {
            let partitions = ((start.partition_count as f64 * multiplier).round() as usize).max(1);
            for fraction in BREADTH_FRACTIONS {
                let breadth = ((partitions as f64 * fraction).round() as usize).max(1);
                let params = IvfParams::new(partitions, breadth).clamped(corpus_size);
                if !grid.contains(&params) {
                    grid.push(params);
                }
            }
        }

        grid.sort_by_key(|p| (p.partition_count, p.search_breadth));
        grid
    }

    /// Deterministic held-out queries: `0.9·v[i] + 0.1·v[i+1]` at a fixed stride
    pub fn held_out_queries(vectors: &[Vec<f32>], count: usize) -> Vec<Vec<f32>> {
        if vectors.is_empty() || count == 0 {
            return Vec::new();
        }

        let count = count.min(vectors.len());
        let stride = (vectors.len() / count).max(1);

        (0..count)
            .map(|q| {
                let i = (q * stride) % vectors.len();
                let next = &vectors[(i + 1) % vectors.len()];
                vectors[i]
                    .iter()
                    .zip(next)
                    .map(|(a, b)| 0.9 * a + 0.1 * b)
                    .collect()
            })
            .collect()
    }

    /// Tune against queries sampled from the corpus itself
    pub fn tune(
        &self,
        dimension: usize,
        vectors: &[Vec<f32>],
        ids: &[EvidenceId],
    ) -> Result<TuningReport, VectorIndexError> {
        let queries = Self::held_out_queries(vectors, self.config.query_count);
        self.tune_with_queries(dimension, vectors, ids, &queries)
    }

    /// Tune against caller-supplied query vectors
    pub fn tune_with_queries(
        &self,
        dimension: usize,
        vectors: &[Vec<f32>],
        ids: &[EvidenceId],
        queries: &[Vec<f32>],
    ) -> Result<TuningReport, VectorIndexError> {
        if vectors.is_empty() || queries.is_empty() {
            return Err(VectorIndexError::EmptyCorpus);
        }

        let grid = Self::grid(vectors.len());
        info!(
            "Tuning vector index: {} vectors, {} queries, {} grid points",
            vectors.len(),
            queries.len(),
            grid.len()
        );

        let mut points = Vec::with_capacity(grid.len());
        let mut built: Option<(usize, VectorIndex)> = None;
        let mut truth: Vec<Option<EvidenceId>> = Vec::new();

        for params in grid {
            let index = match built.take() {
                Some((partitions, index)) if partitions == params.partition_count => index,
                _ => VectorIndex::build(
                    dimension,
                    vectors,
                    ids,
                    params,
                    self.config.kmeans_iterations,
                )?,
            };

            if truth.is_empty() {
                truth = queries
                    .iter()
                    .map(|q| Ok(index.exact_query(q, 1)?.into_iter().next().map(|r| r.id)))
                    .collect::<Result<_, VectorIndexError>>()?;
            }

            let point = measure(&index, params, queries, &truth)?;
            debug!(
                "partitions={} breadth={} recall={:.3} latency={:.1}us",
                params.partition_count, params.search_breadth, point.recall, point.mean_latency_us
            );
            points.push(point);
            built = Some((params.partition_count, index));
        }

        let (selected, floor_met) = select(&points, self.config.recall_floor);
        info!(
            "Selected partitions={} breadth={} (recall {:.3}, floor met: {})",
            selected.params.partition_count,
            selected.params.search_breadth,
            selected.recall,
            floor_met
        );

        Ok(TuningReport {
            points,
            selected,
            floor_met,
            corpus_size: vectors.len(),
            query_count: queries.len(),
        })
    }
}

fn measure(
    index: &VectorIndex,
    params: IvfParams,
    queries: &[Vec<f32>],
    truth: &[Option<EvidenceId>],
) -> Result<TuningPoint, VectorIndexError> {
    let mut hits = 0usize;
    let start = Instant::now();

    for (query, expected) in queries.iter().zip(truth) {
        let found = index.query_with_breadth(query, 1, params.search_breadth)?;
        if found.first().map(|r| &r.id) == expected.as_ref() {
            hits += 1;
        }
    }

    let elapsed = start.elapsed();
    Ok(TuningPoint {
        params,
        recall: hits as f64 / queries.len() as f64,
        mean_latency_us: elapsed.as_secs_f64() * 1e6 / queries.len() as f64,
    })
}

/// Fastest point meeting the floor, else the highest-recall point
fn select(points: &[TuningPoint], floor: f64) -> (TuningPoint, bool) {
    let by_latency = |a: &&TuningPoint, b: &&TuningPoint| {
        a.mean_latency_us
            .partial_cmp(&b.mean_latency_us)
            .unwrap_or(std::cmp::Ordering::Equal)
    };

    if let Some(best) = points.iter().filter(|p| p.recall >= floor).min_by(by_latency) {
        return (best.clone(), true);
    }

    let top_recall = points.iter().map(|p| p.recall).fold(0.0, f64::max);
    let best = points
        .iter()
        .filter(|p| p.recall >= top_recall)
        .min_by(by_latency)
        .or_else(|| points.first());

    match best {
        Some(point) => (point.clone(), false),
        None => (
            TuningPoint {
                params: IvfParams::new(1, 1),
                recall: 0.0,
                mean_latency_us: 0.0,
            },
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize, dim: usize) -> (Vec<Vec<f32>>, Vec<EvidenceId>) {
        let vectors = (0..n)
            .map(|i| {
                (0..dim)
                    .map(|d| ((i * 31 + d * 17) % 97) as f32 / 97.0 - 0.5)
                    .collect()
            })
            .collect();
        let ids = (0..n).map(|i| EvidenceId::new(format!("e{}", i))).collect();
        (vectors, ids)
    }

    #[test]
    fn test_grid_is_deduplicated_and_clamped() {
        let grid = IndexTuner::grid(4);
        let mut unique = grid.clone();
        unique.dedup();
        assert_eq!(grid, unique);
        assert!(grid
            .iter()
            .all(|p| p.partition_count <= 4 && p.search_breadth <= p.partition_count));
    }

    #[test]
    fn test_held_out_queries_are_deterministic() {
        let (vectors, _) = corpus(20, 4);
        let a = IndexTuner::held_out_queries(&vectors, 5);
        let b = IndexTuner::held_out_queries(&vectors, 5);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(IndexTuner::held_out_queries(&[], 5).is_empty());
    }

    #[test]
    fn test_recall_monotone_in_breadth() {
        let (vectors, ids) = corpus(200, 8);
        let queries = IndexTuner::held_out_queries(&vectors, 40);
        let index = VectorIndex::build(8, &vectors, &ids, IvfParams::new(16, 1), 10).unwrap();
        let truth: Vec<Option<EvidenceId>> = queries
            .iter()
            .map(|q| index.exact_query(q, 1).unwrap().into_iter().next().map(|r| r.id))
            .collect();

        let mut previous = 0.0;
        for breadth in 1..=16 {
            let point = measure(&index, IvfParams::new(16, breadth), &queries, &truth).unwrap();
            assert!(point.recall >= previous, "recall dropped at breadth {}", breadth);
            previous = point.recall;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_tune_selects_point_meeting_floor() {
        let (vectors, ids) = corpus(120, 6);
        let tuner = IndexTuner::new(TuningConfig {
            recall_floor: 0.9,
            query_count: 30,
            kmeans_iterations: 5,
        });

        let report = tuner.tune(6, &vectors, &ids).unwrap();
        assert!(report.floor_met);
        assert!(report.selected.recall >= 0.9);
        assert_eq!(report.corpus_size, 120);
        assert_eq!(report.points.len(), IndexTuner::grid(120).len());
    }

    #[test]
    fn test_unreachable_floor_takes_best_recall() {
        let points = vec![
            TuningPoint {
                params: IvfParams::new(4, 1),
                recall: 0.5,
                mean_latency_us: 1.0,
            },
            TuningPoint {
                params: IvfParams::new(4, 2),
                recall: 0.8,
                mean_latency_us: 3.0,
            },
        ];

        let (selected, floor_met) = select(&points, 0.99);
        assert!(!floor_met);
        assert_eq!(selected.params, IvfParams::new(4, 2));
    }

    #[test]
    fn test_empty_corpus_is_rejected() {
        let result = IndexTuner::default().tune(4, &[], &[]);
        assert!(matches!(result, Err(VectorIndexError::EmptyCorpus)));
    }
}
