/// Partitioned (IVF) vector index for approximate cosine search
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::types::EvidenceId;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector/id count mismatch: {vectors} vectors, {ids} ids")]
    LengthMismatch { vectors: usize, ids: usize },

    #[error("Cannot tune an index over an empty corpus")]
    EmptyCorpus,

    #[error("Matrix shape error: {0}")]
    Shape(String),
}

/// The two tunable IVF parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of coarse partitions (k-means clusters)
    pub partition_count: usize,
    /// Number of partitions searched per query
    pub search_breadth: usize,
}

impl IvfParams {
    pub fn new(partition_count: usize, search_breadth: usize) -> Self {
        Self {
            partition_count,
            search_breadth,
        }
    }

    /// `partition_count ≈ 5·sqrt(n)`, `search_breadth ≈ 0.2·partition_count`
    pub fn heuristic(corpus_size: usize) -> Self {
        let partition_count = ((5.0 * (corpus_size as f64).sqrt()).round() as usize).max(1);
        let search_breadth = ((0.2 * partition_count as f64).round() as usize).max(1);
        Self::new(partition_count, search_breadth).clamped(corpus_size)
    }

    /// Clamp to `1..=corpus_size` partitions and `1..=partition_count` searched partitions
    pub fn clamped(self, corpus_size: usize) -> Self {
        let partition_count = self.partition_count.clamp(1, corpus_size.max(1));
        let search_breadth = self.search_breadth.clamp(1, partition_count);
        Self::new(partition_count, search_breadth)
    }
}

/// Search result with ID and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: EvidenceId,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Inverted-file index over L2-normalized vectors
///
/// Immutable once built, so concurrent queries need no locking. A build is
/// deterministic: the same vectors, ids and parameters give the same index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// One normalized row per stored vector
    vectors: Array2<f32>,
    ids: Vec<EvidenceId>,
    /// One normalized row per partition
    centroids: Array2<f32>,
    /// Row indices of `vectors` per partition
    partitions: Vec<Vec<usize>>,
    search_breadth: usize,
}

impl VectorIndex {
    /// An index with no vectors; every query returns nothing
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
            ids: Vec::new(),
            centroids: Array2::zeros((0, dimension)),
            partitions: Vec::new(),
            search_breadth: 1,
        }
    }

    /// Build a partitioned index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match every input vector)
    /// * `vectors` - Vectors to index, parallel to `ids`
    /// * `ids` - Evidence ids
    /// * `params` - Partition count and default search breadth (clamped to the corpus)
    /// * `kmeans_iterations` - Upper bound on Lloyd iterations for the coarse centroids
    pub fn build(
        dimension: usize,
        vectors: &[Vec<f32>],
        ids: &[EvidenceId],
        params: IvfParams,
        kmeans_iterations: usize,
    ) -> Result<Self, VectorIndexError> {
        if vectors.len() != ids.len() {
            return Err(VectorIndexError::LengthMismatch {
                vectors: vectors.len(),
                ids: ids.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(Self::empty(dimension));
        }

        let params = params.clamped(vectors.len());
        let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
        let mut data = Array2::from_shape_vec((vectors.len(), dimension), flat)
            .map_err(|e| VectorIndexError::Shape(e.to_string()))?;
        for row in data.rows_mut() {
            normalize(row);
        }

        let centroids = train_centroids(&data, params.partition_count, kmeans_iterations);
        let mut partitions = vec![Vec::new(); params.partition_count];
        for (row, partition) in assign(&data, &centroids).into_iter().enumerate() {
            partitions[partition].push(row);
        }

        tracing::debug!(
            "Built vector index: {} vectors, {} partitions, breadth {}",
            vectors.len(),
            params.partition_count,
            params.search_breadth
        );

        Ok(Self {
            dimension,
            vectors: data,
            ids: ids.to_vec(),
            centroids,
            partitions,
            search_breadth: params.search_breadth,
        })
    }

    /// Approximate top-k using the configured search breadth
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.query_with_breadth(query, k, self.search_breadth)
    }

    /// Exact top-k (searches every partition)
    pub fn exact_query(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.query_with_breadth(query, k, self.partitions.len())
    }

    /// Approximate top-k over the `breadth` partitions nearest the query
    ///
    /// Candidates are scored exactly and ranked by similarity, ties broken by
    /// insertion order, so a wider search never loses a hit a narrower one found.
    pub fn query_with_breadth(
        &self,
        query: &[f32],
        k: usize,
        breadth: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut q = Array1::from_vec(query.to_vec());
        if !normalize(q.view_mut()) {
            // A zero query is similar to nothing
            return Ok(Vec::new());
        }

        let centroid_scores = self.centroids.dot(&q);
        let mut order: Vec<usize> = (0..self.partitions.len()).collect();
        order.sort_by(|&a, &b| descending(centroid_scores[a], centroid_scores[b]).then(a.cmp(&b)));

        let breadth = breadth.clamp(1, self.partitions.len());
        let mut candidates: Vec<(usize, f32)> = order[..breadth]
            .iter()
            .flat_map(|&p| self.partitions[p].iter())
            .map(|&row| (row, self.vectors.row(row).dot(&q)))
            .collect();

        candidates.sort_by(|a, b| descending(a.1, b.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|(row, score)| SearchResult {
                id: self.ids[row].clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn search_breadth(&self) -> usize {
        self.search_breadth
    }

    /// Change the default search breadth (clamped to the partition count)
    pub fn set_search_breadth(&mut self, breadth: usize) {
        self.search_breadth = breadth.clamp(1, self.partitions.len().max(1));
    }

    pub fn params(&self) -> IvfParams {
        IvfParams::new(self.partitions.len(), self.search_breadth)
    }

    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Vec::len).collect()
    }
}

fn descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Scale a row to unit length; returns false for the zero vector
fn normalize(mut row: ArrayViewMut1<f32>) -> bool {
    let norm = row.dot(&row).sqrt();
    if norm > 0.0 && norm.is_finite() {
        row.mapv_inplace(|x| x / norm);
        true
    } else {
        false
    }
}

/// Index of the most similar centroid per row (first wins on ties)
fn assign(data: &Array2<f32>, centroids: &Array2<f32>) -> Vec<usize> {
    let scores = data.dot(&centroids.t());
    scores.rows().into_iter().map(argmax).collect()
}

fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &score) in row.iter().enumerate() {
        if score > row[best] {
            best = i;
        }
    }
    best
}

/// Spherical k-means with strided seeding
///
/// Seeds are rows `c·n/k`, so training is deterministic. Empty clusters keep
/// their previous centroid. Stops early once no centroid moves.
fn train_centroids(data: &Array2<f32>, k: usize, iterations: usize) -> Array2<f32> {
    let (n, dim) = data.dim();
    let mut centroids: Array2<f32> = Array2::zeros((k, dim));
    for c in 0..k {
        centroids.row_mut(c).assign(&data.row(c * n / k));
    }

    for _ in 0..iterations {
        let assignments = assign(data, &centroids);
        let mut sums: Array2<f32> = Array2::zeros((k, dim));
        let mut counts = vec![0usize; k];

        for (row, &cluster) in assignments.iter().enumerate() {
            let mut sum = sums.row_mut(cluster);
            sum += &data.row(row);
            counts[cluster] += 1;
        }

        let mut moved = false;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let mut updated = sums.row(c).to_owned();
            if !normalize(updated.view_mut()) {
                continue;
            }
            if updated != centroids.row(c) {
                moved = true;
                centroids.row_mut(c).assign(&updated);
            }
        }

        if !moved {
            break;
        }
    }

    centroids
}
