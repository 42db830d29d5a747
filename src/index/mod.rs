//! Evidence indexes
//!
//! - `VectorIndex`: IVF approximate nearest neighbour search over embeddings
//! - `KeywordIndex`: tantivy BM25 over evidence text
//! - `IndexTuner`: recall/latency sweep over IVF parameters
//! - `IndexGeneration` / `IndexHandle`: immutable snapshots swapped atomically
mod generation;
mod keyword_index;
mod tuning;
mod vector_index;

pub use generation::{IndexGeneration, IndexHandle, IndexSettings};
pub use keyword_index::{KeywordIndex, KeywordIndexError, KeywordSearchResult};
pub use tuning::{IndexTuner, TuningConfig, TuningPoint, TuningReport};
pub use vector_index::{IvfParams, SearchResult, VectorIndex, VectorIndexError};
