//! Hybrid evidence retrieval
//!
//! Vector and keyword rankings are normalized, fused linearly, deduplicated and
//! truncated to the requested number of results.

mod deduplication;
mod fusion;
mod hybrid;

pub use deduplication::deduplicate_results;
pub use fusion::{fuse, normalize, rank, FusionConfig, FusionError, NormalizationMethod};
pub use hybrid::{HybridRetriever, RetrievalError};
