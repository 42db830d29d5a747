//! Pairwise semantic inference
//!
//! - `InferenceFunction`: the external classifier contract
//! - `HeuristicInference`: deterministic lexical proxy with no model runtime
//! - `CrossEncoderInference`: fastembed reranker relevance with lexical polarity
//! - `InferenceScorer`: batching, truncation and output validation
mod classifier;
mod scorer;

pub use classifier::{
    CrossEncoderInference, HeuristicInference, InferenceError, InferenceFunction, InferenceTriple,
};
pub use scorer::InferenceScorer;
