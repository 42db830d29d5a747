//! Embedding generation
//!
//! - `EmbeddingFunction`: the external model contract (texts in, vectors out)
//! - `FastEmbedFunction`: local ONNX model via fastembed
//! - `HashingEmbedding`: deterministic fallback with no model runtime
//! - `EmbeddingGateway`: batching policy in front of whichever function was selected
mod gateway;
mod provider;

pub use gateway::EmbeddingGateway;
pub use provider::{EmbeddingError, EmbeddingFunction, FastEmbedFunction, HashingEmbedding};
