//! Language-model provider layer for the research pipeline
//!
//! This crate provides provider-agnostic abstractions for the two model
//! services the pipeline talks to:
//!
//! - Text completion (`LLMProvider`), used to synthesize SQL statements,
//!   per-quarter analyses and news summaries
//! - Text embedding (`EmbeddingProvider`), used to vectorize queries and
//!   document chunks for the vector index
//!
//! Concrete providers live behind feature flags in [`providers`].

pub mod completion;
pub mod embedding;
pub mod error;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{Completion, CompletionRequest};
pub use embedding::EmbeddingProvider;
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;

// Provider implementations (feature-gated)
#[cfg(any(feature = "openai", feature = "gemini"))]
pub mod providers;
