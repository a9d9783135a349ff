//! Concrete LLM and embedding provider implementations
//!
//! This module contains implementations of the [`LLMProvider`](crate::LLMProvider)
//! and [`EmbeddingProvider`](crate::EmbeddingProvider) traits for the hosted
//! services the pipeline uses.

#[cfg(feature = "openai")]
pub mod embeddings;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use embeddings::{OpenAIEmbedder, OpenAIEmbeddingConfig};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiConfig, GeminiProvider};
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};
