//! Embedding provider trait definition

use crate::Result;
use async_trait::async_trait;

/// Trait for text embedding services
///
/// Implementations turn a piece of text into a dense vector whose
/// dimensionality matches the vector index it is queried against.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding model identifier
    fn model(&self) -> &str;
}
