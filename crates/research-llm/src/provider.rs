//! Chat model seam

use crate::{Completion, CompletionRequest, Result};
use async_trait::async_trait;

/// A hosted chat-completion backend
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Short backend name for logs and error messages
    fn name(&self) -> &'static str;
}
