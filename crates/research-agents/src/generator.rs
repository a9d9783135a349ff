//! Text generation and embedding adapters over `research-llm` providers

use crate::api::Embedder;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use research_llm::{CompletionRequest, EmbeddingProvider, LLMProvider};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Opaque prompt-in, text-out language model call
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// [`TextGenerator`] backed by an [`LLMProvider`]
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl LlmGenerator {
    /// Use the model settings from `config`
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ResearchConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    #[instrument(skip(self, prompt), fields(provider = self.provider.name(), model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest::prompt(&self.model, prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let completion = self.provider.complete(request).await?;
        if completion.truncated {
            warn!(max_tokens = self.max_tokens, "Generation hit the token limit");
        }
        debug!(tokens = ?completion.tokens, "Generation finished");

        completion
            .text()
            .map(str::to_string)
            .ok_or_else(|| ResearchError::upstream(self.provider.name(), "empty completion"))
    }
}

/// [`Embedder`] backed by an [`EmbeddingProvider`]
pub struct ProviderEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.provider.embed(text).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_llm::{Completion, LLMError, Role};
    use std::sync::Mutex;

    struct FakeProvider {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LLMProvider for FakeProvider {
        async fn complete(&self, request: CompletionRequest) -> research_llm::Result<Completion> {
            self.seen.lock().unwrap().push(request);
            Ok(Completion {
                content: self.reply.clone(),
                truncated: false,
                tokens: Some(42),
            })
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> research_llm::Result<Vec<f32>> {
            Err(LLMError::RateLimitExceeded("slow down".to_string()))
        }

        fn model(&self) -> &str {
            "fake-embedding"
        }
    }

    #[tokio::test]
    async fn test_generate_uses_config_model() {
        let provider = Arc::new(FakeProvider {
            reply: "SELECT 1;".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let config = ResearchConfig::builder()
            .model("test-model")
            .temperature(0.2)
            .build()
            .unwrap();
        let generator = LlmGenerator::new(provider.clone(), &config);

        let text = generator.generate("write sql").await.unwrap();
        assert_eq!(text, "SELECT 1;");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].model, "test-model");
        assert_eq!(seen[0].temperature, Some(0.2));
        assert_eq!(seen[0].messages[0].role, Role::User);
        assert_eq!(seen[0].messages[0].content, "write sql");
    }

    #[tokio::test]
    async fn test_generate_blank_reply_is_upstream_error() {
        let provider = Arc::new(FakeProvider {
            reply: "   ".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let generator = LlmGenerator::new(provider, &ResearchConfig::default());

        let err = generator.generate("anything").await.unwrap_err();
        assert!(matches!(err, ResearchError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_embedder_maps_provider_errors() {
        let embedder = ProviderEmbedder::new(Arc::new(FailingEmbedder));
        let err = embedder.embed("revenue").await.unwrap_err();
        assert!(matches!(err, ResearchError::UpstreamUnavailable { .. }));
    }
}
