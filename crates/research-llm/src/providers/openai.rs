//! OpenAI-compatible chat provider (`/chat/completions`)
//!
//! A custom `api_base` points it at Azure, vLLM or a llama.cpp server.
//!
//! ```no_run
//! use research_llm::{CompletionRequest, LLMProvider};
//! use research_llm::providers::OpenAIProvider;
//!
//! # async fn run() -> research_llm::Result<()> {
//! let provider = OpenAIProvider::from_env()?;
//! let reply = provider
//!     .complete(CompletionRequest::prompt("gpt-4o-mini", "Summarize NVIDIA's latest quarter"))
//!     .await?;
//! println!("{}", reply.text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use crate::{Completion, CompletionRequest, LLMError, LLMProvider, Result, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub(crate) const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Endpoint and credentials
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Reads `OPENAI_API_KEY` and optional `OPENAI_API_BASE`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LLMError::ConfigurationError("OPENAI_API_KEY is not set".to_string()))?;
        let config = Self::new(api_key);
        Ok(match std::env::var("OPENAI_API_BASE") {
            Ok(base) => config.with_api_base(base),
            Err(_) => config,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    pub fn from_env() -> Result<Self> {
        Self::with_config(OpenAIConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ChatRequest::from(&request);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(LLMError::from_status(status, text, &request.model));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::UnexpectedResponse(format!("chat completion body: {e}")))?;
        reply.into_completion()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a CompletionRequest> for ChatRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}

impl ChatResponse {
    fn into_completion(self) -> Result<Completion> {
        let tokens = self.usage.map(|u| u.total_tokens);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("no choices in reply".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LLMError::EmptyCompletion("content_filter".to_string()));
        }
        let truncated = choice.finish_reason.as_deref() == Some("length");
        debug!(truncated, ?tokens, "Chat completion received");

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            truncated,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn test_config_trims_api_base() {
        let provider = OpenAIProvider::with_config(
            OpenAIConfig::new("test-key")
                .with_api_base("http://localhost:8000/v1/")
                .with_timeout(30),
        )
        .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.config().api_base, "http://localhost:8000/v1");
        assert_eq!(provider.config().timeout_secs, 30);
    }

    #[test]
    fn test_request_body() {
        let mut request =
            CompletionRequest::prompt("gpt-4o-mini", "Hi").with_temperature(Some(0.1));
        request.messages.push(Message::assistant("Hello"));

        let json = serde_json::to_value(ChatRequest::from(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["max_tokens"], 1024);
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_reply_without_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#;
        let reply: ChatResponse = serde_json::from_str(body).unwrap();
        let completion = reply.into_completion().unwrap();
        assert_eq!(completion.text(), Some("ok"));
        assert!(!completion.truncated);
        assert!(completion.tokens.is_none());
    }

    #[test]
    fn test_reply_truncated_and_filtered() {
        let body = r#"{"choices":[{"message":{"content":"SELECT"},"finish_reason":"length"}],"usage":{"prompt_tokens":9,"completion_tokens":1,"total_tokens":10}}"#;
        let completion = serde_json::from_str::<ChatResponse>(body)
            .unwrap()
            .into_completion()
            .unwrap();
        assert!(completion.truncated);
        assert_eq!(completion.tokens, Some(10));

        let body = r#"{"choices":[{"message":{"content":null},"finish_reason":"content_filter"}]}"#;
        let err = serde_json::from_str::<ChatResponse>(body)
            .unwrap()
            .into_completion()
            .unwrap_err();
        assert!(matches!(err, LLMError::EmptyCompletion(_)));
    }

    #[test]
    fn test_reply_without_choices() {
        let reply: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            reply.into_completion(),
            Err(LLMError::UnexpectedResponse(_))
        ));
    }
}
