//! Prompt completion request and reply

use crate::Message;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_TOKENS: usize = 1024;

/// A prompt for a chat model plus its sampling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Single user turn with the default token limit
    pub fn prompt(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(text)],
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// `None` leaves sampling to the provider default
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// What a provider returned for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    /// Generation stopped at `max_tokens`
    pub truncated: bool,
    /// Prompt plus output tokens, when the provider reports usage
    pub tokens: Option<usize>,
}

impl Completion {
    /// Generated text, `None` when the reply is blank
    pub fn text(&self) -> Option<&str> {
        (!self.content.trim().is_empty()).then_some(self.content.as_str())
    }
}
