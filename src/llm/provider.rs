//! Provider-agnostic chat completion types and the `LlmProvider` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request. Unset sampling fields fall back to provider defaults.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    /// System prompt plus an optional user turn.
    pub fn from_prompts(system_prompt: impl Into<String>, user_prompt: Option<&str>) -> Self {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        if let Some(user) = user_prompt {
            messages.push(ChatMessage::user(user));
        }
        Self::new(messages)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Which payload layout the reply text was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `choices[0].message.content`
    ChatChoices,
    /// top-level `text`
    Text,
    /// top-level `generated_text`
    GeneratedText,
    /// `predictions[0]`, either a string or an object
    Predictions,
    /// produced locally, no remote payload
    Scripted,
}

/// Normalized completion result.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub shape: ResponseShape,
}

/// A remote text-completion provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Name used in logs and error messages.
    fn model_name(&self) -> &str;

    /// Run one completion. No retries.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
