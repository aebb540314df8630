//! Scripted provider: replays queued replies in order and records every
//! request it receives. Used to drive the survey without a remote model.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, ResponseShape};

const PROVIDER: &str = "scripted";

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.queue(Ok(text.into()))
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) -> &Self {
        self.queue(Err(error))
    }

    /// Queue a transport failure.
    pub fn push_transport_error(&self) -> &Self {
        self.push_error(LlmError::Transport {
            provider: PROVIDER.to_string(),
            reason: "connection reset".to_string(),
        })
    }

    fn queue(&self, item: Result<String, LlmError>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
        self
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                shape: ResponseShape::Scripted,
            }),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::Transport {
                provider: PROVIDER.to_string(),
                reason: "no scripted reply left".to_string(),
            }),
        }
    }
}
