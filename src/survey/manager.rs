//! SurveyManager — coordinates session state, model calls, and phase
//! transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SurveyConfig;
use crate::error::{LlmError, SurveyError};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::store::SessionStore;

use super::greeting::greeting_prefix;
use super::prompts::{
    KeywordFallback, RatingVerdict, UnmarkedReplyPolicy, classify_rating_reply, closed_prompt,
    rating_prompt, reason_prompt, start_prompt,
};
use super::state::{ConversationState, SurveyPhase};

/// Result of one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Reply text with control markers removed.
    pub reply: String,
    /// Phase after the turn.
    pub phase: SurveyPhase,
    /// Whether the phase changed.
    pub transitioned: bool,
}

/// Survey status returned by the REST endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyStatus {
    pub phase: SurveyPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rating: Option<String>,
    /// Number of messages in the transcript.
    pub turns: usize,
}

/// One async mutex per session id, so turns for the same session run
/// strictly one after another.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Drives the survey: prompt selection, marker interpretation, and
/// all-or-nothing persistence of each turn.
pub struct SurveyManager {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn SessionStore>,
    config: SurveyConfig,
    fallback: Arc<dyn UnmarkedReplyPolicy>,
    locks: SessionLocks,
}

impl SurveyManager {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn SessionStore>,
        config: SurveyConfig,
    ) -> Self {
        Self {
            llm,
            store,
            config,
            fallback: Arc::new(KeywordFallback::default()),
            locks: SessionLocks::default(),
        }
    }

    /// Replace the policy applied to rating replies that carry no marker.
    pub fn with_fallback_policy(mut self, policy: Arc<dyn UnmarkedReplyPolicy>) -> Self {
        self.fallback = policy;
        self
    }

    /// Start (or restart) the survey using the server's local clock.
    pub async fn start(&self, session_id: &str) -> Result<String, SurveyError> {
        self.start_at(session_id, Local::now().time()).await
    }

    /// Start (or restart) the survey as if it were `now`.
    ///
    /// On success the session is replaced by a fresh `AwaitingRating` state
    /// holding only the opening message. On failure the previous state is
    /// left as it was.
    pub async fn start_at(&self, session_id: &str, now: NaiveTime) -> Result<String, SurveyError> {
        let _guard = self.locks.acquire(session_id).await;

        let prompt = start_prompt(greeting_prefix(&now), &self.config);
        let reply = self.ask(prompt, None).await.map_err(|e| {
            warn!(session_id, error = %e, "Survey start failed");
            SurveyError::Initialization(e)
        })?;

        let mut state = ConversationState::default();
        state.record_greeting(&reply);
        self.store.save(session_id, &state).await?;

        info!(session_id, "Survey started");
        Ok(reply)
    }

    /// Process one user message.
    ///
    /// 1. Reject blank input.
    /// 2. Build the prompt for the current phase and call the model.
    /// 3. Decide the next phase from the reply.
    /// 4. Append the turn to history and persist the whole state.
    ///
    /// Any failure before step 4 leaves the stored state untouched.
    pub async fn advance(&self, session_id: &str, message: &str) -> Result<TurnOutcome, SurveyError> {
        if message.trim().is_empty() {
            return Err(SurveyError::EmptyInput);
        }

        let _guard = self.locks.acquire(session_id).await;
        let mut state = self.store.load(session_id).await?.unwrap_or_default();
        let from = state.phase;

        let result = match from {
            SurveyPhase::AwaitingRating => self.rating_turn(&mut state, message).await,
            SurveyPhase::AwaitingReason => {
                let prompt = reason_prompt(&self.config, state.last_rating.as_deref(), message);
                self.ask(prompt, Some(message))
                    .await
                    .map(|reply| (reply, SurveyPhase::Completed))
                    .map_err(SurveyError::from)
            }
            SurveyPhase::Completed => self
                .ask(closed_prompt(&self.config, message), Some(message))
                .await
                .map(|reply| (reply, SurveyPhase::Completed))
                .map_err(SurveyError::from),
        };

        let (reply, next) = result.inspect_err(|e| {
            warn!(session_id, phase = %from, error = %e, "Survey turn failed");
        })?;

        state.transition_to(next)?;
        state.record_turn(message, &reply);
        self.store.save(session_id, &state).await?;

        if next != from {
            info!(session_id, from = %from, to = %next, "Survey phase advanced");
        }

        Ok(TurnOutcome {
            reply,
            phase: next,
            transitioned: next != from,
        })
    }

    /// Current phase and progress for a session.
    pub async fn status(&self, session_id: &str) -> Result<SurveyStatus, SurveyError> {
        let state = self.store.load(session_id).await?.unwrap_or_default();
        Ok(SurveyStatus {
            phase: state.phase,
            last_rating: state.last_rating,
            turns: state.history.len(),
        })
    }

    /// Delete sessions that have not been saved for longer than `max_idle`.
    /// Returns how many were removed.
    pub async fn expire_idle(&self, max_idle: Duration) -> Result<usize, SurveyError> {
        let Some(cutoff) = TimeDelta::from_std(max_idle)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return Ok(0);
        };
        self.expire_idle_before(cutoff).await
    }

    /// Delete sessions last saved before `cutoff`.
    ///
    /// Each session is re-checked under its lock, so a turn that lands
    /// between listing and deleting keeps its session.
    pub async fn expire_idle_before(&self, cutoff: DateTime<Utc>) -> Result<usize, SurveyError> {
        let mut removed = 0;
        for session_id in self.store.idle_sessions(cutoff).await? {
            let _guard = self.locks.acquire(&session_id).await;
            let still_idle = self
                .store
                .last_touched(&session_id)
                .await?
                .is_some_and(|touched| touched < cutoff);
            if still_idle && self.store.delete(&session_id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Expired idle survey sessions");
        }
        Ok(removed)
    }

    async fn rating_turn(
        &self,
        state: &mut ConversationState,
        message: &str,
    ) -> Result<(String, SurveyPhase), SurveyError> {
        let raw = self
            .ask(rating_prompt(&self.config, message), Some(message))
            .await?;
        let classified = classify_rating_reply(&raw);

        if classified.text.is_empty() {
            return Err(SurveyError::MalformedResponse(LlmError::MalformedResponse {
                provider: self.llm.model_name().to_string(),
                reason: "reply contained only a rating marker".to_string(),
            }));
        }

        let next = match classified.verdict {
            RatingVerdict::Valid => {
                state.last_rating = Some(message.to_string());
                SurveyPhase::AwaitingReason
            }
            RatingVerdict::Invalid => SurveyPhase::AwaitingRating,
            RatingVerdict::Unmarked if self.fallback.advances_to_reason(&classified.text) => {
                // Rating stays unrecorded: the model never confirmed it.
                warn!("Rating reply had no marker; keyword fallback advanced the survey");
                SurveyPhase::AwaitingReason
            }
            RatingVerdict::Unmarked => {
                debug!("Rating reply had no marker; staying in awaiting_rating");
                SurveyPhase::AwaitingRating
            }
        };

        Ok((classified.text, next))
    }

    async fn ask(&self, system_prompt: String, user_prompt: Option<&str>) -> Result<String, LlmError> {
        let request = CompletionRequest::from_prompts(system_prompt, user_prompt);
        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

/// Spawn a background task that periodically expires idle sessions.
pub fn spawn_expiry_task(
    manager: Arc<SurveyManager>,
    max_idle: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = manager.expire_idle(max_idle).await {
                warn!(error = %e, "Session expiry sweep failed");
            }
        }
    })
}
