//! `SessionStore` trait — the survey's only persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::survey::state::ConversationState;

/// Persists one `ConversationState` per client session.
///
/// `save` must write phase, history and rating together: a reader never
/// observes a partially updated state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state for a session, if any was saved.
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, DatabaseError>;

    /// Replace the state for a session.
    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), DatabaseError>;

    /// Forget a session. Returns whether anything was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, DatabaseError>;

    /// When the session was last saved, if it exists.
    async fn last_touched(
        &self,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Ids of sessions last saved before `cutoff`.
    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, DatabaseError>;
}
