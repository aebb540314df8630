//! In-process session store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::traits::SessionStore;
use crate::survey::state::ConversationState;

struct Entry {
    state: ConversationState,
    touched_at: DateTime<Utc>,
}

/// Keeps session states in a map. Lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, DatabaseError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.state.clone()))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), DatabaseError> {
        self.sessions.write().await.insert(
            session_id.to_string(),
            Entry {
                state: state.clone(),
                touched_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn last_touched(
        &self,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.touched_at))
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.touched_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::survey::state::SurveyPhase;

    #[tokio::test]
    async fn save_load_delete() {
        let store = InMemorySessionStore::new();
        assert!(store.load("a").await.unwrap().is_none());

        let mut state = ConversationState::default();
        state.record_turn("8", "gracias");
        state.transition_to(SurveyPhase::AwaitingReason).unwrap();
        store.save("a", &state).await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), Some(state));
        assert!(store.load("b").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn idle_sessions_respect_cutoff() {
        let store = InMemorySessionStore::new();
        let before = Utc::now() - TimeDelta::seconds(1);
        store.save("a", &ConversationState::default()).await.unwrap();

        let touched = store.last_touched("a").await.unwrap().unwrap();
        assert!(touched > before);
        assert!(store.last_touched("b").await.unwrap().is_none());

        assert!(store.idle_sessions(before).await.unwrap().is_empty());
        let later = Utc::now() + TimeDelta::seconds(1);
        assert_eq!(store.idle_sessions(later).await.unwrap(), vec!["a".to_string()]);
    }
}
