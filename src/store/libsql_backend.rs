//! libSQL backend — durable `SessionStore` implementation.
//!
//! Each session is one row holding the whole `ConversationState` as JSON,
//! so a save replaces phase, history and rating in a single statement.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::SessionStore;
use crate::survey::state::ConversationState;

/// libSQL session store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlSessionStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlSessionStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Session database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse `updated_at`: RFC 3339 from `save`, or SQLite's `datetime('now')`
/// format for rows that took the column default.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|t| t.and_utc()))
        .map_err(|e| DatabaseError::Serialization(format!("updated_at {raw:?}: {e}")))
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM survey_sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load session: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load session: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("load session: {e}")))?;
        let state = serde_json::from_str(&raw)
            .map_err(|e| DatabaseError::Serialization(format!("session {session_id}: {e}")))?;
        Ok(Some(state))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), DatabaseError> {
        let raw =
            serde_json::to_string(state).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO survey_sessions (session_id, phase, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (session_id) DO UPDATE SET phase = ?2, state = ?3, updated_at = ?4",
                params![session_id, state.phase.to_string(), raw, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save session: {e}")))?;

        debug!(session_id, phase = %state.phase, turns = state.history.len(), "Session saved");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM survey_sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete session: {e}")))?;
        Ok(count > 0)
    }

    async fn last_touched(
        &self,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT updated_at FROM survey_sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("last touched: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("last touched: {e}")))?
        {
            Some(row) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("last touched: {e}")))?;
                parse_timestamp(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT session_id, updated_at FROM survey_sessions", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("idle sessions: {e}")))?;

        let mut idle = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("idle sessions: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("idle sessions: {e}")))?;
            let raw: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("idle sessions: {e}")))?;
            match parse_timestamp(&raw) {
                Ok(touched) if touched < cutoff => idle.push(id),
                Ok(_) => {}
                Err(e) => warn!(session_id = %id, error = %e, "Skipping session with bad timestamp"),
            }
        }
        Ok(idle)
    }
}
