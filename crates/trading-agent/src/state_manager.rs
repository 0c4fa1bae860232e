use agent_core::{AuditLog, UserState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::session::SessionState;

/// Where user sessions are persisted between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, user_id: &str, session: &SessionState) -> Result<()>;

    /// `None` when nothing is stored for `user_id`.
    async fn load_session(&self, user_id: &str, now: DateTime<Utc>)
        -> Result<Option<SessionState>>;
}

/// Key-value store for user sessions. Each session is one JSON blob.
pub struct StateManager {
    pub(crate) db_pool: sqlx::AnyPool,
}

impl StateManager {
    pub fn new(db_pool: sqlx::AnyPool) -> Self {
        Self { db_pool }
    }

    /// Connect to `database_url`. In-memory SQLite is pinned to one
    /// connection so every query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let db_pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to {database_url}"))?;
        Ok(Self::new(db_pool))
    }

    /// Initialize agent state tables.
    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Save a state value by key (upsert).
    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Load a state value by key.
    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM agent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl SessionStore for StateManager {
    async fn save_session(&self, user_id: &str, session: &SessionState) -> Result<()> {
        let blob = serde_json::to_string(session).context("failed to serialize session")?;
        self.save_state(&session_key(user_id), &blob).await?;
        tracing::info!(
            "Saved session for {} ({} agents, {} audit entries)",
            user_id,
            session.user.agents.len(),
            session.audit.len()
        );
        Ok(())
    }

    /// Load and normalize a stored session. Repaired fields are logged.
    async fn load_session(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionState>> {
        let Some(blob) = self.load_state(&session_key(user_id)).await? else {
            return Ok(None);
        };
        let raw: Value = serde_json::from_str(&blob)
            .with_context(|| format!("stored session for {user_id} is not valid JSON"))?;

        let normalized = UserState::from_value(raw.get("user").unwrap_or(&Value::Null), now)
            .with_context(|| format!("stored session for {user_id} has no usable user record"))?;
        for repair in &normalized.repairs {
            tracing::warn!(
                "Repaired stored field {} for {}: {}",
                repair.path,
                user_id,
                repair.detail
            );
        }

        let audit = match raw.get("audit") {
            None | Some(Value::Null) => AuditLog::new(),
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                tracing::warn!("Discarded unreadable audit log for {}: {}", user_id, e);
                AuditLog::new()
            }),
        };

        tracing::info!(
            "Loaded session for {} ({} agents, {} repairs)",
            user_id,
            normalized.value.agents.len(),
            normalized.repairs.len()
        );
        Ok(Some(SessionState {
            user: normalized.value,
            audit,
        }))
    }
}

fn session_key(user_id: &str) -> String {
    format!("session:{user_id}")
}
