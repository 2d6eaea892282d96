//! SQLite conversation store.
//!
//! Uses a single SQLite database file with two tables:
//! - `messages` — the append-only message log, one row per message
//! - `context_configurations` — one row per session holding the latest
//!   summary and the active id set as JSON
//!
//! Every mutation runs inside a transaction whose first statement is a write,
//! so the read-modify-write of a configuration row holds the write lock.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::error::StoreError;
use parley_core::message::{Message, Role, SessionId};
use parley_core::store::{ContextConfiguration, ConversationStore, Summary};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// A durable conversation store backed by SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-width timestamps so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp {s:?}: {e}")))
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // Each connection to :memory: is its own database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                session_id   TEXT NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS context_configurations (
                session_id          TEXT PRIMARY KEY,
                summary             TEXT,
                active_message_ids  TEXT NOT NULL DEFAULT '[]',
                updated_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("context_configurations table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let role = Role::parse(&role_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role {role_str:?}")))?;

        Ok(Message {
            id,
            role,
            content,
            timestamp: parse_ts(&created_at)?,
        })
    }

    fn row_to_configuration(
        session_id: &SessionId,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<ContextConfiguration, StoreError> {
        let summary_json: Option<String> = row
            .try_get("summary")
            .map_err(|e| StoreError::QueryFailed(format!("summary column: {e}")))?;
        let active_json: String = row
            .try_get("active_message_ids")
            .map_err(|e| StoreError::QueryFailed(format!("active_message_ids column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        let summary = summary_json
            .map(|json| serde_json::from_str::<Summary>(&json))
            .transpose()
            .map_err(|e| StoreError::QueryFailed(format!("summary JSON: {e}")))?;
        let active_message_ids: Vec<String> = serde_json::from_str(&active_json)
            .map_err(|e| StoreError::QueryFailed(format!("active ids JSON: {e}")))?;

        Ok(ContextConfiguration {
            session_id: session_id.clone(),
            summary,
            active_message_ids,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    async fn load_configuration(
        tx: &mut Transaction<'_, Sqlite>,
        session_id: &SessionId,
    ) -> Result<Option<ContextConfiguration>, StoreError> {
        let row = sqlx::query(
            "SELECT summary, active_message_ids, updated_at FROM context_configurations WHERE session_id = ?1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT configuration: {e}")))?;

        row.map(|r| Self::row_to_configuration(session_id, &r)).transpose()
    }

    async fn save_configuration(
        tx: &mut Transaction<'_, Sqlite>,
        config: &ContextConfiguration,
    ) -> Result<(), StoreError> {
        let summary_json = config
            .summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("summary serialization: {e}")))?;
        let active_json = serde_json::to_string(&config.active_message_ids)
            .map_err(|e| StoreError::Storage(format!("active ids serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO context_configurations (session_id, summary, active_message_ids, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id) DO UPDATE SET
                summary = excluded.summary,
                active_message_ids = excluded.active_message_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.session_id.as_str())
        .bind(summary_json)
        .bind(active_json)
        .bind(format_ts(&config.updated_at))
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT configuration: {e}")))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Sqlite>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))
    }

    async fn commit(tx: Transaction<'_, Sqlite>) -> Result<(), StoreError> {
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_messages(&self, session_id: &SessionId, messages: &[Message]) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        // Touch the configuration row first so this transaction holds the write lock
        sqlx::query(
            "INSERT INTO context_configurations (session_id, updated_at) VALUES (?1, ?2) ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(session_id.as_str())
        .bind(format_ts(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT configuration: {e}")))?;

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (id, session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&message.id)
            .bind(session_id.as_str())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(format_ts(&message.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT message: {e}")))?;
        }

        // Only the active set changes here; the summary column is left alone
        let active_json: String =
            sqlx::query_scalar("SELECT active_message_ids FROM context_configurations WHERE session_id = ?1")
                .bind(session_id.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("SELECT active ids: {e}")))?;
        let mut active: Vec<String> = serde_json::from_str(&active_json)
            .map_err(|e| StoreError::QueryFailed(format!("active ids JSON: {e}")))?;
        active.extend(messages.iter().map(|m| m.id.clone()));
        let active_json = serde_json::to_string(&active)
            .map_err(|e| StoreError::Storage(format!("active ids serialization: {e}")))?;

        sqlx::query("UPDATE context_configurations SET active_message_ids = ?2, updated_at = ?3 WHERE session_id = ?1")
            .bind(session_id.as_str())
            .bind(active_json)
            .bind(format_ts(&Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE active ids: {e}")))?;

        Self::commit(tx).await?;
        debug!(session_id = %session_id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM messages WHERE session_id = ?1 ORDER BY created_at, seq",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn messages_by_ids(&self, session_id: &SessionId, ids: &[String]) -> Result<Vec<Message>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        // json_each avoids building a variable-length IN list
        let ids_json = serde_json::to_string(ids)
            .map_err(|e| StoreError::QueryFailed(format!("ids serialization: {e}")))?;
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, created_at FROM messages
            WHERE session_id = ?1 AND id IN (SELECT value FROM json_each(?2))
            ORDER BY created_at, seq
            "#,
        )
        .bind(session_id.as_str())
        .bind(ids_json)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT messages by id: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn context_configuration(&self, session_id: &SessionId) -> Result<Option<ContextConfiguration>, StoreError> {
        let row = sqlx::query(
            "SELECT summary, active_message_ids, updated_at FROM context_configurations WHERE session_id = ?1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT configuration: {e}")))?;

        row.map(|r| Self::row_to_configuration(session_id, &r)).transpose()
    }

    async fn ensure_context_configuration(&self, session_id: &SessionId) -> Result<ContextConfiguration, StoreError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO context_configurations (session_id, updated_at) VALUES (?1, ?2) ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(session_id.as_str())
        .bind(format_ts(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT configuration: {e}")))?;

        let config = Self::load_configuration(&mut tx, session_id)
            .await?
            .ok_or_else(|| StoreError::MissingConfiguration(session_id.to_string()))?;
        Self::commit(tx).await?;
        Ok(config)
    }

    async fn commit_summary(&self, session_id: &SessionId, summary: Summary) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        let touched = sqlx::query("UPDATE context_configurations SET updated_at = ?2 WHERE session_id = ?1")
            .bind(session_id.as_str())
            .bind(format_ts(&Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE configuration: {e}")))?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::MissingConfiguration(session_id.to_string()));
        }

        let mut config = Self::load_configuration(&mut tx, session_id)
            .await?
            .ok_or_else(|| StoreError::MissingConfiguration(session_id.to_string()))?;
        config.apply_summary(summary);
        Self::save_configuration(&mut tx, &config).await?;

        Self::commit(tx).await?;
        debug!(session_id = %session_id, "Committed summary");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}
