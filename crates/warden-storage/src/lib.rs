//! SQLite adapter for the storage session port.
//!
//! One `SqliteSession` wraps one sqlx transaction: the transaction begins
//! lazily on first use and begins again after a rollback, so the create-race
//! recovery path (rollback + re-fetch) keeps working within a single
//! session. Unique-constraint violations surface as `Error::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions},
    FromRow, Sqlite, Transaction,
};
use tracing::info;

use warden_core::{
    detectors::domains::parse_domains,
    domain::{ChatConfig, ChatId, NewChat, UserId, UserTrustState},
    errors::Error,
    ports::{SessionFactory, StorageSession},
    Result,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id BIGINT NOT NULL UNIQUE,
        title TEXT,
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        ai_check_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        cleanup_mentions BOOLEAN NOT NULL DEFAULT TRUE,
        cleanup_links BOOLEAN NOT NULL DEFAULT TRUE,
        cleanup_emojis BOOLEAN NOT NULL DEFAULT TRUE,
        allowed_domains TEXT NOT NULL DEFAULT '',
        invite_link TEXT
    )",
    "CREATE INDEX IF NOT EXISTS ix_chats_chat_id ON chats (chat_id)",
    "CREATE TABLE IF NOT EXISTS user_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_ref INTEGER NOT NULL REFERENCES chats (id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL,
        joined_at TEXT NOT NULL,
        valid_messages INTEGER NOT NULL DEFAULT 0,
        CONSTRAINT uq_user_state_chat_user UNIQUE (chat_ref, user_id)
    )",
    "CREATE INDEX IF NOT EXISTS ix_user_states_chat_ref ON user_states (chat_ref)",
];

fn map_db_err(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict(db.message().to_string())
        }
        _ => Error::Storage(e.to_string()),
    }
}

#[derive(FromRow)]
struct ChatRow {
    id: i64,
    chat_id: i64,
    title: Option<String>,
    is_active: bool,
    ai_check_enabled: bool,
    cleanup_mentions: bool,
    cleanup_links: bool,
    cleanup_emojis: bool,
    allowed_domains: String,
    invite_link: Option<String>,
}

impl From<ChatRow> for ChatConfig {
    fn from(row: ChatRow) -> Self {
        ChatConfig {
            id: row.id,
            chat_id: ChatId(row.chat_id),
            title: row.title,
            is_active: row.is_active,
            ai_check_enabled: row.ai_check_enabled,
            cleanup_mentions: row.cleanup_mentions,
            cleanup_links: row.cleanup_links,
            cleanup_emojis: row.cleanup_emojis,
            allowed_domains: parse_domains(&row.allowed_domains).into_iter().collect(),
            invite_link: row.invite_link,
        }
    }
}

#[derive(FromRow)]
struct UserStateRow {
    id: i64,
    chat_ref: i64,
    user_id: i64,
    joined_at: DateTime<Utc>,
    valid_messages: i64,
}

impl From<UserStateRow> for UserTrustState {
    fn from(row: UserStateRow) -> Self {
        UserTrustState {
            id: row.id,
            chat_ref: row.chat_ref,
            user_id: UserId(row.user_id),
            joined_at: row.joined_at,
            valid_messages: row.valid_messages,
        }
    }
}

/// Pool owner + session factory.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and bootstrap the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        // In-memory databases exist per connection; keep the pool at one
        // connection so every session sees the same schema.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_db_err)?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await.map_err(map_db_err)?;
        }

        info!(url, "storage ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for SqliteStore {
    async fn session(&self) -> Result<Box<dyn StorageSession>> {
        Ok(Box::new(SqliteSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }
}

pub struct SqliteSession {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteSession {
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(map_db_err)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| Error::Storage("no active transaction".to_string()))
    }
}

#[async_trait]
impl StorageSession for SqliteSession {
    async fn chat_by_telegram_id(&mut self, chat_id: ChatId) -> Result<Option<ChatConfig>> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE chat_id = ?")
            .bind(chat_id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_err)?;
        Ok(row.map(ChatConfig::from))
    }

    async fn create_chat(&mut self, new: NewChat) -> Result<ChatConfig> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, ChatRow>(
            "INSERT INTO chats (chat_id, title, is_active, ai_check_enabled,
                                cleanup_mentions, cleanup_links, cleanup_emojis,
                                allowed_domains)
             VALUES (?, ?, FALSE, ?, TRUE, TRUE, TRUE, '')
             RETURNING *",
        )
        .bind(new.chat_id.0)
        .bind(&new.title)
        .bind(new.ai_check_enabled)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn update_chat_title(&mut self, chat_ref: i64, title: &str) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query("UPDATE chats SET title = ? WHERE id = ?")
            .bind(title)
            .bind(chat_ref)
            .execute(&mut **tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn user_state(
        &mut self,
        chat_ref: i64,
        user_id: UserId,
    ) -> Result<Option<UserTrustState>> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, UserStateRow>(
            "SELECT * FROM user_states WHERE chat_ref = ? AND user_id = ?",
        )
        .bind(chat_ref)
        .bind(user_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_err)?;
        Ok(row.map(UserTrustState::from))
    }

    async fn create_user_state(
        &mut self,
        chat_ref: i64,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<UserTrustState> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, UserStateRow>(
            "INSERT INTO user_states (chat_ref, user_id, joined_at, valid_messages)
             VALUES (?, ?, ?, 0)
             RETURNING *",
        )
        .bind(chat_ref)
        .bind(user_id.0)
        .bind(joined_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn increment_valid_messages(&mut self, state_id: i64) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query("UPDATE user_states SET valid_messages = valid_messages + 1 WHERE id = ?")
            .bind(state_id)
            .execute(&mut **tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(map_db_err)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(map_db_err)?;
        }
        Ok(())
    }
}
