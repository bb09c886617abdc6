use crate::config::Config;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Persisted OAuth credentials for one Telegram user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub auth_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry, epoch seconds.
    pub expires_at: i64,
    pub scope: String,
    pub token_type: String,
}

impl AuthRecord {
    /// The OAuth handshake has been started but not completed.
    pub fn is_pending(&self) -> bool {
        self.access_token.is_empty()
    }

    /// True once `now` is within `margin` of the expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        now.timestamp().saturating_add(margin) >= self.expires_at
    }
}

/// Fresh credentials as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub scope: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub user_id: String,
    pub message_id: String,
    pub role: MessageRole,
    pub text: String,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let conn = Connection::open(&config.database_url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        self.conn()?.execute_batch(SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    /// Run a synchronous database call off the async runtime.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Authorizations ---

    /// Start (or restart) the OAuth handshake for a user under a new `auth_id`.
    pub fn upsert_pending_authorization(&self, user_id: &str, auth_id: &str) -> anyhow::Result<()> {
        debug!("Database: Creating pending authorization {} for user {}", auth_id, user_id);
        self.conn()?.execute(
            "INSERT INTO authorizations (auth_id, user_id, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id) DO UPDATE SET
                auth_id = excluded.auth_id,
                access_token = '',
                refresh_token = '',
                expires_at = 0,
                scope = '',
                token_type = '',
                updated_at = CURRENT_TIMESTAMP",
            (auth_id, user_id),
        )?;
        Ok(())
    }

    /// Fill a pending record with its first tokens. Returns the owning user id,
    /// or `None` when `auth_id` is unknown.
    pub fn complete_authorization(
        &self,
        auth_id: &str,
        grant: &TokenGrant,
    ) -> anyhow::Result<Option<String>> {
        let conn = self.conn()?;
        let user_id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM authorizations WHERE auth_id = ?1",
                [auth_id],
                |row| row.get(0),
            )
            .optional()?;

        if user_id.is_some() {
            conn.execute(
                "UPDATE authorizations SET
                    access_token = ?2, refresh_token = ?3, expires_at = ?4,
                    scope = ?5, token_type = ?6, updated_at = CURRENT_TIMESTAMP
                 WHERE auth_id = ?1",
                (
                    auth_id,
                    &grant.access_token,
                    &grant.refresh_token,
                    grant.expires_at,
                    &grant.scope,
                    &grant.token_type,
                ),
            )?;
        }
        Ok(user_id)
    }

    pub fn find_authorization_by_user_id(&self, user_id: &str) -> anyhow::Result<Option<AuthRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT auth_id, user_id, access_token, refresh_token, expires_at, scope, token_type
                 FROM authorizations WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(AuthRecord {
                        auth_id: row.get(0)?,
                        user_id: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        expires_at: row.get(4)?,
                        scope: row.get(5)?,
                        token_type: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn update_tokens(&self, user_id: &str, grant: &TokenGrant) -> anyhow::Result<usize> {
        let updated = self.conn()?.execute(
            "UPDATE authorizations SET
                access_token = ?2, refresh_token = ?3, expires_at = ?4,
                scope = ?5, token_type = ?6, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = ?1",
            (
                user_id,
                &grant.access_token,
                &grant.refresh_token,
                grant.expires_at,
                &grant.scope,
                &grant.token_type,
            ),
        )?;
        Ok(updated)
    }

    // --- Messages ---

    /// Returns false when the message was already logged.
    pub fn save_message(
        &self,
        user_id: &str,
        message_id: &str,
        role: MessageRole,
        text: &str,
    ) -> anyhow::Result<bool> {
        debug!("Database: Saving {} message {} for user {}", role.as_str(), message_id, user_id);
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO messages (user_id, message_id, role, text)
             VALUES (?1, ?2, ?3, ?4)",
            (user_id, message_id, role.as_str(), text),
        )?;
        Ok(inserted > 0)
    }

    /// Latest `limit` messages for a user, oldest first.
    pub fn recent_messages(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, message_id, role, text FROM messages
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map((user_id, limit as i64), |row| {
            let role: String = row.get(2)?;
            Ok(StoredMessage {
                user_id: row.get(0)?,
                message_id: row.get(1)?,
                role: MessageRole::parse(&role),
                text: row.get(3)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }
}
