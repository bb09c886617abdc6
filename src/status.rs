//! Progress messages shown in the chat while a tool call runs.
//!
//! Per user the message goes `NONE -> STARTED -> FINALIZED`. Finalizing clears
//! the user's entry, so the next tool call starts a fresh message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::telegram::TelegramClient;

#[async_trait]
pub trait StatusMessenger: Send + Sync {
    /// Post a status message, or reuse the one already started for this user.
    async fn create_status_message(&self, user_id: &str, chat_id: i64, text: &str)
        -> anyhow::Result<i64>;

    async fn update_status_message(&self, user_id: &str, chat_id: i64, text: &str)
        -> anyhow::Result<()>;

    /// Write the final text and forget the message.
    async fn finalize_status_message(&self, user_id: &str, chat_id: i64, text: &str)
        -> anyhow::Result<()>;
}

/// Where status messages are drawn. Implemented by the Telegram client.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<i64>;
    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ChatSurface for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<i64> {
        Ok(self.send_message(chat_id, text, None).await?.message_id)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> anyhow::Result<()> {
        Ok(self.edit_message_text(chat_id, message_id, text).await?)
    }
}

/// user id -> id of the status message currently in STARTED state.
///
/// Keys are disjoint per user, so interleaved turns of different users never
/// touch each other's entry. The lock is only held for the map operation.
#[derive(Default)]
pub struct StatusStore {
    messages: Mutex<HashMap<String, i64>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, user_id: &str) -> Option<i64> {
        self.lock().get(user_id).copied()
    }

    pub fn insert(&self, user_id: &str, message_id: i64) {
        self.lock().insert(user_id.to_string(), message_id);
    }

    pub fn take(&self, user_id: &str) -> Option<i64> {
        self.lock().remove(user_id)
    }

    pub fn is_started(&self, user_id: &str) -> bool {
        self.get(user_id).is_some()
    }
}

pub struct TelegramStatusMessenger {
    surface: Arc<dyn ChatSurface>,
    store: Arc<StatusStore>,
}

impl TelegramStatusMessenger {
    pub fn new(surface: Arc<dyn ChatSurface>, store: Arc<StatusStore>) -> Self {
        Self { surface, store }
    }
}

#[async_trait]
impl StatusMessenger for TelegramStatusMessenger {
    async fn create_status_message(
        &self,
        user_id: &str,
        chat_id: i64,
        text: &str,
    ) -> anyhow::Result<i64> {
        if let Some(message_id) = self.store.get(user_id) {
            self.surface.edit_text(chat_id, message_id, text).await?;
            return Ok(message_id);
        }

        let message_id = self.surface.send_text(chat_id, text).await?;
        self.store.insert(user_id, message_id);
        debug!("Status: started message {} for user {}", message_id, user_id);
        Ok(message_id)
    }

    async fn update_status_message(
        &self,
        user_id: &str,
        chat_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        match self.store.get(user_id) {
            Some(message_id) => self.surface.edit_text(chat_id, message_id, text).await,
            None => self
                .create_status_message(user_id, chat_id, text)
                .await
                .map(|_| ()),
        }
    }

    async fn finalize_status_message(
        &self,
        user_id: &str,
        chat_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        // Cleared before the edit so a failed edit can't leak into the next call.
        match self.store.take(user_id) {
            Some(message_id) => {
                debug!("Status: finalizing message {} for user {}", message_id, user_id);
                self.surface.edit_text(chat_id, message_id, text).await
            }
            None => self.surface.send_text(chat_id, text).await.map(|_| ()),
        }
    }
}
