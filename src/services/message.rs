use crate::db::{Database, MessageRole, StoredMessage};

/// Chat log kept per Telegram user, used for history and duplicate detection.
#[derive(Clone)]
pub struct MessageService {
    db: Database,
}

impl MessageService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns false when the message had already been saved.
    pub async fn save_user_message(
        &self,
        user_id: &str,
        message_id: i64,
        text: &str,
    ) -> anyhow::Result<bool> {
        self.save(user_id, message_id, MessageRole::User, text).await
    }

    pub async fn save_assistant_message(
        &self,
        user_id: &str,
        message_id: i64,
        text: &str,
    ) -> anyhow::Result<bool> {
        self.save(user_id, message_id, MessageRole::Assistant, text).await
    }

    async fn save(
        &self,
        user_id: &str,
        message_id: i64,
        role: MessageRole,
        text: &str,
    ) -> anyhow::Result<bool> {
        let user_id = user_id.to_string();
        let message_id = message_id.to_string();
        let text = text.to_string();
        self.db
            .run_blocking(move |db| db.save_message(&user_id, &message_id, role, &text))
            .await
    }

    /// Up to `limit` earlier messages, oldest first.
    pub async fn history(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        let user_id = user_id.to_string();
        self.db
            .run_blocking(move |db| db.recent_messages(&user_id, limit))
            .await
    }
}
