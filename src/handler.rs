//! One inbound chat message, from intake to the reply.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::llm::ChatMessage;
use crate::services::auth::AuthStore;
use crate::telegram::{InlineKeyboardMarkup, Message};
use crate::tools::ExecutionContext;
use crate::Data;

pub async fn handle_message(data: &Data, message: &Message) -> anyhow::Result<()> {
    let Some(text) = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        debug!("Handler: ignoring non-text message {}", message.message_id);
        return Ok(());
    };

    let chat_id = message.chat.id;
    let user_id = chat_id.to_string();

    if !data.config.is_chat_allowed(chat_id) {
        warn!("Handler: chat {} is not on the allow-list", chat_id);
        data.telegram
            .send_message(chat_id, "Sorry, this bot is private.", None)
            .await?;
        return Ok(());
    }

    // The insert is the dedupe gate; concurrent redeliveries lose here.
    if !data
        .messages
        .save_user_message(&user_id, message.message_id, text)
        .await?
    {
        info!("Handler: message {} already processed", message.message_id);
        return Ok(());
    }

    let record = data
        .auth
        .find_authorization_by_user_id(&user_id)
        .await?
        .filter(|r| !r.is_pending());
    let Some(record) = record else {
        return send_connect_link(data, message).await;
    };

    if record.is_expired(Utc::now(), data.config.token_refresh_margin) {
        info!("Handler: access token for user {} expired, refreshing", user_id);
        // Tool calls will report AUTHENTICATION if this left the token stale.
        if let Err(e) = data.auth.refresh(&user_id).await {
            warn!("Handler: token refresh failed for user {}: {:#}", user_id, e);
        }
    }

    let history = load_history(data, &user_id, message.message_id).await?;

    let mut ctx = ExecutionContext::new(user_id.clone(), data.connector.clone());
    if data.config.status_messages_enabled {
        ctx = ctx.with_progress(chat_id, data.status.clone());
    }

    match data.agent.run(text, &history, &ctx).await {
        Ok(reply) => {
            let sent = data.telegram.send_message(chat_id, &reply, None).await?;
            data.messages
                .save_assistant_message(&user_id, sent.message_id, &reply)
                .await?;
        }
        Err(e) => {
            error!("Handler: agent failed for user {}: {}", user_id, e);
            data.telegram
                .send_message(chat_id, &e.user_message(), None)
                .await?;
        }
    }
    Ok(())
}

async fn send_connect_link(data: &Data, message: &Message) -> anyhow::Result<()> {
    let user_id = message.chat.id.to_string();
    info!("Handler: user {} has no Spotify connection, sending link", user_id);

    let url = data.auth.start_authorization(&user_id).await?;
    let name = message
        .chat
        .first_name
        .as_deref()
        .or(message.from.as_ref().map(|u| u.first_name.as_str()))
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    let text = format!(
        "Hello {},\n\nIt seems you haven't connected your Spotify account yet. \
         Please use the button below to connect it so I can take care of your request.",
        name
    );

    data.telegram
        .send_message(
            message.chat.id,
            &text,
            Some(&InlineKeyboardMarkup::single_link("🔗 Connect Spotify", &url)),
        )
        .await?;
    Ok(())
}

/// Earlier turns, oldest first, without the message being answered.
async fn load_history(data: &Data, user_id: &str, current: i64) -> anyhow::Result<Vec<ChatMessage>> {
    let limit = data.config.history_limit;
    let current = current.to_string();
    let stored = data.messages.history(user_id, limit + 1).await?;

    let mut history: Vec<ChatMessage> = stored
        .iter()
        .filter(|m| !(m.message_id == current && m.role == crate::db::MessageRole::User))
        .map(ChatMessage::from)
        .collect();
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
    Ok(history)
}
