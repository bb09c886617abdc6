use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use crate::handler::handle_message;
use crate::telegram::Update;
use crate::Data;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Serve the HTTP routes until the process stops.
pub async fn serve(data: Arc<Data>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&data.config.http_bind).await?;
    info!("HTTP: listening on {}", listener.local_addr()?);
    axum::serve(listener, router(data)).await?;
    Ok(())
}

pub fn router(data: Arc<Data>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/spotify/callback", get(spotify_callback))
        .route("/telegram/webhook", post(telegram_webhook))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .with_state(data)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "botify",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Redirect target of the Spotify consent page.
async fn spotify_callback(
    State(data): State<Arc<Data>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, String) {
    if let Some(reason) = params.error {
        warn!("HTTP: Spotify authorization declined: {}", reason);
        return (
            StatusCode::BAD_REQUEST,
            format!("Spotify authorization was not granted ({}).", reason),
        );
    }
    let (Some(code), Some(state)) = (params.code, params.state) else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing code or state parameter.".to_string(),
        );
    };

    match data.auth.complete_authorization(&code, &state).await {
        Ok(Some(user_id)) => {
            notify_connected(&data, &user_id).await;
            (
                StatusCode::OK,
                "Successfully authenticated with Spotify. You can go back to Telegram.".to_string(),
            )
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            "This authorization link is unknown or has been replaced by a newer one.".to_string(),
        ),
        Err(e) => {
            error!("HTTP: completing Spotify authorization failed: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Could not complete the Spotify authorization. Please try again.".to_string(),
            )
        }
    }
}

async fn notify_connected(data: &Data, user_id: &str) {
    let Ok(chat_id) = user_id.parse::<i64>() else {
        return;
    };
    let text = "✅ Your Spotify account is connected. Send me your request again.";
    if let Err(e) = data.telegram.send_message(chat_id, text, None).await {
        warn!("HTTP: could not notify user {} about the connection: {}", user_id, e);
    }
}

async fn telegram_webhook(
    State(data): State<Arc<Data>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(expected) = &data.config.telegram_webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!("HTTP: webhook call with a missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Answer right away; Telegram redelivers updates that take too long.
    if let Some(message) = update.message {
        tokio::spawn(async move {
            if let Err(e) = handle_message(&data, &message).await {
                error!("HTTP: failed to handle update {}: {:#}", update.update_id, e);
            }
        });
    }
    StatusCode::OK
}
