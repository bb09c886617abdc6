use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use botify::config::{Config, TelegramMode};
use botify::db::Database;
use botify::handler::handle_message;
use botify::{http, Data};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Starting botify in {:?} mode", config.telegram_mode);

    if let Some(dir) = Path::new(&config.database_url).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let db = Database::new(&config)?;
    db.execute_init()?;

    let data = Arc::new(Data::new(config, db)?);

    // The OAuth callback is needed in both modes.
    let server = tokio::spawn(http::serve(data.clone()));

    match data.config.telegram_mode {
        TelegramMode::Polling => {
            tokio::select! {
                result = poll_updates(data.clone()) => result?,
                result = server => result??,
            }
        }
        TelegramMode::Webhook => server.await??,
    }

    Ok(())
}

async fn poll_updates(data: Arc<Data>) -> anyhow::Result<()> {
    info!("Telegram: polling for updates");
    let mut offset = None;
    loop {
        let updates = match data
            .telegram
            .get_updates(offset, data.config.telegram_poll_timeout_secs)
            .await
        {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Telegram: getUpdates failed: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let data = data.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_message(&data, &message).await {
                    error!("Telegram: failed to handle update {}: {:#}", update.update_id, e);
                }
            });
        }
    }
}
