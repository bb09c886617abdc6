use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramMode {
    Polling,
    Webhook,
}

#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub telegram_mode: TelegramMode,
    pub telegram_webhook_secret: Option<String>,
    pub telegram_poll_timeout_secs: u64,
    /// Empty means every chat may use the bot.
    pub allowed_chat_ids: Vec<i64>,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_api_url: String,
    pub spotify_accounts_url: String,
    /// A token is refreshed once it is this close to expiry.
    pub token_refresh_margin: Duration,
    pub public_base_url: String,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub database_url: String,
    pub system_prompt: String,
    pub history_limit: usize,
    pub agent_max_iterations: usize,
    pub status_messages_enabled: bool,
    pub http_bind: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            telegram_token: env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN must be set"))?,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            telegram_mode: match env::var("TELEGRAM_MODE")
                .unwrap_or_else(|_| "polling".to_string())
                .to_lowercase()
                .as_str()
            {
                "polling" => TelegramMode::Polling,
                "webhook" => TelegramMode::Webhook,
                other => anyhow::bail!("TELEGRAM_MODE must be 'polling' or 'webhook', got '{}'", other),
            },
            telegram_webhook_secret: env::var("TELEGRAM_WEBHOOK_SECRET").ok(),
            telegram_poll_timeout_secs: env::var("TELEGRAM_POLL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            allowed_chat_ids: env::var("TELEGRAM_ALLOWED_CHAT_IDS")
                .map(|raw| parse_chat_ids(&raw))
                .unwrap_or_default(),
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID")
                .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_ID must be set"))?,
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET")
                .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_SECRET must be set"))?,
            spotify_api_url: env::var("SPOTIFY_API_URL")
                .unwrap_or_else(|_| "https://api.spotify.com/v1".to_string()),
            spotify_accounts_url: env::var("SPOTIFY_ACCOUNTS_URL")
                .unwrap_or_else(|_| "https://accounts.spotify.com".to_string()),
            token_refresh_margin: env::var("SPOTIFY_TOKEN_REFRESH_MARGIN")
                .ok()
                .and_then(|raw| humantime::parse_duration(raw.trim()).ok())
                .unwrap_or(Duration::from_secs(60)),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map_err(|_| anyhow::anyhow!("PUBLIC_BASE_URL must be set"))?
                .trim_end_matches('/')
                .to_string(),
            llm_url: env::var("LLM_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.3".to_string())
                .parse()
                .unwrap_or(0.3),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/botify.db".to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| crate::system_prompt::SPOTIFY_AGENT_PROMPT.to_string()),
            history_limit: env::var("HISTORY_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            agent_max_iterations: env::var("AGENT_MAX_ITERATIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            status_messages_enabled: env::var("STATUS_MESSAGES_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            http_bind: env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn spotify_redirect_uri(&self) -> String {
        format!("{}/spotify/callback", self.public_base_url)
    }

    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }
}

fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"[REDACTED]")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("telegram_mode", &self.telegram_mode)
            .field(
                "telegram_webhook_secret",
                &self.telegram_webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("telegram_poll_timeout_secs", &self.telegram_poll_timeout_secs)
            .field("allowed_chat_ids", &self.allowed_chat_ids)
            .field("spotify_client_id", &self.spotify_client_id)
            .field("spotify_client_secret", &"[REDACTED]")
            .field("spotify_api_url", &self.spotify_api_url)
            .field("spotify_accounts_url", &self.spotify_accounts_url)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .field("public_base_url", &self.public_base_url)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("llm_temperature", &self.llm_temperature)
            .field("database_url", &self.database_url)
            .field("system_prompt", &self.system_prompt)
            .field("history_limit", &self.history_limit)
            .field("agent_max_iterations", &self.agent_max_iterations)
            .field("status_messages_enabled", &self.status_messages_enabled)
            .field("http_bind", &self.http_bind)
            .finish()
    }
}

/// Telegram rejects messages longer than this.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            telegram_token: "test-token".to_string(),
            telegram_api_url: "http://localhost:0".to_string(),
            telegram_mode: TelegramMode::Polling,
            telegram_webhook_secret: None,
            telegram_poll_timeout_secs: 0,
            allowed_chat_ids: Vec::new(),
            spotify_client_id: "client-id".to_string(),
            spotify_client_secret: "client-secret".to_string(),
            spotify_api_url: "http://localhost:0".to_string(),
            spotify_accounts_url: "http://localhost:0".to_string(),
            token_refresh_margin: Duration::from_secs(60),
            public_base_url: "https://bot.example.com".to_string(),
            llm_url: "http://localhost:0".to_string(),
            llm_model: "test".to_string(),
            llm_api_key: None,
            llm_temperature: 0.3,
            database_url: ":memory:".to_string(),
            system_prompt: "test".to_string(),
            history_limit: 20,
            agent_max_iterations: 5,
            status_messages_enabled: true,
            http_bind: "127.0.0.1:0".to_string(),
        }
    }
}
