pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod http;
pub mod llm;
pub mod services;
pub mod spotify;
pub mod status;
pub mod system_prompt;
pub mod telegram;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use services::auth::{AuthStore, SpotifyAuthService, SpotifyOAuth};
use services::message::MessageService;
use spotify::{AuthorizedConnector, SpotifyConnector};
use status::{StatusMessenger, StatusStore, TelegramStatusMessenger};

/// Shared state handed to every update handler and HTTP route.
pub struct Data {
    pub config: config::Config,
    pub telegram: telegram::TelegramClient,
    pub auth: Arc<SpotifyAuthService>,
    pub messages: MessageService,
    pub connector: Arc<dyn SpotifyConnector>,
    pub agent: llm::SpotifyAgent,
    pub status: Arc<dyn StatusMessenger>,
}

impl Data {
    /// Wire up the production collaborators. `db` must already be initialized.
    pub fn new(config: config::Config, db: db::Database) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let telegram = telegram::TelegramClient::new(http.clone(), &config);

        let auth = Arc::new(SpotifyAuthService::new(
            db.clone(),
            SpotifyOAuth::new(http.clone(), &config),
        ));
        let auth_store: Arc<dyn AuthStore> = auth.clone();
        let connector = Arc::new(AuthorizedConnector::new(
            auth_store,
            http,
            &config.spotify_api_url,
        ));

        let tools = Arc::new(tools::builtin::spotify_tools()?);
        let agent = llm::SpotifyAgent::new(
            Arc::new(llm::LlmClient::new(&config)),
            tools,
            config.system_prompt.clone(),
            config.agent_max_iterations,
        );

        let status = Arc::new(TelegramStatusMessenger::new(
            Arc::new(telegram.clone()),
            Arc::new(StatusStore::new()),
        ));

        Ok(Self {
            config,
            telegram,
            auth,
            messages: MessageService::new(db),
            connector,
            agent,
            status,
        })
    }
}
