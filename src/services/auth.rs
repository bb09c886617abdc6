use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{AuthRecord, Database, TokenGrant};

/// Permissions requested when a user connects their account.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-currently-playing",
    "user-read-playback-state",
    "user-modify-playback-state",
    "app-remote-control",
    "streaming",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-read-playback-position",
    "user-top-read",
    "user-read-recently-played",
    "user-library-modify",
    "user-library-read",
];

/// Persisted Spotify credentials, looked up by Telegram user id.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_authorization_by_user_id(&self, user_id: &str)
        -> anyhow::Result<Option<AuthRecord>>;

    /// Exchange the stored refresh token for a new access token and persist it.
    async fn refresh(&self, user_id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_grant(self, fallback_refresh_token: &str) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| fallback_refresh_token.to_string()),
            expires_at: Utc::now().timestamp() + self.expires_in,
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

/// Authorization-code flow against the Spotify accounts service.
#[derive(Clone)]
pub struct SpotifyOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_url: String,
    redirect_uri: String,
}

impl SpotifyOAuth {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            accounts_url: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            redirect_uri: config.spotify_redirect_uri(),
        }
    }

    /// Returns the consent URL and the one-time id carried in `state`.
    pub fn authorize_url(&self) -> anyhow::Result<(String, String)> {
        let auth_id = uuid::Uuid::new_v4().to_string();
        let scope = SPOTIFY_SCOPES.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.accounts_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("show_dialog", "false"),
                ("state", auth_id.as_str()),
                ("scope", scope.as_str()),
            ],
        )?;
        Ok((url.to_string(), auth_id))
    }

    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<TokenGrant> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        Ok(response.into_grant(""))
    }

    /// Spotify may omit `refresh_token` on refresh; the old one stays valid then.
    pub async fn refresh_token(&self, refresh_token: &str) -> anyhow::Result<TokenGrant> {
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .await?;
        Ok(response.into_grant(refresh_token))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> anyhow::Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Spotify token endpoint returned {}: {}", status, body);
        }
        Ok(response.json().await?)
    }
}

/// [`AuthStore`] backed by SQLite, plus the two ends of the OAuth handshake.
#[derive(Clone)]
pub struct SpotifyAuthService {
    db: Database,
    oauth: SpotifyOAuth,
}

impl SpotifyAuthService {
    pub fn new(db: Database, oauth: SpotifyOAuth) -> Self {
        Self { db, oauth }
    }

    /// Record a pending authorization and return the link the user must open.
    pub async fn start_authorization(&self, user_id: &str) -> anyhow::Result<String> {
        let (url, auth_id) = self.oauth.authorize_url()?;
        let user_id = user_id.to_string();
        self.db
            .run_blocking(move |db| db.upsert_pending_authorization(&user_id, &auth_id))
            .await?;
        Ok(url)
    }

    /// Finish the handshake for `state`. Returns the user id it belonged to.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> anyhow::Result<Option<String>> {
        let grant = self.oauth.exchange_code(code).await?;
        let state = state.to_string();
        let user_id = self
            .db
            .run_blocking(move |db| db.complete_authorization(&state, &grant))
            .await?;
        if let Some(user_id) = &user_id {
            info!("Auth: Spotify connected for user {}", user_id);
        }
        Ok(user_id)
    }
}

#[async_trait]
impl AuthStore for SpotifyAuthService {
    async fn find_authorization_by_user_id(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<AuthRecord>> {
        let user_id = user_id.to_string();
        self.db
            .run_blocking(move |db| db.find_authorization_by_user_id(&user_id))
            .await
    }

    async fn refresh(&self, user_id: &str) -> anyhow::Result<()> {
        let record = self
            .find_authorization_by_user_id(user_id)
            .await?
            .filter(|r| !r.is_pending())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No Spotify authorization found. Please connect your Spotify account first."
                )
            })?;

        debug!("Auth: Refreshing access token for user {}", user_id);
        let grant = self.oauth.refresh_token(&record.refresh_token).await?;
        let user_id = user_id.to_string();
        self.db
            .run_blocking(move |db| db.update_tokens(&user_id, &grant))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASIC: &str = "Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=";

    fn service(server: &MockServer) -> SpotifyAuthService {
        let mut config = Config::for_tests();
        config.spotify_accounts_url = server.uri();
        let db = Database::new(&config).unwrap();
        db.execute_init().unwrap();
        SpotifyAuthService::new(db, SpotifyOAuth::new(reqwest::Client::new(), &config))
    }

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let config = Config::for_tests();
        let oauth = SpotifyOAuth::new(reqwest::Client::new(), &config);
        let (url, auth_id) = oauth.authorize_url().unwrap();
        let url = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "https://bot.example.com/spotify/callback");
        assert_eq!(params["state"], auth_id);
        assert!(params["scope"].contains("playlist-modify-private"));
    }

    #[tokio::test]
    async fn test_handshake_then_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("authorization", BASIC))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "first",
                "token_type": "Bearer",
                "scope": "streaming",
                "expires_in": 3600,
                "refresh_token": "refresh-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "second",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = service(&server);
        let url = auth.start_authorization("42").await.unwrap();
        let state = Url::parse(&url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert!(auth.find_authorization_by_user_id("42").await.unwrap().unwrap().is_pending());
        let owner = auth.complete_authorization("code-xyz", &state).await.unwrap();
        assert_eq!(owner.as_deref(), Some("42"));

        auth.refresh("42").await.unwrap();
        let record = auth.find_authorization_by_user_id("42").await.unwrap().unwrap();
        assert_eq!(record.access_token, "second");
        assert_eq!(record.refresh_token, "refresh-1");
        assert!(record.expires_at > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_refresh_without_authorization_fails() {
        let server = MockServer::start().await;
        let auth = service(&server);
        assert!(auth.refresh("nobody").await.is_err());

        auth.start_authorization("pending").await.unwrap();
        assert!(auth.refresh("pending").await.is_err());
    }

    #[tokio::test]
    async fn test_token_endpoint_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = service(&server)
            .complete_authorization("bad", "state")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
