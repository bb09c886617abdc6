pub mod client;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AppError, ErrorKind};
use crate::services::auth::AuthStore;

pub use client::SpotifyClient;
pub use types::{
    Device, NewPlaylist, PlaybackState, Playlist, SearchResults, SearchType, Track, UserProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    #[error("Spotify API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Spotify request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected Spotify response: {0}")]
    Decode(String),
}

impl SpotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpotifyError::Status { status, .. } => match status {
                401 => ErrorKind::Authentication,
                403 => ErrorKind::Authorization,
                404 => ErrorKind::NotFound,
                400 => ErrorKind::Validation,
                429 | 500..=599 => ErrorKind::ExternalService,
                _ => ErrorKind::Internal,
            },
            SpotifyError::Transport(_) => ErrorKind::ExternalService,
            SpotifyError::Decode(_) => ErrorKind::Internal,
        }
    }
}

/// The slice of the Spotify Web API the tools depend on.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn search(
        &self,
        query: &str,
        types: &[SearchType],
        limit: u32,
    ) -> Result<SearchResults, SpotifyError>;

    async fn devices(&self) -> Result<Vec<Device>, SpotifyError>;

    /// The device currently reported as active. Devices without an id cannot
    /// be targeted and count as absent.
    async fn find_active_device(&self) -> Result<Option<Device>, SpotifyError> {
        let devices = self.devices().await?;
        debug!("Spotify: {} device(s) visible", devices.len());
        Ok(devices.into_iter().find(|d| d.is_active && d.id.is_some()))
    }

    /// `None` when nothing is loaded in the player.
    async fn playback_state(&self) -> Result<Option<PlaybackState>, SpotifyError>;

    /// Start or resume playback. A `spotify:track:` URI plays that track,
    /// any other URI is played as a context (album, playlist, artist).
    async fn resume_playback(&self, device: &Device, uri: Option<&str>) -> Result<(), SpotifyError>;

    async fn pause_playback(&self, device: &Device) -> Result<(), SpotifyError>;

    async fn skip_to_next(&self, device: &Device) -> Result<(), SpotifyError>;

    async fn skip_to_previous(&self, device: &Device) -> Result<(), SpotifyError>;

    async fn add_to_queue(&self, uri: &str, device: Option<&Device>) -> Result<(), SpotifyError>;

    async fn current_user_profile(&self) -> Result<UserProfile, SpotifyError>;

    async fn current_user_playlists(&self, limit: u32) -> Result<Vec<Playlist>, SpotifyError>;

    async fn create_playlist(
        &self,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<Playlist, SpotifyError>;

    /// All tracks in playlist order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError>;

    /// `position: None` appends at the end.
    async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<(), SpotifyError>;

    /// Removes every occurrence of each URI.
    async fn remove_tracks_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), SpotifyError>;

    async fn change_playlist_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), SpotifyError>;
}

/// Hands out an authenticated client for a user.
#[async_trait]
pub trait SpotifyConnector: Send + Sync {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn SpotifyApi>, AppError>;
}

/// Builds a [`SpotifyClient`] from the user's stored access token.
pub struct AuthorizedConnector {
    auth: Arc<dyn AuthStore>,
    http: reqwest::Client,
    api_base: String,
}

impl AuthorizedConnector {
    pub fn new(auth: Arc<dyn AuthStore>, http: reqwest::Client, api_base: &str) -> Self {
        Self {
            auth,
            http,
            api_base: api_base.to_string(),
        }
    }
}

#[async_trait]
impl SpotifyConnector for AuthorizedConnector {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn SpotifyApi>, AppError> {
        let record = self
            .auth
            .find_authorization_by_user_id(user_id)
            .await
            .map_err(|e| AppError::internal(format!("failed to load authorization: {:#}", e)))?;

        match record {
            Some(record) if !record.is_pending() => Ok(Arc::new(SpotifyClient::new(
                self.http.clone(),
                &self.api_base,
                &record.access_token,
            ))),
            _ => Err(AppError::authentication(format!(
                "no Spotify authorization for user {}",
                user_id
            ))),
        }
    }
}

/// Spotify ids come as bare ids, `spotify:<kind>:<id>` URIs or open.spotify.com links.
pub fn extract_id(raw: &str, kind: &str) -> String {
    let raw = raw.trim();
    let uri_prefix = format!("spotify:{}:", kind);
    if let Some(id) = raw.strip_prefix(&uri_prefix) {
        return id.to_string();
    }

    let link_marker = format!("open.spotify.com/{}/", kind);
    if let Some(idx) = raw.find(&link_marker) {
        let rest = &raw[idx + link_marker.len()..];
        let end = rest.find(['?', '/', '#']).unwrap_or(rest.len());
        return rest[..end].to_string();
    }

    raw.to_string()
}

/// Bare track ids become `spotify:track:<id>`; URIs and links are normalized.
pub fn track_uri(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("spotify:") && !raw.starts_with("spotify:track:") {
        return raw.to_string();
    }
    format!("spotify:track:{}", extract_id(raw, "track"))
}
