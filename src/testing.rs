//! In-memory doubles for the Spotify API, the chat surface and the LLM.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::llm::{ChatEngine, ChatMessage, EngineReply, SpotifyAgent};
use crate::services::auth::{SpotifyAuthService, SpotifyOAuth};
use crate::services::message::MessageService;
use crate::spotify::types::{Artist, Paging, PlaylistTracksRef};
use crate::spotify::{
    Device, NewPlaylist, PlaybackState, Playlist, SearchResults, SearchType, SpotifyApi,
    SpotifyConnector, SpotifyError, Track, UserProfile,
};
use crate::status::{ChatSurface, StatusMessenger};
use crate::telegram::TelegramClient;
use crate::tools::builtin::spotify_tools;
use crate::tools::ExecutionContext;
use crate::Data;

pub fn context_for(spotify: Arc<FakeSpotify>) -> ExecutionContext {
    ExecutionContext::new("u1", Arc::new(FakeConnector::new(spotify)))
}

/// Bot state over `db` with a scripted model, a fake Spotify account and
/// real Telegram/accounts clients pointed at `config`'s URLs.
pub fn data_for(config: Config, db: Database, engine: Arc<ScriptedEngine>) -> Data {
    let http = reqwest::Client::new();
    Data {
        telegram: TelegramClient::new(http.clone(), &config),
        auth: Arc::new(SpotifyAuthService::new(
            db.clone(),
            SpotifyOAuth::new(http, &config),
        )),
        messages: MessageService::new(db),
        connector: Arc::new(FakeConnector::new(Arc::new(FakeSpotify::new()))),
        agent: SpotifyAgent::new(
            engine,
            Arc::new(spotify_tools().expect("builtin tools register")),
            "prompt",
            config.agent_max_iterations,
        ),
        status: Arc::new(RecordingMessenger::default()),
        config,
    }
}

struct FakePlaylist {
    playlist: Playlist,
    uris: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    devices: Vec<Device>,
    playing: bool,
    current: Option<Track>,
    catalog: Vec<Track>,
    playlists: Vec<FakePlaylist>,
    created: usize,
    calls: Vec<String>,
}

impl FakeState {
    fn playlist_mut(&mut self, id: &str) -> Result<&mut FakePlaylist, SpotifyError> {
        self.playlists
            .iter_mut()
            .find(|p| p.playlist.id == id)
            .ok_or_else(|| SpotifyError::Status {
                status: 404,
                message: "Resource not found".to_string(),
            })
    }

    fn has_active_device(&self) -> bool {
        self.devices.iter().any(|d| d.is_active)
    }
}

/// Spotify account with a catalog, devices and playlists. Every mutating call
/// is appended to [`FakeSpotify::calls`]; reads are not.
#[derive(Default)]
pub struct FakeSpotify {
    state: Mutex<FakeState>,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "user-1".to_string(),
            display_name: Some("Test User".to_string()),
            uri: "spotify:user:user-1".to_string(),
        }
    }

    pub fn set_active_device(&self, active: bool) {
        let mut state = self.state();
        if active && state.devices.is_empty() {
            state.devices.push(Device {
                id: Some("device-1".to_string()),
                name: "Kitchen Speaker".to_string(),
                is_active: true,
                device_type: Some("Speaker".to_string()),
            });
            return;
        }
        for device in &mut state.devices {
            device.is_active = active;
        }
    }

    pub fn add_device(&self, id: Option<&str>, name: &str, active: bool) {
        self.state().devices.push(Device {
            id: id.map(str::to_string),
            name: name.to_string(),
            is_active: active,
            device_type: None,
        });
    }

    pub fn set_playing(&self, playing: bool) {
        self.state().playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn add_catalog_track(&self, id: &str, name: &str, artist: &str) {
        self.state().catalog.push(Track {
            id: Some(id.to_string()),
            name: name.to_string(),
            uri: format!("spotify:track:{}", id),
            artists: vec![Artist {
                id: None,
                name: artist.to_string(),
                uri: String::new(),
            }],
            album: None,
            duration_ms: 180_000,
        });
    }

    pub fn add_playlist(&self, id: &str, name: &str, uris: &[&str]) {
        self.state().playlists.push(FakePlaylist {
            playlist: Playlist {
                id: id.to_string(),
                name: name.to_string(),
                uri: format!("spotify:playlist:{}", id),
                description: None,
                public: Some(false),
                collaborative: false,
                owner: Some(Self::profile()),
                tracks: None,
            },
            uris: uris.iter().map(|u| u.to_string()).collect(),
        });
    }

    pub fn playlist_name(&self, id: &str) -> Option<String> {
        self.state()
            .playlists
            .iter()
            .find(|p| p.playlist.id == id)
            .map(|p| p.playlist.name.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn search(
        &self,
        query: &str,
        types: &[SearchType],
        limit: u32,
    ) -> Result<SearchResults, SpotifyError> {
        let mut state = self.state();
        let kinds: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        state
            .calls
            .push(format!("search:{}:{}:{}", query, kinds.join(","), limit));

        let needle = query.to_lowercase();
        let mut results = SearchResults::default();
        if types.contains(&SearchType::Track) {
            let items: Vec<Track> = state
                .catalog
                .iter()
                .filter(|t| {
                    t.name.to_lowercase().contains(&needle)
                        || t.artist_names().to_lowercase().contains(&needle)
                })
                .take(limit as usize)
                .cloned()
                .collect();
            results.tracks = Some(Paging {
                total: Some(items.len() as u32),
                items,
                next: None,
            });
        }
        Ok(results)
    }

    async fn devices(&self) -> Result<Vec<Device>, SpotifyError> {
        Ok(self.state().devices.clone())
    }

    async fn playback_state(&self) -> Result<Option<PlaybackState>, SpotifyError> {
        let state = self.state();
        if !state.has_active_device() {
            return Ok(None);
        }
        Ok(Some(PlaybackState {
            is_playing: state.playing,
            device: state.devices.iter().find(|d| d.is_active).cloned(),
            item: state.current.clone(),
        }))
    }

    async fn resume_playback(&self, _device: &Device, uri: Option<&str>) -> Result<(), SpotifyError> {
        let mut state = self.state();
        match uri {
            Some(uri) => {
                state.calls.push(format!("play:{}", uri));
                if uri.starts_with("spotify:track:") {
                    let track = state.catalog.iter().find(|t| t.uri == uri).cloned();
                    state.current = track;
                }
            }
            None => state.calls.push("resume".to_string()),
        }
        state.playing = true;
        Ok(())
    }

    async fn pause_playback(&self, _device: &Device) -> Result<(), SpotifyError> {
        let mut state = self.state();
        state.calls.push("pause".to_string());
        state.playing = false;
        Ok(())
    }

    async fn skip_to_next(&self, _device: &Device) -> Result<(), SpotifyError> {
        self.state().calls.push("next".to_string());
        Ok(())
    }

    async fn skip_to_previous(&self, _device: &Device) -> Result<(), SpotifyError> {
        self.state().calls.push("previous".to_string());
        Ok(())
    }

    async fn add_to_queue(&self, uri: &str, _device: Option<&Device>) -> Result<(), SpotifyError> {
        self.state().calls.push(format!("queue:{}", uri));
        Ok(())
    }

    async fn current_user_profile(&self) -> Result<UserProfile, SpotifyError> {
        Ok(Self::profile())
    }

    async fn current_user_playlists(&self, limit: u32) -> Result<Vec<Playlist>, SpotifyError> {
        Ok(self
            .state()
            .playlists
            .iter()
            .take(limit as usize)
            .map(|p| Playlist {
                tracks: Some(PlaylistTracksRef {
                    total: p.uris.len() as u32,
                }),
                ..p.playlist.clone()
            })
            .collect())
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<Playlist, SpotifyError> {
        let mut state = self.state();
        state.calls.push(format!("create:{}", playlist.name));
        state.created += 1;
        let id = format!("new-playlist-{}", state.created);
        let created = Playlist {
            id: id.clone(),
            name: playlist.name.clone(),
            uri: format!("spotify:playlist:{}", id),
            description: playlist.description.clone(),
            public: Some(playlist.public),
            collaborative: playlist.collaborative,
            owner: Some(UserProfile {
                id: user_id.to_string(),
                ..Self::profile()
            }),
            tracks: None,
        };
        state.playlists.push(FakePlaylist {
            playlist: created.clone(),
            uris: Vec::new(),
        });
        Ok(created)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        let mut state = self.state();
        let uris = state.playlist_mut(playlist_id)?.uris.clone();
        Ok(uris
            .into_iter()
            .map(|uri| {
                state
                    .catalog
                    .iter()
                    .find(|t| t.uri == uri)
                    .cloned()
                    .unwrap_or(Track {
                        id: uri.rsplit(':').next().map(str::to_string),
                        name: uri.clone(),
                        uri,
                        artists: Vec::new(),
                        album: None,
                        duration_ms: 0,
                    })
            })
            .collect())
    }

    async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<(), SpotifyError> {
        let mut state = self.state();
        let playlist = state.playlist_mut(playlist_id)?;
        let at = position
            .map(|p| (p as usize).min(playlist.uris.len()))
            .unwrap_or(playlist.uris.len());
        playlist.uris.splice(at..at, uris.iter().cloned());
        state
            .calls
            .push(format!("add:{}:{}", playlist_id, uris.len()));
        Ok(())
    }

    async fn remove_tracks_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), SpotifyError> {
        let mut state = self.state();
        state
            .playlist_mut(playlist_id)?
            .uris
            .retain(|u| !uris.contains(u));
        state
            .calls
            .push(format!("remove:{}:{}", playlist_id, uris.len()));
        Ok(())
    }

    async fn change_playlist_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let mut state = self.state();
        let playlist = &mut state.playlist_mut(playlist_id)?.playlist;
        if let Some(name) = name {
            playlist.name = name.to_string();
        }
        if let Some(description) = description {
            playlist.description = Some(description.to_string());
        }
        state.calls.push(format!("details:{}", playlist_id));
        Ok(())
    }
}

/// Hands out the same [`FakeSpotify`] to everyone, or refuses like a user
/// who never connected their account.
pub struct FakeConnector {
    spotify: Option<Arc<FakeSpotify>>,
}

impl FakeConnector {
    pub fn new(spotify: Arc<FakeSpotify>) -> Self {
        Self {
            spotify: Some(spotify),
        }
    }

    pub fn unauthorized() -> Self {
        Self { spotify: None }
    }
}

#[async_trait]
impl SpotifyConnector for FakeConnector {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn SpotifyApi>, AppError> {
        match &self.spotify {
            Some(spotify) => Ok(spotify.clone()),
            None => Err(AppError::authentication(format!(
                "no Spotify authorization for user {}",
                user_id
            ))),
        }
    }
}

/// Records status calls as `create:<text>`, `update:<text>`, `finalize:<text>`.
#[derive(Default)]
pub struct RecordingMessenger {
    events: Mutex<Vec<String>>,
    started: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingMessenger {
    /// Every call fails, like a chat that can no longer be written to.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_started(&self, user_id: &str) -> bool {
        self.started.lock().unwrap().iter().any(|u| u == user_id)
    }

    fn record(&self, event: String) -> anyhow::Result<()> {
        if self.failing {
            anyhow::bail!("chat unavailable");
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[async_trait]
impl StatusMessenger for RecordingMessenger {
    async fn create_status_message(&self, user_id: &str, _chat_id: i64, text: &str) -> anyhow::Result<i64> {
        self.record(format!("create:{}", text))?;
        let mut started = self.started.lock().unwrap();
        if !started.iter().any(|u| u == user_id) {
            started.push(user_id.to_string());
        }
        Ok(1)
    }

    async fn update_status_message(&self, _user_id: &str, _chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.record(format!("update:{}", text))
    }

    async fn finalize_status_message(&self, user_id: &str, _chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.started.lock().unwrap().retain(|u| u != user_id);
        self.record(format!("finalize:{}", text))
    }
}

/// Chat that remembers what was sent and edited. Message ids start at 100.
pub struct RecordingSurface {
    sent: Mutex<Vec<(i64, String)>>,
    edits: Mutex<Vec<(i64, i64, String)>>,
    next_id: AtomicI64,
    fail_edits: AtomicBool,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            fail_edits: AtomicBool::new(false),
        }
    }
}

impl RecordingSurface {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(i64, i64, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn fail_edits(&self) {
        self.fail_edits.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatSurface for RecordingSurface {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<i64> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> anyhow::Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            anyhow::bail!("message to edit not found");
        }
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }
}

/// Replays canned model turns in order and keeps every prompt it was sent.
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<EngineReply>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    tool_count: Mutex<usize>,
}

impl ScriptedEngine {
    pub fn new(replies: Vec<EngineReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            tool_count: Mutex::new(0),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of tool definitions offered in the last request.
    pub fn tool_count(&self) -> usize {
        *self.tool_count.lock().unwrap()
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<EngineReply> {
        self.requests.lock().unwrap().push(messages.to_vec());
        *self.tool_count.lock().unwrap() = tools.len();
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("model unavailable"))
    }
}
