use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::spotify::Device;
use crate::tools::{ParameterizedTool, SimpleTool, ToolEnv, ToolResult};

fn device_name(device: &Device) -> &str {
    if device.name.is_empty() {
        "Unknown Device"
    } else {
        &device.name
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayTrackParams {
    /// Spotify URI to play, e.g. "spotify:track:4iV5W9uYEdYUVa79Axb7Rh" or an album/playlist URI
    #[schemars(length(min = 1))]
    pub spotify_uri: String,
}

pub struct PlayTrackTool;

#[async_trait]
impl ParameterizedTool for PlayTrackTool {
    type Params = PlayTrackParams;

    fn name(&self) -> &'static str {
        "playTrack"
    }

    fn description(&self) -> &'static str {
        "Start playing a Spotify URI on the user's active device. Track URIs play that track; \
         album, artist and playlist URIs play that context. Needs an active Spotify device."
    }

    fn requires_active_device(&self) -> bool {
        true
    }

    fn start_message(&self, params: &PlayTrackParams) -> String {
        format!("▶️ Starting {}...", params.spotify_uri)
    }

    async fn execute(&self, env: &ToolEnv, params: PlayTrackParams) -> anyhow::Result<ToolResult> {
        let device = env.device()?;
        let uri = params.spotify_uri.trim();
        env.spotify.resume_playback(device, Some(uri)).await?;

        let kind = if uri.starts_with("spotify:track:") {
            "track"
        } else {
            "context"
        };
        Ok(ToolResult::ok(
            format!("Playing {} on {}", uri, device_name(device)),
            json!({
                "uri": uri,
                "playedAs": kind,
                "deviceId": device.id,
                "deviceName": device_name(device),
            }),
        ))
    }
}

pub struct PauseTrackTool;

#[async_trait]
impl SimpleTool for PauseTrackTool {
    fn name(&self) -> &'static str {
        "pauseTrack"
    }

    fn description(&self) -> &'static str {
        "Pause the music currently playing on the user's active Spotify device. \
         Safe to call when playback is already paused."
    }

    fn requires_active_device(&self) -> bool {
        true
    }

    fn start_message(&self) -> String {
        "⏸️ Pausing playback...".to_string()
    }

    async fn execute(&self, env: &ToolEnv) -> anyhow::Result<ToolResult> {
        let device = env.device()?;
        let playing = env
            .spotify
            .playback_state()
            .await?
            .is_some_and(|state| state.is_playing);

        if !playing {
            return Ok(ToolResult::ok(
                "Playback is already paused",
                json!({ "alreadyPaused": true, "deviceName": device_name(device) }),
            ));
        }

        env.spotify.pause_playback(device).await?;
        Ok(ToolResult::ok(
            format!("Paused playback on {}", device_name(device)),
            json!({ "alreadyPaused": false, "deviceId": device.id, "deviceName": device_name(device) }),
        ))
    }
}

pub struct ResumeTrackTool;

#[async_trait]
impl SimpleTool for ResumeTrackTool {
    fn name(&self) -> &'static str {
        "resumeTrack"
    }

    fn description(&self) -> &'static str {
        "Resume paused playback on the user's active Spotify device from where it stopped. \
         Safe to call when music is already playing."
    }

    fn requires_active_device(&self) -> bool {
        true
    }

    fn start_message(&self) -> String {
        "▶️ Resuming playback...".to_string()
    }

    async fn execute(&self, env: &ToolEnv) -> anyhow::Result<ToolResult> {
        let device = env.device()?;
        let playing = env
            .spotify
            .playback_state()
            .await?
            .is_some_and(|state| state.is_playing);

        if playing {
            return Ok(ToolResult::ok(
                "Music is already playing",
                json!({ "alreadyPlaying": true, "deviceName": device_name(device) }),
            ));
        }

        env.spotify.resume_playback(device, None).await?;
        Ok(ToolResult::ok(
            format!("Resumed playback on {}", device_name(device)),
            json!({ "alreadyPlaying": false, "deviceId": device.id, "deviceName": device_name(device) }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SkipTrackParams {
    /// How many tracks to skip
    #[serde(default = "default_skip")]
    #[schemars(range(min = 1, max = 10))]
    pub n: u32,
}

fn default_skip() -> u32 {
    1
}

pub struct SkipTrackTool;

#[async_trait]
impl ParameterizedTool for SkipTrackTool {
    type Params = SkipTrackParams;

    fn name(&self) -> &'static str {
        "skipTrack"
    }

    fn description(&self) -> &'static str {
        "Skip forward in the current playback queue, one track by default. Needs an active Spotify device."
    }

    fn requires_active_device(&self) -> bool {
        true
    }

    fn start_message(&self, params: &SkipTrackParams) -> String {
        if params.n == 1 {
            "⏭️ Skipping to the next track...".to_string()
        } else {
            format!("⏭️ Skipping {} tracks...", params.n)
        }
    }

    async fn execute(&self, env: &ToolEnv, params: SkipTrackParams) -> anyhow::Result<ToolResult> {
        let device = env.device()?;
        for _ in 0..params.n {
            env.spotify.skip_to_next(device).await?;
        }
        Ok(ToolResult::ok(
            format!("Skipped {} track(s) on {}", params.n, device_name(device)),
            json!({ "skipped": params.n, "deviceName": device_name(device) }),
        ))
    }
}

pub struct PreviousTrackTool;

#[async_trait]
impl SimpleTool for PreviousTrackTool {
    fn name(&self) -> &'static str {
        "previousTrack"
    }

    fn description(&self) -> &'static str {
        "Go back to the previous track. Needs an active Spotify device."
    }

    fn requires_active_device(&self) -> bool {
        true
    }

    fn start_message(&self) -> String {
        "⏮️ Going back to the previous track...".to_string()
    }

    async fn execute(&self, env: &ToolEnv) -> anyhow::Result<ToolResult> {
        let device = env.device()?;
        env.spotify.skip_to_previous(device).await?;
        Ok(ToolResult::ok(
            format!("Went back to the previous track on {}", device_name(device)),
            json!({ "deviceName": device_name(device) }),
        ))
    }
}

pub struct GetCurrentTrackTool;

#[async_trait]
impl SimpleTool for GetCurrentTrackTool {
    fn name(&self) -> &'static str {
        "getCurrentTrack"
    }

    fn description(&self) -> &'static str {
        "Show what is currently playing: track, artists, album and whether playback is running."
    }

    fn start_message(&self) -> String {
        "🎧 Checking what's playing...".to_string()
    }

    async fn execute(&self, env: &ToolEnv) -> anyhow::Result<ToolResult> {
        let state = env.spotify.playback_state().await?;
        let Some((state, track)) = state.and_then(|s| s.item.clone().map(|t| (s, t))) else {
            return Ok(ToolResult::ok(
                "No track currently playing",
                json!({ "isPlaying": false }),
            ));
        };

        Ok(ToolResult::ok(
            format!("{} by {}", track.name, track.artist_names()),
            json!({
                "isPlaying": state.is_playing,
                "track": {
                    "name": track.name,
                    "uri": track.uri,
                    "artists": track.artist_names(),
                    "album": track.album.as_ref().map(|a| a.name.clone()),
                    "durationMs": track.duration_ms,
                },
                "deviceName": state.device.as_ref().map(|d| d.name.clone()),
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueParams {
    /// Spotify track URI to queue, e.g. "spotify:track:4iV5W9uYEdYUVa79Axb7Rh"
    #[schemars(length(min = 1))]
    pub spotify_uri: String,
}

pub struct AddToQueueTool;

#[async_trait]
impl ParameterizedTool for AddToQueueTool {
    type Params = AddToQueueParams;

    fn name(&self) -> &'static str {
        "addToQueue"
    }

    fn description(&self) -> &'static str {
        "Add a track to the end of the playback queue without interrupting the current track."
    }

    fn start_message(&self, _params: &AddToQueueParams) -> String {
        "➕ Adding to the queue...".to_string()
    }

    async fn execute(&self, env: &ToolEnv, params: AddToQueueParams) -> anyhow::Result<ToolResult> {
        let uri = crate::spotify::track_uri(&params.spotify_uri);
        let device = env.spotify.find_active_device().await?;
        env.spotify.add_to_queue(&uri, device.as_ref()).await?;
        Ok(ToolResult::ok(
            format!("Added {} to the queue", uri),
            json!({ "uri": uri, "deviceName": device.as_ref().map(|d| d.name.clone()) }),
        ))
    }
}
