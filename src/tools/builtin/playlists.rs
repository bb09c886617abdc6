use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::spotify::{extract_id, track_uri, NewPlaylist};
use crate::tools::schema::{NonEmptyString, ValidationError};
use crate::tools::{ParameterizedTool, ToolEnv, ToolResult};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistParams {
    /// Name of the playlist
    #[schemars(length(min = 1))]
    pub name: String,
    /// Whether the playlist should be public
    #[serde(default)]
    pub is_public: bool,
    /// Whether other users can edit the playlist
    #[serde(default)]
    pub collaborative: bool,
    /// Description for the playlist
    pub description: Option<String>,
}

pub struct CreatePlaylistTool;

#[async_trait]
impl ParameterizedTool for CreatePlaylistTool {
    type Params = CreatePlaylistParams;

    fn name(&self) -> &'static str {
        "createPlaylist"
    }

    fn description(&self) -> &'static str {
        "Create a new, empty playlist in the user's Spotify library. Private and \
         non-collaborative unless asked otherwise. Returns the new playlist id."
    }

    fn start_message(&self, params: &CreatePlaylistParams) -> String {
        format!("📝 Creating playlist \"{}\"...", params.name)
    }

    async fn execute(&self, env: &ToolEnv, params: CreatePlaylistParams) -> anyhow::Result<ToolResult> {
        let profile = env.spotify.current_user_profile().await?;
        let playlist = env
            .spotify
            .create_playlist(
                &profile.id,
                &NewPlaylist {
                    name: params.name.clone(),
                    public: params.is_public,
                    collaborative: params.collaborative,
                    description: params.description.clone(),
                },
            )
            .await?;

        Ok(ToolResult::ok(
            format!("Created playlist \"{}\" with ID: {}", params.name, playlist.id),
            json!({
                "playlistId": playlist.id,
                "playlistName": params.name,
                "uri": playlist.uri,
                "isPublic": params.is_public,
                "collaborative": params.collaborative,
                "description": params.description,
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetPlaylistTracksParams {
    /// Spotify playlist id, e.g. "37i9dQZF1DXcBWIGoYBM5M"
    #[schemars(length(min = 1))]
    pub playlist_id: String,
}

pub struct GetPlaylistTracksTool;

#[async_trait]
impl ParameterizedTool for GetPlaylistTracksTool {
    type Params = GetPlaylistTracksParams;

    fn name(&self) -> &'static str {
        "getPlaylistTracks"
    }

    fn description(&self) -> &'static str {
        "List the tracks of a playlist in playlist order. Takes the playlist id, not its name."
    }

    fn start_message(&self, _params: &GetPlaylistTracksParams) -> String {
        "📃 Loading playlist tracks...".to_string()
    }

    async fn execute(&self, env: &ToolEnv, params: GetPlaylistTracksParams) -> anyhow::Result<ToolResult> {
        let playlist_id = extract_id(&params.playlist_id, "playlist");
        let tracks = env.spotify.playlist_tracks(&playlist_id).await?;

        let items: Vec<_> = tracks
            .iter()
            .enumerate()
            .map(|(position, t)| {
                json!({
                    "position": position,
                    "name": t.name,
                    "uri": t.uri,
                    "artists": t.artist_names(),
                })
            })
            .collect();

        Ok(ToolResult::ok(
            format!("Playlist {} has {} track(s)", playlist_id, tracks.len()),
            json!({
                "playlistId": playlist_id,
                "total": tracks.len(),
                "tracks": items,
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddTracksToPlaylistParams {
    /// Spotify playlist id
    #[schemars(length(min = 1))]
    pub playlist_id: String,
    /// Spotify track URIs to add
    #[schemars(length(min = 1, max = 100))]
    pub tracks_uris: Vec<NonEmptyString>,
    /// Zero-based insert position; omit to append at the end
    #[schemars(range(min = 0, max = 1000))]
    pub position: Option<u32>,
}

pub struct AddTracksToPlaylistTool;

#[async_trait]
impl ParameterizedTool for AddTracksToPlaylistTool {
    type Params = AddTracksToPlaylistParams;

    fn name(&self) -> &'static str {
        "addTracksToPlaylist"
    }

    fn description(&self) -> &'static str {
        "Add 1 to 100 tracks to an existing playlist, at a given position or at the end."
    }

    fn start_message(&self, params: &AddTracksToPlaylistParams) -> String {
        format!("➕ Adding {} track(s) to the playlist...", params.tracks_uris.len())
    }

    async fn execute(&self, env: &ToolEnv, params: AddTracksToPlaylistParams) -> anyhow::Result<ToolResult> {
        let playlist_id = extract_id(&params.playlist_id, "playlist");
        let uris: Vec<String> = params.tracks_uris.iter().map(|u| track_uri(u.as_str())).collect();
        env.spotify
            .add_tracks_to_playlist(&playlist_id, &uris, params.position)
            .await?;

        Ok(ToolResult::ok(
            format!("Added {} tracks to playlist {}", uris.len(), playlist_id),
            json!({
                "playlistId": playlist_id,
                "tracksAdded": uris.len(),
                "position": params.position,
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveTracksFromPlaylistParams {
    /// Spotify playlist id
    #[schemars(length(min = 1))]
    pub playlist_id: String,
    /// Track URIs or ids to remove; every occurrence is removed
    #[schemars(length(min = 1, max = 100))]
    pub track_ids: Vec<NonEmptyString>,
}

pub struct RemoveTracksFromPlaylistTool;

#[async_trait]
impl ParameterizedTool for RemoveTracksFromPlaylistTool {
    type Params = RemoveTracksFromPlaylistParams;

    fn name(&self) -> &'static str {
        "removeTracksFromPlaylist"
    }

    fn description(&self) -> &'static str {
        "Remove 1 to 100 tracks from a playlist, matched by track URI or id."
    }

    fn start_message(&self, params: &RemoveTracksFromPlaylistParams) -> String {
        format!("➖ Removing {} track(s) from the playlist...", params.track_ids.len())
    }

    async fn execute(
        &self,
        env: &ToolEnv,
        params: RemoveTracksFromPlaylistParams,
    ) -> anyhow::Result<ToolResult> {
        let playlist_id = extract_id(&params.playlist_id, "playlist");
        let uris: Vec<String> = params.track_ids.iter().map(|id| track_uri(id.as_str())).collect();
        env.spotify.remove_tracks_from_playlist(&playlist_id, &uris).await?;

        Ok(ToolResult::ok(
            format!("Removed {} tracks from playlist {}", uris.len(), playlist_id),
            json!({
                "playlistId": playlist_id,
                "tracksRemoved": uris.len(),
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetUserPlaylistsParams {
    /// Number of playlists to return
    #[serde(default = "default_playlist_limit")]
    #[schemars(range(min = 1, max = 50))]
    pub limit: u32,
}

fn default_playlist_limit() -> u32 {
    20
}

pub struct GetUserPlaylistsTool;

#[async_trait]
impl ParameterizedTool for GetUserPlaylistsTool {
    type Params = GetUserPlaylistsParams;

    fn name(&self) -> &'static str {
        "getUserPlaylists"
    }

    fn description(&self) -> &'static str {
        "List the user's own and followed playlists with their ids. Use it to find a playlist id by name."
    }

    fn start_message(&self, _params: &GetUserPlaylistsParams) -> String {
        "📚 Loading your playlists...".to_string()
    }

    async fn execute(&self, env: &ToolEnv, params: GetUserPlaylistsParams) -> anyhow::Result<ToolResult> {
        let profile = env.spotify.current_user_profile().await?;
        let playlists = env.spotify.current_user_playlists(params.limit).await?;

        let items: Vec<_> = playlists
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "name": p.name,
                    "uri": p.uri,
                    "tracks": p.tracks.as_ref().map(|t| t.total),
                    "public": p.public,
                    "collaborative": p.collaborative,
                    "owned": p.owner.as_ref().is_some_and(|o| o.id == profile.id),
                })
            })
            .collect();

        Ok(ToolResult::ok(
            format!("Found {} playlist(s)", playlists.len()),
            json!({
                "user": { "id": profile.id, "displayName": profile.display_name },
                "playlists": items,
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlaylistDetailsParams {
    /// Spotify playlist id
    #[schemars(length(min = 1))]
    pub playlist_id: String,
    /// New playlist name
    #[schemars(length(min = 1))]
    pub name: Option<String>,
    /// New playlist description
    pub description: Option<String>,
}

pub struct ChangePlaylistDetailsTool;

#[async_trait]
impl ParameterizedTool for ChangePlaylistDetailsTool {
    type Params = ChangePlaylistDetailsParams;

    fn name(&self) -> &'static str {
        "changePlaylistDetails"
    }

    fn description(&self) -> &'static str {
        "Rename a playlist and/or change its description. Needs edit rights on the playlist."
    }

    fn check_params(&self, params: &ChangePlaylistDetailsParams) -> Result<(), ValidationError> {
        if params.name.is_none() && params.description.is_none() {
            return Err(ValidationError::new(
                "name",
                "or description must be provided",
            ));
        }
        Ok(())
    }

    fn start_message(&self, _params: &ChangePlaylistDetailsParams) -> String {
        "✏️ Updating playlist details...".to_string()
    }

    async fn execute(
        &self,
        env: &ToolEnv,
        params: ChangePlaylistDetailsParams,
    ) -> anyhow::Result<ToolResult> {
        let playlist_id = extract_id(&params.playlist_id, "playlist");
        env.spotify
            .change_playlist_details(
                &playlist_id,
                params.name.as_deref(),
                params.description.as_deref(),
            )
            .await?;

        Ok(ToolResult::ok(
            format!("Updated details of playlist {}", playlist_id),
            json!({
                "playlistId": playlist_id,
                "name": params.name,
                "description": params.description,
            }),
        ))
    }
}
