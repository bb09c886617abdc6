use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::types::{
    Device, NewPlaylist, Paging, PlaybackState, Playlist, PlaylistItem, SearchResults, SearchType,
    Track, UserProfile,
};
use super::{SpotifyApi, SpotifyError};

/// Spotify Web API client bound to one user's access token.
///
/// The token is assumed valid for the lifetime of the client; refreshing is
/// the caller's job.
pub struct SpotifyClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, api_base: &str, access_token: &str) -> Self {
        Self {
            http,
            api_base: api_base.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SpotifyError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SpotifyError::Decode(format!("invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SpotifyError::Decode("API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SpotifyError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        debug!("Spotify API error {}: {}", status, message);
        Err(SpotifyError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, SpotifyError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::GET, url).query(query)).await?;
        Ok(response.json().await?)
    }

    /// GET that maps `204 No Content` to `None`.
    async fn get_optional_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<Option<T>, SpotifyError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| SpotifyError::Decode(e.to_string()))
    }

    /// Player commands answer with an empty body.
    async fn player_command(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<(), SpotifyError> {
        let url = self.endpoint(segments)?;
        let mut request = self.request(method, url).query(query);
        request = match body {
            Some(body) => request.json(&body),
            None => request.header(CONTENT_LENGTH, "0"),
        };
        self.send(request).await?;
        Ok(())
    }
}

fn device_query(device: &Device) -> Result<Vec<(&'static str, String)>, SpotifyError> {
    let id = device
        .id
        .clone()
        .ok_or_else(|| SpotifyError::Decode(format!("device '{}' has no id", device.name)))?;
    Ok(vec![("device_id", id)])
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn search(
        &self,
        query: &str,
        types: &[SearchType],
        limit: u32,
    ) -> Result<SearchResults, SpotifyError> {
        let types = types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.get_json(
            &["search"],
            &[
                ("q", query.to_string()),
                ("type", types),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn devices(&self) -> Result<Vec<Device>, SpotifyError> {
        let response: DevicesResponse = self.get_json(&["me", "player", "devices"], &[]).await?;
        Ok(response.devices)
    }

    async fn playback_state(&self) -> Result<Option<PlaybackState>, SpotifyError> {
        self.get_optional_json(&["me", "player"]).await
    }

    async fn resume_playback(&self, device: &Device, uri: Option<&str>) -> Result<(), SpotifyError> {
        let body = match uri {
            Some(uri) if uri.starts_with("spotify:track:") => json!({ "uris": [uri] }),
            Some(uri) => json!({ "context_uri": uri }),
            None => json!({}),
        };
        debug!("Starting playback of {:?} on {}", uri, device.name);
        self.player_command(Method::PUT, &["me", "player", "play"], &device_query(device)?, Some(body))
            .await
    }

    async fn pause_playback(&self, device: &Device) -> Result<(), SpotifyError> {
        self.player_command(Method::PUT, &["me", "player", "pause"], &device_query(device)?, None)
            .await
    }

    async fn skip_to_next(&self, device: &Device) -> Result<(), SpotifyError> {
        self.player_command(Method::POST, &["me", "player", "next"], &device_query(device)?, None)
            .await
    }

    async fn skip_to_previous(&self, device: &Device) -> Result<(), SpotifyError> {
        self.player_command(Method::POST, &["me", "player", "previous"], &device_query(device)?, None)
            .await
    }

    async fn add_to_queue(&self, uri: &str, device: Option<&Device>) -> Result<(), SpotifyError> {
        let mut query = vec![("uri", uri.to_string())];
        if let Some(id) = device.and_then(|d| d.id.clone()) {
            query.push(("device_id", id));
        }
        self.player_command(Method::POST, &["me", "player", "queue"], &query, None)
            .await
    }

    async fn current_user_profile(&self) -> Result<UserProfile, SpotifyError> {
        self.get_json(&["me"], &[]).await
    }

    async fn current_user_playlists(&self, limit: u32) -> Result<Vec<Playlist>, SpotifyError> {
        let page: Paging<Playlist> = self
            .get_json(&["me", "playlists"], &[("limit", limit.to_string())])
            .await?;
        Ok(page.items)
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<Playlist, SpotifyError> {
        let url = self.endpoint(&["users", user_id, "playlists"])?;
        let response = self
            .send(self.request(Method::POST, url).json(playlist))
            .await?;
        Ok(response.json().await?)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        let mut tracks = Vec::new();
        let mut page: Paging<PlaylistItem> = self
            .get_json(
                &["playlists", playlist_id, "tracks"],
                &[("limit", "100".to_string())],
            )
            .await?;

        loop {
            tracks.extend(page.items.into_iter().filter_map(|item| item.track));
            let Some(next) = page.next else {
                break;
            };
            let next = Url::parse(&next).map_err(|e| SpotifyError::Decode(e.to_string()))?;
            let response = self.send(self.request(Method::GET, next)).await?;
            page = response.json().await?;
        }

        Ok(tracks)
    }

    async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<(), SpotifyError> {
        let mut body = json!({ "uris": uris });
        if let Some(position) = position {
            body["position"] = json!(position);
        }
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn remove_tracks_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), SpotifyError> {
        let tracks: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        self.send(
            self.request(Method::DELETE, url)
                .json(&json!({ "tracks": tracks })),
        )
        .await?;
        Ok(())
    }

    async fn change_playlist_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert("name".to_string(), json!(name));
        }
        if let Some(description) = description {
            body.insert("description".to_string(), json!(description));
        }
        let url = self.endpoint(&["playlists", playlist_id])?;
        self.send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SpotifyClient {
        SpotifyClient::new(reqwest::Client::new(), &server.uri(), "token-123")
    }

    fn device() -> Device {
        Device {
            id: Some("dev-1".to_string()),
            name: "Kitchen".to_string(),
            is_active: true,
            device_type: None,
        }
    }

    #[tokio::test]
    async fn test_find_active_device() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "devices": [
                    {"id": "a", "name": "Phone", "is_active": false},
                    {"id": "b", "name": "Laptop", "is_active": true}
                ]
            })))
            .mount(&server)
            .await;

        let active = client(&server).find_active_device().await.unwrap();
        assert_eq!(active.unwrap().name, "Laptop");
    }

    #[tokio::test]
    async fn test_play_track_uri_uses_uris_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player/play"))
            .and(query_param("device_id", "dev-1"))
            .and(body_json(serde_json::json!({"uris": ["spotify:track:abc"]})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/me/player/play"))
            .and(body_json(serde_json::json!({"context_uri": "spotify:album:xyz"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let spotify = client(&server);
        spotify
            .resume_playback(&device(), Some("spotify:track:abc"))
            .await
            .unwrap();
        spotify
            .resume_playback(&device(), Some("spotify:album:xyz"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_playback_state_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(client(&server).playback_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"status": 401, "message": "The access token expired"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).current_user_profile().await.unwrap_err();
        match err {
            SpotifyError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "The access token expired");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_playlist_tracks_follows_pages() {
        let server = MockServer::start().await;
        let next = format!("{}/playlists/p1/tracks?offset=1&limit=1", server.uri());
        Mock::given(method("GET"))
            .and(path("/playlists/p1/tracks"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"track": {"name": "First", "uri": "spotify:track:1"}}],
                "next": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/p1/tracks"))
            .and(query_param("offset", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"track": null}, {"track": {"name": "Second", "uri": "spotify:track:2"}}],
                "next": null
            })))
            .mount(&server)
            .await;

        let tracks = client(&server).playlist_tracks("p1").await.unwrap();
        let names: Vec<_> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_add_tracks_sends_position() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/playlists/p1/tracks"))
            .and(body_json(serde_json::json!({"uris": ["spotify:track:1"], "position": 0})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"snapshot_id": "s"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .add_tracks_to_playlist("p1", &["spotify:track:1".to_string()], Some(0))
            .await
            .unwrap();
    }
}
