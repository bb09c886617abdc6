use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::spotify::{SearchResults, SearchType};
use crate::tools::{ParameterizedTool, ToolEnv, ToolResult};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search terms: song, artist, album or playlist name
    #[schemars(length(min = 1))]
    pub query: String,
    /// Content types to search
    #[serde(default = "default_types")]
    #[schemars(length(min = 1))]
    pub types: Vec<SearchType>,
    /// Maximum results per content type
    #[serde(default = "default_limit")]
    #[schemars(range(min = 1, max = 50))]
    pub limit: u32,
}

fn default_types() -> Vec<SearchType> {
    vec![SearchType::Track]
}

fn default_limit() -> u32 {
    10
}

pub struct SearchTool;

#[async_trait]
impl ParameterizedTool for SearchTool {
    type Params = SearchParams;

    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search Spotify for tracks, albums, artists or playlists. Returns names and Spotify URIs \
         you can pass to other tools. Use it to find a URI before playing, queueing or adding \
         music to a playlist."
    }

    fn start_message(&self, params: &SearchParams) -> String {
        format!("🔍 Searching Spotify for \"{}\"...", params.query)
    }

    async fn execute(&self, env: &ToolEnv, params: SearchParams) -> anyhow::Result<ToolResult> {
        let results = env
            .spotify
            .search(&params.query, &params.types, params.limit)
            .await?;

        let mut counts = serde_json::Map::new();
        let mut total = 0;
        for kind in &params.types {
            let count = results.count(*kind);
            total += count;
            counts.insert(kind.as_str().to_string(), json!(count));
        }

        Ok(ToolResult::ok(
            format!("Found {} result(s) for \"{}\"", total, params.query),
            json!({
                "query": params.query,
                "types": params.types,
                "counts": counts,
                "resultsCount": total,
                "items": compact_items(&results),
            }),
        ))
    }
}

/// Only what the agent needs to pick an item and refer to it later.
fn compact_items(results: &SearchResults) -> Value {
    let mut items = serde_json::Map::new();
    if let Some(tracks) = &results.tracks {
        let tracks: Vec<Value> = tracks
            .items
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "uri": t.uri,
                    "artists": t.artist_names(),
                    "album": t.album.as_ref().map(|a| a.name.clone()),
                })
            })
            .collect();
        items.insert("tracks".to_string(), Value::Array(tracks));
    }
    if let Some(artists) = &results.artists {
        let artists: Vec<Value> = artists
            .items
            .iter()
            .map(|a| json!({ "name": a.name, "uri": a.uri }))
            .collect();
        items.insert("artists".to_string(), Value::Array(artists));
    }
    if let Some(albums) = &results.albums {
        let albums: Vec<Value> = albums
            .items
            .iter()
            .map(|a| {
                let artists: Vec<&str> = a.artists.iter().map(|ar| ar.name.as_str()).collect();
                json!({
                    "name": a.name,
                    "uri": a.uri,
                    "artists": artists.join(", "),
                    "releaseDate": a.release_date,
                })
            })
            .collect();
        items.insert("albums".to_string(), Value::Array(albums));
    }
    if let Some(playlists) = &results.playlists {
        let playlists: Vec<Value> = playlists
            .items
            .iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "uri": p.uri }))
            .collect();
        items.insert("playlists".to_string(), Value::Array(playlists));
    }
    Value::Object(items)
}
