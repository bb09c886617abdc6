pub mod playback;
pub mod playlists;
pub mod search;

use super::{Tool, ToolSet};

/// Every tool the Spotify agent can call.
pub fn spotify_tools() -> anyhow::Result<ToolSet> {
    let mut tools = ToolSet::new();

    tools.register(Tool::parameterized(search::SearchTool))?;

    tools.register(Tool::parameterized(playback::PlayTrackTool))?;
    tools.register(Tool::simple(playback::PauseTrackTool))?;
    tools.register(Tool::simple(playback::ResumeTrackTool))?;
    tools.register(Tool::parameterized(playback::SkipTrackTool))?;
    tools.register(Tool::simple(playback::PreviousTrackTool))?;
    tools.register(Tool::simple(playback::GetCurrentTrackTool))?;
    tools.register(Tool::parameterized(playback::AddToQueueTool))?;

    tools.register(Tool::parameterized(playlists::CreatePlaylistTool))?;
    tools.register(Tool::parameterized(playlists::GetPlaylistTracksTool))?;
    tools.register(Tool::parameterized(playlists::AddTracksToPlaylistTool))?;
    tools.register(Tool::parameterized(playlists::RemoveTracksFromPlaylistTool))?;
    tools.register(Tool::parameterized(playlists::GetUserPlaylistsTool))?;
    tools.register(Tool::parameterized(playlists::ChangePlaylistDetailsTool))?;

    Ok(tools)
}
