//! Instructions handed to the model at the start of every turn.

use chrono::{DateTime, Local, Utc};

pub const SPOTIFY_AGENT_PROMPT: &str = "\
You are Botify, a Spotify assistant living in a Telegram chat.
You help the user control playback, find music and manage playlists using the tools you have.

Rules:
- Only handle Spotify-related requests. Politely decline anything else.
- Always answer in the language the user wrote in.
- Use the tools to act; never claim an action succeeded unless a tool reported success.
- Search first when you need a Spotify URI or id you don't already have.
- If a tool reports that no active device was found, ask the user to open Spotify on a device and start playing.
- Keep replies short: one or two sentences, plain text, no personal opinions.";

/// Current date/time in UTC and local time, for the system message.
///
/// ```text
/// Current date/time: Wednesday, February 05, 2025, 14:30:15 UTC (2025-02-05T14:30:15+00:00)
/// Local time: Wednesday, February 05, 2025, 09:30:15 -05:00 (2025-02-05T09:30:15-05:00)
/// ```
pub fn get_datetime_context() -> String {
    format_datetime_context(Utc::now(), Local::now())
}

fn format_datetime_context(utc_now: DateTime<Utc>, local_now: DateTime<Local>) -> String {
    format!(
        "Current date/time: {}, {} UTC ({})\nLocal time: {}, {} ({})",
        utc_now.format("%A, %B %d, %Y"),
        utc_now.format("%H:%M:%S"),
        utc_now.to_rfc3339(),
        local_now.format("%A, %B %d, %Y"),
        local_now.format("%H:%M:%S %:z"),
        local_now.to_rfc3339()
    )
}

/// Appended to the system prompt so "new releases" or "tonight" mean something.
pub fn build_datetime_system_message() -> String {
    get_datetime_context()
}
