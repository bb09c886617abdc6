use std::sync::Arc;

use crate::error::AppError;
use crate::spotify::{Device, SpotifyApi, SpotifyConnector};
use crate::status::StatusMessenger;

/// Where progress for the current turn is reported.
#[derive(Clone)]
pub struct ProgressChannel {
    pub chat_id: i64,
    pub messenger: Arc<dyn StatusMessenger>,
}

/// Everything a tool call needs to know about who it runs for.
///
/// Built once per agent invocation and never shared between users.
#[derive(Clone)]
pub struct ExecutionContext {
    pub user_id: String,
    pub connector: Arc<dyn SpotifyConnector>,
    pub progress: Option<ProgressChannel>,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>, connector: Arc<dyn SpotifyConnector>) -> Self {
        Self {
            user_id: user_id.into(),
            connector,
            progress: None,
        }
    }

    pub fn with_progress(mut self, chat_id: i64, messenger: Arc<dyn StatusMessenger>) -> Self {
        self.progress = Some(ProgressChannel { chat_id, messenger });
        self
    }
}

/// What a tool body gets to work with: an authenticated client and, for
/// playback tools, the device that was active when the call started.
pub struct ToolEnv {
    pub spotify: Arc<dyn SpotifyApi>,
    device: Option<Device>,
}

impl ToolEnv {
    pub fn new(spotify: Arc<dyn SpotifyApi>, device: Option<Device>) -> Self {
        Self { spotify, device }
    }

    /// Only available to tools that declare `requires_active_device`.
    pub fn device(&self) -> anyhow::Result<&Device> {
        self.device.as_ref().ok_or_else(|| {
            AppError::internal("tool ran without resolving an active device").into()
        })
    }
}
