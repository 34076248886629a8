//! Player commands and the channel they are sent over.
//!
//! Every command is a GET to `/player/<path>` on the player's active
//! connection. The channel stamps each one with a `commandID` taken from a
//! per-session sequence and with the remote's identity headers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use http_client::{HttpClient, Method};
use tracing::Span;

use crate::device::Device;
use crate::error::{RemoteError, Result};
use crate::identity::Headers;
use crate::media::MediaClass;

pub const TIMELINE_SUBSCRIBE: &str = "timeline/subscribe";
pub const TIMELINE_UNSUBSCRIBE: &str = "timeline/unsubscribe";
pub const TIMELINE_POLL: &str = "timeline/poll";
pub const MIRROR_DETAILS: &str = "mirror/details";
pub const PLAY_MEDIA: &str = "playback/playMedia";

const COMMAND_ID_PARAM: &str = "commandID";
const MAX_VOLUME: u8 = 100;

/// The navigation and playback alphabet a player understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Select,
    Back,
    Home,
    Music,
    Play,
    Pause,
    Stop,
    SkipNext,
    SkipPrevious,
    StepBack,
    StepForward,
    SeekTo { offset_ms: u64 },
    SkipTo { key: String },
    SetVolume { volume: u8 },
}

impl PlayerCommand {
    pub fn path(&self) -> &'static str {
        match self {
            PlayerCommand::MoveUp => "navigation/moveUp",
            PlayerCommand::MoveDown => "navigation/moveDown",
            PlayerCommand::MoveLeft => "navigation/moveLeft",
            PlayerCommand::MoveRight => "navigation/moveRight",
            PlayerCommand::Select => "navigation/select",
            PlayerCommand::Back => "navigation/back",
            PlayerCommand::Home => "navigation/home",
            PlayerCommand::Music => "navigation/music",
            PlayerCommand::Play => "playback/play",
            PlayerCommand::Pause => "playback/pause",
            PlayerCommand::Stop => "playback/stop",
            PlayerCommand::SkipNext => "playback/skipNext",
            PlayerCommand::SkipPrevious => "playback/skipPrevious",
            PlayerCommand::StepBack => "playback/stepBack",
            PlayerCommand::StepForward => "playback/stepForward",
            PlayerCommand::SeekTo { .. } => "playback/seekTo",
            PlayerCommand::SkipTo { .. } => "playback/skipTo",
            PlayerCommand::SetVolume { .. } => "playback/setParameters",
        }
    }

    pub fn params(&self) -> Vec<(String, String)> {
        match self {
            PlayerCommand::SeekTo { offset_ms } => {
                vec![("offset".to_string(), offset_ms.to_string())]
            }
            PlayerCommand::SkipTo { key } => vec![("key".to_string(), key.clone())],
            PlayerCommand::SetVolume { volume } => {
                vec![("volume".to_string(), volume.to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Validate the command and turn it into a request.
    pub fn into_request(self) -> Result<CommandRequest> {
        if let PlayerCommand::SetVolume { volume } = self {
            if volume > MAX_VOLUME {
                return Err(RemoteError::InvalidParameter(format!(
                    "volume {volume} is above {MAX_VOLUME}"
                )));
            }
        }
        Ok(CommandRequest::new(self.path(), self.params()))
    }

    /// Scope the command to one media class, for players running several at once.
    pub fn with_media_type(self, class: MediaClass) -> Result<CommandRequest> {
        let mut request = self.into_request()?;
        request
            .params
            .push(("type".to_string(), class.as_str().to_string()));
        Ok(request)
    }
}

/// A validated command path and its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn new(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }
}

/// Sends commands to one player.
///
/// Shared between the session, the renewal task and the listener dispatcher,
/// so the sequence is atomic and every send takes `&self`.
#[derive(Debug)]
pub struct CommandChannel {
    player: Device,
    http: HttpClient,
    headers: Headers,
    sequence: AtomicU64,
    span: Span,
}

impl CommandChannel {
    pub fn new(player: Device, http: HttpClient, headers: Headers, span: Span) -> Self {
        Self {
            player,
            http,
            headers,
            sequence: AtomicU64::new(0),
            span,
        }
    }

    /// Send `/player/<path>` and return the raw response body.
    ///
    /// `path` may be given with or without the `/player/` prefix. The sequence
    /// advances exactly once per call, whether or not the player answers. An
    /// explicit `commandID` in `params` wins over the sequence.
    pub fn send(&self, path: &str, params: &[(String, String)]) -> Result<String> {
        let _entered = self.span.enter();
        let command_id = self.sequence.fetch_add(1, Ordering::SeqCst);

        let mut merged = BTreeMap::new();
        merged.insert(COMMAND_ID_PARAM.to_string(), command_id.to_string());
        merged.extend(params.iter().cloned());
        let merged: Vec<(String, String)> = merged.into_iter().collect();

        let endpoint = format!("/player/{}", command_path(path));
        tracing::debug!(%endpoint, command_id, "sending command");

        let response = self
            .player
            .request(&self.http, Method::Get, &endpoint, &self.headers, &merged)
            .map_err(RemoteError::Connectivity)?;

        if !response.is_success() {
            tracing::warn!(%endpoint, status = response.status, "player rejected command");
        }
        Ok(response.body)
    }

    /// Start numbering from zero again.
    pub fn reset(&self) {
        self.sequence.store(0, Ordering::SeqCst);
    }

    /// The `commandID` the next command will carry.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn player(&self) -> &Device {
        &self.player
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }
}

/// Strip the leading `/` and `player/` from a command path.
pub fn command_path(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    path.strip_prefix("player/").unwrap_or(path)
}
