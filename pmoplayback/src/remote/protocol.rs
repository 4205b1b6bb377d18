//! Wire format of the remote receiver channel.
//!
//! Inbound messages arrive as `{"method": ..., "params": {...}}` and are
//! decoded once, here, into the closed [`RemoteMessage`] enum. Unknown methods
//! decode to `None`; a known method with a malformed payload is a
//! [`PlaybackError::Protocol`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PlaybackError;
use crate::model::{PlaybackEvent, TrackKind};

/// Raw message as received from the device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Periodic status report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub volume: Option<u32>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub info_hash: Option<String>,
    #[serde(default)]
    pub file_index: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemoteMessage {
    Playing,
    Paused,
    Buffering { percent: f32 },
    Stopped,
    EndReached,
    PausableChanged(bool),
    SeekableChanged(bool),
    TimeChanged(u64),
    LengthChanged(u64),
    VolumeChanged(u32),
    VideoSizeChanged { width: u32, height: u32 },
    TracksChanged,
    Status(RemoteStatus),
    PlayerClosed,
}

#[derive(Deserialize)]
struct BufferingParams {
    percent: f32,
}

#[derive(Deserialize)]
struct PausableParams {
    pausable: bool,
}

#[derive(Deserialize)]
struct SeekableParams {
    seekable: bool,
}

#[derive(Deserialize)]
struct TimeParams {
    time: u64,
}

#[derive(Deserialize)]
struct LengthParams {
    length: u64,
}

#[derive(Deserialize)]
struct VolumeParams {
    volume: u32,
}

#[derive(Deserialize)]
struct VideoSizeParams {
    width: u32,
    height: u32,
}

impl DeviceMessage {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, PlaybackError> {
        serde_json::from_str(raw).map_err(|e| PlaybackError::protocol("<frame>", e))
    }

    fn params<T: DeserializeOwned>(&self) -> Result<T, PlaybackError> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| PlaybackError::protocol(&self.method, e))
    }

    /// Decodes the message. `Ok(None)` means the method is not one we handle.
    pub fn decode(&self) -> Result<Option<RemoteMessage>, PlaybackError> {
        let message = match self.method.as_str() {
            "playing" => RemoteMessage::Playing,
            "paused" => RemoteMessage::Paused,
            "buffering" => {
                let p: BufferingParams = self.params()?;
                RemoteMessage::Buffering { percent: p.percent }
            }
            "stopped" => RemoteMessage::Stopped,
            "end_reached" => RemoteMessage::EndReached,
            "pausable_changed" => {
                RemoteMessage::PausableChanged(self.params::<PausableParams>()?.pausable)
            }
            "seekable_changed" => {
                RemoteMessage::SeekableChanged(self.params::<SeekableParams>()?.seekable)
            }
            "time_changed" => RemoteMessage::TimeChanged(self.params::<TimeParams>()?.time),
            "length_changed" => RemoteMessage::LengthChanged(self.params::<LengthParams>()?.length),
            "volume_changed" => RemoteMessage::VolumeChanged(self.params::<VolumeParams>()?.volume),
            "video_size_changed" => {
                let p: VideoSizeParams = self.params()?;
                RemoteMessage::VideoSizeChanged {
                    width: p.width,
                    height: p.height,
                }
            }
            "tracks_changed" => RemoteMessage::TracksChanged,
            "status" => RemoteMessage::Status(self.params()?),
            "player_closed" => RemoteMessage::PlayerClosed,
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

impl RemoteMessage {
    /// Normalized playback event for the simple notifications.
    ///
    /// `status` and `player_closed` need session state and are handled by the
    /// session manager.
    pub fn to_event(&self) -> Option<PlaybackEvent> {
        let event = match self {
            RemoteMessage::Playing => PlaybackEvent::Playing,
            RemoteMessage::Paused => PlaybackEvent::Paused,
            RemoteMessage::Buffering { percent } => PlaybackEvent::Buffering(*percent),
            RemoteMessage::Stopped => PlaybackEvent::Stopped,
            RemoteMessage::EndReached => PlaybackEvent::EndReached,
            RemoteMessage::PausableChanged(v) => PlaybackEvent::PausableChanged(*v),
            RemoteMessage::SeekableChanged(v) => PlaybackEvent::SeekableChanged(*v),
            RemoteMessage::TimeChanged(t) => PlaybackEvent::TimeChanged(*t),
            RemoteMessage::LengthChanged(l) => PlaybackEvent::LengthChanged(*l),
            RemoteMessage::VolumeChanged(v) => PlaybackEvent::VolumeChanged(*v),
            RemoteMessage::VideoSizeChanged { width, height } => PlaybackEvent::VideoSizeChanged {
                width: *width,
                height: *height,
            },
            RemoteMessage::TracksChanged => PlaybackEvent::TracksChanged,
            RemoteMessage::Status(_) | RemoteMessage::PlayerClosed => return None,
        };
        Some(event)
    }
}

/// Outbound command sent to the receiver.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    Seek { position_ms: u64 },
    SetVolume { volume: u32 },
    SelectTrack { kind: TrackKind, id: i32 },
    SetRate { rate: f32 },
    SetAudioDelay { delay_ms: i64 },
    SetSubtitleDelay { delay_ms: i64 },
    SetScale { scale: f32 },
    Load {
        locator: String,
        title: Option<String>,
        position_ms: u64,
        autoplay: bool,
    },
}

impl RemoteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::Play => "play",
            RemoteCommand::Pause => "pause",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Seek { .. } => "seek",
            RemoteCommand::SetVolume { .. } => "set_volume",
            RemoteCommand::SelectTrack { .. } => "select_track",
            RemoteCommand::SetRate { .. } => "set_rate",
            RemoteCommand::SetAudioDelay { .. } => "set_audio_delay",
            RemoteCommand::SetSubtitleDelay { .. } => "set_subtitle_delay",
            RemoteCommand::SetScale { .. } => "set_scale",
            RemoteCommand::Load { .. } => "load",
        }
    }

    pub fn to_json(&self) -> Result<String, PlaybackError> {
        serde_json::to_string(self).map_err(|e| PlaybackError::protocol(self.name(), e))
    }
}
