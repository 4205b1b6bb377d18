//! Sink-side collaborators and the dispatch over the active sink.

use std::sync::Arc;

use tracing::warn;

use crate::errors::PlaybackError;
use crate::model::{MediaItem, RendererInfo, SinkRoute, TrackKind};
use crate::remote::{DeviceChannel, RemoteCommand};

/// Local decoding player.
pub trait LocalPlayer: Send + Sync {
    fn play(&self) -> Result<(), PlaybackError>;
    fn pause(&self) -> Result<(), PlaybackError>;
    fn stop(&self) -> Result<(), PlaybackError>;
    fn seek(&self, position_ms: u64) -> Result<(), PlaybackError>;
    fn set_volume(&self, volume: u32) -> Result<(), PlaybackError>;
    fn set_rate(&self, rate: f32) -> Result<(), PlaybackError>;

    /// `id` -1 disables the track kind.
    fn select_track(&self, kind: TrackKind, id: i32) -> Result<(), PlaybackError>;
    fn set_audio_delay(&self, delay_ms: i64) -> Result<(), PlaybackError>;
    fn set_subtitle_delay(&self, delay_ms: i64) -> Result<(), PlaybackError>;
    fn set_scale(&self, scale: f32) -> Result<(), PlaybackError>;

    /// Binds output to a renderer target the player drives natively, or
    /// back to local output with `None`.
    fn set_renderer(&self, renderer: Option<&RendererInfo>) -> Result<(), PlaybackError>;

    fn load(&self, media: &MediaItem, position_ms: u64, start: bool) -> Result<(), PlaybackError>;
}

/// Video presentation surface owner.
pub trait PresentationHost: Send + Sync {
    /// Take over display of `media`, which a remote sink was showing.
    fn take_video(&self, media: &MediaItem);

    fn close_video(&self, stopped_after_device_loss: bool);

    fn dismiss_overlays(&self);
}

pub trait AudioFocus: Send + Sync {
    fn acquire(&self) -> bool;
    fn release(&self);
}

/// The one sink transport commands currently go to.
#[derive(Clone)]
pub enum ActiveSink {
    Local(Arc<dyn LocalPlayer>),
    Remote {
        route: SinkRoute,
        channel: Arc<dyn DeviceChannel>,
    },
}

impl std::fmt::Debug for ActiveSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveSink::Local(_) => f.write_str("ActiveSink::Local"),
            ActiveSink::Remote { route, .. } => write!(f, "ActiveSink::Remote({:?})", route),
        }
    }
}

impl ActiveSink {
    pub fn route(&self) -> SinkRoute {
        match self {
            ActiveSink::Local(_) => SinkRoute::Local,
            ActiveSink::Remote { route, .. } => route.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ActiveSink::Remote { .. })
    }

    pub fn play(&self) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.play(),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::Play),
        }
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.pause(),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::Pause),
        }
    }

    pub fn stop(&self) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.stop(),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::Stop),
        }
    }

    pub fn seek(&self, position_ms: u64) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.seek(position_ms),
            ActiveSink::Remote { channel, .. } => {
                channel.send(&RemoteCommand::Seek { position_ms })
            }
        }
    }

    pub fn set_volume(&self, volume: u32) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.set_volume(volume),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::SetVolume { volume }),
        }
    }

    pub fn set_rate(&self, rate: f32) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.set_rate(rate),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::SetRate { rate }),
        }
    }

    pub fn select_track(&self, kind: TrackKind, id: i32) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.select_track(kind, id),
            ActiveSink::Remote { channel, .. } => {
                channel.send(&RemoteCommand::SelectTrack { kind, id })
            }
        }
    }

    pub fn set_audio_delay(&self, delay_ms: i64) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.set_audio_delay(delay_ms),
            ActiveSink::Remote { channel, .. } => {
                channel.send(&RemoteCommand::SetAudioDelay { delay_ms })
            }
        }
    }

    pub fn set_subtitle_delay(&self, delay_ms: i64) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.set_subtitle_delay(delay_ms),
            ActiveSink::Remote { channel, .. } => {
                channel.send(&RemoteCommand::SetSubtitleDelay { delay_ms })
            }
        }
    }

    pub fn set_scale(&self, scale: f32) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.set_scale(scale),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::SetScale { scale }),
        }
    }

    pub fn load(&self, media: &MediaItem, position_ms: u64, start: bool) -> Result<(), PlaybackError> {
        match self {
            ActiveSink::Local(player) => player.load(media, position_ms, start),
            ActiveSink::Remote { channel, .. } => channel.send(&RemoteCommand::Load {
                locator: media.locator.clone(),
                title: media.title.clone(),
                position_ms,
                autoplay: start,
            }),
        }
    }
}

/// Runs a native sink call, logging and swallowing its failure.
///
/// Returns whether the call succeeded.
pub fn guarded(operation: &str, route: &SinkRoute, result: Result<(), PlaybackError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(
                operation,
                sink = ?route,
                error = %err,
                "Sink call failed; ignoring"
            );
            false
        }
    }
}
