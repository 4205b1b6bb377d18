use serde::{Deserialize, Serialize};

use crate::model::PlaybackPhase;

/// Transport actions currently available to the OS-level controls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackActions {
    pub play: bool,
    pub pause: bool,
    pub stop: bool,
    pub seek: bool,
    pub next: bool,
    pub previous: bool,
}

/// Playback state as published to the media session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub position_ms: u64,
    pub length_ms: u64,
    pub rate: f32,
    pub volume: Option<u32>,
    pub title: Option<String>,
    pub remote: bool,
    pub actions: PlaybackActions,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            position_ms: 0,
            length_ms: 0,
            rate: 1.0,
            volume: None,
            title: None,
            remote: false,
            actions: PlaybackActions::default(),
        }
    }
}

/// OS media-session publisher (platform transport controls).
pub trait MediaSessionPublisher: Send + Sync {
    fn publish(&self, snapshot: &PlaybackSnapshot);

    /// The session stayed idle for too long and may be torn down.
    fn release(&self);
}
