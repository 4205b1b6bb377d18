use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RendererId(pub String);

impl std::fmt::Display for RendererId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Peer-to-peer locator of one file inside a (possibly multi-file) container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2pDescriptor {
    pub info_hash: String,
    pub file_index: u32,
    pub base_locator: String,
}

impl P2pDescriptor {
    pub fn new(info_hash: &str, file_index: u32, base_locator: &str) -> Self {
        Self {
            info_hash: info_hash.to_ascii_lowercase(),
            file_index,
            base_locator: base_locator.to_string(),
        }
    }

    /// Locator addressing this file directly, used for catalog lookups.
    pub fn locator(&self) -> String {
        synthesize_locator(&self.base_locator, self.file_index)
    }

    /// Same container and same file.
    pub fn same_file(&self, base_locator: &str, file_index: u32) -> bool {
        self.base_locator == base_locator && self.file_index == file_index
    }
}

pub fn synthesize_locator(base_locator: &str, file_index: u32) -> String {
    format!("{}#index={}", base_locator, file_index)
}

/// A playable unit as handed over by the playlist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub locator: String,
    #[serde(default)]
    pub catalog_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub resume_position_ms: u64,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub p2p: Option<P2pDescriptor>,
}

impl MediaItem {
    pub fn new(locator: &str) -> Self {
        Self {
            locator: locator.to_string(),
            catalog_id: None,
            title: None,
            duration_ms: None,
            resume_position_ms: 0,
            has_video: false,
            p2p: None,
        }
    }

    pub fn from_descriptor(descriptor: P2pDescriptor) -> Self {
        let mut item = MediaItem::new(&descriptor.locator());
        item.p2p = Some(descriptor);
        item
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }

    pub fn with_p2p(mut self, descriptor: P2pDescriptor) -> Self {
        self.p2p = Some(descriptor);
        self
    }

    /// Stable identity: the catalog id when the item is known, else its locator.
    pub fn identity(&self) -> String {
        match self.catalog_id {
            Some(id) => format!("catalog:{}", id),
            None => self.locator.clone(),
        }
    }

    pub fn is_p2p(&self) -> bool {
        self.p2p.is_some()
    }
}

/// Class of media a renderer accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaClass {
    #[default]
    Any,
    PeerToPeerOnly,
}

impl MediaClass {
    pub fn accepts(&self, item: &MediaItem) -> bool {
        match self {
            MediaClass::Any => true,
            MediaClass::PeerToPeerOnly => item.is_p2p(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Chromecast,
    Dlna,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Chromecast => "chromecast",
            DeviceKind::Dlna => "dlna",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererCapabilities {
    pub seekable: bool,
    pub pausable: bool,
    pub supports_video: bool,
    pub media_class: MediaClass,
    /// The local player can bind to this renderer directly.
    pub native_target: bool,
}

impl Default for RendererCapabilities {
    fn default() -> Self {
        Self {
            seekable: true,
            pausable: true,
            supports_video: false,
            media_class: MediaClass::Any,
            native_target: false,
        }
    }
}

/// A discoverable remote playback target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererInfo {
    pub id: RendererId,
    pub name: String,
    pub kind: DeviceKind,
    pub capabilities: RendererCapabilities,
}

impl RendererInfo {
    pub fn new(id: &str, name: &str, kind: DeviceKind) -> Self {
        Self {
            id: RendererId(id.to_string()),
            name: name.to_string(),
            kind,
            capabilities: RendererCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: RendererCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Whether a renderer selection outlives the current activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererScope {
    #[default]
    Session,
    Global,
}

impl RendererScope {
    pub fn from_global(global: bool) -> Self {
        if global {
            RendererScope::Global
        } else {
            RendererScope::Session
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RendererScope::Global)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Close was requested and acknowledged.
    Clean,
    /// Connection lost without acknowledgment.
    Unclean,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteConnectionState {
    Unselected,
    Connecting,
    Connected,
    Playing,
    Paused,
    Buffering,
    Disconnected(DisconnectKind),
}

impl RemoteConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            RemoteConnectionState::Connected
                | RemoteConnectionState::Playing
                | RemoteConnectionState::Paused
                | RemoteConnectionState::Buffering
        )
    }
}

/// Where transport commands go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkRoute {
    Local,
    Remote(RendererId),
}

impl SinkRoute {
    pub fn is_remote(&self) -> bool {
        matches!(self, SinkRoute::Remote(_))
    }
}

/// Routing decision for every transport call.
///
/// A remote renderer only takes the commands once its session is connected;
/// until then, and after any disconnect, the local player stays in charge.
pub fn route(selected: Option<&RendererInfo>, state: RemoteConnectionState) -> SinkRoute {
    match selected {
        Some(renderer) if state.is_connected() => SinkRoute::Remote(renderer.id.clone()),
        _ => SinkRoute::Local,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
}

impl PlaybackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "IDLE",
            PlaybackPhase::Opening => "OPENING",
            PlaybackPhase::Buffering => "BUFFERING",
            PlaybackPhase::Playing => "PLAYING",
            PlaybackPhase::Paused => "PAUSED",
            PlaybackPhase::Stopped => "STOPPED",
            PlaybackPhase::Ended => "ENDED",
        }
    }

    /// Map a raw remote phase string to a logical phase.
    pub fn from_remote(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PLAYING" => Some(PlaybackPhase::Playing),
            "PAUSED" => Some(PlaybackPhase::Paused),
            "BUFFERING" | "LOADING" => Some(PlaybackPhase::Buffering),
            "IDLE" | "STOPPED" => Some(PlaybackPhase::Stopped),
            "OPENING" => Some(PlaybackPhase::Opening),
            "ENDED" | "FINISHED" => Some(PlaybackPhase::Ended),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
    Subtitle,
}

/// Normalized playback event, whichever sink produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    Playing,
    Paused,
    Buffering(f32),
    Stopped,
    EndReached,
    PausableChanged(bool),
    SeekableChanged(bool),
    TimeChanged(u64),
    LengthChanged(u64),
    VolumeChanged(u32),
    VideoSizeChanged { width: u32, height: u32 },
    TracksChanged,
}

impl PlaybackEvent {
    /// Phase implied by this event, if it is a phase transition.
    pub fn phase(&self) -> Option<PlaybackPhase> {
        match self {
            PlaybackEvent::Playing => Some(PlaybackPhase::Playing),
            PlaybackEvent::Paused => Some(PlaybackPhase::Paused),
            PlaybackEvent::Buffering(_) => Some(PlaybackPhase::Buffering),
            PlaybackEvent::Stopped => Some(PlaybackPhase::Stopped),
            PlaybackEvent::EndReached => Some(PlaybackPhase::Ended),
            _ => None,
        }
    }
}
