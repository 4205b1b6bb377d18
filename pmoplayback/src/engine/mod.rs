//! Local streaming engine: external RPC surface and the session bridge.

mod bridge;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use bridge::{EngineCallback, EngineSession, EngineSessionBridge, EngineSessionState};

use crate::errors::PlaybackError;
use crate::model::{MediaItem, P2pDescriptor};

/// Coarse engine lifecycle, as reported by the engine process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Unpacking,
    Starting,
    Connected,
    Failed(String),
    Stopped,
}

impl EngineStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EngineStatus::Unpacking => "unpacking",
            EngineStatus::Starting => "starting",
            EngineStatus::Connected => "connected",
            EngineStatus::Failed(_) => "failed",
            EngineStatus::Stopped => "stopped",
        }
    }
}

/// An unresolved (possibly multi-file) piece of content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    pub id: String,
    pub info_hash: String,
    pub base_locator: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Locally cached descriptor file, if any.
    #[serde(default)]
    pub cached_file: Option<PathBuf>,
    #[serde(default)]
    pub parsed: bool,
}

impl TransportDescriptor {
    pub fn new(id: &str, info_hash: &str, base_locator: &str) -> Self {
        Self {
            id: id.to_string(),
            info_hash: info_hash.to_ascii_lowercase(),
            base_locator: base_locator.to_string(),
            title: None,
            cached_file: None,
            parsed: false,
        }
    }
}

/// One file enumerated inside a transport descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainedFile {
    pub index: u32,
    pub name: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub has_video: bool,
}

impl ContainedFile {
    /// Catalog item addressing this file.
    pub fn to_media_item(&self, descriptor: &TransportDescriptor) -> MediaItem {
        let p2p = P2pDescriptor::new(&descriptor.info_hash, self.index, &descriptor.base_locator);
        MediaItem::from_descriptor(p2p)
            .with_title(&self.name)
            .with_video(self.has_video)
    }
}

pub type FilesReply = Box<dyn FnOnce(Result<Vec<ContainedFile>, PlaybackError>) + Send>;

/// RPC surface of the local streaming engine process.
///
/// `connect` only starts the handshake: readiness (or failure) comes back
/// asynchronously through [`EngineSessionBridge::on_status`].
pub trait StreamingEngine: Send + Sync {
    fn connect(&self) -> Result<(), PlaybackError>;

    /// Enumerates the files of `descriptor`; `reply` may run on any thread,
    /// possibly long after this call returned.
    fn get_files(&self, descriptor: &TransportDescriptor, reply: FilesReply);

    fn start_session(&self, media: &MediaItem) -> Result<(), PlaybackError>;

    fn stop_session(&self, force: bool) -> Result<(), PlaybackError>;
}
