//! Connection state machine for the selected remote receiver.
//!
//! The manager never calls out while its owner holds a lock: it records
//! transitions and returns [`SessionNotice`]s describing what the orchestrator
//! has to do. Outbound traffic goes through the [`DeviceChannel`] obtained
//! from [`RemoteDeviceSessionManager::channel`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::PlaybackError;
use crate::model::{
    DisconnectKind, MediaItem, PlaybackEvent, PlaybackPhase, RemoteConnectionState, RendererId,
    RendererInfo, RendererScope,
};
use crate::remote::protocol::{DeviceMessage, RemoteCommand, RemoteMessage, RemoteStatus};
use crate::remote::recovery::{RecoveryRecord, RecoveryWindow};

/// Transport to a remote receiver (cast session, DLNA control point, ...).
pub trait DeviceChannel: Send + Sync {
    /// Opens a session; `on_device_connected` reports success later.
    fn connect(&self, device: &RendererInfo) -> Result<(), PlaybackError>;

    fn send(&self, command: &RemoteCommand) -> Result<(), PlaybackError>;

    /// Closes the session. `Ok` means the receiver acknowledged the close.
    fn disconnect(&self) -> Result<(), PlaybackError>;
}

/// Something the orchestrator must act upon.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionNotice {
    Connected(RendererInfo),
    Event(PlaybackEvent),
    /// The receiver reports playing another file of the current container.
    FileIndexReported {
        info_hash: Option<String>,
        file_index: u32,
    },
    PlayerClosed,
    CleanDisconnect(RendererInfo),
    UncleanDisconnect {
        device: RendererInfo,
        recovery_armed: bool,
    },
}

/// Last values seen in status reports, to only forward changes.
#[derive(Clone, Debug, Default)]
struct StatusCache {
    position: Option<u64>,
    duration: Option<u64>,
    volume: Option<u32>,
    phase: Option<PlaybackPhase>,
    file_index: Option<u32>,
}

fn phase_event(phase: PlaybackPhase) -> Option<PlaybackEvent> {
    match phase {
        PlaybackPhase::Playing => Some(PlaybackEvent::Playing),
        PlaybackPhase::Paused => Some(PlaybackEvent::Paused),
        PlaybackPhase::Buffering => Some(PlaybackEvent::Buffering(0.0)),
        PlaybackPhase::Stopped => Some(PlaybackEvent::Stopped),
        PlaybackPhase::Ended => Some(PlaybackEvent::EndReached),
        PlaybackPhase::Idle | PlaybackPhase::Opening => None,
    }
}

impl StatusCache {
    fn apply(&mut self, status: &RemoteStatus, notices: &mut Vec<SessionNotice>) {
        if let Some(position) = status.position {
            if self.position != Some(position) {
                self.position = Some(position);
                notices.push(SessionNotice::Event(PlaybackEvent::TimeChanged(position)));
            }
        }

        if let Some(duration) = status.duration {
            if self.duration != Some(duration) {
                self.duration = Some(duration);
                notices.push(SessionNotice::Event(PlaybackEvent::LengthChanged(duration)));
            }
        }

        if let Some(volume) = status.volume {
            if self.volume != Some(volume) {
                self.volume = Some(volume);
                notices.push(SessionNotice::Event(PlaybackEvent::VolumeChanged(volume)));
            }
        }

        if let Some(phase) = status.phase.as_deref().and_then(PlaybackPhase::from_remote) {
            if self.phase != Some(phase) {
                self.phase = Some(phase);
                if let Some(event) = phase_event(phase) {
                    notices.push(SessionNotice::Event(event));
                }
            }
        }

        if let Some(file_index) = status.file_index {
            if self.file_index != Some(file_index) {
                self.file_index = Some(file_index);
                notices.push(SessionNotice::FileIndexReported {
                    info_hash: status.info_hash.clone(),
                    file_index,
                });
            }
        }
    }
}

pub struct RemoteDeviceSessionManager {
    channel: Arc<dyn DeviceChannel>,
    state: RemoteConnectionState,
    device: Option<RendererInfo>,
    closing: bool,
    status: StatusCache,
    recovery: RecoveryWindow,
}

impl std::fmt::Debug for RemoteDeviceSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDeviceSessionManager")
            .field("state", &self.state)
            .field("device", &self.device.as_ref().map(|d| &d.id))
            .field("closing", &self.closing)
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl RemoteDeviceSessionManager {
    pub fn new(channel: Arc<dyn DeviceChannel>, recovery_window: Duration) -> Self {
        Self {
            channel,
            state: RemoteConnectionState::Unselected,
            device: None,
            closing: false,
            status: StatusCache::default(),
            recovery: RecoveryWindow::new(recovery_window),
        }
    }

    pub fn channel(&self) -> Arc<dyn DeviceChannel> {
        Arc::clone(&self.channel)
    }

    pub fn state(&self) -> RemoteConnectionState {
        self.state
    }

    /// Device of the current (or pending) session.
    pub fn device(&self) -> Option<&RendererInfo> {
        self.device.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Records that a connection to `device` is being opened.
    pub fn begin_connect(&mut self, device: RendererInfo) {
        info!(renderer = device.name.as_str(), id = %device.id, "Connecting to remote renderer");
        self.state = RemoteConnectionState::Connecting;
        self.device = Some(device);
        self.closing = false;
        self.status = StatusCache::default();
    }

    /// The channel refused to open; we fall back to no session.
    pub fn connect_failed(&mut self, id: &RendererId) {
        if !self.is_current(id) {
            return;
        }
        warn!(id = %id, "Remote renderer connection failed");
        self.state = RemoteConnectionState::Unselected;
        self.device = None;
    }

    pub fn on_connected(&mut self, id: &RendererId) -> Vec<SessionNotice> {
        if !self.is_current(id) || self.state != RemoteConnectionState::Connecting {
            debug!(id = %id, "Ignoring stale connection report");
            return Vec::new();
        }
        self.state = RemoteConnectionState::Connected;
        match &self.device {
            Some(device) => {
                info!(renderer = device.name.as_str(), "Remote renderer connected");
                vec![SessionNotice::Connected(device.clone())]
            }
            None => Vec::new(),
        }
    }

    /// Marks the session as closing on our request; returns the device to
    /// disconnect from.
    pub fn begin_disconnect(&mut self) -> Option<RendererInfo> {
        let device = self.device.clone()?;
        self.closing = true;
        Some(device)
    }

    /// Applies a connection loss.
    ///
    /// The disconnect is clean when we asked for it or the receiver
    /// acknowledged it. An unclean loss of the selected device arms a
    /// recovery record with `last_media`.
    pub fn on_disconnected(
        &mut self,
        id: &RendererId,
        acknowledged: bool,
        selected: Option<&RendererId>,
        scope: RendererScope,
        last_media: Option<MediaItem>,
    ) -> Vec<SessionNotice> {
        if !self.is_current(id) {
            debug!(id = %id, "Ignoring disconnect of a device without session");
            return Vec::new();
        }
        let Some(device) = self.device.take() else {
            return Vec::new();
        };

        let kind = if self.closing || acknowledged {
            DisconnectKind::Clean
        } else {
            DisconnectKind::Unclean
        };
        self.state = RemoteConnectionState::Disconnected(kind);
        self.closing = false;
        self.status = StatusCache::default();

        match kind {
            DisconnectKind::Clean => {
                info!(renderer = device.name.as_str(), "Remote renderer disconnected");
                self.recovery.clear();
                vec![SessionNotice::CleanDisconnect(device)]
            }
            DisconnectKind::Unclean => {
                let recovery_armed = selected == Some(&device.id);
                warn!(
                    renderer = device.name.as_str(),
                    recovery_armed, "Remote renderer lost"
                );
                if recovery_armed {
                    self.recovery.arm(RecoveryRecord {
                        device_id: device.id.clone(),
                        device_kind: device.kind.clone(),
                        scope,
                        last_media,
                        armed_at: Instant::now(),
                    });
                }
                vec![SessionNotice::UncleanDisconnect {
                    device,
                    recovery_armed,
                }]
            }
        }
    }

    /// Decodes and applies an inbound message.
    pub fn on_message(
        &mut self,
        id: &RendererId,
        message: &DeviceMessage,
    ) -> Result<Vec<SessionNotice>, PlaybackError> {
        if !self.is_current(id) {
            debug!(id = %id, method = message.method.as_str(), "Message from inactive device");
            return Ok(Vec::new());
        }

        let Some(decoded) = message.decode()? else {
            debug!(method = message.method.as_str(), "Ignoring unknown device message");
            return Ok(Vec::new());
        };

        let mut notices = Vec::new();
        match decoded {
            RemoteMessage::Status(status) => {
                self.status.apply(&status, &mut notices);
                if let Some(phase) = self.status.phase {
                    self.track_phase(phase);
                }
            }
            RemoteMessage::PlayerClosed => notices.push(SessionNotice::PlayerClosed),
            other => {
                if let Some(event) = other.to_event() {
                    if let Some(phase) = event.phase() {
                        self.status.phase = Some(phase);
                        self.track_phase(phase);
                    }
                    if let PlaybackEvent::TimeChanged(t) = event {
                        self.status.position = Some(t);
                    }
                    notices.push(SessionNotice::Event(event));
                }
            }
        }
        Ok(notices)
    }

    fn track_phase(&mut self, phase: PlaybackPhase) {
        if !self.state.is_connected() {
            return;
        }
        self.state = match phase {
            PlaybackPhase::Playing => RemoteConnectionState::Playing,
            PlaybackPhase::Paused => RemoteConnectionState::Paused,
            PlaybackPhase::Buffering | PlaybackPhase::Opening => RemoteConnectionState::Buffering,
            PlaybackPhase::Idle | PlaybackPhase::Stopped | PlaybackPhase::Ended => {
                RemoteConnectionState::Connected
            }
        };
    }

    /// Last file index reported by the receiver.
    pub fn reported_file_index(&self) -> Option<u32> {
        self.status.file_index
    }

    /// Live recovery record, if any.
    pub fn recovery(&mut self) -> Option<RecoveryRecord> {
        self.recovery.current().cloned()
    }

    /// Consumes the recovery record of `id`, if it is still within its window.
    pub fn take_recovery(&mut self, id: &RendererId) -> Option<RecoveryRecord> {
        self.recovery.take_for(id)
    }

    pub fn clear_recovery(&mut self) {
        self.recovery.clear();
    }

    fn is_current(&self, id: &RendererId) -> bool {
        self.device.as_ref().is_some_and(|d| &d.id == id)
    }
}
