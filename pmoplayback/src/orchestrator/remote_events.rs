//! Remote receiver callbacks: discovery, connection changes, inbound
//! messages, the restore protocol and file-index correction.

use tracing::{debug, info, warn};

use super::{LoadOptions, PlaybackOrchestrator, SelectionOrigin, StopOptions};
use crate::capabilities::guarded;
use crate::events::OrchestratorEvent;
use crate::model::{
    MediaItem, P2pDescriptor, PlaybackPhase, RendererId, RendererInfo, SinkRoute,
    synthesize_locator,
};
use crate::registry::RegistryEvent;
use crate::remote::{DeviceMessage, RecoveryRecord, SessionNotice};
use crate::timer::ScheduledTask;

impl PlaybackOrchestrator {
    /// A renderer showed up on the network.
    ///
    /// When it is the device lost moments ago and nothing was loaded since,
    /// its session is restored.
    pub fn on_device_discovered(&self, renderer: RendererInfo) {
        self.inner.registry.add_device(renderer.clone());
        self.restore_device(&renderer);
    }

    /// Restores playback on `renderer` from its recovery record.
    ///
    /// Returns false, doing nothing, when there is no live record for it or
    /// media is already loaded.
    pub fn restore_device(&self, renderer: &RendererInfo) -> bool {
        let record = {
            let mut state = self.lock();
            if state.now_playing.is_some() {
                None
            } else {
                state.session.take_recovery(&renderer.id)
            }
        };
        match record {
            Some(record) => {
                self.restore(renderer.clone(), record);
                true
            }
            None => false,
        }
    }

    fn restore(&self, renderer: RendererInfo, record: RecoveryRecord) {
        info!(
            renderer = renderer.name.as_str(),
            scope = ?record.scope,
            "Restoring session on recovered renderer"
        );
        self.set_renderer(Some(renderer), false, SelectionOrigin::Restore(record.scope));

        if let Some(media) = record.last_media {
            self.load(vec![media], 0, LoadOptions::restore());
        }

        let weak = self.downgrade();
        let task = ScheduledTask::schedule(
            "restore-check",
            self.inner.config.restore.verification_timeout(),
            move || {
                if let Some(orchestrator) = PlaybackOrchestrator::from_weak(&weak) {
                    orchestrator.restore_check_expired();
                }
            },
        );
        self.lock().restore_check = Some(task);
    }

    fn restore_check_expired(&self) {
        let stalled = {
            let mut state = self.lock();
            if state.restore_check.take().is_none() {
                return;
            }
            state.snapshot.phase != PlaybackPhase::Playing
        };

        if stalled {
            warn!("Restored session never started playing; stopping");
            self.stop(StopOptions {
                save_metadata: true,
                ..StopOptions::default()
            });
        } else {
            debug!("Restored session is playing");
        }
    }

    /// A renderer left the network.
    pub fn on_device_removed(&self, id: &RendererId) {
        let Some(RegistryEvent::Removed { was_selected, .. }) =
            self.inner.registry.remove_device(id)
        else {
            return;
        };
        let has_session = self
            .lock()
            .session
            .device()
            .is_some_and(|device| &device.id == id);
        if was_selected && has_session {
            self.on_device_disconnected(id, false);
        }
    }

    pub fn on_device_connected(&self, id: &RendererId) {
        let notices = self.lock().session.on_connected(id);
        self.apply_notices(notices);
    }

    /// Connection to `id` ended; `acknowledged` when the receiver confirmed a
    /// close.
    pub fn on_device_disconnected(&self, id: &RendererId, acknowledged: bool) {
        let selected = self.inner.registry.selected_renderer().map(|r| r.id);
        let scope = self.inner.registry.scope();

        let notices = {
            let mut state = self.lock();
            let position = state.snapshot.position_ms;
            let last_media = state.now_playing.clone().map(|mut media| {
                media.resume_position_ms = position;
                media
            });
            state
                .session
                .on_disconnected(id, acknowledged, selected.as_ref(), scope, last_media)
        };
        self.apply_notices(notices);
    }

    /// Raw message from the receiver of `id`.
    pub fn on_device_message(&self, id: &RendererId, message: &DeviceMessage) {
        let result = self.lock().session.on_message(id, message);
        match result {
            Ok(notices) => self.apply_notices(notices),
            Err(err) => warn!(device = %id, error = %err, "Dropping device message"),
        }
    }

    /// Same as [`on_device_message`](Self::on_device_message) for a JSON frame.
    pub fn on_device_frame(&self, id: &RendererId, frame: &str) {
        match DeviceMessage::from_json(frame) {
            Ok(message) => self.on_device_message(id, &message),
            Err(err) => warn!(device = %id, error = %err, "Dropping device frame"),
        }
    }

    fn apply_notices(&self, notices: Vec<SessionNotice>) {
        for notice in notices {
            match notice {
                SessionNotice::Connected(device) => self.hand_over(&device),
                SessionNotice::Event(event) => self.apply_event(event),
                SessionNotice::FileIndexReported {
                    info_hash,
                    file_index,
                } => self.correct_file_index(info_hash.as_deref(), file_index),
                SessionNotice::PlayerClosed => {
                    info!("Remote player closed");
                    self.stop(StopOptions {
                        save_metadata: true,
                        keep_renderer: true,
                        ..StopOptions::default()
                    });
                }
                SessionNotice::CleanDisconnect(device) => {
                    info!(renderer = device.name.as_str(), "Renderer closed the session");
                    if self.inner.registry.selected_renderer().is_some() {
                        self.reset_selection();
                    }
                    self.emit_snapshot();
                }
                SessionNotice::UncleanDisconnect {
                    device,
                    recovery_armed,
                } => {
                    if recovery_armed {
                        self.stop_after_device_loss(&device);
                    } else {
                        debug!(renderer = device.name.as_str(), "Unselected renderer lost");
                    }
                }
            }
        }
    }

    /// Moves the loaded item to the freshly connected receiver.
    fn hand_over(&self, device: &RendererInfo) {
        let pending = {
            let state = self.lock();
            let sink = self.active_sink(&state);
            state.now_playing.clone().map(|media| {
                (
                    media,
                    state.snapshot.position_ms,
                    state.snapshot.phase == PlaybackPhase::Playing,
                    sink,
                )
            })
        };

        if let Some((media, position, playing, sink)) = pending {
            if sink.is_remote() {
                info!(
                    renderer = device.name.as_str(),
                    locator = media.locator.as_str(),
                    position,
                    "Handing playback over to renderer"
                );
                guarded("stop", &SinkRoute::Local, self.inner.player.stop());
                guarded("load", &sink.route(), sink.load(&media, position, playing));
            }
        }
        self.emit_snapshot();
    }

    /// Local stop after the selected device vanished; the recovery record
    /// armed by the session manager is left in place.
    fn stop_after_device_loss(&self, device: &RendererInfo) {
        warn!(renderer = device.name.as_str(), "Stopping playback after device loss");

        let stopped = {
            let mut state = self.lock();
            state.restore_check = None;
            state.sleep_timer.cancel();
            let stopped = Self::take_now_playing(&mut state);
            self.transition(&mut state, PlaybackPhase::Stopped);
            stopped
        };

        guarded("stop", &SinkRoute::Local, self.inner.player.stop());
        self.inner.bridge.stop_session(true);
        if let Some(item) = &stopped {
            self.save_metadata(item);
        }
        self.reset_selection();
        self.inner.presentation.close_video(true);
        self.inner
            .bus
            .broadcast(OrchestratorEvent::StoppedAfterDeviceLoss);
        self.emit_snapshot();
    }

    /// The receiver plays another file of the current container: follow it
    /// in the playlist without commanding the sink again.
    fn correct_file_index(&self, info_hash: Option<&str>, file_index: u32) {
        let Some(current) = self.lock().now_playing.clone() else {
            return;
        };
        let Some(descriptor) = current.p2p else {
            debug!(file_index, "Index report for a non peer-to-peer item");
            return;
        };
        if info_hash.is_some_and(|hash| !hash.eq_ignore_ascii_case(&descriptor.info_hash)) {
            debug!(file_index, "Index report for another container");
            return;
        }
        if descriptor.file_index == file_index {
            return;
        }

        let base = descriptor.base_locator.as_str();
        let repositioned = {
            let mut playlist = self.lock_playlist();
            let found = playlist.items().iter().position(|item| {
                item.p2p
                    .as_ref()
                    .is_some_and(|p2p| p2p.same_file(base, file_index))
            });
            match found {
                Some(index) => match playlist.set_current_index(index) {
                    Ok(()) => playlist.current(),
                    Err(err) => {
                        warn!(index, error = %err, "Failed to reposition playlist");
                        None
                    }
                },
                None => None,
            }
        };

        let item = match repositioned {
            Some(item) => {
                info!(file_index, "Playlist follows the renderer's file");
                item
            }
            None => {
                let reported = P2pDescriptor::new(&descriptor.info_hash, file_index, base);
                let locator = synthesize_locator(base, file_index);
                let item = match self.inner.catalog.find_by_locator(&locator) {
                    Some(entry) => {
                        let mut item = entry.item;
                        if item.p2p.is_none() {
                            item.p2p = Some(reported);
                        }
                        item
                    }
                    None => MediaItem::from_descriptor(reported),
                };
                info!(file_index, locator = locator.as_str(), "Renderer's file not in playlist");
                if let Err(err) = self.lock_playlist().load(vec![item.clone()], 0) {
                    warn!(error = %err, "Failed to load the renderer's file");
                    return;
                }
                item
            }
        };

        {
            let mut state = self.lock();
            state.snapshot.title = item.title.clone();
            if let Some(duration) = item.duration_ms {
                state.snapshot.length_ms = duration;
            }
            state.now_playing = Some(item);
        }
        self.emit_snapshot();
    }
}
