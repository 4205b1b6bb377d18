//! Playback orchestration.
//!
//! [`PlaybackOrchestrator`] is the single entry point for transport commands.
//! Each call is routed to exactly one sink: the local player, or the remote
//! receiver once its session is connected. Sink events, remote messages and
//! engine status all come back through the orchestrator, which keeps the
//! playback snapshot, feeds the media-session publisher and fans events out
//! to subscribers.
//!
//! All orchestrator state sits behind one mutex. Collaborators are always
//! called after that lock is released, so they may call back in.

mod options;
mod remote_events;

pub use options::{LoadOptions, LoadOutcome, SelectionOrigin, StopOptions};

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::capabilities::{ActiveSink, AudioFocus, LocalPlayer, PresentationHost, guarded};
use crate::catalog::{Catalog, EntryOrigin};
use crate::config::PlaybackConfig;
use crate::engine::{EngineSessionBridge, EngineStatus, StreamingEngine};
use crate::errors::PlaybackError;
use crate::events::{OrchestratorEvent, OrchestratorEventBus};
use crate::media_session::{MediaSessionPublisher, PlaybackActions, PlaybackSnapshot};
use crate::model::{
    MediaClass, MediaItem, PlaybackEvent, PlaybackPhase, RemoteConnectionState, RendererInfo,
    SinkRoute, TrackKind, route,
};
use crate::playlist::PlaylistStore;
use crate::registry::RendererRegistry;
use crate::remote::{DeviceChannel, RecoveryRecord, RemoteDeviceSessionManager};
use crate::sleep_timer::SleepTimer;
use crate::timer::ScheduledTask;

pub type SharedPlaylist = Arc<Mutex<dyn PlaylistStore>>;

/// External collaborators driven by the orchestrator.
pub struct Collaborators {
    pub player: Arc<dyn LocalPlayer>,
    pub channel: Arc<dyn DeviceChannel>,
    pub engine: Arc<dyn StreamingEngine>,
    pub playlist: SharedPlaylist,
    pub catalog: Arc<dyn Catalog>,
    pub publisher: Arc<dyn MediaSessionPublisher>,
    pub presentation: Arc<dyn PresentationHost>,
    pub audio_focus: Arc<dyn AudioFocus>,
}

struct OrchestratorState {
    session: RemoteDeviceSessionManager,
    /// Item last pushed to a sink.
    now_playing: Option<MediaItem>,
    snapshot: PlaybackSnapshot,
    pausable: bool,
    seekable: bool,
    focus_held: bool,
    restore_check: Option<ScheduledTask>,
    keep_alive: Option<ScheduledTask>,
    sleep_timer: SleepTimer,
}

struct Inner {
    config: PlaybackConfig,
    registry: Arc<RendererRegistry>,
    bridge: EngineSessionBridge,
    player: Arc<dyn LocalPlayer>,
    playlist: SharedPlaylist,
    catalog: Arc<dyn Catalog>,
    publisher: Arc<dyn MediaSessionPublisher>,
    presentation: Arc<dyn PresentationHost>,
    audio_focus: Arc<dyn AudioFocus>,
    state: Mutex<OrchestratorState>,
    bus: OrchestratorEventBus,
}

/// Cheap, cloneable handle; clones drive the same playback.
#[derive(Clone)]
pub struct PlaybackOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PlaybackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PlaybackOrchestrator")
            .field("session", &state.session)
            .field("now_playing", &state.now_playing)
            .field("phase", &state.snapshot.phase)
            .finish()
    }
}

impl PlaybackOrchestrator {
    pub fn new(
        config: PlaybackConfig,
        registry: Arc<RendererRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let bridge =
            EngineSessionBridge::new(collaborators.engine, config.engine.pending_capacity);
        let session = RemoteDeviceSessionManager::new(
            collaborators.channel,
            config.restore.recovery_window(),
        );

        let state = OrchestratorState {
            session,
            now_playing: None,
            snapshot: PlaybackSnapshot::default(),
            pausable: true,
            seekable: true,
            focus_held: false,
            restore_check: None,
            keep_alive: None,
            sleep_timer: SleepTimer::new(),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                bridge,
                player: collaborators.player,
                playlist: collaborators.playlist,
                catalog: collaborators.catalog,
                publisher: collaborators.publisher,
                presentation: collaborators.presentation,
                audio_focus: collaborators.audio_focus,
                state: Mutex::new(state),
                bus: OrchestratorEventBus::new(),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_playlist(&self) -> MutexGuard<'_, dyn PlaylistStore + 'static> {
        self.inner.playlist.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> Receiver<OrchestratorEvent> {
        self.inner.bus.subscribe()
    }

    pub fn registry(&self) -> &Arc<RendererRegistry> {
        &self.inner.registry
    }

    pub fn engine(&self) -> &EngineSessionBridge {
        &self.inner.bridge
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn now_playing(&self) -> Option<MediaItem> {
        self.lock().now_playing.clone()
    }

    pub fn connection_state(&self) -> RemoteConnectionState {
        self.lock().session.state()
    }

    pub fn recovery_record(&self) -> Option<RecoveryRecord> {
        self.lock().session.recovery()
    }

    pub fn has_pending_restore_check(&self) -> bool {
        self.lock().restore_check.is_some()
    }

    /// Where transport commands would go right now.
    pub fn active_route(&self) -> SinkRoute {
        let state = self.lock();
        self.active_sink(&state).route()
    }

    fn active_sink(&self, state: &OrchestratorState) -> ActiveSink {
        let selected = self.inner.registry.selected_renderer();
        // The session only counts when it belongs to the selected renderer
        let connection = match (selected.as_ref(), state.session.device()) {
            (Some(selected), Some(device)) if selected.id == device.id => state.session.state(),
            _ => RemoteConnectionState::Unselected,
        };

        match route(selected.as_ref(), connection) {
            SinkRoute::Local => ActiveSink::Local(Arc::clone(&self.inner.player)),
            remote => ActiveSink::Remote {
                route: remote,
                channel: state.session.channel(),
            },
        }
    }

    fn dispatch<F>(&self, operation: &str, command: F) -> bool
    where
        F: FnOnce(&ActiveSink) -> Result<(), PlaybackError>,
    {
        let sink = {
            let state = self.lock();
            self.active_sink(&state)
        };
        debug!(operation, sink = ?sink.route(), "Dispatching transport command");
        guarded(operation, &sink.route(), command(&sink))
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Resumes playback, or starts the playlist's current item when nothing
    /// was pushed to a sink yet.
    pub fn play(&self) {
        let idle = self.lock().now_playing.is_none();
        if idle {
            let current = self.lock_playlist().current();
            if let Some(item) = current {
                let position = item.resume_position_ms;
                self.push_to_sink(item, position, true);
                return;
            }
        }
        self.dispatch("play", |sink| sink.play());
    }

    pub fn pause(&self) {
        self.dispatch("pause", |sink| sink.pause());
    }

    pub fn seek(&self, position_ms: u64) {
        self.dispatch("seek", |sink| sink.seek(position_ms));
    }

    pub fn set_volume(&self, volume: u32) {
        self.dispatch("set_volume", |sink| sink.set_volume(volume));
    }

    pub fn select_track(&self, kind: TrackKind, id: i32) {
        self.dispatch("select_track", |sink| sink.select_track(kind, id));
    }

    pub fn set_rate(&self, rate: f32) {
        if self.dispatch("set_rate", |sink| sink.set_rate(rate)) {
            self.lock().snapshot.rate = rate;
            self.emit_snapshot();
        }
    }

    pub fn set_audio_delay(&self, delay_ms: i64) {
        self.dispatch("set_audio_delay", |sink| sink.set_audio_delay(delay_ms));
    }

    pub fn set_subtitle_delay(&self, delay_ms: i64) {
        self.dispatch("set_subtitle_delay", |sink| {
            sink.set_subtitle_delay(delay_ms)
        });
    }

    pub fn set_scale(&self, scale: f32) {
        self.dispatch("set_scale", |sink| sink.set_scale(scale));
    }

    /// Advances the playlist and plays the new current item.
    pub fn next(&self) -> bool {
        let item = {
            let mut playlist = self.lock_playlist();
            if !playlist.next() {
                return false;
            }
            playlist.current()
        };
        match item {
            Some(item) => {
                self.push_to_sink(item, 0, true);
                true
            }
            None => false,
        }
    }

    pub fn previous(&self) -> bool {
        let item = {
            let mut playlist = self.lock_playlist();
            if !playlist.previous() {
                return false;
            }
            playlist.current()
        };
        match item {
            Some(item) => {
                self.push_to_sink(item, 0, true);
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, options: StopOptions) {
        self.inner.presentation.dismiss_overlays();

        let (sink, stopped, disconnect) = {
            let mut state = self.lock();
            state.restore_check = None;
            state.session.clear_recovery();
            state.sleep_timer.cancel();
            let sink = self.active_sink(&state);
            let stopped = Self::take_now_playing(&mut state);
            self.transition(&mut state, PlaybackPhase::Stopped);
            let disconnect = if options.keep_renderer {
                None
            } else {
                state.session.begin_disconnect()
            };
            (sink, stopped, disconnect)
        };

        info!(
            sink = ?sink.route(),
            clear_playlist = options.clear_playlist,
            save_metadata = options.save_metadata,
            keep_renderer = options.keep_renderer,
            "Stopping playback"
        );
        guarded("stop", &sink.route(), sink.stop());
        self.inner.bridge.stop_session(false);

        if options.save_metadata {
            if let Some(item) = &stopped {
                self.save_metadata(item);
            }
        }
        if options.clear_playlist {
            self.lock_playlist().clear();
        }
        if let Some(device) = disconnect {
            self.disconnect_cleanly(&device);
        }
        if !options.keep_renderer && self.inner.registry.selected_renderer().is_some() {
            self.reset_selection();
        }
        self.emit_snapshot();
    }

    fn take_now_playing(state: &mut OrchestratorState) -> Option<MediaItem> {
        let mut item = state.now_playing.take()?;
        item.resume_position_ms = state.snapshot.position_ms;
        Some(item)
    }

    fn save_metadata(&self, item: &MediaItem) {
        match self.inner.catalog.upsert(item, EntryOrigin::User) {
            Ok(entry) => debug!(
                entry = entry.id,
                position = item.resume_position_ms,
                "Saved resume position"
            ),
            Err(err) => warn!(locator = item.locator.as_str(), error = %err, "Failed to save metadata"),
        }

        let mut playlist = self.lock_playlist();
        let is_current = playlist
            .current()
            .is_some_and(|current| current.identity() == item.identity());
        if is_current {
            playlist.update_current(item.clone());
        }
    }

    // ------------------------------------------------------------------
    // Renderer selection
    // ------------------------------------------------------------------

    /// Central sink transition.
    ///
    /// In order: a video sink being left hands its item to the presentation
    /// host; an explicit switch closes the current device cleanly; the local
    /// player is bound to the new target (or cleared); audio focus follows
    /// the sink. The registry is updated last and a session is opened for a
    /// remote renderer.
    pub fn set_renderer(
        &self,
        renderer: Option<RendererInfo>,
        from_user: bool,
        origin: SelectionOrigin,
    ) {
        let previous = self.inner.registry.selected_renderer();
        let new_id = renderer.as_ref().map(|r| r.id.clone());

        let (take_video, disconnect, already_open, playing) = {
            let mut state = self.lock();
            let connected = state.session.is_connected();
            let leaving = previous
                .as_ref()
                .is_some_and(|p| connected && Some(&p.id) != new_id.as_ref());

            let take_video = match (&previous, &state.now_playing) {
                (Some(p), Some(media))
                    if leaving && p.capabilities.supports_video && media.has_video =>
                {
                    Some(media.clone())
                }
                _ => None,
            };

            let session_elsewhere = state
                .session
                .device()
                .is_some_and(|d| Some(&d.id) != new_id.as_ref());
            let switching = origin == SelectionOrigin::SwitchRendererAction && previous.is_some();
            let disconnect = if switching || session_elsewhere {
                state.session.begin_disconnect()
            } else {
                None
            };
            let already_open = disconnect.is_none()
                && state
                    .session
                    .device()
                    .is_some_and(|d| Some(&d.id) == new_id.as_ref());

            (
                take_video,
                disconnect,
                already_open,
                state.snapshot.phase == PlaybackPhase::Playing,
            )
        };

        info!(
            renderer = renderer.as_ref().map(|r| r.name.as_str()).unwrap_or("local"),
            from_user,
            origin = ?origin,
            "Switching renderer"
        );

        if let Some(media) = take_video {
            self.inner.presentation.take_video(&media);
        }

        if let Some(device) = disconnect {
            self.disconnect_cleanly(&device);
        }

        let native = renderer.as_ref().filter(|r| r.capabilities.native_target);
        guarded(
            "set_renderer",
            &SinkRoute::Local,
            self.inner.player.set_renderer(native),
        );

        self.update_audio_focus(renderer.is_some(), previous.is_some(), playing);

        self.inner
            .registry
            .select_renderer(from_user, renderer.clone(), origin.scope().is_global());
        self.inner
            .bus
            .broadcast(OrchestratorEvent::RendererChanged(renderer.clone()));

        if let Some(device) = renderer.filter(|r| !r.capabilities.native_target) {
            if !already_open {
                self.connect(device);
            }
        }
        self.emit_snapshot();
    }

    fn update_audio_focus(&self, remote_now: bool, had_renderer: bool, playing: bool) {
        if remote_now {
            let held = std::mem::replace(&mut self.lock().focus_held, false);
            if held {
                debug!("Releasing local audio focus");
                self.inner.audio_focus.release();
            }
        } else if had_renderer && playing && !self.lock().focus_held {
            let acquired = self.inner.audio_focus.acquire();
            debug!(acquired, "Re-acquiring local audio focus");
            self.lock().focus_held = acquired;
        }
    }

    fn connect(&self, device: RendererInfo) {
        let channel = {
            let mut state = self.lock();
            state.session.begin_connect(device.clone());
            state.session.channel()
        };
        if let Err(err) = channel.connect(&device) {
            warn!(renderer = device.name.as_str(), error = %err, "Failed to connect renderer");
            self.lock().session.connect_failed(&device.id);
            self.advise(format!("Unable to connect to {}", device.name));
        }
    }

    /// Closes the session on our request; never arms recovery.
    fn disconnect_cleanly(&self, device: &RendererInfo) {
        let channel = self.lock().session.channel();
        if let Err(err) = channel.disconnect() {
            warn!(renderer = device.name.as_str(), error = %err, "Remote close not acknowledged");
        }
        let scope = self.inner.registry.scope();
        let notices = self
            .lock()
            .session
            .on_disconnected(&device.id, true, None, scope, None);
        debug!(renderer = device.name.as_str(), notices = notices.len(), "Remote session closed");
    }

    fn reset_selection(&self) {
        self.inner.registry.select_renderer(false, None, false);
        guarded(
            "set_renderer",
            &SinkRoute::Local,
            self.inner.player.set_renderer(None),
        );
        self.inner
            .bus
            .broadcast(OrchestratorEvent::RendererChanged(None));
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Hands `items` to the playlist and pushes the current one to the sink.
    pub fn load(&self, items: Vec<MediaItem>, position: usize, options: LoadOptions) -> LoadOutcome {
        let requested = items.len();
        let selected = self.inner.registry.selected_renderer();

        let (items, position) = if options.skip_sink_filter {
            (items, position)
        } else {
            let class = selected
                .as_ref()
                .map(|r| r.capabilities.media_class)
                .unwrap_or_default();
            filter_for_class(items, position, class)
        };

        if items.is_empty() {
            let target = selected
                .as_ref()
                .map(|r| r.name.as_str())
                .unwrap_or("this player");
            info!(requested, renderer = target, "Nothing playable after filtering");
            self.advise(format!("No media playable on {}", target));
            return LoadOutcome::Rejected;
        }

        if !options.skip_device_reset {
            let mut state = self.lock();
            state.session.clear_recovery();
            state.restore_check = None;
        }

        let count = items.len();
        let (current, position) = {
            let mut playlist = self.lock_playlist();
            if let Err(err) = playlist.load(items, position) {
                warn!(error = %err, "Playlist refused the load");
                return LoadOutcome::Rejected;
            }
            (playlist.current(), playlist.current_index().unwrap_or(position))
        };

        self.inner.bus.broadcast(OrchestratorEvent::Loaded {
            count,
            position,
            extras: options.extras,
        });

        if let Some(item) = current {
            let start_at = item.resume_position_ms;
            self.push_to_sink(item, start_at, options.start);
        }

        LoadOutcome::Loaded {
            count,
            position,
            filtered_out: requested - count,
        }
    }

    fn push_to_sink(&self, item: MediaItem, position_ms: u64, start: bool) {
        let sink = {
            let mut state = self.lock();
            state.now_playing = Some(item.clone());
            state.snapshot.title = item.title.clone();
            state.snapshot.length_ms = item.duration_ms.unwrap_or(0);
            state.snapshot.position_ms = position_ms;
            let phase = if start {
                PlaybackPhase::Opening
            } else {
                PlaybackPhase::Paused
            };
            self.transition(&mut state, phase);
            self.active_sink(&state)
        };

        if !sink.is_remote() && item.is_p2p() {
            match self.inner.bridge.start_session(item.clone()) {
                Ok(_) => {}
                Err(PlaybackError::Engine(reason)) => {
                    warn!(locator = item.locator.as_str(), reason = reason.as_str(), "Engine did not start");
                    self.report_engine_status(EngineStatus::Failed(reason));
                }
                Err(err) => {
                    warn!(locator = item.locator.as_str(), error = %err, "Engine session not started");
                }
            }
        }

        info!(
            locator = item.locator.as_str(),
            position_ms,
            start,
            sink = ?sink.route(),
            "Loading media"
        );
        guarded("load", &sink.route(), sink.load(&item, position_ms, start));
        self.emit_snapshot();
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Event reported by the local player. Ignored while a remote sink is
    /// routed.
    pub fn on_player_event(&self, event: PlaybackEvent) {
        let remote = {
            let state = self.lock();
            self.active_sink(&state).is_remote()
        };
        if remote {
            debug!(event = ?event, "Ignoring local player event while casting");
            return;
        }
        self.apply_event(event);
    }

    fn apply_event(&self, event: PlaybackEvent) {
        let mut end_reached = false;
        {
            let mut state = self.lock();
            match &event {
                PlaybackEvent::TimeChanged(time) => state.snapshot.position_ms = *time,
                PlaybackEvent::LengthChanged(length) => state.snapshot.length_ms = *length,
                PlaybackEvent::VolumeChanged(volume) => state.snapshot.volume = Some(*volume),
                PlaybackEvent::PausableChanged(pausable) => state.pausable = *pausable,
                PlaybackEvent::SeekableChanged(seekable) => state.seekable = *seekable,
                PlaybackEvent::EndReached => end_reached = true,
                _ => {}
            }
            if let Some(phase) = event.phase() {
                self.transition(&mut state, phase);
            }
        }

        self.inner
            .bus
            .broadcast(OrchestratorEvent::Playback(event));

        if end_reached && !self.next() {
            debug!("End of playlist reached");
        }
        self.emit_snapshot();
    }

    /// Lifecycle notification from the local streaming engine.
    pub fn on_engine_status(&self, status: EngineStatus) {
        let status = self.inner.bridge.on_status(status);
        self.report_engine_status(status);
    }

    /// Tells subscribers about a status the bridge already applied.
    fn report_engine_status(&self, status: EngineStatus) {
        if let EngineStatus::Failed(reason) = &status {
            self.advise(format!("Streaming engine failed: {}", reason));
        }
        self.inner.bus.broadcast(OrchestratorEvent::Engine(status));
    }

    fn advise(&self, message: String) {
        info!(message = message.as_str(), "Advisory");
        self.inner
            .bus
            .broadcast(OrchestratorEvent::Advisory(message));
    }

    // ------------------------------------------------------------------
    // Media session
    // ------------------------------------------------------------------

    /// Records a phase change; leaving `Playing` arms the keep-alive task,
    /// entering it cancels the task.
    fn transition(&self, state: &mut OrchestratorState, phase: PlaybackPhase) {
        let previous = state.snapshot.phase;
        state.snapshot.phase = phase;

        if phase == PlaybackPhase::Playing {
            if state.keep_alive.take().is_some() {
                debug!("Media session keep-alive cancelled");
            }
        } else if previous == PlaybackPhase::Playing && state.keep_alive.is_none() {
            let weak = self.downgrade();
            state.keep_alive = Some(ScheduledTask::schedule(
                "media-session",
                self.inner.config.media_session.keep_alive(),
                move || {
                    if let Some(orchestrator) = PlaybackOrchestrator::from_weak(&weak) {
                        orchestrator.keep_alive_expired();
                    }
                },
            ));
        }
    }

    fn keep_alive_expired(&self) {
        let release = {
            let mut state = self.lock();
            if state.snapshot.phase == PlaybackPhase::Playing {
                false
            } else {
                state.keep_alive = None;
                true
            }
        };
        if release {
            info!("Media session idle; releasing");
            self.inner.publisher.release();
        }
    }

    fn emit_snapshot(&self) {
        let (has_next, has_previous) = {
            let playlist = self.lock_playlist();
            (playlist.has_next(), playlist.has_previous())
        };

        let snapshot = {
            let mut state = self.lock();
            let remote = self.active_sink(&state).is_remote();
            let phase = state.snapshot.phase;
            let loaded = state.now_playing.is_some();
            state.snapshot.remote = remote;
            state.snapshot.actions = PlaybackActions {
                play: loaded && phase != PlaybackPhase::Playing,
                pause: phase == PlaybackPhase::Playing && state.pausable,
                stop: loaded,
                seek: loaded && state.seekable,
                next: has_next,
                previous: has_previous,
            };
            state.snapshot.clone()
        };

        self.inner.publisher.publish(&snapshot);
        self.inner
            .bus
            .broadcast(OrchestratorEvent::Snapshot(snapshot));
    }

    // ------------------------------------------------------------------
    // Sleep timer
    // ------------------------------------------------------------------

    /// Pauses playback after `seconds`.
    pub fn start_sleep_timer(&self, seconds: u32) -> Result<(), PlaybackError> {
        let weak = self.downgrade();
        let max = self.inner.config.sleep_timer.max_secs;
        self.lock().sleep_timer.start(seconds, max, move |generation| {
            if let Some(orchestrator) = PlaybackOrchestrator::from_weak(&weak) {
                orchestrator.sleep_timer_expired(generation);
            }
        })?;
        info!(seconds, "Sleep timer started");
        Ok(())
    }

    pub fn cancel_sleep_timer(&self) {
        self.lock().sleep_timer.cancel();
        debug!("Sleep timer cancelled");
    }

    pub fn sleep_timer_remaining(&self) -> Option<u32> {
        self.lock().sleep_timer.remaining_seconds()
    }

    fn sleep_timer_expired(&self, generation: u64) {
        if !self.lock().sleep_timer.mark_expired(generation) {
            debug!(generation, "Ignoring expiry of a replaced sleep timer");
            return;
        }
        info!("Sleep timer expired; pausing");
        self.pause();
    }
}

/// Keeps the items `class` accepts. The returned position points at the
/// requested item, or the first kept item after it.
fn filter_for_class(
    items: Vec<MediaItem>,
    position: usize,
    class: MediaClass,
) -> (Vec<MediaItem>, usize) {
    if class == MediaClass::Any {
        return (items, position);
    }

    let mut kept = Vec::with_capacity(items.len());
    let mut new_position = None;
    for (index, item) in items.into_iter().enumerate() {
        if !class.accepts(&item) {
            continue;
        }
        if new_position.is_none() && index >= position {
            new_position = Some(kept.len());
        }
        kept.push(item);
    }

    let position = new_position.unwrap_or_else(|| kept.len().saturating_sub(1));
    (kept, position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::P2pDescriptor;

    fn p2p(index: u32) -> MediaItem {
        MediaItem::from_descriptor(P2pDescriptor::new("hash", index, "magnet:?xt=hash"))
    }

    #[test]
    fn test_filter_keeps_position_on_requested_item() {
        let items = vec![
            MediaItem::new("file:///a.mkv"),
            p2p(0),
            MediaItem::new("file:///b.mkv"),
            p2p(1),
        ];

        let (kept, position) = filter_for_class(items.clone(), 3, MediaClass::PeerToPeerOnly);
        assert_eq!(kept, vec![p2p(0), p2p(1)]);
        assert_eq!(position, 1);

        // Requested item filtered out: next accepted one
        let (_, position) = filter_for_class(items.clone(), 2, MediaClass::PeerToPeerOnly);
        assert_eq!(position, 1);

        let (kept, position) = filter_for_class(items, 2, MediaClass::Any);
        assert_eq!(kept.len(), 4);
        assert_eq!(position, 2);
    }

    #[test]
    fn test_filter_can_empty_the_list() {
        let (kept, position) = filter_for_class(
            vec![MediaItem::new("file:///a.mkv")],
            0,
            MediaClass::PeerToPeerOnly,
        );
        assert!(kept.is_empty());
        assert_eq!(position, 0);
    }
}
