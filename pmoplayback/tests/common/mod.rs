//! Recording fakes for the collaborators of the orchestrator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use pmoplayback::{
    AudioFocus, Collaborators, ContainedFile, DeviceChannel, DeviceKind, FilesReply, LocalPlayer,
    MediaClass, MediaItem, MediaSessionPublisher, MemoryCatalog, MemoryPlaylist,
    OrchestratorEvent, P2pDescriptor, PlaybackConfig, PlaybackError, PlaybackOrchestrator,
    PlaybackSnapshot, PresentationHost, RemoteCommand, RendererCapabilities, RendererInfo,
    RendererRegistry, StreamingEngine, TrackKind, TransportDescriptor,
};

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCall {
    Play,
    Pause,
    Stop,
    Seek(u64),
    SetVolume(u32),
    SetRate(f32),
    SelectTrack(TrackKind, i32),
    SetAudioDelay(i64),
    SetSubtitleDelay(i64),
    SetScale(f32),
    SetRenderer(Option<String>),
    Load {
        locator: String,
        position_ms: u64,
        start: bool,
    },
}

#[derive(Default)]
pub struct RecordingPlayer {
    pub calls: Mutex<Vec<PlayerCall>>,
    pub fail_all: std::sync::atomic::AtomicBool,
}

impl RecordingPlayer {
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<PlayerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, PlayerCall::Load { .. }))
            .collect()
    }

    fn record(&self, call: PlayerCall) -> Result<(), PlaybackError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_all.load(Ordering::SeqCst) {
            Err(PlaybackError::sink("player", "native failure"))
        } else {
            Ok(())
        }
    }
}

impl LocalPlayer for RecordingPlayer {
    fn play(&self) -> Result<(), PlaybackError> {
        self.record(PlayerCall::Play)
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        self.record(PlayerCall::Pause)
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        self.record(PlayerCall::Stop)
    }

    fn seek(&self, position_ms: u64) -> Result<(), PlaybackError> {
        self.record(PlayerCall::Seek(position_ms))
    }

    fn set_volume(&self, volume: u32) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetVolume(volume))
    }

    fn set_rate(&self, rate: f32) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetRate(rate))
    }

    fn select_track(&self, kind: TrackKind, id: i32) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SelectTrack(kind, id))
    }

    fn set_audio_delay(&self, delay_ms: i64) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetAudioDelay(delay_ms))
    }

    fn set_subtitle_delay(&self, delay_ms: i64) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetSubtitleDelay(delay_ms))
    }

    fn set_scale(&self, scale: f32) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetScale(scale))
    }

    fn set_renderer(&self, renderer: Option<&RendererInfo>) -> Result<(), PlaybackError> {
        self.record(PlayerCall::SetRenderer(renderer.map(|r| r.id.0.clone())))
    }

    fn load(&self, media: &MediaItem, position_ms: u64, start: bool) -> Result<(), PlaybackError> {
        self.record(PlayerCall::Load {
            locator: media.locator.clone(),
            position_ms,
            start,
        })
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub connects: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<RemoteCommand>>,
    pub disconnects: AtomicUsize,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<RemoteCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> Vec<RemoteCommand> {
        self.sent()
            .into_iter()
            .filter(|c| matches!(c, RemoteCommand::Load { .. }))
            .collect()
    }
}

impl DeviceChannel for RecordingChannel {
    fn connect(&self, device: &RendererInfo) -> Result<(), PlaybackError> {
        self.connects.lock().unwrap().push(device.id.0.clone());
        Ok(())
    }

    fn send(&self, command: &RemoteCommand) -> Result<(), PlaybackError> {
        self.sent.lock().unwrap().push(command.clone());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), PlaybackError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine answering `get_files` from a table, optionally after a delay.
#[derive(Default)]
pub struct FakeEngine {
    pub connects: AtomicUsize,
    pub sessions: Mutex<Vec<String>>,
    pub files: Mutex<HashMap<String, Vec<ContainedFile>>>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub requests: Mutex<Vec<String>>,
    pub fail_connect: AtomicBool,
}

impl FakeEngine {
    pub fn with_files(&self, descriptor: &str, files: Vec<ContainedFile>) {
        self.files
            .lock()
            .unwrap()
            .insert(descriptor.to_string(), files);
    }

    pub fn with_delay(&self, descriptor: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(descriptor.to_string(), delay);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl StreamingEngine for FakeEngine {
    fn connect(&self) -> Result<(), PlaybackError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlaybackError::engine("engine binary not found"));
        }
        Ok(())
    }

    fn get_files(&self, descriptor: &TransportDescriptor, reply: FilesReply) {
        self.requests.lock().unwrap().push(descriptor.id.clone());
        let files = self.files.lock().unwrap().get(&descriptor.id).cloned();
        let delay = self.delays.lock().unwrap().get(&descriptor.id).copied();
        let result = files.ok_or_else(|| PlaybackError::engine("unknown descriptor"));

        match delay {
            Some(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    reply(result);
                });
            }
            None => reply(result),
        }
    }

    fn start_session(&self, media: &MediaItem) -> Result<(), PlaybackError> {
        self.sessions.lock().unwrap().push(media.locator.clone());
        Ok(())
    }

    fn stop_session(&self, _force: bool) -> Result<(), PlaybackError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub snapshots: Mutex<Vec<PlaybackSnapshot>>,
    pub releases: AtomicUsize,
}

impl RecordingPublisher {
    pub fn last(&self) -> Option<PlaybackSnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl MediaSessionPublisher for RecordingPublisher {
    fn publish(&self, snapshot: &PlaybackSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingPresentation {
    pub taken: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<bool>>,
    pub dismissed: AtomicUsize,
}

impl PresentationHost for RecordingPresentation {
    fn take_video(&self, media: &MediaItem) {
        self.taken.lock().unwrap().push(media.locator.clone());
    }

    fn close_video(&self, stopped_after_device_loss: bool) {
        self.closed.lock().unwrap().push(stopped_after_device_loss);
    }

    fn dismiss_overlays(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingFocus {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl AudioFocus for RecordingFocus {
    fn acquire(&self) -> bool {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub orchestrator: PlaybackOrchestrator,
    pub registry: Arc<RendererRegistry>,
    pub player: Arc<RecordingPlayer>,
    pub channel: Arc<RecordingChannel>,
    pub engine: Arc<FakeEngine>,
    pub playlist: Arc<Mutex<MemoryPlaylist>>,
    pub catalog: Arc<MemoryCatalog>,
    pub publisher: Arc<RecordingPublisher>,
    pub presentation: Arc<RecordingPresentation>,
    pub focus: Arc<RecordingFocus>,
    pub events: Receiver<OrchestratorEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        let registry = Arc::new(RendererRegistry::new());
        let player = Arc::new(RecordingPlayer::default());
        let channel = Arc::new(RecordingChannel::default());
        let engine = Arc::new(FakeEngine::default());
        let playlist = Arc::new(Mutex::new(MemoryPlaylist::new()));
        let catalog = Arc::new(MemoryCatalog::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let presentation = Arc::new(RecordingPresentation::default());
        let focus = Arc::new(RecordingFocus::default());

        let orchestrator = PlaybackOrchestrator::new(
            config,
            registry.clone(),
            Collaborators {
                player: player.clone(),
                channel: channel.clone(),
                engine: engine.clone(),
                playlist: playlist.clone(),
                catalog: catalog.clone(),
                publisher: publisher.clone(),
                presentation: presentation.clone(),
                audio_focus: focus.clone(),
            },
        );
        let events = orchestrator.subscribe();

        Self {
            orchestrator,
            registry,
            player,
            channel,
            engine,
            playlist,
            catalog,
            publisher,
            presentation,
            focus,
            events,
        }
    }

    /// Drains the events received so far.
    pub fn drain_events(&self) -> Vec<OrchestratorEvent> {
        self.events.try_iter().collect()
    }

    pub fn playlist_load_count(&self) -> usize {
        self.playlist.lock().unwrap().load_count()
    }
}

pub fn cast(id: &str) -> RendererInfo {
    RendererInfo::new(id, &format!("Cast {}", id), DeviceKind::Chromecast)
}

pub fn video_cast(id: &str) -> RendererInfo {
    cast(id).with_capabilities(RendererCapabilities {
        supports_video: true,
        ..RendererCapabilities::default()
    })
}

pub fn p2p_only_cast(id: &str) -> RendererInfo {
    cast(id).with_capabilities(RendererCapabilities {
        media_class: MediaClass::PeerToPeerOnly,
        ..RendererCapabilities::default()
    })
}

pub fn movie(name: &str) -> MediaItem {
    MediaItem::new(&format!("http://media.local/{}.mkv", name))
        .with_title(name)
        .with_video(true)
}

pub fn p2p_file(hash: &str, index: u32) -> MediaItem {
    MediaItem::from_descriptor(P2pDescriptor::new(
        hash,
        index,
        &format!("magnet:?xt=urn:btih:{}", hash),
    ))
}

pub fn contained(index: u32, name: &str) -> ContainedFile {
    ContainedFile {
        index,
        name: name.to_string(),
        length: 1_000_000,
        has_video: true,
    }
}
