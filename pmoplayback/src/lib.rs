pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media_session;
pub mod model;
pub mod orchestrator;
pub mod playlist;
pub mod registry;
pub mod remote;
pub mod resolver;
pub mod sleep_timer;
pub mod timer;

pub use capabilities::{ActiveSink, AudioFocus, LocalPlayer, PresentationHost};
pub use catalog::{Catalog, CatalogEntry, EntryOrigin, MemoryCatalog};
pub use config::PlaybackConfig;
pub use engine::{
    ContainedFile, EngineSession, EngineSessionBridge, EngineSessionState, EngineStatus,
    FilesReply, StreamingEngine, TransportDescriptor,
};
pub use errors::PlaybackError;
pub use events::{EventBus, OrchestratorEvent};
pub use logging::init_logging;
pub use media_session::{MediaSessionPublisher, PlaybackActions, PlaybackSnapshot};
pub use model::{
    DeviceKind, DisconnectKind, MediaClass, MediaItem, P2pDescriptor, PlaybackEvent,
    PlaybackPhase, RemoteConnectionState, RendererCapabilities, RendererId, RendererInfo,
    RendererScope, SinkRoute, TrackKind,
};
pub use orchestrator::{
    Collaborators, LoadOptions, LoadOutcome, PlaybackOrchestrator, SelectionOrigin,
    SharedPlaylist, StopOptions,
};
pub use playlist::{MemoryPlaylist, PlaylistStore, RepeatMode};
pub use registry::{RegistryEvent, RendererRegistry};
pub use remote::{
    DeviceChannel, DeviceMessage, RecoveryRecord, RemoteCommand, RemoteDeviceSessionManager,
    RemoteMessage, SessionNotice,
};
pub use resolver::{
    AuthorityPolicy, DescriptorStore, MemoryDescriptorStore, PreferUserEntries, ResolverHandle,
    ResolverOptions, ResolverProgress, ResolverReport, TransportDescriptorResolver,
};
pub use sleep_timer::SleepTimer;
