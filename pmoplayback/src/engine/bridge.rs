//! Deferred access to the local streaming engine.
//!
//! Callers ask for the engine through [`EngineSessionBridge::with_engine`].
//! While the engine handshake is in flight their callbacks wait in a bounded
//! FIFO mailbox; the mailbox is drained exactly once when the engine reports
//! `Connected`. Enqueue and drain happen under the bridge lock, callbacks run
//! outside of it so they may call back into the bridge.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{EngineStatus, StreamingEngine};
use crate::errors::PlaybackError;
use crate::events::EventBus;
use crate::model::MediaItem;

pub type EngineCallback = Box<dyn FnOnce(&dyn StreamingEngine) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineSessionState {
    Starting,
    Ready,
    Stopped,
}

/// One local engine playback instance bound to a media item.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSession {
    pub id: Uuid,
    pub media: MediaItem,
    pub state: EngineSessionState,
}

struct BridgeState {
    phase: ConnectionPhase,
    pending: VecDeque<EngineCallback>,
    session: Option<EngineSession>,
}

pub struct EngineSessionBridge {
    engine: Arc<dyn StreamingEngine>,
    capacity: usize,
    state: Arc<Mutex<BridgeState>>,
    status_bus: EventBus<EngineStatus>,
}

impl std::fmt::Debug for EngineSessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("EngineSessionBridge")
            .field("phase", &state.phase)
            .field("pending", &state.pending.len())
            .field("session", &state.session)
            .finish()
    }
}

fn lock(state: &Mutex<BridgeState>) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl EngineSessionBridge {
    pub fn new(engine: Arc<dyn StreamingEngine>, capacity: usize) -> Self {
        Self {
            engine,
            capacity: capacity.max(1),
            state: Arc::new(Mutex::new(BridgeState {
                phase: ConnectionPhase::Disconnected,
                pending: VecDeque::new(),
                session: None,
            })),
            status_bus: EventBus::new(),
        }
    }

    /// Lifecycle notifications, for user feedback.
    pub fn subscribe(&self) -> Receiver<EngineStatus> {
        self.status_bus.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).phase == ConnectionPhase::Connected
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Runs `callback` now if the engine is connected, otherwise once it is.
    ///
    /// The first deferred call starts a connection attempt. When that attempt
    /// fails on the spot the queue is discarded, as for a `Failed` status, and
    /// the error is returned so the caller can report it.
    pub fn with_engine<F>(&self, callback: F) -> Result<(), PlaybackError>
    where
        F: FnOnce(&dyn StreamingEngine) + Send + 'static,
    {
        let start_connect = {
            let mut state = lock(&self.state);
            if state.phase == ConnectionPhase::Connected {
                drop(state);
                callback(self.engine.as_ref());
                return Ok(());
            }

            if state.pending.len() >= self.capacity {
                warn!(
                    pending = state.pending.len(),
                    "Engine callback queue full; rejecting"
                );
                return Err(PlaybackError::EngineQueueFull(state.pending.len()));
            }

            state.pending.push_back(Box::new(callback));
            let start = state.phase == ConnectionPhase::Disconnected;
            if start {
                state.phase = ConnectionPhase::Connecting;
            }
            start
        };

        if start_connect {
            debug!("Starting engine connection");
            if let Err(err) = self.engine.connect() {
                warn!(error = %err, "Engine connection attempt failed");
                self.on_status(EngineStatus::Failed(err.to_string()));
                return Err(err);
            }
        }
        Ok(())
    }

    /// Applies an engine lifecycle notification and forwards it to subscribers.
    pub fn on_status(&self, status: EngineStatus) -> EngineStatus {
        match &status {
            EngineStatus::Connected => {
                let drained = {
                    let mut state = lock(&self.state);
                    state.phase = ConnectionPhase::Connected;
                    std::mem::take(&mut state.pending)
                };
                info!(flushed = drained.len(), "Engine connected");
                for callback in drained {
                    callback(self.engine.as_ref());
                }
            }
            EngineStatus::Failed(reason) => {
                let dropped = {
                    let mut state = lock(&self.state);
                    state.phase = ConnectionPhase::Disconnected;
                    Self::stop_current(&mut state);
                    std::mem::take(&mut state.pending)
                };
                warn!(
                    reason = reason.as_str(),
                    dropped = dropped.len(),
                    "Engine failed; pending callbacks discarded"
                );
            }
            EngineStatus::Stopped => {
                let mut state = lock(&self.state);
                state.phase = ConnectionPhase::Disconnected;
                Self::stop_current(&mut state);
                debug!("Engine stopped");
            }
            EngineStatus::Unpacking | EngineStatus::Starting => {
                let mut state = lock(&self.state);
                if state.phase == ConnectionPhase::Disconnected {
                    state.phase = ConnectionPhase::Connecting;
                }
            }
        }

        self.status_bus.broadcast(status.clone());
        status
    }

    fn stop_current(state: &mut BridgeState) {
        if let Some(mut session) = state.session.take() {
            session.state = EngineSessionState::Stopped;
            debug!(session = %session.id, "Engine session dropped");
        }
    }

    /// Starts an engine session for `media`, replacing the current one.
    pub fn start_session(&self, media: MediaItem) -> Result<Uuid, PlaybackError> {
        let id = Uuid::new_v4();
        {
            let mut state = lock(&self.state);
            state.session = Some(EngineSession {
                id,
                media: media.clone(),
                state: EngineSessionState::Starting,
            });
        }

        let shared = Arc::clone(&self.state);
        let queued = self.with_engine(move |engine| {
            let result = engine.start_session(&media);
            let mut state = lock(&shared);
            let Some(session) = state.session.as_mut().filter(|s| s.id == id) else {
                debug!(session = %id, "Engine session superseded before start");
                return;
            };
            match result {
                Ok(()) => session.state = EngineSessionState::Ready,
                Err(err) => {
                    warn!(session = %id, error = %err, "Engine session failed to start");
                    state.session = None;
                }
            }
        });

        if let Err(err) = queued {
            let mut state = lock(&self.state);
            if state.session.as_ref().is_some_and(|s| s.id == id) {
                state.session = None;
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Stops the current session, if any.
    pub fn stop_session(&self, force: bool) {
        let (session, connected) = {
            let mut state = lock(&self.state);
            (state.session.take(), state.phase == ConnectionPhase::Connected)
        };
        let Some(session) = session else {
            return;
        };
        if connected {
            if let Err(err) = self.engine.stop_session(force) {
                warn!(session = %session.id, error = %err, "Failed to stop engine session");
            }
        }
    }

    pub fn current_session(&self) -> Option<EngineSession> {
        lock(&self.state).session.clone()
    }
}
