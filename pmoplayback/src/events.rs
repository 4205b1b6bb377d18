use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::engine::EngineStatus;
use crate::media_session::PlaybackSnapshot;
use crate::model::{PlaybackEvent, RendererInfo};

/// Everything the orchestrator tells its observers.
#[derive(Clone, Debug, PartialEq)]
pub enum OrchestratorEvent {
    /// A normalized event coming from the active sink.
    Playback(PlaybackEvent),
    /// Playback state after applying a change.
    Snapshot(PlaybackSnapshot),
    /// Coarse local engine status, for user feedback.
    Engine(EngineStatus),
    /// Short user-visible notice.
    Advisory(String),
    /// A list was handed to the playlist.
    Loaded {
        count: usize,
        position: usize,
        extras: BTreeMap<String, String>,
    },
    /// The routed renderer changed (`None` = local playback).
    RendererChanged(Option<RendererInfo>),
    /// Playback was stopped because the remote device went away.
    StoppedAfterDeviceLoss,
}

/// Fan-out of events to any number of subscribers.
///
/// Disconnected subscribers are pruned on the next broadcast.
pub struct EventBus<E: Clone> {
    subscribers: Arc<Mutex<Vec<Sender<E>>>>,
}

impl<E: Clone> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

pub type OrchestratorEventBus = EventBus<OrchestratorEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let bus: EventBus<u32> = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.broadcast(7);

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus: EventBus<u32> = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.broadcast(1);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 1);
    }
}
