use std::collections::HashMap;
use std::sync::RwLock;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::events::EventBus;
use crate::model::{RendererId, RendererInfo, RendererScope};

/// Change notifications fired synchronously from the thread that mutated the
/// registry (usually the discovery thread).
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryEvent {
    Added(RendererInfo),
    Removed {
        renderer: RendererInfo,
        /// The removed device is the current selection; the orchestrator
        /// decides what that disconnect means.
        was_selected: bool,
    },
    SelectionChanged {
        renderer: Option<RendererInfo>,
        from_user: bool,
        scope: RendererScope,
    },
}

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<RendererId, RendererInfo>,
    selected: Option<RendererInfo>,
    scope: RendererScope,
    global_default: Option<RendererId>,
}

/// Currently discoverable renderers and the selected one.
#[derive(Default)]
pub struct RendererRegistry {
    state: RwLock<RegistryState>,
    bus: EventBus<RegistryEvent>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("state", &self.state)
            .field("listeners", &self.bus.subscriber_count())
            .finish()
    }
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the application-wide default renderer (e.g. from preferences).
    pub fn with_global_default(id: Option<RendererId>) -> Self {
        let registry = Self::default();
        registry.write().global_default = id;
        registry
    }

    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        self.bus.subscribe()
    }

    /// Records a discovered device. Returns false if it was already known.
    pub fn add_device(&self, renderer: RendererInfo) -> bool {
        let inserted = {
            let mut state = self.write();
            state
                .devices
                .insert(renderer.id.clone(), renderer.clone())
                .is_none()
        };

        if inserted {
            debug!(renderer = renderer.name.as_str(), id = %renderer.id, "Renderer added");
            self.bus.broadcast(RegistryEvent::Added(renderer));
        }
        inserted
    }

    /// Forgets a device. The selection is left untouched.
    pub fn remove_device(&self, id: &RendererId) -> Option<RegistryEvent> {
        let event = {
            let mut state = self.write();
            let renderer = state.devices.remove(id)?;
            let was_selected = state
                .selected
                .as_ref()
                .map(|selected| &selected.id == id)
                .unwrap_or(false);
            RegistryEvent::Removed {
                renderer,
                was_selected,
            }
        };

        debug!(id = %id, "Renderer removed");
        self.bus.broadcast(event.clone());
        Some(event)
    }

    /// Single writer for the selection; `global` makes the choice the
    /// application default, otherwise it only lasts for this activation.
    pub fn select_renderer(
        &self,
        from_user: bool,
        renderer: Option<RendererInfo>,
        global: bool,
    ) -> Option<RendererInfo> {
        let scope = RendererScope::from_global(global);
        let previous = {
            let mut state = self.write();
            let previous = state.selected.take();
            state.selected = renderer.clone();
            state.scope = scope;
            if global {
                state.global_default = renderer.as_ref().map(|r| r.id.clone());
            }
            previous
        };

        info!(
            renderer = renderer.as_ref().map(|r| r.name.as_str()).unwrap_or("local"),
            from_user,
            global,
            "Renderer selected"
        );
        self.bus.broadcast(RegistryEvent::SelectionChanged {
            renderer,
            from_user,
            scope,
        });
        previous
    }

    pub fn selected_renderer(&self) -> Option<RendererInfo> {
        self.read().selected.clone()
    }

    pub fn is_global(&self) -> bool {
        self.read().scope.is_global()
    }

    pub fn scope(&self) -> RendererScope {
        self.read().scope
    }

    pub fn global_default(&self) -> Option<RendererId> {
        self.read().global_default.clone()
    }

    pub fn get(&self, id: &RendererId) -> Option<RendererInfo> {
        self.read().devices.get(id).cloned()
    }

    pub fn devices(&self) -> Vec<RendererInfo> {
        let mut devices: Vec<_> = self.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;

    fn cast(id: &str) -> RendererInfo {
        RendererInfo::new(id, &format!("Cast {}", id), DeviceKind::Chromecast)
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = RendererRegistry::new();
        let events = registry.subscribe();

        assert!(registry.add_device(cast("a")));
        assert!(!registry.add_device(cast("a")));

        assert_eq!(registry.devices().len(), 1);
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Added(cast("a")));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_removing_selected_keeps_selection() {
        let registry = RendererRegistry::new();
        registry.add_device(cast("a"));
        registry.select_renderer(true, Some(cast("a")), false);

        let event = registry.remove_device(&RendererId("a".to_string())).unwrap();

        assert_eq!(
            event,
            RegistryEvent::Removed {
                renderer: cast("a"),
                was_selected: true
            }
        );
        assert_eq!(registry.selected_renderer(), Some(cast("a")));
        assert!(registry.remove_device(&RendererId("a".to_string())).is_none());
    }

    #[test]
    fn test_scope_and_global_default() {
        let registry = RendererRegistry::new();
        registry.select_renderer(true, Some(cast("a")), false);
        assert!(!registry.is_global());
        assert_eq!(registry.global_default(), None);

        let previous = registry.select_renderer(true, Some(cast("b")), true);
        assert_eq!(previous, Some(cast("a")));
        assert!(registry.is_global());
        assert_eq!(registry.global_default(), Some(RendererId("b".to_string())));

        registry.select_renderer(false, None, false);
        assert_eq!(registry.selected_renderer(), None);
        assert_eq!(registry.global_default(), Some(RendererId("b".to_string())));
    }
}
