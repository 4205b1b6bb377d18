use std::collections::BTreeMap;

use crate::model::RendererScope;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Start playback once loaded.
    pub start: bool,
    /// Do not filter the items against the selected renderer's media class.
    pub skip_sink_filter: bool,
    /// Keep the recovery bookkeeping of a lost device.
    pub skip_device_reset: bool,
    /// Opaque caller data, forwarded to observers with the load notice.
    pub extras: BTreeMap<String, String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            start: true,
            skip_sink_filter: false,
            skip_device_reset: false,
            extras: BTreeMap::new(),
        }
    }
}

impl LoadOptions {
    /// Options used to reload a recovered item: paused, unfiltered, and
    /// without touching device bookkeeping.
    pub fn restore() -> Self {
        Self {
            start: false,
            skip_sink_filter: true,
            skip_device_reset: true,
            extras: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        count: usize,
        position: usize,
        filtered_out: usize,
    },
    /// Nothing left to play once filtered; state is unchanged.
    Rejected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopOptions {
    pub clear_playlist: bool,
    /// Persist the current item with its resume position.
    pub save_metadata: bool,
    /// Keep the remote session and the renderer selection.
    pub keep_renderer: bool,
}

/// Who asks for a renderer change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// Renderer picker; `global` makes the choice the application default.
    Picker { global: bool },
    /// Explicit "switch renderer" action while a device is selected.
    SwitchRendererAction,
    /// Reselection of a device that came back after a loss.
    Restore(RendererScope),
}

impl SelectionOrigin {
    pub fn scope(&self) -> RendererScope {
        match self {
            SelectionOrigin::Picker { global } => RendererScope::from_global(*global),
            SelectionOrigin::SwitchRendererAction => RendererScope::Session,
            SelectionOrigin::Restore(scope) => *scope,
        }
    }
}
