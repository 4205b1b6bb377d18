//! Ordered playlist consumed by the orchestrator.
//!
//! The orchestrator only relies on [`PlaylistStore`]. [`MemoryPlaylist`] is a
//! plain in-memory implementation:
//!   - a `Vec<MediaItem>`,
//!   - an optional current index,
//!   - a repeat mode.
//!
//! It never starts playback; the orchestrator pushes the current item to the
//! active sink itself.

use rand::seq::SliceRandom;
use tracing::debug;

use crate::errors::PlaybackError;
use crate::model::MediaItem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatMode {
    #[default]
    None,
    /// `next` replays the current item.
    One,
    /// `next` and `previous` wrap around.
    All,
}

pub trait PlaylistStore: Send {
    fn items(&self) -> Vec<MediaItem>;
    fn current(&self) -> Option<MediaItem>;
    fn current_index(&self) -> Option<usize>;
    fn is_valid_index(&self, index: usize) -> bool;
    fn has_next(&self) -> bool;
    fn has_previous(&self) -> bool;

    /// Moves to the next item. Returns false when there is none.
    fn next(&mut self) -> bool;

    /// Moves to the previous item. Returns false when there is none.
    fn previous(&mut self) -> bool;

    /// Makes `index` current as a fresh load.
    fn load_at(&mut self, index: usize) -> Result<(), PlaybackError>;

    /// Moves the pointer only; the item is already playing somewhere.
    fn set_current_index(&mut self, index: usize) -> Result<(), PlaybackError>;

    /// Replaces the content and makes `position` current.
    fn load(&mut self, items: Vec<MediaItem>, position: usize) -> Result<(), PlaybackError>;

    fn append(&mut self, items: Vec<MediaItem>);
    fn insert_next(&mut self, items: Vec<MediaItem>);

    /// Writes back the current item (resume position, metadata).
    fn update_current(&mut self, item: MediaItem);

    fn clear(&mut self);

    fn len(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPlaylist {
    items: Vec<MediaItem>,
    current_index: Option<usize>,
    repeat: RepeatMode,
    load_count: usize,
}

impl MemoryPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<MediaItem>, current_index: Option<usize>) -> Self {
        let current_index = current_index.filter(|&i| i < items.len());
        Self {
            items,
            current_index,
            repeat: RepeatMode::None,
            load_count: 0,
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Number of `load`/`load_at` calls so far.
    pub fn load_count(&self) -> usize {
        self.load_count
    }

    /// Randomizes the order of the items; the current item moves to the front.
    pub fn shuffle(&mut self) {
        if self.items.len() < 2 {
            return;
        }
        let current = self.current_index.map(|i| self.items.remove(i));
        self.items.shuffle(&mut rand::rng());
        if let Some(item) = current {
            self.items.insert(0, item);
            self.current_index = Some(0);
        }
    }

    fn check_index(&self, index: usize) -> Result<(), PlaybackError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(PlaybackError::Playlist(format!(
                "Index out of bound {} >= {}",
                index,
                self.items.len()
            )))
        }
    }
}

impl PlaylistStore for MemoryPlaylist {
    fn items(&self) -> Vec<MediaItem> {
        self.items.clone()
    }

    fn current(&self) -> Option<MediaItem> {
        self.current_index.and_then(|i| self.items.get(i).cloned())
    }

    fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    fn is_valid_index(&self, index: usize) -> bool {
        index < self.items.len()
    }

    fn has_next(&self) -> bool {
        match self.current_index {
            None => false,
            Some(_) if self.repeat != RepeatMode::None => !self.items.is_empty(),
            Some(i) => i + 1 < self.items.len(),
        }
    }

    fn has_previous(&self) -> bool {
        match self.current_index {
            None => false,
            Some(_) if self.repeat == RepeatMode::All => !self.items.is_empty(),
            Some(i) => i > 0,
        }
    }

    fn next(&mut self) -> bool {
        let Some(current) = self.current_index else {
            return false;
        };
        let next = if self.repeat == RepeatMode::One {
            current
        } else if current + 1 < self.items.len() {
            current + 1
        } else if self.repeat == RepeatMode::All && !self.items.is_empty() {
            0
        } else {
            return false;
        };
        self.current_index = Some(next);
        true
    }

    fn previous(&mut self) -> bool {
        let Some(current) = self.current_index else {
            return false;
        };
        let previous = if current > 0 {
            current - 1
        } else if self.repeat == RepeatMode::All && !self.items.is_empty() {
            self.items.len() - 1
        } else {
            return false;
        };
        self.current_index = Some(previous);
        true
    }

    fn load_at(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.check_index(index)?;
        self.current_index = Some(index);
        self.load_count += 1;
        Ok(())
    }

    fn set_current_index(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.check_index(index)?;
        self.current_index = Some(index);
        Ok(())
    }

    fn load(&mut self, items: Vec<MediaItem>, position: usize) -> Result<(), PlaybackError> {
        if items.is_empty() {
            return Err(PlaybackError::Playlist("Cannot load an empty list".to_string()));
        }
        let position = position.min(items.len() - 1);
        debug!(count = items.len(), position, "Loading playlist");
        self.items = items;
        self.current_index = Some(position);
        self.load_count += 1;
        Ok(())
    }

    fn append(&mut self, items: Vec<MediaItem>) {
        self.items.extend(items);
    }

    fn insert_next(&mut self, items: Vec<MediaItem>) {
        let at = match self.current_index {
            Some(i) => i + 1,
            None => self.items.len(),
        };
        self.items.splice(at..at, items);
    }

    fn update_current(&mut self, item: MediaItem) {
        if let Some(i) = self.current_index {
            if let Some(slot) = self.items.get_mut(i) {
                *slot = item;
            }
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.current_index = None;
    }
}
