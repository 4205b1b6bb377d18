//! Media catalog lookups consumed by the orchestrator and the resolver.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::PlaybackError;
use crate::model::MediaItem;

/// Where a catalog entry comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Scanned or added by the user.
    User,
    /// Synthesized locally (e.g. from a resolved transport descriptor).
    Internal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub item: MediaItem,
    pub origin: EntryOrigin,
    pub discovered_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn is_internal(&self) -> bool {
        self.origin == EntryOrigin::Internal
    }
}

pub trait Catalog: Send + Sync {
    fn find_by_locator(&self, locator: &str) -> Option<CatalogEntry>;

    /// Inserts the item, or updates the entry with the same locator.
    fn upsert(&self, item: &MediaItem, origin: EntryOrigin) -> Result<CatalogEntry, PlaybackError>;

    fn delete_by_id(&self, id: u64) -> Result<(), PlaybackError>;

    /// Overwrites the entry with the same id, as a whole.
    fn replace(&self, entry: &CatalogEntry) -> Result<(), PlaybackError>;

    /// Upserts every item or none of them.
    ///
    /// The default rolls back the writes already done when one fails;
    /// stores with real transactions should override it.
    fn upsert_all(
        &self,
        items: &[MediaItem],
        origin: EntryOrigin,
    ) -> Result<Vec<CatalogEntry>, PlaybackError> {
        let mut written: Vec<(CatalogEntry, Option<CatalogEntry>)> = Vec::with_capacity(items.len());
        for item in items {
            let previous = self.find_by_locator(&item.locator);
            match self.upsert(item, origin) {
                Ok(entry) => written.push((entry, previous)),
                Err(err) => {
                    for (entry, previous) in written.into_iter().rev() {
                        let undone = match previous {
                            Some(previous) => self.replace(&previous),
                            None => self.delete_by_id(entry.id),
                        };
                        if let Err(undo) = undone {
                            warn!(id = entry.id, error = %undo, "Failed to roll back catalog write");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(written.into_iter().map(|(entry, _)| entry).collect())
    }

    /// Fills the metadata `to` lacks from entry `from`.
    fn copy_metadata(&self, from: u64, to: u64) -> Result<(), PlaybackError>;

    /// Entries carrying a peer-to-peer descriptor.
    fn entries_with_descriptor(&self) -> Vec<CatalogEntry>;
}

#[derive(Debug, Default)]
struct CatalogState {
    entries: BTreeMap<u64, CatalogEntry>,
    next_id: u64,
    writes: usize,
}

impl CatalogState {
    fn insert(&mut self, item: &MediaItem, origin: EntryOrigin, discovered_at: DateTime<Utc>) -> CatalogEntry {
        self.next_id += 1;
        let id = self.next_id;
        let mut item = item.clone();
        item.catalog_id = Some(id);
        let entry = CatalogEntry {
            id,
            item,
            origin,
            discovered_at,
        };
        self.entries.insert(id, entry.clone());
        self.writes += 1;
        entry
    }

    fn upsert(&mut self, item: &MediaItem, origin: EntryOrigin) -> CatalogEntry {
        let existing = self
            .entries
            .values_mut()
            .find(|entry| entry.item.locator == item.locator);
        let Some(entry) = existing else {
            return self.insert(item, origin, Utc::now());
        };

        if item.title.is_some() {
            entry.item.title = item.title.clone();
        }
        if item.duration_ms.is_some() {
            entry.item.duration_ms = item.duration_ms;
        }
        if item.p2p.is_some() {
            entry.item.p2p = item.p2p.clone();
        }
        entry.item.resume_position_ms = item.resume_position_ms;
        entry.item.has_video |= item.has_video;
        let updated = entry.clone();
        self.writes += 1;
        updated
    }
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry unconditionally, with an explicit discovery date.
    pub fn insert(
        &self,
        item: &MediaItem,
        origin: EntryOrigin,
        discovered_at: DateTime<Utc>,
    ) -> CatalogEntry {
        self.lock().insert(item, origin, discovered_at)
    }

    pub fn get(&self, id: u64) -> Option<CatalogEntry> {
        self.lock().entries.get(&id).cloned()
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of insert/update operations performed so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Catalog for MemoryCatalog {
    fn find_by_locator(&self, locator: &str) -> Option<CatalogEntry> {
        self.lock()
            .entries
            .values()
            .find(|entry| entry.item.locator == locator)
            .cloned()
    }

    fn upsert(&self, item: &MediaItem, origin: EntryOrigin) -> Result<CatalogEntry, PlaybackError> {
        Ok(self.lock().upsert(item, origin))
    }

    fn upsert_all(
        &self,
        items: &[MediaItem],
        origin: EntryOrigin,
    ) -> Result<Vec<CatalogEntry>, PlaybackError> {
        let mut state = self.lock();
        Ok(items.iter().map(|item| state.upsert(item, origin)).collect())
    }

    fn replace(&self, entry: &CatalogEntry) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        let slot = state
            .entries
            .get_mut(&entry.id)
            .ok_or_else(|| PlaybackError::Catalog(format!("No entry with id {}", entry.id)))?;
        *slot = entry.clone();
        state.writes += 1;
        Ok(())
    }

    fn delete_by_id(&self, id: u64) -> Result<(), PlaybackError> {
        self.lock()
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PlaybackError::Catalog(format!("No entry with id {}", id)))
    }

    fn copy_metadata(&self, from: u64, to: u64) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        let source = state
            .entries
            .get(&from)
            .map(|entry| entry.item.clone())
            .ok_or_else(|| PlaybackError::Catalog(format!("No entry with id {}", from)))?;
        let target = state
            .entries
            .get_mut(&to)
            .ok_or_else(|| PlaybackError::Catalog(format!("No entry with id {}", to)))?;

        if target.item.title.is_none() {
            target.item.title = source.title;
        }
        if target.item.duration_ms.is_none() {
            target.item.duration_ms = source.duration_ms;
        }
        if target.item.resume_position_ms == 0 {
            target.item.resume_position_ms = source.resume_position_ms;
        }
        target.item.has_video |= source.has_video;
        state.writes += 1;
        Ok(())
    }

    fn entries_with_descriptor(&self) -> Vec<CatalogEntry> {
        self.lock()
            .entries
            .values()
            .filter(|entry| entry.item.p2p.is_some())
            .cloned()
            .collect()
    }
}
