//! Background resolution of transport descriptors.
//!
//! A single worker walks the pending descriptors of a [`DescriptorStore`] and
//! asks the streaming engine for the files each one contains. The engine
//! answers through a callback; the worker waits for it on a one-shot
//! channel, polling at `poll_interval` for at most `item_timeout`. A timeout
//! does not cancel the request: a late answer is still written, once.
//!
//! After the pass, catalog entries addressing the same `(info_hash,
//! file_index)` are collapsed onto the most authoritative one, and cached
//! descriptor files nobody references any more are removed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry, EntryOrigin};
use crate::config::PlaybackConfig;
use crate::engine::{ContainedFile, StreamingEngine, TransportDescriptor};
use crate::errors::PlaybackError;

/// Persistent list of known transport descriptors.
pub trait DescriptorStore: Send + Sync {
    /// Descriptors not parsed yet.
    fn pending(&self) -> Vec<TransportDescriptor>;
    fn is_parsed(&self, id: &str) -> bool;
    fn mark_parsed(&self, id: &str) -> Result<(), PlaybackError>;
    /// Cached descriptor files still in use.
    fn referenced_files(&self) -> Vec<PathBuf>;
}

#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
    descriptors: Mutex<BTreeMap<String, TransportDescriptor>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, descriptor: TransportDescriptor) {
        self.lock().insert(descriptor.id.clone(), descriptor);
    }

    pub fn get(&self, id: &str) -> Option<TransportDescriptor> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TransportDescriptor>> {
        self.descriptors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DescriptorStore for MemoryDescriptorStore {
    fn pending(&self) -> Vec<TransportDescriptor> {
        self.lock().values().filter(|d| !d.parsed).cloned().collect()
    }

    fn is_parsed(&self, id: &str) -> bool {
        self.lock().get(id).is_some_and(|d| d.parsed)
    }

    fn mark_parsed(&self, id: &str) -> Result<(), PlaybackError> {
        let mut descriptors = self.lock();
        let descriptor = descriptors
            .get_mut(id)
            .ok_or_else(|| PlaybackError::Catalog(format!("Unknown descriptor {}", id)))?;
        descriptor.parsed = true;
        Ok(())
    }

    fn referenced_files(&self) -> Vec<PathBuf> {
        self.lock()
            .values()
            .filter_map(|d| d.cached_file.clone())
            .collect()
    }
}

/// Decides which of two duplicate entries is kept.
pub trait AuthorityPolicy: Send + Sync {
    /// `Less` when `a` is more authoritative than `b`.
    fn compare(&self, a: &CatalogEntry, b: &CatalogEntry) -> Ordering;
}

/// User entries beat internal ones; then the earliest discovered wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferUserEntries;

impl AuthorityPolicy for PreferUserEntries {
    fn compare(&self, a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
        a.is_internal()
            .cmp(&b.is_internal())
            .then(a.discovered_at.cmp(&b.discovered_at))
            .then(a.id.cmp(&b.id))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolverOptions {
    pub poll_interval: Duration,
    pub item_timeout: Duration,
    pub orphan_max_age: Duration,
    pub cache_dir: PathBuf,
}

impl ResolverOptions {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            poll_interval: config.resolver.poll_interval(),
            item_timeout: config.resolver.item_timeout(),
            orphan_max_age: config.resolver.orphan_max_age(),
            cache_dir: config.resolver_cache_dir(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolverReport {
    pub processed: usize,
    pub resolved: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub duplicates_removed: usize,
    pub orphans_removed: usize,
    /// The pass stopped early on shutdown.
    pub interrupted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverProgress {
    ItemProcessed {
        index: usize,
        total: usize,
        resolved: bool,
    },
    Finished(ResolverReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Resolved,
    Failed,
}

/// One-shot answer slot between the worker and the engine callback.
struct Completion {
    tx: Sender<ItemOutcome>,
    rx: Receiver<ItemOutcome>,
}

impl Completion {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    fn signal(&self) -> Sender<ItemOutcome> {
        self.tx.clone()
    }

    /// Waits in `poll` steps until the outcome is known or `timeout` elapsed.
    fn wait(&self, poll: Duration, timeout: Duration) -> Option<ItemOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return self.rx.try_recv().ok();
            }
            match self.rx.recv_timeout(poll.min(left)) {
                Ok(outcome) => return Some(outcome),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Writes the files of one descriptor. Shared by the worker and any late
/// engine callback.
#[derive(Clone)]
struct EntryWriter {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn DescriptorStore>,
    write_lock: Arc<Mutex<()>>,
}

impl EntryWriter {
    fn write(
        &self,
        descriptor: &TransportDescriptor,
        result: Result<Vec<ContainedFile>, PlaybackError>,
    ) -> ItemOutcome {
        let files = match result {
            Ok(files) => files,
            Err(err) => {
                warn!(descriptor = descriptor.id.as_str(), error = %err, "Failed to list descriptor files");
                return ItemOutcome::Failed;
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.store.is_parsed(&descriptor.id) {
            debug!(descriptor = descriptor.id.as_str(), "Descriptor already parsed; skipping");
            return ItemOutcome::Resolved;
        }

        let items: Vec<_> = files.iter().map(|f| f.to_media_item(descriptor)).collect();
        if let Err(err) = self.catalog.upsert_all(&items, EntryOrigin::Internal) {
            warn!(
                descriptor = descriptor.id.as_str(),
                error = %err,
                "Failed to write catalog entries"
            );
            return ItemOutcome::Failed;
        }

        if let Err(err) = self.store.mark_parsed(&descriptor.id) {
            warn!(descriptor = descriptor.id.as_str(), error = %err, "Failed to mark descriptor parsed");
            return ItemOutcome::Failed;
        }
        info!(
            descriptor = descriptor.id.as_str(),
            files = items.len(),
            "Descriptor resolved"
        );
        ItemOutcome::Resolved
    }
}

pub struct TransportDescriptorResolver {
    engine: Arc<dyn StreamingEngine>,
    writer: EntryWriter,
    policy: Arc<dyn AuthorityPolicy>,
    options: ResolverOptions,
}

impl TransportDescriptorResolver {
    pub fn new(
        engine: Arc<dyn StreamingEngine>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn DescriptorStore>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            engine,
            writer: EntryWriter {
                catalog,
                store,
                write_lock: Arc::new(Mutex::new(())),
            },
            policy: Arc::new(PreferUserEntries),
            options,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Runs one pass on a dedicated thread.
    pub fn spawn(self) -> Result<ResolverHandle, PlaybackError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let flag = Arc::clone(&shutdown);

        let thread = thread::Builder::new()
            .name("descriptor-resolver".to_string())
            .spawn(move || self.run_pass(&flag, &tx))?;

        Ok(ResolverHandle {
            shutdown,
            thread: Some(thread),
            progress: rx,
        })
    }

    /// One full pass: resolve pending descriptors, dedup, clean orphans.
    pub fn run_pass(
        &self,
        shutdown: &AtomicBool,
        progress: &Sender<ResolverProgress>,
    ) -> ResolverReport {
        let pending = self.writer.store.pending();
        let total = pending.len();
        let mut report = ResolverReport::default();
        info!(total, "Resolving transport descriptors");

        for (index, descriptor) in pending.into_iter().enumerate() {
            if shutdown.load(AtomicOrdering::SeqCst) {
                info!(index, total, "Resolver interrupted");
                report.interrupted = true;
                break;
            }

            let outcome = self.resolve_one(descriptor);
            report.processed += 1;
            match outcome {
                Some(ItemOutcome::Resolved) => report.resolved += 1,
                Some(ItemOutcome::Failed) => report.failed += 1,
                None => report.timed_out += 1,
            }
            let _ = progress.send(ResolverProgress::ItemProcessed {
                index,
                total,
                resolved: outcome == Some(ItemOutcome::Resolved),
            });
        }

        report.duplicates_removed = self.dedup();
        report.orphans_removed = match self.cleanup_orphans() {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, "Orphan cleanup failed");
                0
            }
        };

        info!(
            processed = report.processed,
            resolved = report.resolved,
            timed_out = report.timed_out,
            duplicates = report.duplicates_removed,
            orphans = report.orphans_removed,
            "Resolver pass finished"
        );
        let _ = progress.send(ResolverProgress::Finished(report.clone()));
        report
    }

    fn resolve_one(&self, descriptor: TransportDescriptor) -> Option<ItemOutcome> {
        let completion = Completion::new();
        let writer = self.writer.clone();
        let signal = completion.signal();
        let target = descriptor.clone();

        debug!(descriptor = descriptor.id.as_str(), "Requesting descriptor files");
        self.engine.get_files(
            &descriptor,
            Box::new(move |result| {
                let outcome = writer.write(&target, result);
                // Nobody listens any more once the worker timed out
                let _ = signal.send(outcome);
            }),
        );

        let outcome = completion.wait(self.options.poll_interval, self.options.item_timeout);
        if outcome.is_none() {
            warn!(
                descriptor = descriptor.id.as_str(),
                timeout_ms = self.options.item_timeout.as_millis() as u64,
                "No answer from the engine; moving on"
            );
        }
        outcome
    }

    /// Collapses entries sharing `(info_hash, file_index)`. Returns the
    /// number of entries deleted.
    pub fn dedup(&self) -> usize {
        let catalog = &self.writer.catalog;
        let mut groups: HashMap<(String, u32), Vec<CatalogEntry>> = HashMap::new();
        for entry in catalog.entries_with_descriptor() {
            if let Some(p2p) = &entry.item.p2p {
                let key = (p2p.info_hash.to_ascii_lowercase(), p2p.file_index);
                groups.entry(key).or_default().push(entry);
            }
        }

        let mut removed = 0;
        for ((hash, index), mut entries) in groups {
            if entries.len() < 2 {
                continue;
            }
            entries.sort_by(|a, b| self.policy.compare(a, b));
            let keeper = entries.remove(0);

            for duplicate in entries {
                if let Err(err) = catalog.copy_metadata(duplicate.id, keeper.id) {
                    warn!(entry = duplicate.id, error = %err, "Failed to copy metadata; keeping duplicate");
                    continue;
                }
                match catalog.delete_by_id(duplicate.id) {
                    Ok(()) => {
                        debug!(
                            hash = hash.as_str(),
                            index,
                            kept = keeper.id,
                            deleted = duplicate.id,
                            "Duplicate entry removed"
                        );
                        removed += 1;
                    }
                    Err(err) => warn!(entry = duplicate.id, error = %err, "Failed to delete duplicate"),
                }
            }
        }
        removed
    }

    /// Deletes unreferenced cached descriptor files older than the
    /// configured age.
    pub fn cleanup_orphans(&self) -> Result<usize, PlaybackError> {
        let dir = &self.options.cache_dir;
        if !dir.is_dir() {
            return Ok(0);
        }

        let referenced: HashSet<PathBuf> = self.writer.store.referenced_files().into_iter().collect();
        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || referenced.contains(&path) {
                continue;
            }
            let age = fs::metadata(&path)?
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            match age {
                Some(age) if age >= self.options.orphan_max_age => {
                    fs::remove_file(&path)?;
                    debug!(path = %path.display(), "Orphan descriptor file removed");
                    removed += 1;
                }
                _ => {}
            }
        }
        Ok(removed)
    }
}

/// Running resolver pass.
pub struct ResolverHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<ResolverReport>>,
    progress: Receiver<ResolverProgress>,
}

impl ResolverHandle {
    pub fn progress(&self) -> &Receiver<ResolverProgress> {
        &self.progress
    }

    /// Asks the worker to stop before its next item.
    pub fn shutdown(&self) {
        self.shutdown.store(true, AtomicOrdering::SeqCst);
    }

    /// Waits for the pass to end. `None` if the worker panicked.
    pub fn join(mut self) -> Option<ResolverReport> {
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(report) => Some(report),
            Err(_) => {
                warn!("Resolver thread panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::model::{MediaItem, P2pDescriptor};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn entry(id: u64, internal: bool, age_secs: i64) -> CatalogEntry {
        CatalogEntry {
            id,
            item: MediaItem::new("magnet:?xt=h#index=0"),
            origin: if internal {
                EntryOrigin::Internal
            } else {
                EntryOrigin::User
            },
            discovered_at: Utc::now() - ChronoDuration::seconds(age_secs),
        }
    }

    #[test]
    fn test_user_entries_are_authoritative() {
        let policy = PreferUserEntries;
        let internal_old = entry(1, true, 100);
        let user_new = entry(2, false, 1);
        assert_eq!(policy.compare(&user_new, &internal_old), Ordering::Less);

        let user_old = entry(3, false, 50);
        assert_eq!(policy.compare(&user_old, &user_new), Ordering::Less);
    }

    #[test]
    fn test_completion_times_out_without_answer() {
        let completion = Completion::new();
        let started = Instant::now();
        let outcome = completion.wait(Duration::from_millis(5), Duration::from_millis(30));
        assert_eq!(outcome, None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_completion_wakes_on_signal() {
        let completion = Completion::new();
        let signal = completion.signal();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signal.send(ItemOutcome::Resolved).unwrap();
        });

        let outcome = completion.wait(Duration::from_millis(5), Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(outcome, Some(ItemOutcome::Resolved));
    }

    #[test]
    fn test_writer_skips_parsed_descriptor() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryDescriptorStore::new());
        let descriptor = TransportDescriptor::new("d1", "HASH", "magnet:?xt=hash");
        store.add(descriptor.clone());
        let writer = EntryWriter {
            catalog: catalog.clone(),
            store: store.clone(),
            write_lock: Arc::new(Mutex::new(())),
        };
        let files = vec![ContainedFile {
            index: 0,
            name: "movie.mkv".to_string(),
            length: 10,
            has_video: true,
        }];

        assert_eq!(writer.write(&descriptor, Ok(files.clone())), ItemOutcome::Resolved);
        assert_eq!(catalog.write_count(), 1);
        assert!(store.is_parsed("d1"));

        assert_eq!(writer.write(&descriptor, Ok(files)), ItemOutcome::Resolved);
        assert_eq!(catalog.write_count(), 1);

        let item = &catalog.entries()[0].item;
        assert_eq!(item.p2p, Some(P2pDescriptor::new("hash", 0, "magnet:?xt=hash")));
        assert!(catalog.entries()[0].is_internal());
    }

    #[test]
    fn test_writer_failure_leaves_descriptor_pending() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryDescriptorStore::new());
        let descriptor = TransportDescriptor::new("d1", "hash", "magnet:?xt=hash");
        store.add(descriptor.clone());
        let writer = EntryWriter {
            catalog,
            store: store.clone(),
            write_lock: Arc::new(Mutex::new(())),
        };

        let outcome = writer.write(&descriptor, Err(PlaybackError::engine("busy")));
        assert_eq!(outcome, ItemOutcome::Failed);
        assert_eq!(store.pending().len(), 1);
    }

    /// Delegates to a memory catalog but refuses its n-th upsert.
    struct FlakyCatalog {
        inner: MemoryCatalog,
        upserts: AtomicUsize,
        fail_on: usize,
    }

    impl Catalog for FlakyCatalog {
        fn find_by_locator(&self, locator: &str) -> Option<CatalogEntry> {
            self.inner.find_by_locator(locator)
        }

        fn upsert(&self, item: &MediaItem, origin: EntryOrigin) -> Result<CatalogEntry, PlaybackError> {
            if self.upserts.fetch_add(1, AtomicOrdering::SeqCst) + 1 == self.fail_on {
                return Err(PlaybackError::Catalog("disk full".to_string()));
            }
            self.inner.upsert(item, origin)
        }

        fn delete_by_id(&self, id: u64) -> Result<(), PlaybackError> {
            self.inner.delete_by_id(id)
        }

        fn replace(&self, entry: &CatalogEntry) -> Result<(), PlaybackError> {
            self.inner.replace(entry)
        }

        fn copy_metadata(&self, from: u64, to: u64) -> Result<(), PlaybackError> {
            self.inner.copy_metadata(from, to)
        }

        fn entries_with_descriptor(&self) -> Vec<CatalogEntry> {
            self.inner.entries_with_descriptor()
        }
    }

    fn file(index: u32) -> ContainedFile {
        ContainedFile {
            index,
            name: format!("part{}.mkv", index),
            length: 10,
            has_video: true,
        }
    }

    #[test]
    fn test_writer_leaves_no_partial_entries() {
        let catalog = Arc::new(FlakyCatalog {
            inner: MemoryCatalog::new(),
            upserts: AtomicUsize::new(0),
            fail_on: 2,
        });
        let store = Arc::new(MemoryDescriptorStore::new());
        let descriptor = TransportDescriptor::new("d1", "hash", "magnet:?xt=hash");
        store.add(descriptor.clone());
        let writer = EntryWriter {
            catalog: catalog.clone(),
            store: store.clone(),
            write_lock: Arc::new(Mutex::new(())),
        };

        let outcome = writer.write(&descriptor, Ok(vec![file(0), file(1), file(2)]));

        assert_eq!(outcome, ItemOutcome::Failed);
        assert!(catalog.inner.is_empty());
        assert!(!store.is_parsed("d1"));
    }

    #[test]
    fn test_writer_rollback_restores_updated_entry() {
        let catalog = Arc::new(FlakyCatalog {
            inner: MemoryCatalog::new(),
            upserts: AtomicUsize::new(0),
            fail_on: 3,
        });
        let descriptor = TransportDescriptor::new("d1", "hash", "magnet:?xt=hash");
        let mut known = file(0).to_media_item(&descriptor);
        known.title = None;
        known.resume_position_ms = 4000;
        let before = catalog.inner.insert(&known, EntryOrigin::User, Utc::now());
        let store = Arc::new(MemoryDescriptorStore::new());
        store.add(descriptor.clone());
        let writer = EntryWriter {
            catalog: catalog.clone(),
            store: store.clone(),
            write_lock: Arc::new(Mutex::new(())),
        };

        let outcome = writer.write(&descriptor, Ok(vec![file(0), file(1), file(2)]));

        assert_eq!(outcome, ItemOutcome::Failed);
        assert_eq!(catalog.inner.entries(), vec![before]);
        assert_eq!(store.pending().len(), 1);
    }
}
