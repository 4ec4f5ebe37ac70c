//! File buffer cache - remembers what each file looked like on disk
//!
//! The editor asks "is this buffer still what's saved?" far more often than
//! files actually change. Each tracked path keeps the bytes last read from or
//! written to disk, so those questions are answered from memory. Snapshots are
//! refreshed on every successful write and dropped once they have not been
//! touched for the TTL.

pub mod store;

pub use store::{DiskStore, FileStore};

use crate::error::{Result, ShellError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Entries untouched for longer than this are eligible for eviction.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Snapshot of a file's bytes at a point in time.
pub type Snapshot = Arc<[u8]>;

#[derive(Debug, Clone)]
struct CacheEntry {
    content: Snapshot,
    last_access: Instant,
}

impl CacheEntry {
    fn new(content: Snapshot, now: Instant) -> Self {
        Self {
            content,
            last_access: now,
        }
    }

    // last_access never moves backwards
    fn touch(&mut self, now: Instant) {
        if now > self.last_access {
            self.last_access = now;
        }
    }
}

type EntryMap = HashMap<PathBuf, CacheEntry>;

/// Per-path cache of on-disk file contents.
///
/// One instance is created at startup and shared by handle. Every operation
/// holds the entry lock for its whole lookup/IO/update sequence, so a path
/// never has two snapshots in flight.
pub struct FileBufferCache<S = DiskStore> {
    entries: Mutex<EntryMap>,
    store: S,
    ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub oldest_age: Option<Duration>,
}

impl FileBufferCache<DiskStore> {
    /// Create a disk-backed cache with the default one hour TTL
    pub fn new() -> Self {
        Self::with_store(DiskStore, DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_store(DiskStore, ttl)
    }
}

impl Default for FileBufferCache<DiskStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: FileStore> FileBufferCache<S> {
    pub fn with_store(store: S, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read a file from disk and remember its contents.
    ///
    /// Later comparisons against this path are served from the snapshot.
    pub fn read(&self, path: &Path) -> Result<Snapshot> {
        self.read_at(path, Instant::now())
    }

    pub fn read_at(&self, path: &Path, now: Instant) -> Result<Snapshot> {
        let mut entries = self.lock()?;
        let snapshot = self.load(&mut entries, path, now)?;
        evict_expired(&mut entries, now, self.ttl);
        Ok(snapshot)
    }

    /// Persist `content` to `path` and refresh the snapshot.
    ///
    /// # Errors
    /// Returns `ShellError::Io` if the write fails. The cache is left
    /// exactly as it was in that case.
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.write_at(path, content, Instant::now())
    }

    pub fn write_at(&self, path: &Path, content: &[u8], now: Instant) -> Result<()> {
        let mut entries = self.lock()?;

        self.store
            .write(path, content)
            .map_err(|err| ShellError::io(path, err))?;

        match entries.get_mut(path) {
            Some(entry) => {
                entry.content = Arc::from(content);
                entry.touch(now);
            }
            None => {
                entries.insert(path.to_path_buf(), CacheEntry::new(Arc::from(content), now));
            }
        }
        debug!(path = %path.display(), bytes = content.len(), "Buffer snapshot refreshed on write");

        evict_expired(&mut entries, now, self.ttl);
        Ok(())
    }

    /// Check whether `content` is byte-for-byte what is saved at `path`.
    ///
    /// Uses the cached snapshot when there is one, otherwise (or when
    /// `force_refresh` is set) reads the file and caches it first. A hit
    /// counts as an access and restarts the entry's TTL window.
    pub fn compare(&self, path: &Path, content: &[u8], force_refresh: bool) -> Result<bool> {
        self.compare_at(path, content, force_refresh, Instant::now())
    }

    pub fn compare_at(
        &self,
        path: &Path,
        content: &[u8],
        force_refresh: bool,
        now: Instant,
    ) -> Result<bool> {
        let mut entries = self.lock()?;

        let cached = if force_refresh {
            None
        } else {
            entries.get_mut(path).map(|entry| {
                entry.touch(now);
                Arc::clone(&entry.content)
            })
        };

        let snapshot = match cached {
            Some(snapshot) => snapshot,
            None => self.load(&mut entries, path, now)?,
        };

        evict_expired(&mut entries, now, self.ttl);
        Ok(*snapshot == *content)
    }

    /// Remove entries idle for longer than `ttl`. Returns how many were removed.
    ///
    /// The pass is skipped while at most one entry is tracked, so a lone
    /// entry never expires.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> Result<usize> {
        let mut entries = self.lock()?;
        Ok(evict_expired(&mut entries, now, ttl))
    }

    /// Forget the snapshot for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: &Path) -> Result<bool> {
        self.invalidate_at(path, Instant::now())
    }

    pub fn invalidate_at(&self, path: &Path, now: Instant) -> Result<bool> {
        let mut entries = self.lock()?;
        let removed = entries.remove(path).is_some();
        if removed {
            debug!(path = %path.display(), "Buffer snapshot invalidated");
        }
        evict_expired(&mut entries, now, self.ttl);
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    #[cfg(test)]
    pub fn contains(&self, path: &Path) -> Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }

    #[cfg(test)]
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> Result<CacheStats> {
        let entries = self.lock()?;
        Ok(CacheStats {
            entries: entries.len(),
            bytes: entries.values().map(|entry| entry.content.len()).sum(),
            oldest_age: entries
                .values()
                .map(|entry| now.saturating_duration_since(entry.last_access))
                .max(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, EntryMap>> {
        self.entries
            .lock()
            .map_err(|_| ShellError::CacheLock("buffer cache"))
    }

    // Read from the store and replace the entry. On failure any existing
    // entry is left alone and no new one is created.
    fn load(&self, entries: &mut EntryMap, path: &Path, now: Instant) -> Result<Snapshot> {
        let tracked = entries.contains_key(path);
        let bytes = self.store.read(path).map_err(|err| {
            if !tracked && err.kind() == std::io::ErrorKind::NotFound {
                ShellError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ShellError::io(path, err)
            }
        })?;

        let snapshot: Snapshot = Arc::from(bytes);
        match entries.get_mut(path) {
            Some(entry) => {
                entry.content = Arc::clone(&snapshot);
                entry.touch(now);
            }
            None => {
                entries.insert(path.to_path_buf(), CacheEntry::new(Arc::clone(&snapshot), now));
            }
        }
        debug!(path = %path.display(), bytes = snapshot.len(), "Buffer snapshot loaded from disk");
        Ok(snapshot)
    }
}

fn evict_expired(entries: &mut EntryMap, now: Instant, ttl: Duration) -> usize {
    if entries.len() <= 1 {
        return 0;
    }

    let before = entries.len();
    entries.retain(|_, entry| now.saturating_duration_since(entry.last_access) <= ttl);
    let removed = before - entries.len();

    if removed > 0 {
        debug!(removed, remaining = entries.len(), "Evicted stale buffer snapshots");
    }
    removed
}
