//! On-disk cache of synthesized audio.
//!
//! Each cached notification fragment is a single `<key>.mp3` file named by
//! its [`ContentKey`]. A sidecar `CacheIndex.json` in the same directory
//! records when each entry was created and how often it has been played;
//! those two numbers drive eviction once the directory grows past its
//! byte budget.
//!
//! ## Index Recovery
//!
//! The index is advisory. On startup a missing or corrupt index is replaced
//! by an empty one (logged, never fatal), and every audio file that the
//! index does not know about is re-indexed with a hit count of zero and the
//! file's own creation time. Entries whose file has disappeared are dropped.
//!
//! ## Eviction
//!
//! After each recorded access the indexed files are summed, and while the
//! total exceeds the budget the entry with the fewest hits (oldest first on
//! ties) is removed from the index and its file deleted. The entry that was
//! just recorded is never a candidate, and neither is any entry pinned with
//! [`AudioCache::pin`]. The queue pins every fragment of a notification
//! until that fragment has played, so sibling fetches cannot delete audio
//! that is still waiting for the speakers.
//!
//! ## Atomicity
//!
//! Audio files and the index are both written to a temp file in the cache
//! directory and then renamed into place, so readers never observe a
//! partially written file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::content_key::ContentKey;
use crate::errors::CacheError;

/// Name of the sidecar index file.
pub const INDEX_FILE_NAME: &str = "CacheIndex.json";

/// Extension of audio files written by older releases; purged on commit.
const LEGACY_EXTENSION: &str = "wav";

/// How long a commit waits for the index file to become writable.
const COMMIT_WAIT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for the index file.
const COMMIT_POLL: Duration = Duration::from_millis(100);

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Index metadata for one cached audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the entry was first fetched (or discovered on disk).
    pub created: DateTime<Utc>,
    /// How many times the audio has been requested.
    pub hit_count: u64,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of indexed entries.
    pub entries: usize,
    /// Bytes on disk belonging to indexed entries.
    pub indexed_bytes: u64,
    /// The byte budget.
    pub max_bytes: u64,
    /// Lookups answered from disk since the cache was opened.
    pub hits: u64,
    /// Lookups that required a fetch since the cache was opened.
    pub misses: u64,
}

/// Size-bounded audio cache with a persisted hit-count index.
///
/// All methods take `&self`; the index sits behind a mutex that is never
/// held across disk I/O or an `.await`.
#[derive(Debug)]
pub struct AudioCache {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<HashMap<ContentKey, CacheEntry>>,
    key_locks: Mutex<HashMap<ContentKey, Arc<AsyncMutex<()>>>>,
    pins: Mutex<HashMap<ContentKey, usize>>,
    commit_lock: AsyncMutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AudioCache {
    /// Open (or create) a cache directory with a budget in megabytes.
    ///
    /// The budget is clamped to at least 1 MB.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Io` if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>, max_mb: u64) -> Result<Self, CacheError> {
        Self::open_with_max_bytes(dir, max_mb.max(1) * BYTES_PER_MB)
    }

    /// Open (or create) a cache directory with an exact byte budget.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Io` if the directory cannot be created or listed.
    pub fn open_with_max_bytes(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let cache = Self {
            dir,
            max_bytes,
            index: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            pins: Mutex::new(HashMap::new()),
            commit_lock: AsyncMutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        cache.load_or_rebuild_index()?;
        Ok(cache)
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The byte budget.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Path of the sidecar index.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    /// Where the audio for `key` lives (whether or not it exists yet).
    pub fn audio_path(&self, key: &ContentKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// The index entry for `key`, if any.
    pub fn entry(&self, key: &ContentKey) -> Option<CacheEntry> {
        self.lock_index().get(key).copied()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.lock_index().is_empty()
    }

    /// Replace the in-memory index with the persisted one, reconciled
    /// against the files actually present.
    ///
    /// Returns the number of orphaned files that were re-indexed.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Io` only if the cache directory cannot be listed.
    /// A missing or unreadable index is not an error.
    pub fn load_or_rebuild_index(&self) -> Result<usize, CacheError> {
        let mut index = read_index_file(&self.index_path());
        let on_disk = self.scan_audio_files()?;

        let before = index.len();
        index.retain(|key, _| on_disk.contains_key(key));
        if index.len() < before {
            tracing::info!(
                dropped = before - index.len(),
                "Dropped index entries whose audio file is gone"
            );
        }

        let mut orphans = 0;
        for (key, file) in on_disk {
            index.entry(key).or_insert_with(|| {
                orphans += 1;
                CacheEntry {
                    created: file.created,
                    hit_count: 0,
                }
            });
        }
        if orphans > 0 {
            tracing::info!(orphans, dir = %self.dir.display(), "Re-indexed orphaned audio files");
        }

        *self.lock_index() = index;
        Ok(orphans)
    }

    /// Look for usable audio for `key`.
    ///
    /// A zero-length file is the remains of an interrupted write: it is
    /// deleted, dropped from the index and reported as a miss.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Io` if the file exists but cannot be inspected
    /// or the corrupt file cannot be removed.
    pub fn lookup(&self, key: &ContentKey) -> Result<Option<PathBuf>, CacheError> {
        let path = self.audio_path(key);
        let found = match fs::metadata(&path) {
            Ok(metadata) if metadata.len() > 0 => Some(path),
            Ok(_) => {
                tracing::warn!(key = %key, "Discarding zero-length cached audio");
                remove_if_present(&path)?;
                self.lock_index().remove(key);
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::io(path, e)),
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Audio cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Audio cache miss");
        }
        Ok(found)
    }

    /// Write freshly synthesized audio for `key`.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::WriteConflict` if a file for `key` already exists,
    /// or `CacheError::Io` if the write fails.
    pub fn store(&self, key: &ContentKey, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.audio_path(key);

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| CacheError::io(&self.dir, e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| CacheError::io(temp.path(), e))?;

        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                CacheError::WriteConflict { path: path.clone() }
            } else {
                CacheError::io(&path, e.error)
            }
        })?;

        tracing::debug!(key = %key, bytes = bytes.len(), "Stored audio in cache");
        Ok(path)
    }

    /// Count a use of `key`.
    ///
    /// A new entry (freshly stored audio) starts at one hit created now,
    /// replacing any stale entry left behind by a file that vanished from
    /// under the index. Otherwise the existing hit count is incremented.
    pub fn record_access(&self, key: &ContentKey, is_new_entry: bool) {
        let mut index = self.lock_index();
        if !is_new_entry {
            if let Some(entry) = index.get_mut(key) {
                entry.hit_count = entry.hit_count.saturating_add(1);
                tracing::trace!(key = %key, hits = entry.hit_count, "Recorded cache hit");
                return;
            }
        }

        let replaced = index.insert(
            key.clone(),
            CacheEntry {
                created: Utc::now(),
                hit_count: 1,
            },
        );
        if is_new_entry && replaced.is_some() {
            tracing::debug!(key = %key, "Reset stale index entry for refetched audio");
        }
        tracing::trace!(key = %key, is_new_entry, "Recorded new cache entry");
    }

    /// Keep `key` out of eviction until the returned pin is dropped.
    ///
    /// Pins nest: a key stays protected while any pin for it is alive.
    pub fn pin(self: &Arc<Self>, key: &ContentKey) -> KeyPin {
        *self.lock_pins().entry(key.clone()).or_insert(0) += 1;
        KeyPin {
            cache: Arc::clone(self),
            key: key.clone(),
        }
    }

    /// Whether any pin for `key` is alive.
    pub fn is_pinned(&self, key: &ContentKey) -> bool {
        self.lock_pins().contains_key(key)
    }

    /// Evict entries until the indexed files fit the budget.
    ///
    /// `protected` (the entry recorded by the triggering call) and pinned
    /// entries are never evicted, even if they alone exceed the budget.
    /// Returns the evicted keys.
    pub fn enforce_size_limit(&self, protected: &ContentKey) -> Vec<ContentKey> {
        let sizes = match self.scan_audio_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "Could not size the audio cache; skipping eviction");
                return Vec::new();
            }
        };

        let pinned: HashSet<ContentKey> = self.lock_pins().keys().cloned().collect();

        let evicted = {
            let mut index = self.lock_index();
            let mut total: u64 = index
                .keys()
                .filter_map(|key| sizes.get(key))
                .map(|file| file.len)
                .sum();

            let mut evicted = Vec::new();
            while total > self.max_bytes {
                let Some(stalest) = stalest_entry(&index, protected, &pinned) else {
                    break;
                };
                index.remove(&stalest);
                total = total.saturating_sub(sizes.get(&stalest).map_or(0, |f| f.len));
                evicted.push(stalest);
            }
            evicted
        };

        for key in &evicted {
            let path = self.audio_path(key);
            match remove_if_present(&path) {
                Ok(()) => tracing::debug!(key = %key, "Evicted cached audio"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Evicted entry but could not delete its file"),
            }
        }
        evicted
    }

    /// Persist the index.
    ///
    /// Waits up to a second for the index file to become writable (someone
    /// may have it open in an editor) and skips the commit if it does not;
    /// the next commit catches up. Legacy `.wav` files are purged after a
    /// successful write. Returns whether the index was written.
    pub async fn commit(&self) -> bool {
        let _serialized = self.commit_lock.lock().await;
        let path = self.index_path();

        let started = tokio::time::Instant::now();
        while !is_writable(&path) {
            if started.elapsed() >= COMMIT_WAIT {
                tracing::warn!(path = %path.display(), "Index file stayed locked; skipping commit");
                return false;
            }
            tokio::time::sleep(COMMIT_POLL).await;
        }

        let snapshot: BTreeMap<String, CacheEntry> = self
            .lock_index()
            .iter()
            .map(|(key, entry)| (key.to_string(), *entry))
            .collect();
        let entries = snapshot.len();

        let dir = self.dir.clone();
        let index_path = path.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_index_atomically(&index_path, &snapshot)?;
            purge_legacy_files(&dir);
            Ok::<(), std::io::Error>(())
        })
        .await;

        match written {
            Ok(Ok(())) => {
                tracing::debug!(entries, "Committed cache index");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write cache index");
                false
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache index writer did not finish");
                false
            }
        }
    }

    /// Run [`commit`](Self::commit) in the background.
    pub fn spawn_commit(self: &Arc<Self>) -> JoinHandle<bool> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.commit().await })
    }

    /// Current entry count, indexed size and hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let sizes = self.scan_audio_files().unwrap_or_default();
        let index = self.lock_index();
        CacheStats {
            entries: index.len(),
            indexed_bytes: index
                .keys()
                .filter_map(|key| sizes.get(key))
                .map(|file| file.len)
                .sum(),
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Serialize fetches of the same key.
    ///
    /// Two fragments with identical markup would otherwise both miss and
    /// race to store the same file.
    pub(crate) async fn lock_key(&self, key: &ContentKey) -> KeyGuard<'_> {
        let lock = Arc::clone(
            self.lock_key_locks()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        KeyGuard {
            cache: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, HashMap<ContentKey, CacheEntry>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pins(&self) -> MutexGuard<'_, HashMap<ContentKey, usize>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_key_locks(&self) -> MutexGuard<'_, HashMap<ContentKey, Arc<AsyncMutex<()>>>> {
        self.key_locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `<key>.mp3` in the cache directory.
    fn scan_audio_files(&self) -> Result<HashMap<ContentKey, AudioFile>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let mut files = HashMap::new();
        for entry in entries.flatten() {
            let Some(key) = entry.file_name().to_str().and_then(ContentKey::from_file_name) else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.insert(
                key,
                AudioFile {
                    len: metadata.len(),
                    created,
                },
            );
        }
        Ok(files)
    }
}

/// Keeps a key out of eviction while alive.
#[derive(Debug)]
pub struct KeyPin {
    cache: Arc<AudioCache>,
    key: ContentKey,
}

impl KeyPin {
    /// The pinned key.
    pub fn key(&self) -> &ContentKey {
        &self.key
    }
}

impl Drop for KeyPin {
    fn drop(&mut self) {
        let mut pins = self.cache.lock_pins();
        if let Some(count) = pins.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.key);
            }
        }
    }
}

/// Holds the per-key fetch lock; forgets the lock once nobody else wants it.
pub(crate) struct KeyGuard<'a> {
    cache: &'a AudioCache,
    key: ContentKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.cache.lock_key_locks();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AudioFile {
    len: u64,
    created: DateTime<Utc>,
}

/// Least hits first, then oldest. Ties are broken by key so eviction is deterministic.
fn stalest_entry(
    index: &HashMap<ContentKey, CacheEntry>,
    protected: &ContentKey,
    pinned: &HashSet<ContentKey>,
) -> Option<ContentKey> {
    index
        .iter()
        .filter(|(key, _)| *key != protected && !pinned.contains(*key))
        .min_by(|(a_key, a), (b_key, b)| {
            a.hit_count
                .cmp(&b.hit_count)
                .then(a.created.cmp(&b.created))
                .then(a_key.cmp(b_key))
        })
        .map(|(key, _)| key.clone())
}

/// Read the persisted index, falling back to an empty one.
fn read_index_file(path: &Path) -> HashMap<ContentKey, CacheEntry> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read cache index; starting cold");
            return HashMap::new();
        }
    };

    let raw: BTreeMap<String, CacheEntry> = match serde_json::from_str(&contents) {
        Ok(raw) => raw,
        Err(source) => {
            let err = CacheError::IndexCorrupt {
                path: path.to_path_buf(),
                source,
            };
            tracing::warn!(error = %err, cause = ?std::error::Error::source(&err), "Discarding cache index");
            return HashMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, entry)| match ContentKey::parse(&key) {
            Some(key) => Some((key, entry)),
            None => {
                tracing::debug!(key = %key, "Ignoring index entry with an invalid key");
                None
            }
        })
        .collect()
}

/// Write the index using temp file + rename.
fn write_index_atomically(
    path: &Path,
    index: &BTreeMap<String, CacheEntry>,
) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(index)?;

    let parent = path.parent().unwrap_or(path);
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(json.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(path)?;

    Ok(())
}

fn purge_legacy_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        let is_legacy = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(LEGACY_EXTENSION));
        if is_legacy && path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Purged legacy cache file"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to purge legacy cache file"),
            }
        }
    }
}

/// A missing index counts as writable; an existing one must open for writing.
fn is_writable(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    fs::OpenOptions::new().write(true).open(path).is_ok()
}

fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

// ============================================================================
// Tests
// ============================================================================
