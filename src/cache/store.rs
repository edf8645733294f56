use std::collections::{HashMap, HashSet};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};

use anyhow::Context as _;
use chrono::Utc;

use crate::cache::entry::{
    Artifact, ArtifactKind, CacheEntry, CacheStats, EntryMeta, InvalidationScope, Namespace,
};
use crate::cache::fingerprint::{Fingerprint, OpKind, OpParams, SourceSignature, fingerprint};
use crate::foundation::error::{ErrorKind, ReelError, ReelResult};
use crate::foundation::fs::{TempFileGuard, unique_name, unique_name_pid};

const TEMP_DIR: &str = "temp";
/// Temp files of other processes younger than this are treated as in flight.
const STALE_TEMP_AGE: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Content-addressable artifact store rooted at one directory.
///
/// Layout: `clips/<key>.mp4`, `frames/<key>.png`, a `<key>.json` sidecar next to each artifact,
/// and `temp/` for artifacts still being produced. Artifacts are immutable once published.
///
/// The store is safe to share across threads (`Arc<CacheStore>`) and across processes pointed at
/// the same root: every artifact is produced under `temp/` and published with a no-overwrite
/// link, so readers never observe a partial file under its final key.
pub struct CacheStore {
    root: PathBuf,
    namespace: RwLock<Namespace>,
    hits: AtomicU64,
    misses: AtomicU64,
    inflight: Mutex<HashMap<Fingerprint, Arc<InFlight>>>,
    temps: Mutex<HashSet<PathBuf>>,
}

#[derive(Clone, Debug)]
struct FlightFailure {
    kind: ErrorKind,
    message: String,
}

#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<Result<Artifact, FlightFailure>>>,
    ready: Condvar,
}

impl InFlight {
    /// Record the outcome unless one was recorded already, and wake every waiter.
    fn finish(&self, outcome: Result<Artifact, FlightFailure>) {
        let mut guard = lock(&self.outcome);
        if guard.is_none() {
            *guard = Some(outcome);
        }
        drop(guard);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<Artifact, FlightFailure> {
        let mut guard = lock(&self.outcome);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Held by the producing caller of a key. Dropping it, also while unwinding out of a panicking
/// producer, releases the key and fails any waiter that got no outcome.
struct Leadership<'a> {
    store: &'a CacheStore,
    key: Fingerprint,
    flight: Arc<InFlight>,
}

impl Drop for Leadership<'_> {
    fn drop(&mut self) {
        self.flight.finish(Err(FlightFailure {
            kind: ErrorKind::Internal,
            message: "producer panicked".to_owned(),
        }));
        lock(&self.store.inflight).remove(&self.key);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CacheStore {
    /// Open (creating if needed) a store at `root` with the given key namespace.
    pub fn open(root: impl Into<PathBuf>, namespace: Namespace) -> ReelResult<Self> {
        let root = root.into();
        for sub in [
            ArtifactKind::Clip.dir_name(),
            ArtifactKind::Frame.dir_name(),
            TEMP_DIR,
        ] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| {
                ReelError::cache_write(format!(
                    "failed to create cache directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }
        tracing::info!(
            root = %root.display(),
            namespace = %namespace.scope_id(),
            "cache store opened"
        );
        Ok(Self {
            root,
            namespace: RwLock::new(namespace),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inflight: Mutex::new(HashMap::new()),
            temps: Mutex::new(HashSet::new()),
        })
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Currently active namespace.
    pub fn namespace(&self) -> Namespace {
        self.namespace
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Derive the key for an operation under the active namespace.
    pub fn key(&self, source: &SourceSignature, op: OpKind, params: &OpParams) -> Fingerprint {
        fingerprint(source, op, params, &self.namespace().scope_id())
    }

    /// Switch the active namespace. Keys derived afterwards differ from earlier ones, so earlier
    /// entries become unreachable. Nothing is deleted.
    pub fn invalidate_namespace(&self, scope: InvalidationScope) {
        let mut ns = self
            .namespace
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match scope {
            InvalidationScope::Profile(profile_id) => ns.profile_id = profile_id,
            InvalidationScope::SourceSet(set) => ns.source_set = Some(set),
        }
        tracing::info!(namespace = %ns.scope_id(), "cache namespace switched");
    }

    /// Final path an artifact with `key` is published under.
    pub fn artifact_path(&self, key: &Fingerprint, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}.{}", key.to_hex(), kind.extension()))
    }

    fn sidecar_path(&self, key: &Fingerprint, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}.json", key.to_hex()))
    }

    fn lookup(&self, key: &Fingerprint, kind: ArtifactKind) -> Option<Artifact> {
        let path = self.artifact_path(key, kind);
        let meta = std::fs::metadata(&path).ok()?;
        meta.is_file().then(|| Artifact {
            key: *key,
            kind,
            path,
            bytes: meta.len(),
        })
    }

    /// Look up a published artifact, recording a hit or a miss.
    pub fn get(&self, key: &Fingerprint, kind: ArtifactKind) -> Option<Artifact> {
        match self.lookup(key, kind) {
            Some(artifact) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.touch(key, kind);
                tracing::debug!(key = %key.to_hex(), kind = ?kind, "cache hit");
                Some(artifact)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key.to_hex(), kind = ?kind, "cache miss");
                None
            }
        }
    }

    /// Publish the artifact for `key`, producing it with `producer` if it does not exist yet.
    ///
    /// `producer` receives a fresh path under `temp/` and must write the complete artifact there.
    /// At most one producer runs per key within this process: concurrent callers for the same key
    /// block and receive the first producer's result. If that producer fails, the waiters fail
    /// too and nothing is published.
    pub fn put<F>(
        &self,
        key: &Fingerprint,
        kind: ArtifactKind,
        meta: EntryMeta,
        producer: F,
    ) -> ReelResult<Artifact>
    where
        F: FnOnce(&Path) -> ReelResult<()>,
    {
        if let Some(artifact) = self.lookup(key, kind) {
            return Ok(artifact);
        }

        let (flight, leader) = {
            let mut map = lock(&self.inflight);
            match map.get(key) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(InFlight::default());
                    map.insert(*key, Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !leader {
            tracing::debug!(key = %key.to_hex(), "waiting for in-flight producer");
            return flight.wait().map_err(|failure| ReelError::Concurrent {
                key: key.to_hex(),
                kind: failure.kind,
                message: failure.message,
            });
        }
        let leadership = Leadership {
            store: self,
            key: *key,
            flight,
        };

        // Another process may have published between the first lookup and taking leadership.
        let result = match self.lookup(key, kind) {
            Some(artifact) => Ok(artifact),
            None => self.produce_and_publish(key, kind, &meta, producer),
        };

        leadership.flight.finish(match &result {
            Ok(artifact) => Ok(artifact.clone()),
            Err(e) => Err(FlightFailure {
                kind: e.kind(),
                message: e.to_string(),
            }),
        });
        drop(leadership);
        result
    }

    /// [`CacheStore::get`], then [`CacheStore::put`] on a miss.
    pub fn get_or_put<F>(
        &self,
        key: &Fingerprint,
        kind: ArtifactKind,
        meta: EntryMeta,
        producer: F,
    ) -> ReelResult<Artifact>
    where
        F: FnOnce(&Path) -> ReelResult<()>,
    {
        match self.get(key, kind) {
            Some(artifact) => Ok(artifact),
            None => self.put(key, kind, meta, producer),
        }
    }

    fn produce_and_publish<F>(
        &self,
        key: &Fingerprint,
        kind: ArtifactKind,
        meta: &EntryMeta,
        producer: F,
    ) -> ReelResult<Artifact>
    where
        F: FnOnce(&Path) -> ReelResult<()>,
    {
        let hex = key.to_hex();
        let tmp = self
            .root
            .join(TEMP_DIR)
            .join(unique_name(&hex[..16], kind.extension()));
        lock(&self.temps).insert(tmp.clone());
        let _guard = TempFileGuard(Some(tmp.clone()));
        let result = self.produce_into(key, kind, meta, &tmp, producer);
        lock(&self.temps).remove(&tmp);
        result
    }

    fn produce_into<F>(
        &self,
        key: &Fingerprint,
        kind: ArtifactKind,
        meta: &EntryMeta,
        tmp: &Path,
        producer: F,
    ) -> ReelResult<Artifact>
    where
        F: FnOnce(&Path) -> ReelResult<()>,
    {
        producer(tmp)?;

        let bytes = std::fs::metadata(tmp)
            .map_err(|e| {
                ReelError::cache_write(format!(
                    "producer did not write '{}': {e}",
                    tmp.display()
                ))
            })?
            .len();
        if bytes == 0 {
            return Err(ReelError::cache_write(format!(
                "producer wrote an empty artifact for {}",
                key.to_hex()
            )));
        }

        let final_path = self.artifact_path(key, kind);
        publish_no_overwrite(tmp, &final_path)?;

        let now = Utc::now();
        let entry = CacheEntry {
            key: *key,
            kind,
            path: final_path.clone(),
            bytes,
            op: Some(meta.op),
            namespace: meta
                .namespace
                .clone()
                .unwrap_or_else(|| self.namespace().scope_id()),
            source: meta.source.clone(),
            created_at: now,
            last_used_at: now,
        };
        self.write_sidecar(&entry)?;
        tracing::info!(
            key = %key.to_hex(),
            op = meta.op.as_str(),
            bytes,
            "cache entry published"
        );

        // Bytes reported for an entry another process won the race for.
        let bytes = std::fs::metadata(&final_path)
            .map(|m| m.len())
            .unwrap_or(bytes);
        Ok(Artifact {
            key: *key,
            kind,
            path: final_path,
            bytes,
        })
    }

    fn write_sidecar(&self, entry: &CacheEntry) -> ReelResult<()> {
        let path = self.sidecar_path(&entry.key, entry.kind);
        let tmp = self.root.join(TEMP_DIR).join(unique_name("sidecar", "json"));
        let mut guard = TempFileGuard(Some(tmp.clone()));
        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| ReelError::cache_write(format!("failed to encode cache entry: {e}")))?;
        std::fs::write(&tmp, json).map_err(|e| {
            ReelError::cache_write(format!("failed to write '{}': {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            ReelError::cache_write(format!("failed to publish '{}': {e}", path.display()))
        })?;
        guard.disarm();
        Ok(())
    }

    fn read_sidecar(&self, key: &Fingerprint, kind: ArtifactKind) -> Option<CacheEntry> {
        let bytes = std::fs::read(self.sidecar_path(key, kind)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn touch(&self, key: &Fingerprint, kind: ArtifactKind) {
        if let Some(mut entry) = self.read_sidecar(key, kind) {
            entry.last_used_at = Utc::now();
            if let Err(e) = self.write_sidecar(&entry) {
                tracing::debug!(
                    key = %key.to_hex(),
                    error = %e,
                    "failed to refresh last-used time"
                );
            }
        }
    }

    /// Hit/miss counters plus the current on-disk footprint.
    pub fn stats(&self) -> ReelResult<CacheStats> {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for entry in self.entries()? {
            stats.total_bytes += entry.bytes;
            match entry.kind {
                ArtifactKind::Clip => stats.clip_entries += 1,
                ArtifactKind::Frame => stats.frame_entries += 1,
            }
        }
        Ok(stats)
    }

    /// Reset the hit/miss counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Every published entry, sorted by creation time (oldest first).
    ///
    /// Entries whose sidecar is missing or unreadable are reported from file metadata alone.
    pub fn entries(&self) -> ReelResult<Vec<CacheEntry>> {
        let mut out = Vec::new();
        for kind in [ArtifactKind::Clip, ArtifactKind::Frame] {
            let dir = self.root.join(kind.dir_name());
            let listing = std::fs::read_dir(&dir)
                .with_context(|| format!("failed to list '{}'", dir.display()))?;
            for item in listing {
                let item = item.with_context(|| format!("failed to list '{}'", dir.display()))?;
                let path = item.path();
                if path.extension().and_then(|e| e.to_str()) != Some(kind.extension()) {
                    continue;
                }
                let Some(key) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(Fingerprint::from_hex)
                else {
                    continue;
                };
                let Ok(meta) = item.metadata() else {
                    continue;
                };
                let entry = match self.read_sidecar(&key, kind) {
                    Some(mut entry) => {
                        entry.path = path;
                        entry.bytes = meta.len();
                        entry
                    }
                    None => {
                        let modified = meta
                            .modified()
                            .map(chrono::DateTime::<Utc>::from)
                            .unwrap_or_else(|_| Utc::now());
                        CacheEntry {
                            key,
                            kind,
                            path,
                            bytes: meta.len(),
                            op: None,
                            namespace: String::new(),
                            source: String::new(),
                            created_at: modified,
                            last_used_at: modified,
                        }
                    }
                };
                out.push(entry);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        Ok(out)
    }

    /// Remove every entry and every abandoned temp file. Returns the number of entries removed.
    ///
    /// Temp files still being produced by this store are kept, and so are recent temp files of
    /// other processes sharing the root. Temp files left by this process, or older than an hour,
    /// are removed.
    pub fn clear(&self) -> ReelResult<usize> {
        let entries = self.entries()?;
        let removed = entries.len();
        for entry in entries {
            self.remove_entry(&entry)?;
        }
        let temp = self.root.join(TEMP_DIR);
        let listing = std::fs::read_dir(&temp)
            .with_context(|| format!("failed to list '{}'", temp.display()))?;
        let live = lock(&self.temps).clone();
        let pid = std::process::id();
        for item in listing.flatten() {
            let path = item.path();
            if live.contains(&path) {
                continue;
            }
            let stale = item
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age >= STALE_TEMP_AGE);
            if stale || unique_name_pid(&path) == Some(pid) {
                let _ = std::fs::remove_file(&path);
            }
        }
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }

    /// Remove entries created more than `age` ago. Returns the number removed.
    pub fn remove_older_than(&self, age: chrono::Duration) -> ReelResult<usize> {
        let cutoff = Utc::now() - age;
        let mut removed = 0;
        for entry in self.entries()? {
            if entry.created_at < cutoff {
                self.remove_entry(&entry)?;
                removed += 1;
            }
        }
        tracing::info!(removed, "old cache entries removed");
        Ok(removed)
    }

    fn remove_entry(&self, entry: &CacheEntry) -> ReelResult<()> {
        remove_if_exists(&self.artifact_path(&entry.key, entry.kind))?;
        remove_if_exists(&self.sidecar_path(&entry.key, entry.kind))
    }

    /// Delete temp artifacts this store instance is still producing or abandoned.
    ///
    /// Published entries are never touched. Returns the number of files removed.
    pub fn purge_temp(&self) -> usize {
        let paths: Vec<PathBuf> = lock(&self.temps).drain().collect();
        let mut removed = 0;
        for path in paths {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "purged in-flight temp artifacts");
        }
        removed
    }
}

fn remove_if_exists(path: &Path) -> ReelResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReelError::cache_write(format!(
            "failed to remove '{}': {e}",
            path.display()
        ))),
    }
}

/// Move `tmp` to `dst` unless `dst` already exists.
///
/// A hard link fails with `AlreadyExists` instead of replacing, which keeps the first publisher's
/// bytes when two processes race. Filesystems without hard links fall back to rename after an
/// existence check.
fn publish_no_overwrite(tmp: &Path, dst: &Path) -> ReelResult<()> {
    match std::fs::hard_link(tmp, dst) {
        Ok(()) => {
            let _ = std::fs::remove_file(tmp);
            Ok(())
        }
        Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
            tracing::debug!(path = %dst.display(), "artifact already published, keeping existing");
            let _ = std::fs::remove_file(tmp);
            Ok(())
        }
        Err(link_err) => {
            if dst.exists() {
                let _ = std::fs::remove_file(tmp);
                return Ok(());
            }
            std::fs::rename(tmp, dst).map_err(|e| {
                ReelError::cache_write(format!(
                    "failed to publish '{}' (link: {link_err}; rename: {e})",
                    dst.display()
                ))
            })
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
