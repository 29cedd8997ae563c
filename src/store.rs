//! Snapshot persistence: file naming, single and combined layouts, the
//! per-run combined-file cache, batched combined writes, and the sweep of
//! snapshots no watch expression refers to anymore.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::hasher::{self, HashAlgorithm};
use crate::snapshot::Snapshot;
use crate::types::{Identity as _, TargetKey};

/// Extension of every snapshot file.
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Deterministic snapshot file for a target. Single layout hashes
/// `path:range`; combined layout hashes the source path alone so every range
/// of one source file shares a file.
pub fn file_path_for(dir: &Path, key: &TargetKey, combined: bool, algorithm: HashAlgorithm) -> PathBuf {
    let identity = if combined {
        key.source_file_path.to_string_lossy().into_owned()
    } else {
        key.to_string()
    };
    let name = hasher::digest(algorithm, identity.as_bytes());
    return dir.join(format!("{name}.{SNAPSHOT_EXTENSION}"));
}

/// Read a single-record snapshot file.
///
/// # Errors
///
/// Returns `Error::Io` on read failure, `Error::Json` on malformed content,
/// or `Error::FormatMismatch` if the file holds a combined array.
pub fn read(path: &Path) -> Result<Snapshot, Error> {
    let value = read_json(path)?;
    if value.is_array() {
        return Err(Error::FormatMismatch { expected: "single snapshot", path: path.to_path_buf() });
    }
    return Ok(serde_json::from_value(value)?);
}

/// Parse a snapshot file into an untyped JSON value to inspect its layout.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::Json`.
fn read_json(path: &Path) -> Result<serde_json::Value, Error> {
    let content = std::fs::read_to_string(path)?;
    return Ok(serde_json::from_str(&content)?);
}

/// Read a combined snapshot file.
///
/// # Errors
///
/// Returns `Error::Io` on read failure, `Error::Json` on malformed content,
/// or `Error::FormatMismatch` if the file holds a single record.
pub fn read_many(path: &Path) -> Result<Vec<Snapshot>, Error> {
    let value = read_json(path)?;
    if !value.is_array() {
        return Err(Error::FormatMismatch { expected: "combined snapshot array", path: path.to_path_buf() });
    }
    return Ok(serde_json::from_value(value)?);
}

/// Write a single-record snapshot file, creating parent directories.
///
/// # Errors
///
/// Returns `Error::Json` or `Error::Io`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), Error> {
    let content = serde_json::to_string_pretty(snapshot)?;
    return write_file(path, &content);
}

/// Write a combined snapshot file, sorted by range for stable output.
///
/// # Errors
///
/// Returns `Error::Json` or `Error::Io`.
pub fn save_many(path: &Path, snapshots: &[Snapshot]) -> Result<(), Error> {
    let mut sorted = snapshots.to_vec();
    sorted.sort_by_key(|s| return s.line_range);
    let content = serde_json::to_string_pretty(&sorted)?;
    return write_file(path, &content);
}

/// Write content with a trailing newline, creating parent directories.
///
/// # Errors
///
/// Returns `Error::Io`.
fn write_file(path: &Path, content: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{content}\n"))?;
    return Ok(());
}

/// Snapshot storage rooted at the configured snapshot directory. Holds the
/// per-run state: the read-through cache of combined files and the staged
/// combined writes that [`SnapshotStore::flush`] writes once per file.
#[derive(Debug)]
pub struct SnapshotStore {
    /// Digest used for file names.
    algorithm: HashAlgorithm,
    /// Combined layout toggle.
    combined: bool,
    /// Combined files already read this run, keyed by snapshot file path.
    cache: HashMap<PathBuf, Vec<Snapshot>>,
    /// Directory holding snapshot files.
    dir: PathBuf,
    /// Combined snapshots waiting to be written, keyed by snapshot file path.
    pending: BTreeMap<PathBuf, Vec<Snapshot>>,
}

impl SnapshotStore {
    /// Open the store described by the configuration. Nothing is read yet.
    pub fn new(config: &Config) -> Self {
        return Self::at(config.snapshot_dir(), config.combine, config.hash_algorithm);
    }

    /// Open a store at an explicit directory.
    pub fn at(dir: PathBuf, combined: bool, algorithm: HashAlgorithm) -> Self {
        return Self { algorithm, combined, cache: HashMap::new(), dir, pending: BTreeMap::new() };
    }

    /// Whether a snapshot for the target exists, staged or on disk.
    /// Unreadable combined files count as absent.
    pub fn exists(&mut self, key: &TargetKey) -> bool {
        if !self.combined {
            return self.path_for(key).is_file();
        }
        return matches!(self.read(key), Ok(Some(_)));
    }

    /// Write staged combined snapshots, one write per combined file, merged
    /// with whatever that file already holds. No-op in single layout.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::Json` on the first file that fails.
    /// Files are flushed in path order; later files are not attempted.
    pub fn flush(&mut self) -> Result<usize, Error> {
        let pending = std::mem::take(&mut self.pending);
        let mut written = 0_usize;
        for (path, staged) in pending {
            let mut merged = match self.load_combined(&path) {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "replacing unreadable combined snapshot file");
                    Vec::new()
                },
            };
            for snapshot in staged {
                upsert(&mut merged, snapshot);
            }
            save_many(&path, &merged)?;
            debug!(file = %path.display(), entries = merged.len(), "wrote combined snapshot file");
            self.cache.insert(path, merged);
            written = written.saturating_add(1);
        }
        return Ok(written);
    }

    /// Load a combined file through the cache. Missing files are empty.
    ///
    /// # Errors
    ///
    /// Returns read, JSON, or format errors; failures are not cached.
    fn load_combined(&mut self, path: &Path) -> Result<Vec<Snapshot>, Error> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached.clone());
        }
        let loaded = if path.exists() { read_many(path)? } else { Vec::new() };
        self.cache.insert(path.to_path_buf(), loaded.clone());
        return Ok(loaded);
    }

    /// Snapshot file path for a target under this store's layout.
    pub fn path_for(&self, key: &TargetKey) -> PathBuf {
        return file_path_for(&self.dir, key, self.combined, self.algorithm);
    }

    /// Read the snapshot for a target. Staged combined snapshots are visible
    /// before they are flushed.
    ///
    /// # Errors
    ///
    /// Returns `Error::FormatMismatch` when the file holds the other layout,
    /// `Error::Json` or `Error::Io` when it cannot be read.
    pub fn read(&mut self, key: &TargetKey) -> Result<Option<Snapshot>, Error> {
        let path = self.path_for(key);
        if !self.combined {
            if !path.exists() {
                return Ok(None);
            }
            let snapshot = read(&path)?;
            if snapshot.identity_key() != *key {
                warn!(file = %path.display(), "snapshot file names a different target");
                return Ok(None);
            }
            return Ok(Some(snapshot));
        }

        if let Some(staged) = self.pending.get(&path).and_then(|s| return find_by_key(s, key)) {
            return Ok(Some(staged));
        }
        let entries = self.load_combined(&path)?;
        return Ok(find_by_key(&entries, key));
    }

    /// Persist a snapshot. Single layout writes immediately; combined layout
    /// stages it for [`SnapshotStore::flush`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` or `Error::Io` from an immediate write.
    pub fn save(&mut self, snapshot: Snapshot) -> Result<PathBuf, Error> {
        let path = self.path_for(&snapshot.identity_key());
        if self.combined {
            let staged = self.pending.entry(path.clone()).or_default();
            upsert(staged, snapshot);
            return Ok(path);
        }
        save(&path, &snapshot)?;
        return Ok(path);
    }

    /// Delete snapshots that no live target maps to. Single-layout files are
    /// removed outright; combined files are rewritten without dead ranges and
    /// removed once empty. Files that cannot be read are left in place.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the snapshot directory cannot be listed or a
    /// file cannot be removed or rewritten.
    pub fn sweep(&mut self, live: &HashSet<TargetKey>) -> Result<usize, Error> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let live_files: HashSet<PathBuf> = live.iter().map(|k| return self.path_for(k)).collect();
        let mut removed = 0_usize;

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| return e != SNAPSHOT_EXTENSION) {
                continue;
            }
            let dropped = if self.combined {
                self.sweep_combined_file(&path, live)?
            } else if live_files.contains(&path) {
                0
            } else {
                std::fs::remove_file(&path)?;
                debug!(file = %path.display(), "removed unused snapshot");
                1
            };
            removed = removed.saturating_add(dropped);
        }
        return Ok(removed);
    }

    /// Drop dead entries from one combined file. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::Json` on rewrite/removal failure.
    fn sweep_combined_file(&mut self, path: &Path, live: &HashSet<TargetKey>) -> Result<usize, Error> {
        let entries = match self.load_combined(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "leaving unreadable snapshot file in place");
                return Ok(0);
            },
        };
        let before = entries.len();
        let kept: Vec<Snapshot> = entries.into_iter().filter(|s| return live.contains(&s.identity_key())).collect();
        let dropped = before.saturating_sub(kept.len());

        if kept.is_empty() {
            std::fs::remove_file(path)?;
            self.cache.remove(path);
            debug!(file = %path.display(), "removed unused combined snapshot file");
        } else if dropped > 0 {
            save_many(path, &kept)?;
            self.cache.insert(path.to_path_buf(), kept);
        }
        return Ok(dropped);
    }
}

/// Find the entry whose identity matches the key, i.e. the same range of
/// the same source file.
fn find_by_key(entries: &[Snapshot], key: &TargetKey) -> Option<Snapshot> {
    return entries.iter().find(|s| return s.identity_key() == *key).cloned();
}

/// Replace the entry with the same identity, or append.
fn upsert(entries: &mut Vec<Snapshot>, snapshot: Snapshot) {
    let key = snapshot.identity_key();
    match entries.iter_mut().find(|s| return s.identity_key() == key) {
        Some(slot) => *slot = snapshot,
        None => entries.push(snapshot),
    }
    return;
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::types::LineRange;

    fn snap(path: &str, range: Option<LineRange>, lines: &[&str]) -> Snapshot {
        return Snapshot {
            line_range: range,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            reversed_line_range: range.and_then(|r| r.reverse(20)),
            source_file_path: PathBuf::from(path),
            total_lines_in_file: 20,
        };
    }

    #[test]
    fn file_names_are_content_addressed() {
        let dir = Path::new("/snap");
        let a = TargetKey::new("src/a.rs", Some(LineRange::new(3, 5)));
        let b = TargetKey::new("src/a.rs", Some(LineRange::new(8, 9)));
        let alg = HashAlgorithm::Sha256;

        assert_eq!(file_path_for(dir, &a, false, alg), file_path_for(dir, &a, false, alg));
        assert_ne!(file_path_for(dir, &a, false, alg), file_path_for(dir, &b, false, alg));
        assert_eq!(file_path_for(dir, &a, true, alg), file_path_for(dir, &b, true, alg));
        assert_eq!(file_path_for(dir, &a, false, alg).extension().unwrap(), "json");
    }

    #[test]
    fn single_layout_round_trip_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::at(dir.path().join("s"), false, HashAlgorithm::Sha256);
        let snapshot = snap("a.rs", Some(LineRange::new(3, 5)), &["a", "b", "c"]);
        let key = snapshot.identity_key();

        assert!(!store.exists(&key));
        store.save(snapshot.clone()).unwrap();
        assert!(store.exists(&key));
        assert_eq!(store.read(&key).unwrap(), Some(snapshot));
    }

    #[test]
    fn combined_read_picks_matching_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::at(dir.path().to_path_buf(), true, HashAlgorithm::Sha256);
        let first = snap("a.rs", Some(LineRange::new(3, 5)), &["a", "b", "c"]);
        let second = snap("a.rs", Some(LineRange::new(8, 9)), &["x", "y"]);
        store.save(first.clone()).unwrap();
        store.save(second.clone()).unwrap();
        assert_eq!(store.flush().unwrap(), 1);

        let mut fresh = SnapshotStore::at(dir.path().to_path_buf(), true, HashAlgorithm::Sha256);
        let key = TargetKey::new("a.rs", Some(LineRange::new(8, 9)));
        assert_eq!(fresh.read(&key).unwrap(), Some(second));
        let missing = TargetKey::new("a.rs", Some(LineRange::new(4, 5)));
        assert_eq!(fresh.read(&missing).unwrap(), None);
        assert_eq!(read_many(&fresh.path_for(&key)).unwrap().len(), 2);
    }

    #[test]
    fn combined_flush_merges_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::at(dir.path().to_path_buf(), true, HashAlgorithm::Sha256);
        store.save(snap("a.rs", Some(LineRange::new(1, 2)), &["1", "2"])).unwrap();
        store.flush().unwrap();

        let mut next_run = SnapshotStore::at(dir.path().to_path_buf(), true, HashAlgorithm::Sha256);
        next_run.save(snap("a.rs", Some(LineRange::new(1, 2)), &["one", "two"])).unwrap();
        next_run.save(snap("a.rs", None, &["h"])).unwrap();
        next_run.flush().unwrap();

        let all = read_many(&next_run.path_for(&TargetKey::new("a.rs", None))).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|s| s.lines == ["one", "two"]));
    }

    #[test]
    fn layout_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("single.json");
        let combined = dir.path().join("combined.json");
        let snapshot = snap("a.rs", None, &["h"]);
        save(&single, &snapshot).unwrap();
        save_many(&combined, &[snapshot]).unwrap();

        assert!(matches!(read_many(&single), Err(Error::FormatMismatch { .. })));
        assert!(matches!(read(&combined), Err(Error::FormatMismatch { .. })));
    }

    #[test]
    fn sweep_removes_only_dead_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::at(dir.path().to_path_buf(), false, HashAlgorithm::Sha256);
        let live = snap("a.rs", Some(LineRange::new(1, 2)), &["1", "2"]);
        let dead = snap("b.rs", None, &["h"]);
        store.save(live.clone()).unwrap();
        store.save(dead.clone()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let keys = HashSet::from([live.identity_key()]);
        assert_eq!(store.sweep(&keys).unwrap(), 1);
        assert!(store.exists(&live.identity_key()));
        assert!(!store.exists(&dead.identity_key()));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn combined_sweep_rewrites_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::at(dir.path().to_path_buf(), true, HashAlgorithm::Sha256);
        let keep = snap("a.rs", Some(LineRange::new(3, 5)), &["a", "b", "c"]);
        store.save(keep.clone()).unwrap();
        store.save(snap("a.rs", Some(LineRange::new(8, 9)), &["x", "y"])).unwrap();
        store.save(snap("b.rs", None, &["h"])).unwrap();
        store.flush().unwrap();

        let keys = HashSet::from([keep.identity_key()]);
        assert_eq!(store.sweep(&keys).unwrap(), 2);
        assert_eq!(read_many(&store.path_for(&keep.identity_key())).unwrap(), [keep]);
        assert!(!store.path_for(&TargetKey::new("b.rs", None)).exists());
    }
}
