//! Opportunistic, non-blocking size- and age-bounded eviction.
//!
//! Mirrors the scan-then-sweep shape of this codebase's other cache
//! cleanup routine, simplified for a flat payload directory and
//! per-entry advisory locks in place of an "is this package linked"
//! check: enumerate candidates, sort oldest-first, evict while holding
//! each candidate's lock non-blockingly, skip anything contended.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use fs_err as fs;
use serde::Serialize;

use crate::error::CacheError;
use crate::layout::Layout;
use crate::lock::{LockGuard, LockMode};

/// Summary of one [`crate::Cache::purge`] call.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PurgeReport {
    /// Entries removed, across both the age sweep and the size sweep.
    pub removed: usize,
    /// Of `removed`, the count evicted for being older than `max_age`.
    pub removed_by_age: usize,
    /// Of `removed`, the count evicted to satisfy `max_size`.
    pub removed_by_size: usize,
    /// Bytes reclaimed across both sweeps.
    pub bytes_freed: u64,
    /// Orphaned lock files removed.
    pub orphan_locks_removed: usize,
    /// Candidates skipped because their per-entry lock was held elsewhere.
    pub skipped_locked: usize,
}

struct Candidate {
    key: String,
    path: PathBuf,
    size: u64,
    mtime: SystemTime,
}

/// Runs one purge pass over `layout`. Returns an empty report without
/// touching anything if the whole-cache lock is currently held
/// elsewhere — purge is purely advisory and never blocks producers.
pub fn run(layout: &Layout, max_size: u64, max_age: Duration) -> Result<PurgeReport, CacheError> {
    let _whole_cache_lock =
        match LockGuard::try_acquire(&layout.purge_lock_file, LockMode::Exclusive) {
            Ok(guard) => guard,
            Err(CacheError::LockBusy) => {
                tracing::debug!("purge skipped: whole-cache lock busy");
                return Ok(PurgeReport::default());
            }
            Err(e) => return Err(e),
        };

    let mut report = PurgeReport::default();
    let mut candidates = scan(layout)?;

    let now = SystemTime::now();
    candidates.retain(|c| {
        let age = now.duration_since(c.mtime).unwrap_or(Duration::ZERO);
        if age <= max_age {
            return true;
        }
        match evict(layout, c) {
            Evicted::Removed(size) => {
                report.removed += 1;
                report.removed_by_age += 1;
                report.bytes_freed += size;
                false
            }
            Evicted::Skipped => {
                report.skipped_locked += 1;
                true
            }
        }
    });

    let mut remaining: u64 = candidates.iter().map(|c| c.size).sum();
    if remaining > max_size {
        candidates.sort_by_key(|c| c.mtime);
        for candidate in &candidates {
            if remaining <= max_size {
                break;
            }
            match evict(layout, candidate) {
                Evicted::Removed(size) => {
                    report.removed += 1;
                    report.removed_by_size += 1;
                    report.bytes_freed += size;
                    remaining -= size;
                }
                Evicted::Skipped => {
                    report.skipped_locked += 1;
                }
            }
        }
    }

    report.orphan_locks_removed = sweep_orphan_locks(layout)?;

    tracing::info!(
        removed_by_age = report.removed_by_age,
        removed_by_size = report.removed_by_size,
        bytes_freed = report.bytes_freed,
        skipped_locked = report.skipped_locked,
        orphan_locks_removed = report.orphan_locks_removed,
        "purge complete"
    );
    Ok(report)
}

enum Evicted {
    Removed(u64),
    Skipped,
}

/// Attempts to evict one candidate: acquire its per-entry exclusive
/// lock non-blocking, then delete payload and lock file. Skips (rather
/// than forcibly evicts) anything currently locked by a reader or an
/// in-progress fetch.
fn evict(layout: &Layout, candidate: &Candidate) -> Evicted {
    let lock_path = layout.lock_path(&candidate.key);
    let _entry_lock = match LockGuard::try_acquire(&lock_path, LockMode::Exclusive) {
        Ok(guard) => guard,
        Err(_) => return Evicted::Skipped,
    };

    match fs::remove_file(&candidate.path) {
        Ok(()) => {
            tracing::debug!(key = %candidate.key, "evicted cache entry");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(key = %candidate.key, error = %e, "failed to remove payload during purge");
            return Evicted::Skipped;
        }
    }
    let _ = fs::remove_file(&lock_path);
    Evicted::Removed(candidate.size)
}

fn scan(layout: &Layout) -> Result<Vec<Candidate>, CacheError> {
    use rayon::prelude::*;

    let entries: Vec<_> = match fs::read_dir(&layout.cache_dir) {
        Ok(entries) => entries.collect::<std::io::Result<Vec<_>>>().map_err(|e| CacheError::io(&layout.cache_dir, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(&layout.cache_dir, e)),
    };

    let candidates: Vec<Candidate> = entries
        .into_par_iter()
        .filter_map(|entry| {
            let path = entry.path();
            let key = entry.file_name().to_string_lossy().into_owned();
            let metadata = fs::metadata(&path).ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some(Candidate {
                key,
                path,
                size: metadata.len(),
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })
        })
        .collect();
    Ok(candidates)
}

/// Removes lock files in `lock/` whose corresponding payload no longer
/// exists. Best-effort: any entry this process cannot currently take
/// exclusively is left for a later purge.
fn sweep_orphan_locks(layout: &Layout) -> Result<usize, CacheError> {
    let entries = match fs::read_dir(&layout.lock_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(CacheError::io(&layout.lock_dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(&layout.lock_dir, e))?;
        let key = entry.file_name().to_string_lossy().into_owned();
        if layout.payload_path(&key).exists() {
            continue;
        }
        let lock_path = entry.path();
        if let Ok(_guard) = LockGuard::try_acquire(&lock_path, LockMode::Exclusive) {
            if fs::remove_file(&lock_path).is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::tempdir;

    fn make_entry(layout: &Layout, key: &str, bytes: &[u8], age: Duration) {
        let path = layout.payload_path(key);
        fs::write(&path, bytes).unwrap();
        let mtime = FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(&path, mtime).unwrap();
    }

    #[test]
    fn purge_with_zero_max_size_empties_unlocked_entries() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.init().unwrap();
        make_entry(&layout, "aaaa", b"one", Duration::from_secs(0));
        make_entry(&layout, "bbbb", b"two", Duration::from_secs(0));

        let report = run(&layout, 0, Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(fs::read_dir(&layout.cache_dir).unwrap().count(), 0);
    }

    #[test]
    fn purge_by_age_evicts_only_stale_entries() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.init().unwrap();
        make_entry(&layout, "aaaa", b"old", Duration::from_secs(10_000));
        make_entry(&layout, "bbbb", b"fresh", Duration::from_secs(0));

        let report = run(&layout, u64::MAX, Duration::from_secs(1_000)).unwrap();
        assert_eq!(report.removed_by_age, 1);
        assert!(!layout.payload_path("aaaa").exists());
        assert!(layout.payload_path("bbbb").exists());
    }

    #[test]
    fn purge_skips_entries_locked_by_another_holder() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.init().unwrap();
        make_entry(&layout, "aaaa", b"held", Duration::from_secs(0));

        let _held = LockGuard::acquire_blocking(&layout.lock_path("aaaa"), LockMode::Exclusive).unwrap();
        let report = run(&layout, 0, Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(report.skipped_locked, 1);
        assert!(layout.payload_path("aaaa").exists());
    }

    #[test]
    fn purge_is_a_noop_when_whole_cache_lock_is_held() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.init().unwrap();
        make_entry(&layout, "aaaa", b"x", Duration::from_secs(0));

        let _held = LockGuard::acquire_blocking(&layout.purge_lock_file, LockMode::Shared).unwrap();
        let report = run(&layout, 0, Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(report.removed, 0);
        assert!(layout.payload_path("aaaa").exists());
    }

    #[test]
    fn orphan_lock_files_are_swept() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.init().unwrap();
        fs::write(layout.lock_path("gone"), b"").unwrap();

        let report = run(&layout, u64::MAX, Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(report.orphan_locks_removed, 1);
        assert!(!layout.lock_path("gone").exists());
    }
}
