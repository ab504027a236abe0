//! Cached roster export reader for watch mode.
//!
//! Wraps [`read_records_from_path`] with a cache keyed by the file's
//! modification time and length. Callers use [`RosterSource::get_records`]
//! for fresh-or-cached records, or [`RosterSource::poll_changed`] to learn
//! whether the export was replaced since the last read. Reads are retried up
//! to three times with back-off, and a failed read falls back to the
//! previous cache.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use health_core::error::{CoreError, Result};
use health_core::models::RawRecord;
use health_data::reader::read_records_from_path;

/// Maximum number of read attempts before giving up and keeping stale data.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Identity of one version of the export on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }
}

// ── RosterSource ──────────────────────────────────────────────────────────────

pub struct RosterSource {
    path: PathBuf,
    delimiter: char,
    /// Records of the most recent successful read.
    cache: Option<Vec<RawRecord>>,
    /// Stamp of the file the cache was read from.
    cache_stamp: Option<FileStamp>,
    last_error: Option<CoreError>,
    last_successful_read: Option<Instant>,
}

impl RosterSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: char) -> Self {
        Self {
            path: path.into(),
            delimiter,
            cache: None,
            cache_stamp: None,
            last_error: None,
            last_successful_read: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Records of the export, re-read only when the file changed.
    ///
    /// `force_refresh` bypasses the cache. When reading fails the previous
    /// cache (if any) is returned and the error is kept in
    /// [`RosterSource::last_error`].
    pub fn get_records(&mut self, force_refresh: bool) -> Option<&[RawRecord]> {
        if force_refresh || self.is_stale() {
            self.refresh();
        } else {
            tracing::debug!(path = %self.path.display(), "returning cached roster");
        }
        self.cache.as_deref()
    }

    /// Freshly read records when the export changed since the last
    /// successful read, `None` when it is unchanged or unreadable.
    pub fn poll_changed(&mut self) -> Option<&[RawRecord]> {
        if !self.is_stale() {
            return None;
        }
        if self.refresh() {
            self.cache.as_deref()
        } else {
            None
        }
    }

    /// Discard the cache, forcing the next call to read the file.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
        self.cache_stamp = None;
        tracing::debug!("roster cache invalidated");
    }

    /// Time since the last successful read.
    pub fn cache_age(&self) -> Option<Duration> {
        self.last_successful_read.map(|ts| ts.elapsed())
    }

    pub fn last_error(&self) -> Option<&CoreError> {
        self.last_error.as_ref()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// `true` when there is no cache or the file no longer matches it.
    /// An unreadable file counts as stale so the next read reports why.
    fn is_stale(&self) -> bool {
        match (self.cache.as_ref(), self.cache_stamp) {
            (Some(_), Some(stamp)) => FileStamp::of(&self.path).map_or(true, |now| now != stamp),
            _ => true,
        }
    }

    /// Read the file into the cache. Returns whether the read succeeded.
    fn refresh(&mut self) -> bool {
        match self.read_with_retry() {
            Ok((records, stamp)) => {
                tracing::debug!(rows = records.len(), path = %self.path.display(), "roster cache updated");
                self.cache = Some(records);
                self.cache_stamp = Some(stamp);
                self.last_successful_read = Some(Instant::now());
                self.last_error = None;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "roster read failed; keeping cached records");
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Back-off schedule: attempt 1 → 0 ms, attempt 2 → 100 ms, attempt 3 → 200 ms.
    fn read_with_retry(&self) -> Result<(Vec<RawRecord>, FileStamp)> {
        let mut attempt = 0;
        loop {
            match self.read_once() {
                Ok(read) => return Ok(read),
                Err(e) if attempt + 1 >= MAX_RETRY_ATTEMPTS => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let sleep_ms = u64::from(attempt) * 100;
                    tracing::debug!(attempt, sleep_ms, error = %e, "retrying roster read after back-off");
                    thread::sleep(Duration::from_millis(sleep_ms));
                }
            }
        }
    }

    /// Stamp taken before reading, so a write racing the read shows up as a
    /// change on the next poll.
    fn read_once(&self) -> Result<(Vec<RawRecord>, FileStamp)> {
        let stamp = FileStamp::of(&self.path)?;
        let records = read_records_from_path(&self.path, self.delimiter)?;
        Ok((records, stamp))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROSTER: &str = "Sirvoy Customer ID,Account Name\nC1,Hotel Nordlys\n";

    fn source_with_file(content: &str) -> (RosterSource, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, content).unwrap();
        (RosterSource::new(path, ','), dir)
    }

    // ── cache ─────────────────────────────────────────────────────────────

    #[test]
    fn test_first_call_reads_file() {
        let (mut source, _dir) = source_with_file(ROSTER);
        assert!(source.cache_age().is_none());

        let records = source.get_records(false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Account Name"), Some("Hotel Nordlys"));
        assert!(source.last_error().is_none());
        assert!(source.cache_age().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_unchanged_file_served_from_cache() {
        let (mut source, _dir) = source_with_file(ROSTER);
        source.get_records(false);
        let read_at = source.last_successful_read.unwrap();

        source.get_records(false);
        assert_eq!(source.last_successful_read, Some(read_at));
    }

    #[test]
    fn test_force_refresh_rereads() {
        let (mut source, _dir) = source_with_file(ROSTER);
        source.get_records(false);
        let first = source.last_successful_read.unwrap();

        thread::sleep(Duration::from_millis(10));
        source.get_records(true);
        assert!(source.last_successful_read.unwrap() > first);
    }

    #[test]
    fn test_invalidate_cache() {
        let (mut source, _dir) = source_with_file(ROSTER);
        source.get_records(false);
        source.invalidate_cache();
        assert!(source.cache.is_none());
        assert!(source.cache_stamp.is_none());
    }

    // ── change detection ──────────────────────────────────────────────────

    #[test]
    fn test_poll_changed_reports_new_versions_once() {
        let (mut source, _dir) = source_with_file(ROSTER);
        assert_eq!(source.poll_changed().map(<[_]>::len), Some(1));
        assert!(source.poll_changed().is_none());

        std::fs::write(source.path(), format!("{ROSTER}C2,Hotel Fjord\n")).unwrap();
        assert_eq!(source.poll_changed().map(<[_]>::len), Some(2));
        assert!(source.poll_changed().is_none());
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[test]
    fn test_missing_file_without_cache() {
        let dir = TempDir::new().unwrap();
        let mut source = RosterSource::new(dir.path().join("absent.csv"), ',');

        assert!(source.get_records(false).is_none());
        assert!(source.poll_changed().is_none());
        assert!(matches!(source.last_error(), Some(CoreError::FileRead { .. })));
    }

    #[test]
    fn test_deleted_file_falls_back_to_cache() {
        let (mut source, _dir) = source_with_file(ROSTER);
        source.get_records(false);
        std::fs::remove_file(source.path()).unwrap();

        let records = source.get_records(false).unwrap();
        assert_eq!(records.len(), 1);
        assert!(source.last_error().is_some());
        assert!(source.poll_changed().is_none());
    }
}
