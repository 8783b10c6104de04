//! Atomic, backup-protected file persistence shared by every cache.
//!
//! A save writes a temporary file next to the target and renames it into
//! place. Before the first overwrite of a calendar day the current target is
//! kept as `<key>.<YYYYMMDD>.bak`. A load that fails to deserialize walks the
//! backups from newest to oldest and rewrites the target from the first one
//! that parses.
//!
//! Failures are logged and reported as `false`/`None`; nothing here panics or
//! propagates I/O errors to the caches.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{Local, NaiveDate};
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;

const BACKUP_SUFFIX: &str = ".bak";
const BACKUP_DATE_FORMAT: &str = "%Y%m%d";
const TEMP_MARKER: &str = "_tmp_";

pub(crate) const REPORT_PREFIX: &str = "cache_report";
pub(crate) const RESULT_PREFIX: &str = "tsp_results_";

/// Supplies the calendar day used to name backups.
pub type DateSource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// A dated snapshot of one cache file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveOutcome {
    Unchanged,
    Written,
}

pub struct PersistenceManager {
    dir: PathBuf,
    max_backups: usize,
    max_reports: usize,
    max_results: usize,
    today: DateSource,
    lock: ReentrantMutex<()>,
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("dir", &self.dir)
            .field("max_backups", &self.max_backups)
            .field("max_reports", &self.max_reports)
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl PersistenceManager {
    /// Opens (and creates if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_backups: max_backups.max(1),
            max_reports: 3,
            max_results: 5,
            today: Arc::new(|| Local::now().date_naive()),
            lock: ReentrantMutex::new(()),
        })
    }

    pub fn with_retention(mut self, max_reports: usize, max_results: usize) -> Self {
        self.max_reports = max_reports;
        self.max_results = max_results;
        self
    }

    pub fn with_date_source(mut self, today: DateSource) -> Self {
        self.today = today;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Size of the primary file for `key`, zero when absent.
    pub fn size_of(&self, key: &str) -> u64 {
        fs::metadata(self.path_for(key))
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    /// Persists `data` under `key`. Returns `true` when the data is durable,
    /// including the case where identical content was already on disk.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> bool {
        let _guard = self.lock.lock();

        let bytes = match serde_json::to_vec(data) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, %err, "persistence: failed to serialize");
                return false;
            }
        };

        match self.save_bytes(key, &bytes) {
            Ok(SaveOutcome::Unchanged) => {
                debug!(key, "persistence: content unchanged, skipping write");
                true
            }
            Ok(SaveOutcome::Written) => {
                debug!(key, bytes = bytes.len(), "persistence: saved");
                true
            }
            Err(err) => {
                warn!(key, %err, "persistence: save failed, previous state kept");
                false
            }
        }
    }

    /// Loads `key`, recovering from the newest readable backup when the
    /// primary file is corrupt. `None` means nothing usable exists.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let _guard = self.lock.lock();
        let target = self.path_for(key);

        let bytes = match fs::read(&target) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(key, %err, "persistence: failed to read, trying backups");
                return self.recover(key);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(key, %err, "persistence: corrupt file, trying backups");
                self.recover(key)
            }
        }
    }

    /// Backups of `key`, newest first.
    pub fn backups(&self, key: &str) -> Vec<BackupRecord> {
        let _guard = self.lock.lock();
        let mut backups: Vec<BackupRecord> = self
            .dir_entries()
            .into_iter()
            .filter_map(|(name, path)| {
                let date = backup_date(&name, key)?;
                let size_bytes = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
                Some(BackupRecord {
                    path,
                    date,
                    size_bytes,
                })
            })
            .collect();

        backups.sort_by(|a, b| b.date.cmp(&a.date));
        backups
    }

    /// Removes orphaned temp files, caps backups per file and caps derived
    /// report/result files. Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let _guard = self.lock.lock();
        let mut removed = 0;

        let entries = self.dir_entries();
        for (name, path) in &entries {
            if name.contains(TEMP_MARKER) && remove_logged(path) {
                debug!(file = %name, "cleanup: removed orphaned temp file");
                removed += 1;
            }
        }

        let mut keys: Vec<String> = entries
            .iter()
            .filter_map(|(name, _)| backup_key(name))
            .collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            removed += self.prune_backups(&key);
        }

        removed += self.cap_files(|name| is_derived(name, REPORT_PREFIX), self.max_reports);
        removed += self.cap_files(|name| is_derived(name, RESULT_PREFIX), self.max_results);

        info!(removed, dir = %self.dir.display(), "cleanup: finished");
        removed
    }

    /// Writes `bytes` to `key` through a temp file without taking a backup.
    pub(crate) fn write_atomic(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock();
        let mut tmp = self.temp_file(key)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|err| err.error)?;
        Ok(())
    }

    fn save_bytes(&self, key: &str, bytes: &[u8]) -> io::Result<SaveOutcome> {
        let target = self.path_for(key);

        if let Ok(existing) = fs::read(&target) {
            if existing == bytes {
                return Ok(SaveOutcome::Unchanged);
            }
        }

        let mut tmp = self.temp_file(key)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        if target.exists() {
            let backup = self.backup_path(key, (self.today)());
            if !backup.exists() {
                // The target stays in place until the rename below replaces it.
                if fs::hard_link(&target, &backup).is_err() {
                    fs::copy(&target, &backup)?;
                }
                info!(key, backup = %backup.display(), "persistence: created daily backup");
                self.prune_backups(key);
            }
        }

        tmp.persist(&target).map_err(|err| err.error)?;
        Ok(SaveOutcome::Written)
    }

    fn recover<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        for backup in self.backups(key) {
            let bytes = match fs::read(&backup.path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(backup = %backup.path.display(), %err, "persistence: unreadable backup");
                    continue;
                }
            };

            match serde_json::from_slice::<T>(&bytes) {
                Ok(data) => {
                    if let Err(err) = self.write_atomic(key, &bytes) {
                        warn!(
                            key,
                            %err,
                            "persistence: recovered data but failed to rewrite target"
                        );
                    }
                    info!(
                        key,
                        backup = %backup.path.display(),
                        "persistence: restored from backup"
                    );
                    return Some(data);
                }
                Err(err) => {
                    warn!(backup = %backup.path.display(), %err, "persistence: corrupt backup");
                }
            }
        }

        warn!(key, "persistence: no usable backup");
        None
    }

    fn prune_backups(&self, key: &str) -> usize {
        self.backups(key)
            .iter()
            .skip(self.max_backups)
            .filter(|backup| {
                let removed = remove_logged(&backup.path);
                if removed {
                    debug!(backup = %backup.path.display(), "persistence: pruned old backup");
                }
                removed
            })
            .count()
    }

    fn cap_files(&self, matches: impl Fn(&str) -> bool, keep: usize) -> usize {
        let mut files: Vec<(SystemTime, PathBuf)> = self
            .dir_entries()
            .into_iter()
            .filter(|(name, _)| matches(name))
            .map(|(_, path)| {
                let modified = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        if files.len() <= keep {
            return 0;
        }

        files.sort();
        let excess = files.len() - keep;
        files
            .iter()
            .take(excess)
            .filter(|(_, path)| remove_logged(path))
            .count()
    }

    fn temp_file(&self, key: &str) -> io::Result<tempfile::NamedTempFile> {
        let (stem, ext) = match key.split_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (key, String::new()),
        };

        tempfile::Builder::new()
            .prefix(&format!("{stem}{TEMP_MARKER}"))
            .suffix(&ext)
            .tempfile_in(&self.dir)
    }

    fn backup_path(&self, key: &str, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{key}.{}{BACKUP_SUFFIX}",
            date.format(BACKUP_DATE_FORMAT)
        ))
    }

    fn dir_entries(&self) -> Vec<(String, PathBuf)> {
        match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|ty| ty.is_file()).unwrap_or(false))
                .filter_map(|entry| {
                    let name = entry.file_name().to_str()?.to_string();
                    Some((name, entry.path()))
                })
                .collect(),
            Err(err) => {
                warn!(dir = %self.dir.display(), %err, "persistence: cannot list cache dir");
                Vec::new()
            }
        }
    }
}

/// Date embedded in `<key>.<YYYYMMDD>.bak`, if `name` is a backup of `key`.
fn backup_date(name: &str, key: &str) -> Option<NaiveDate> {
    let stamp = name
        .strip_prefix(key)?
        .strip_prefix('.')?
        .strip_suffix(BACKUP_SUFFIX)?;
    NaiveDate::parse_from_str(stamp, BACKUP_DATE_FORMAT).ok()
}

/// The key a backup file belongs to.
fn backup_key(name: &str) -> Option<String> {
    let rest = name.strip_suffix(BACKUP_SUFFIX)?;
    let (key, stamp) = rest.rsplit_once('.')?;
    NaiveDate::parse_from_str(stamp, BACKUP_DATE_FORMAT).ok()?;
    Some(key.to_string())
}

fn is_derived(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.ends_with(".json")
}

fn remove_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), %err, "persistence: failed to remove file");
            false
        }
    }
}
