//! Human-readable cache status report.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::matrix::MatrixStore;
use crate::pair_cache::{CacheStats, PairCache};
use crate::persistence::{BackupRecord, PersistenceManager, REPORT_PREFIX};

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub generated_at: DateTime<Local>,
    pub cache_dir: PathBuf,
    pub pair_cache: CacheSection,
    pub matrix_store: CacheSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSection {
    pub file: String,
    pub stats: CacheStats,
    /// Hits as a percentage of lookups.
    pub hit_rate: f64,
    pub size_bytes: u64,
    pub backups: Vec<BackupRecord>,
}

impl CacheSection {
    fn collect(persistence: &PersistenceManager, file: &str, stats: CacheStats) -> Self {
        Self {
            file: file.to_string(),
            hit_rate: stats.hit_rate(),
            stats,
            size_bytes: persistence.size_of(file),
            backups: persistence.backups(file),
        }
    }
}

pub fn build_report(
    persistence: &PersistenceManager,
    pairs: &PairCache,
    matrices: &MatrixStore,
) -> CacheReport {
    CacheReport {
        generated_at: Local::now(),
        cache_dir: persistence.dir().to_path_buf(),
        pair_cache: CacheSection::collect(persistence, pairs.file(), pairs.stats()),
        matrix_store: CacheSection::collect(persistence, matrices.file(), matrices.stats()),
    }
}

/// Writes `cache_report_<YYYYmmdd_HHMMSS>.json` into the cache directory and
/// returns its path. Old reports are capped by `PersistenceManager::cleanup`.
pub fn generate_report(
    persistence: &PersistenceManager,
    pairs: &PairCache,
    matrices: &MatrixStore,
) -> Option<PathBuf> {
    let report = build_report(persistence, pairs, matrices);
    let file = format!("{REPORT_PREFIX}_{}.json", report.generated_at.format("%Y%m%d_%H%M%S"));

    let bytes = match serde_json::to_vec_pretty(&report) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "report: failed to serialize");
            return None;
        }
    };

    match persistence.write_atomic(&file, &bytes) {
        Ok(()) => {
            info!(
                file = %file,
                pair_entries = report.pair_cache.stats.entries,
                matrix_entries = report.matrix_store.stats.entries,
                "report: written"
            );
            Some(persistence.path_for(&file))
        }
        Err(err) => {
            warn!(file = %file, %err, "report: failed to write");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geo::Coord;
    use crate::pair_cache::RouteRecord;

    #[test]
    fn test_report_lists_both_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = Arc::new(PersistenceManager::new(dir.path(), 3).expect("manager"));
        let pairs = PairCache::open(Arc::clone(&persistence), "routes.json", 0);
        let matrices = MatrixStore::open(Arc::clone(&persistence), "matrices.json");

        let (a, b) = (Coord::new(52.23, 21.01), Coord::new(50.06, 19.94));
        pairs.put(a, b, RouteRecord::distance_only(252.0), true);
        assert!(pairs.get(b, a).is_some());
        assert!(pairs.get(a, Coord::new(0.0, 0.0)).is_none());

        let path = generate_report(&persistence, &pairs, &matrices).expect("report path");
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert!(name.starts_with("cache_report_"));
        assert!(name.ends_with(".json"));

        let raw = std::fs::read_to_string(&path).expect("report body");
        let body: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(body["pair_cache"]["stats"]["entries"], 2);
        assert_eq!(body["pair_cache"]["stats"]["hits"], 1);
        assert_eq!(body["pair_cache"]["stats"]["misses"], 1);
        assert_eq!(body["pair_cache"]["hit_rate"], 50.0);
        assert_eq!(body["matrix_store"]["file"], "matrices.json");
        assert!(body["pair_cache"]["size_bytes"].as_u64().unwrap_or(0) > 0);
    }
}
