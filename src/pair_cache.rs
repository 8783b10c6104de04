//! Persisted cache of directed point-pair routes.
//!
//! Every insert stores both directions: the forward record as given and the
//! mirror with reversed geometry and the same distance. Lookups that only find
//! the mirror synthesize the forward record and write it through.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geo::Coord;
use crate::persistence::PersistenceManager;
use crate::polyline::Polyline;

pub const DEFAULT_PAIR_CACHE_FILE: &str = "cached_routes.json";

/// A directed pair of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub from: Coord,
    pub to: Coord,
}

impl PairKey {
    pub fn new(from: Coord, to: Coord) -> Self {
        Self { from, to }
    }

    pub fn mirror(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }

    /// The same key for both directions of a pair.
    pub fn unordered(&self) -> Self {
        if self.from <= self.to {
            *self
        } else {
            self.mirror()
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}|{},{}",
            self.from.lat, self.from.lon, self.to.lat, self.to.lon
        )
    }
}

impl FromStr for PairKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('|')
            .ok_or_else(|| format!("pair key without separator: {s}"))?;
        Ok(Self::new(parse_coord(from)?, parse_coord(to)?))
    }
}

fn parse_coord(s: &str) -> Result<Coord, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("coordinate without comma: {s}"))?;
    let lat = lat.parse::<f64>().map_err(|err| format!("{lat}: {err}"))?;
    let lon = lon.parse::<f64>().map_err(|err| format!("{lon}: {err}"))?;
    Ok(Coord::new(lat, lon))
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A resolved route between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub geometry: Option<Polyline>,
    pub distance_km: f64,
}

impl RouteRecord {
    pub fn new(geometry: Polyline, distance_km: f64) -> Self {
        Self {
            geometry: Some(geometry),
            distance_km,
        }
    }

    pub fn distance_only(distance_km: f64) -> Self {
        Self {
            geometry: None,
            distance_km,
        }
    }

    /// The record for the opposite direction.
    pub fn mirrored(&self) -> Self {
        Self {
            geometry: self.geometry.as_ref().map(Polyline::reversed),
            distance_km: self.distance_km,
        }
    }
}

/// Hit/miss counters and size of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

pub struct PairCache {
    persistence: Arc<PersistenceManager>,
    file: String,
    // Never re-entered: saving goes through the manager's own lock.
    routes: Mutex<BTreeMap<PairKey, RouteRecord>>,
    autosave_every: usize,
    unsaved: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PairCache {
    /// Opens the cache stored under `file`, starting empty if nothing usable
    /// is on disk.
    pub fn open(
        persistence: Arc<PersistenceManager>,
        file: impl Into<String>,
        autosave_every: usize,
    ) -> Self {
        let file = file.into();
        let routes: BTreeMap<PairKey, RouteRecord> = persistence.load(&file).unwrap_or_default();
        info!(file = %file, entries = routes.len(), "pair cache: loaded");

        Self {
            persistence,
            file,
            routes: Mutex::new(routes),
            autosave_every,
            unsaved: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Record for `from -> to`, counting a hit or a miss.
    pub fn get(&self, from: Coord, to: Coord) -> Option<RouteRecord> {
        let found = self.peek(from, to);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Same lookup as [`PairCache::get`] without touching the counters.
    pub fn peek(&self, from: Coord, to: Coord) -> Option<RouteRecord> {
        let key = PairKey::new(from, to);
        let mut routes = self.routes.lock();

        if let Some(record) = routes.get(&key) {
            return Some(record.clone());
        }

        let forward = routes.get(&key.mirror())?.mirrored();
        routes.insert(key, forward.clone());
        debug!(pair = %key, "pair cache: synthesized from mirror");
        Some(forward)
    }

    /// Counts a hit for a record found through [`PairCache::peek`]. Misses
    /// are left to whoever goes on to resolve the pair.
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores both directions. With `persist` the cache is saved right away,
    /// otherwise it is saved every `autosave_every` inserts.
    pub fn put(&self, from: Coord, to: Coord, record: RouteRecord, persist: bool) {
        let key = PairKey::new(from, to);
        {
            let mut routes = self.routes.lock();
            routes.insert(key.mirror(), record.mirrored());
            routes.insert(key, record);
        }

        let unsaved = self.unsaved.fetch_add(1, Ordering::AcqRel) + 1;
        if persist || (self.autosave_every > 0 && unsaved >= self.autosave_every) {
            self.save();
        }
    }

    /// Writes the whole cache. In-memory state is kept on failure so a later
    /// save can retry.
    pub fn save(&self) -> bool {
        let routes = self.routes.lock();
        let saved = self.persistence.save(&self.file, &*routes);
        if saved {
            self.unsaved.store(0, Ordering::Release);
        }
        saved
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn cache_in(dir: &std::path::Path) -> PairCache {
        let manager = Arc::new(PersistenceManager::new(dir, 5).expect("manager"));
        PairCache::open(manager, DEFAULT_PAIR_CACHE_FILE, 0)
    }

    fn a() -> Coord {
        Coord::new(52.1, 20.8)
    }

    fn b() -> Coord {
        Coord::new(50.4, 16.5)
    }

    #[test]
    fn test_put_stores_both_directions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = cache_in(dir.path());
        let geometry = Polyline::new(vec![(52.1, 20.8), (51.0, 18.0), (50.4, 16.5)]);

        cache.put(a(), b(), RouteRecord::new(geometry.clone(), 430.1), false);

        let forward = cache.get(a(), b()).expect("forward");
        let backward = cache.get(b(), a()).expect("backward");
        assert_eq!(forward.distance_km, backward.distance_km);
        assert_eq!(backward.geometry, Some(geometry.reversed()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_mirror_synthesis_writes_through() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = cache_in(dir.path());
        cache
            .routes
            .lock()
            .insert(PairKey::new(b(), a()), RouteRecord::distance_only(12.5));

        let forward = cache.get(a(), b()).expect("mirrored hit");
        assert_eq!(forward, RouteRecord::distance_only(12.5));
        assert!(cache.routes.lock().contains_key(&PairKey::new(a(), b())));
    }

    #[test]
    fn test_counters() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = cache_in(dir.path());

        assert!(cache.get(a(), b()).is_none());
        cache.put(a(), b(), RouteRecord::distance_only(3.0), false);
        assert!(cache.get(a(), b()).is_some());
        assert!(cache.peek(b(), a()).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_reload_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let cache = cache_in(dir.path());
            cache.put(a(), b(), RouteRecord::distance_only(7.25), true);
        }

        let reopened = cache_in(dir.path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(b(), a()), Some(RouteRecord::distance_only(7.25)));
    }

    #[test]
    fn test_failed_save_keeps_entries_for_a_later_retry() {
        let root = tempfile::tempdir().expect("temp dir");
        let cache_dir = root.path().join("cache");
        let parked = root.path().join("parked");
        let cache = cache_in(&cache_dir);

        fs::rename(&cache_dir, &parked).expect("park cache dir");
        cache.put(a(), b(), RouteRecord::distance_only(7.25), true);
        assert!(!cache.save());
        assert_eq!(cache.len(), 2);

        fs::rename(&parked, &cache_dir).expect("restore cache dir");
        assert!(cache.save());

        let reopened = cache_in(&cache_dir);
        assert_eq!(reopened.get(a(), b()), Some(RouteRecord::distance_only(7.25)));
    }

    #[test]
    fn test_pair_key_string_round_trip() {
        let key = PairKey::new(Coord::new(52.237049, 21.017532), Coord::new(-33.8688, 151.2093));
        let parsed: PairKey = key.to_string().parse().expect("parse");
        assert_eq!(parsed, key);
        assert!("52.1;20.8".parse::<PairKey>().is_err());
    }

    #[test]
    fn test_unordered_key_matches_both_directions() {
        let key = PairKey::new(a(), b());
        assert_eq!(key.unordered(), key.mirror().unordered());
    }
}
