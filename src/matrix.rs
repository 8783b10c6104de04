//! Dense pairwise matrices and the persisted snapshot store.
//!
//! Location sets are assumed small enough for a complete graph, so matrices
//! are dense row-major `Vec<Option<T>>`. An absent cell means the pair could
//! not be resolved; it is never stored as zero.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::geo::{Coord, LocationPoint};
use crate::pair_cache::CacheStats;
use crate::persistence::PersistenceManager;
use crate::polyline::Polyline;

pub const DEFAULT_MATRIX_STORE_FILE: &str = "distance_matrix.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquareMatrix<T> {
    size: usize,
    cells: Vec<Option<T>>,
}

/// Kilometers between locations, indexed by location index.
pub type DistanceMatrix = SquareMatrix<f64>;

/// Route geometry between locations, indexed by location index.
pub type RouteMatrix = SquareMatrix<Polyline>;

impl<T> SquareMatrix<T> {
    pub fn new(size: usize) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        cells.resize_with(size * size, || None);
        Self { size, cells }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, from: usize, to: usize) -> Option<&T> {
        if from >= self.size || to >= self.size {
            return None;
        }
        self.cells[from * self.size + to].as_ref()
    }

    pub fn set(&mut self, from: usize, to: usize, value: T) {
        assert!(from < self.size && to < self.size, "matrix index out of bounds");
        self.cells[from * self.size + to] = Some(value);
    }

    /// Number of present off-diagonal entries.
    pub fn entry_count(&self) -> usize {
        self.cells
            .iter()
            .enumerate()
            .filter(|(idx, cell)| idx / self.size != idx % self.size && cell.is_some())
            .count()
    }

    fn is_well_formed(&self) -> bool {
        self.cells.len() == self.size * self.size
    }
}

impl SquareMatrix<f64> {
    /// Builds a matrix with the same distance in both directions for each
    /// listed pair.
    pub fn symmetric(size: usize, pairs: &[(usize, usize, f64)]) -> Self {
        let mut matrix = Self::new(size);
        for &(from, to, km) in pairs {
            matrix.set(from, to, km);
            matrix.set(to, from, km);
        }
        matrix
    }

    /// Distance of an edge. The diagonal is always zero.
    pub fn distance(&self, from: usize, to: usize) -> Option<f64> {
        if from == to && from < self.size {
            return Some(0.0);
        }
        self.get(from, to).copied()
    }

    /// Distance with absent edges treated as unreachable.
    pub fn cost(&self, from: usize, to: usize) -> f64 {
        self.distance(from, to).unwrap_or(f64::INFINITY)
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// A full distance/route table for one fixed location set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSnapshot {
    pub locations: Vec<LocationPoint>,
    pub distances: DistanceMatrix,
    pub routes: RouteMatrix,
    pub created_at: DateTime<Utc>,
}

impl MatrixSnapshot {
    /// Ordered pairs that have no distance.
    pub fn missing_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.locations.len();
        (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .filter(|&(i, j)| self.distances.get(i, j).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        let n = self.locations.len();
        self.distances.entry_count() == n * n.saturating_sub(1)
    }

    /// The same table with locations in `order`, or `None` when `order` is
    /// not a permutation of this snapshot's locations.
    pub fn reordered(&self, order: &[Coord]) -> Option<MatrixSnapshot> {
        let n = self.locations.len();
        if order.len() != n {
            return None;
        }

        let position: HashMap<Coord, usize> =
            self.locations.iter().map(|loc| (loc.coord, loc.index)).collect();
        let source: Vec<usize> = order
            .iter()
            .map(|coord| position.get(coord).copied())
            .collect::<Option<_>>()?;
        if source.iter().copied().eq(0..n) {
            return Some(self.clone());
        }

        let mut distances = DistanceMatrix::new(n);
        let mut routes = RouteMatrix::new(n);
        for (i, &from) in source.iter().enumerate() {
            for (j, &to) in source.iter().enumerate() {
                if i == j {
                    continue;
                }
                // Repeated coordinates share a source index; their pair is
                // the zero-length diagonal.
                if let Some(km) = self.distances.distance(from, to) {
                    distances.set(i, j, km);
                }
                if let Some(route) = self.routes.get(from, to) {
                    routes.set(i, j, route.clone());
                }
            }
        }

        Some(MatrixSnapshot {
            locations: order
                .iter()
                .enumerate()
                .map(|(index, coord)| LocationPoint::new(index, *coord))
                .collect(),
            distances,
            routes,
            created_at: self.created_at,
        })
    }

    fn is_consistent(&self) -> bool {
        let n = self.locations.len();
        self.distances.size() == n
            && self.routes.size() == n
            && self.distances.is_well_formed()
            && self.routes.is_well_formed()
            && self.locations.iter().enumerate().all(|(i, loc)| loc.index == i)
    }
}

/// Order-independent content hash of a location set.
pub fn location_set_key(coords: &[Coord]) -> String {
    let mut sorted: Vec<(f64, f64)> = coords.iter().map(Coord::as_tuple).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));

    let mut hasher = Sha256::new();
    for (lat, lon) in sorted {
        hasher.update(lat.to_le_bytes());
        hasher.update(lon.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub(crate) fn short_key(key: &str) -> &str {
    &key[..key.len().min(8)]
}

/// Persisted map of location-set hash to matrix snapshot.
pub struct MatrixStore {
    persistence: Arc<PersistenceManager>,
    file: String,
    // Never re-entered: saving goes through the manager's own lock.
    snapshots: Mutex<BTreeMap<String, MatrixSnapshot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MatrixStore {
    pub fn open(persistence: Arc<PersistenceManager>, file: impl Into<String>) -> Self {
        let file = file.into();
        let mut snapshots: BTreeMap<String, MatrixSnapshot> =
            persistence.load(&file).unwrap_or_default();

        let before = snapshots.len();
        snapshots.retain(|_, snapshot| snapshot.is_consistent());
        if snapshots.len() != before {
            warn!(
                file = %file,
                dropped = before - snapshots.len(),
                "matrix store: dropped inconsistent snapshots"
            );
        }
        info!(file = %file, entries = snapshots.len(), "matrix store: loaded");

        Self {
            persistence,
            file,
            snapshots: Mutex::new(snapshots),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<MatrixSnapshot> {
        let found = self.snapshots.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = short_key(key), "matrix store: hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = short_key(key), "matrix store: miss");
        }
        found
    }

    /// Stores a snapshot and persists the store. A recompute with identical
    /// content only moves `created_at` to the latest build.
    pub fn insert(&self, key: &str, snapshot: MatrixSnapshot) -> bool {
        let mut snapshots = self.snapshots.lock();
        if let Some(existing) = snapshots.get_mut(key) {
            if existing.locations == snapshot.locations
                && existing.distances == snapshot.distances
                && existing.routes == snapshot.routes
            {
                if existing.created_at == snapshot.created_at {
                    debug!(key = short_key(key), "matrix store: identical snapshot already stored");
                    return true;
                }
                existing.created_at = snapshot.created_at;
                debug!(key = short_key(key), "matrix store: refreshed build time");
                return self.persistence.save(&self.file, &*snapshots);
            }
        }

        snapshots.insert(key.to_string(), snapshot);
        info!(key = short_key(key), "matrix store: saving new snapshot");
        self.persistence.save(&self.file, &*snapshots)
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
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
