//! Assembles the full pairwise matrix for a location set.

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::geo::{Coord, LocationPoint};
use crate::matrix::{
    DistanceMatrix, MatrixSnapshot, MatrixStore, RouteMatrix, location_set_key, short_key,
};
use crate::pair_cache::RouteRecord;
use crate::resolver::RouteResolver;

pub struct MatrixBuilder {
    resolver: Arc<RouteResolver>,
    store: Arc<MatrixStore>,
    pool: rayon::ThreadPool,
    offline: bool,
}

impl MatrixBuilder {
    /// `workers` bounds how many pairs are resolved at once; the rest queue.
    pub fn new(
        resolver: Arc<RouteResolver>,
        store: Arc<MatrixStore>,
        workers: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|idx| format!("matrix-{idx}"))
            .build()?;

        Ok(Self {
            resolver,
            store,
            pool,
            offline: false,
        })
    }

    /// In offline mode only cached snapshots are served.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Matrix for `[depot] + locations`. A cached snapshot for the same
    /// location set is returned unless `force_recalc` is set; a rebuild still
    /// reuses every cached pair and only sends the rest to the resolver.
    pub fn build(
        &self,
        locations: &[Coord],
        depot: Coord,
        force_recalc: bool,
    ) -> Result<(String, MatrixSnapshot)> {
        let coords: Vec<Coord> = std::iter::once(depot).chain(locations.iter().copied()).collect();
        for coord in &coords {
            coord.validate()?;
        }

        // The key ignores order; the cached table is reindexed to this call's.
        let key = location_set_key(&coords);
        let cached = self.store.get(&key).and_then(|snapshot| snapshot.reordered(&coords));

        if self.offline {
            return match cached {
                Some(snapshot) => Ok((key, snapshot)),
                None => Err(Error::MatrixUnavailable { key }),
            };
        }

        if let Some(snapshot) = cached {
            if !force_recalc {
                info!(key = short_key(&key), "matrix: using cached snapshot");
                return Ok((key, snapshot));
            }
        }

        let n = coords.len();
        let cache = self.resolver.cache();
        let mut distances = DistanceMatrix::new(n);
        let mut routes = RouteMatrix::new(n);
        let mut missing = Vec::new();

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                // Misses are counted once, by the resolver.
                match cache.peek(coords[i], coords[j]) {
                    Some(record) => {
                        cache.record_hit();
                        place(&mut distances, &mut routes, i, j, record);
                    }
                    None => missing.push((i, j)),
                }
            }
        }

        info!(
            key = short_key(&key),
            locations = n,
            pairs = n * n.saturating_sub(1),
            to_resolve = missing.len(),
            "matrix: building"
        );

        // collect() is the barrier: every dispatched pair has finished here.
        let resolved: Vec<(usize, usize, Result<RouteRecord>)> = self.pool.install(|| {
            missing
                .par_iter()
                .map(|&(i, j)| (i, j, self.resolver.resolve(coords[i], coords[j])))
                .collect()
        });

        let mut unresolved = 0;
        for (i, j, outcome) in resolved {
            match outcome {
                Ok(record) => place(&mut distances, &mut routes, i, j, record),
                Err(err) => {
                    unresolved += 1;
                    warn!(from = i, to = j, %err, "matrix: pair left unresolved");
                }
            }
        }

        if !missing.is_empty() {
            cache.save();
        }

        let snapshot = MatrixSnapshot {
            locations: coords
                .iter()
                .enumerate()
                .map(|(index, coord)| LocationPoint::new(index, *coord))
                .collect(),
            distances,
            routes,
            created_at: Utc::now(),
        };

        if !self.store.insert(&key, snapshot.clone()) {
            warn!(key = short_key(&key), "matrix: snapshot kept in memory only");
        }
        info!(
            key = short_key(&key),
            resolved = missing.len() - unresolved,
            unresolved,
            "matrix: built"
        );

        Ok((key, snapshot))
    }
}

fn place(
    distances: &mut DistanceMatrix,
    routes: &mut RouteMatrix,
    i: usize,
    j: usize,
    record: RouteRecord,
) {
    distances.set(i, j, record.distance_km);
    if let Some(geometry) = record.geometry {
        routes.set(i, j, geometry);
    }
}
