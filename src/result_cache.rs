//! Persisted tour plans, one file per distance matrix and daily cap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::matrix::{DistanceMatrix, short_key};
use crate::persistence::{PersistenceManager, RESULT_PREFIX};
use crate::segment::DaySegment;
use crate::solver::{Candidate, Heuristic};

/// One heuristic's tour together with its daily legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub candidate: Candidate,
    pub days: Vec<DaySegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourPlan {
    pub key: String,
    pub node_count: usize,
    pub max_daily_km: f64,
    pub best: Heuristic,
    /// Every complete candidate, in heuristic priority order.
    pub routes: Vec<PlannedRoute>,
    pub created_at: DateTime<Utc>,
}

impl TourPlan {
    pub fn best_route(&self) -> Option<&PlannedRoute> {
        self.routes.iter().find(|route| route.candidate.heuristic == self.best)
    }
}

/// Content hash of everything a plan depends on.
pub fn result_key(matrix: &DistanceMatrix, max_daily_km: f64) -> String {
    let n = matrix.size();
    let mut hasher = Sha256::new();
    hasher.update((n as u64).to_le_bytes());
    hasher.update(max_daily_km.to_bits().to_le_bytes());
    for from in 0..n {
        for to in 0..n {
            match matrix.get(from, to) {
                Some(km) => {
                    hasher.update([1]);
                    hasher.update(km.to_bits().to_le_bytes());
                }
                None => hasher.update([0]),
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

pub struct TourResultCache {
    persistence: Arc<PersistenceManager>,
}

impl TourResultCache {
    pub fn new(persistence: Arc<PersistenceManager>) -> Self {
        Self { persistence }
    }

    pub fn file_for(key: &str) -> String {
        format!("{RESULT_PREFIX}{}.json", short_key(key))
    }

    /// The stored plan for `key`. Files are named by a key prefix, so a plan
    /// for a different full key is treated as a miss.
    pub fn load(&self, key: &str) -> Option<TourPlan> {
        let file = Self::file_for(key);
        let plan: TourPlan = self.persistence.load(&file)?;
        if plan.key != key {
            warn!(file = %file, "tour results: key prefix collision, ignoring stored plan");
            return None;
        }
        debug!(file = %file, best = %plan.best, "tour results: loaded");
        Some(plan)
    }

    pub fn store(&self, plan: &TourPlan) -> bool {
        let file = Self::file_for(&plan.key);
        let saved = self.persistence.save(&file, plan);
        if saved {
            info!(file = %file, routes = plan.routes.len(), "tour results: stored");
        }
        saved
    }
}
