//! Entry point tying the caches, the resolver, matrix assembly, tour search
//! and day segmentation together.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::builder::MatrixBuilder;
use crate::config::PlannerConfig;
use crate::error::Result;
use crate::geo::Coord;
use crate::matrix::{DEFAULT_MATRIX_STORE_FILE, MatrixSnapshot, MatrixStore, short_key};
use crate::osrm::{OsrmBackend, OsrmConfig};
use crate::pair_cache::{DEFAULT_PAIR_CACHE_FILE, PairCache};
use crate::persistence::PersistenceManager;
use crate::report::generate_report;
use crate::resolver::{ResolverOptions, RetryPolicy, RouteResolver, probe_backends};
use crate::result_cache::{PlannedRoute, TourPlan, TourResultCache, result_key};
use crate::segment::segment;
use crate::solver::{Coordinator, SolveOptions};
use crate::traits::RoutingBackend;

/// Short hop in central Warsaw used to probe backends.
const PROBE_ROUTE: (Coord, Coord) = (
    Coord { lat: 52.237049, lon: 21.017532 },
    Coord { lat: 52.231958, lon: 21.006725 },
);

#[derive(Debug, Clone)]
pub struct PlanResult {
    /// Location-set key of the matrix the plan was computed on.
    pub matrix_key: String,
    /// Matrix the plan indexes into; location 0 is the depot.
    pub snapshot: MatrixSnapshot,
    pub plan: TourPlan,
    /// The plan came from the tour result cache.
    pub from_cache: bool,
}

impl PlanResult {
    pub fn best(&self) -> Option<&PlannedRoute> {
        self.plan.best_route()
    }
}

pub struct RoutePlanner {
    config: PlannerConfig,
    persistence: Arc<PersistenceManager>,
    pair_cache: Arc<PairCache>,
    matrix_store: Arc<MatrixStore>,
    builder: MatrixBuilder,
    coordinator: Coordinator,
    results: TourResultCache,
}

impl RoutePlanner {
    /// Planner racing one OSRM backend per configured base URL.
    pub fn new(config: PlannerConfig) -> Result<Self> {
        let mut backends: Vec<Arc<dyn RoutingBackend>> = Vec::with_capacity(config.backends.len());
        for base_url in &config.backends {
            let backend = OsrmBackend::new(OsrmConfig {
                base_url: base_url.clone(),
                profile: config.profile.clone(),
                timeout_secs: config.request_timeout().as_secs(),
            })?;
            backends.push(Arc::new(backend));
        }
        Self::with_backends(config, backends)
    }

    pub fn with_backends(
        config: PlannerConfig,
        backends: Vec<Arc<dyn RoutingBackend>>,
    ) -> Result<Self> {
        config.validate()?;

        let persistence = Arc::new(
            PersistenceManager::new(&config.cache_dir, config.max_backups)?
                .with_retention(config.max_reports, config.max_results),
        );
        let pair_cache = Arc::new(PairCache::open(
            Arc::clone(&persistence),
            DEFAULT_PAIR_CACHE_FILE,
            config.autosave_every,
        ));
        let matrix_store = Arc::new(MatrixStore::open(
            Arc::clone(&persistence),
            DEFAULT_MATRIX_STORE_FILE,
        ));

        let backends = if config.probe_backends && !config.offline && !config.fallback_only {
            let alive: Vec<Arc<dyn RoutingBackend>> = probe_backends(&backends, PROBE_ROUTE)
                .into_iter()
                .map(|(backend, _)| backend)
                .collect();
            if alive.is_empty() {
                warn!(configured = backends.len(), "planner: no backend answered the probe");
            }
            alive
        } else {
            backends
        };

        let resolver = Arc::new(RouteResolver::new(
            Arc::clone(&pair_cache),
            backends,
            ResolverOptions {
                retry: RetryPolicy {
                    max_attempts: config.max_retries,
                    delay: config.retry_delay(),
                },
                fallback_only: config.fallback_only,
                race_threads: config.workers,
            },
        )?);
        let builder = MatrixBuilder::new(resolver, Arc::clone(&matrix_store), config.workers)?
            .offline(config.offline);
        let coordinator = Coordinator::new(SolveOptions {
            workers: config.workers,
            max_rounds: config.two_opt_max_rounds,
        })?;
        let results = TourResultCache::new(Arc::clone(&persistence));

        Ok(Self {
            config,
            persistence,
            pair_cache,
            matrix_store,
            builder,
            coordinator,
            results,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn persistence(&self) -> &Arc<PersistenceManager> {
        &self.persistence
    }

    pub fn pair_cache(&self) -> &Arc<PairCache> {
        &self.pair_cache
    }

    pub fn matrix_store(&self) -> &Arc<MatrixStore> {
        &self.matrix_store
    }

    /// Plans a closed tour from `depot` through every location and splits
    /// each complete candidate into days. `force` rebuilds the matrix and
    /// ignores stored plans.
    pub fn plan(&self, depot: Coord, locations: &[Coord], force: bool) -> Result<PlanResult> {
        let (matrix_key, snapshot) = self.builder.build(locations, depot, force)?;
        let distances = &snapshot.distances;
        let key = result_key(distances, self.config.max_daily_km);

        if !force {
            if let Some(plan) = self.results.load(&key) {
                info!(key = short_key(&key), best = %plan.best, "planner: reusing stored plan");
                return Ok(PlanResult {
                    matrix_key,
                    snapshot,
                    plan,
                    from_cache: true,
                });
            }
        }

        let outcome = self.coordinator.solve(distances)?;
        let mut routes = Vec::with_capacity(outcome.candidates.len());
        for candidate in outcome.candidates {
            let days = segment(&candidate.tour, distances, self.config.max_daily_km)?;
            info!(
                heuristic = %candidate.heuristic,
                days = days.len(),
                km = candidate.distance_km,
                "planner: segmented tour"
            );
            routes.push(PlannedRoute { candidate, days });
        }

        let plan = TourPlan {
            key,
            node_count: distances.size(),
            max_daily_km: self.config.max_daily_km,
            best: outcome.best.heuristic,
            routes,
            created_at: Utc::now(),
        };
        if !self.results.store(&plan) {
            warn!(key = short_key(&plan.key), "planner: plan kept in memory only");
        }

        Ok(PlanResult {
            matrix_key,
            snapshot,
            plan,
            from_cache: false,
        })
    }

    /// Flushes the pair cache and prunes temp files, backups, reports and
    /// stored plans. Returns the number of files removed.
    pub fn maintain(&self) -> usize {
        if !self.pair_cache.save() {
            warn!(file = self.pair_cache.file(), "planner: pair cache flush failed");
        }
        self.persistence.cleanup()
    }

    pub fn report(&self) -> Option<PathBuf> {
        generate_report(&self.persistence, &self.pair_cache, &self.matrix_store)
    }
}
