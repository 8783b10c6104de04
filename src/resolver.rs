//! Resolves the route between two points through a degrading ladder:
//! pair cache, then a race across routing backends, then great-circle
//! distance.
//!
//! Concurrent callers asking for the same uncached pair (in either direction)
//! are funneled through a per-pair gate, so only one of them runs the race and
//! the others read its cached result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{BackendError, Result};
use crate::geo::{Coord, great_circle_km};
use crate::pair_cache::{PairCache, PairKey, RouteRecord};
use crate::traits::{BackendRoute, RoutingBackend};

/// Granularity at which a sleeping retry notices cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per backend, at least one.
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub retry: RetryPolicy,
    /// Skip the network and always use great-circle distance.
    pub fallback_only: bool,
    /// Threads available to backend queries across all concurrent races.
    pub race_threads: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            fallback_only: false,
            race_threads: 4,
        }
    }
}

pub struct RouteResolver {
    cache: Arc<PairCache>,
    backends: Vec<Arc<dyn RoutingBackend>>,
    options: ResolverOptions,
    race_pool: rayon::ThreadPool,
    in_flight: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl RouteResolver {
    pub fn new(
        cache: Arc<PairCache>,
        backends: Vec<Arc<dyn RoutingBackend>>,
        options: ResolverOptions,
    ) -> Result<Self> {
        let race_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.race_threads.max(1))
            .thread_name(|idx| format!("route-race-{idx}"))
            .build()?;

        Ok(Self {
            cache,
            backends,
            options,
            race_pool,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache(&self) -> &Arc<PairCache> {
        &self.cache
    }

    pub fn backends(&self) -> &[Arc<dyn RoutingBackend>] {
        &self.backends
    }

    /// Route from `from` to `to`. Fails only on invalid coordinates; every
    /// backend problem degrades to great-circle distance.
    pub fn resolve(&self, from: Coord, to: Coord) -> Result<RouteRecord> {
        from.validate()?;
        to.validate()?;

        if from == to {
            return Ok(RouteRecord::distance_only(0.0));
        }

        if let Some(record) = self.cache.get(from, to) {
            return Ok(record);
        }

        let key = PairKey::new(from, to).unordered();
        let gate = self.gate_for(key);
        let record = {
            let _held = gate.lock();

            // Another caller may have finished this pair while we waited.
            match self.cache.peek(from, to) {
                Some(record) => record,
                None => {
                    let record = self.fetch(from, to);
                    self.cache.put(from, to, record.clone(), false);
                    record
                }
            }
        };
        self.release_gate(key, &gate);

        Ok(record)
    }

    fn fetch(&self, from: Coord, to: Coord) -> RouteRecord {
        if self.backends.is_empty() || self.options.fallback_only {
            debug!(
                pair = %PairKey::new(from, to),
                "resolver: no backends in use, great-circle distance"
            );
            return fallback(from, to);
        }

        match self.race(from, to) {
            Some(route) => RouteRecord::new(route.geometry, route.distance_meters / 1000.0),
            None => {
                warn!(
                    pair = %PairKey::new(from, to),
                    "resolver: every backend failed, great-circle distance"
                );
                fallback(from, to)
            }
        }
    }

    /// Queries every backend at once and returns the first valid answer.
    /// Losers see the cancel flag between attempts; a request already on the
    /// wire finishes and its result is dropped.
    fn race(&self, from: Coord, to: Coord) -> Option<BackendRoute> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let cancel = Arc::clone(&cancel);
            let tx = tx.clone();
            let retry = self.options.retry;

            self.race_pool.spawn(move || {
                let started = Instant::now();
                let outcome = query_with_retries(backend.as_ref(), from, to, retry, &cancel);
                // The receiver is gone once a sibling won.
                let _ = tx.send((backend.name().to_string(), outcome, started.elapsed()));
            });
        }
        drop(tx);

        for (name, outcome, elapsed) in rx {
            match outcome {
                Ok(route) => {
                    cancel.store(true, Ordering::Release);
                    info!(
                        backend = %name,
                        km = route.distance_meters / 1000.0,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "resolver: race won"
                    );
                    return Some(route);
                }
                Err(err) => {
                    warn!(backend = %name, %err, "resolver: backend gave up on pair");
                }
            }
        }

        None
    }

    fn gate_for(&self, key: PairKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock();
        Arc::clone(in_flight.entry(key).or_default())
    }

    fn release_gate(&self, key: PairKey, gate: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        let idle = in_flight
            .get(&key)
            .map(|current| Arc::ptr_eq(current, gate) && Arc::strong_count(current) == 2)
            .unwrap_or(false);
        if idle {
            in_flight.remove(&key);
        }
    }
}

fn fallback(from: Coord, to: Coord) -> RouteRecord {
    RouteRecord::distance_only(great_circle_km(from, to))
}

fn query_with_retries(
    backend: &dyn RoutingBackend,
    from: Coord,
    to: Coord,
    retry: RetryPolicy,
    cancel: &AtomicBool,
) -> std::result::Result<BackendRoute, BackendError> {
    let attempts = retry.max_attempts.max(1);
    let mut last_error = BackendError::Cancelled;

    for attempt in 1..=attempts {
        if cancel.load(Ordering::Acquire) {
            return Err(BackendError::Cancelled);
        }

        match backend.route(from, to) {
            Ok(route) if route.is_valid() => return Ok(route),
            Ok(route) => {
                last_error = BackendError::Malformed(format!(
                    "distance={} points={}",
                    route.distance_meters,
                    route.geometry.len()
                ));
            }
            Err(err) => last_error = err,
        }

        debug!(
            backend = backend.name(),
            attempt,
            attempts,
            err = %last_error,
            "resolver: attempt failed"
        );
        if attempt < attempts && !sleep_unless_cancelled(retry.delay, cancel) {
            return Err(BackendError::Cancelled);
        }
    }

    Err(last_error)
}

/// Sleeps for `delay` unless cancelled first. Returns `false` on cancellation.
fn sleep_unless_cancelled(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}

/// Asks every backend for `probe` concurrently and returns the ones that
/// answered, fastest first.
pub fn probe_backends(
    backends: &[Arc<dyn RoutingBackend>],
    probe: (Coord, Coord),
) -> Vec<(Arc<dyn RoutingBackend>, Duration)> {
    let mut alive: Vec<(Arc<dyn RoutingBackend>, Duration)> = backends
        .par_iter()
        .filter_map(|backend| {
            let started = Instant::now();
            match backend.route(probe.0, probe.1) {
                Ok(_) => {
                    let latency = started.elapsed();
                    info!(
                        backend = backend.name(),
                        latency_ms = latency.as_millis() as u64,
                        "probe: backend alive"
                    );
                    Some((Arc::clone(backend), latency))
                }
                Err(err) => {
                    warn!(backend = backend.name(), %err, "probe: backend unavailable");
                    None
                }
            }
        })
        .collect();

    alive.sort_by_key(|(_, latency)| *latency);
    alive
}
