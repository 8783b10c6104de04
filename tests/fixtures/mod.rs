//! Test fixtures for route-planner.
//!
//! Provides:
//! - Real Polish city coordinates (from OpenStreetMap)
//! - In-process routing backends with scripted latency and failures

#![allow(dead_code)]

pub mod polish_cities;

pub use polish_cities::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use route_planner::error::BackendError;
use route_planner::geo::{Coord, great_circle_km};
use route_planner::polyline::Polyline;
use route_planner::traits::{BackendRoute, RoutingBackend};

/// How a [`MockBackend`] answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Road distance is the great-circle distance times this factor.
    Detour(f64),
    /// Fixed road distance in kilometers for every pair.
    Fixed(f64),
    /// Distances looked up by coordinate in a symmetric table.
    Table(Vec<(Coord, Coord, f64)>),
    /// Always fails.
    Fail(BackendError),
    /// Fails the first `n` calls with a timeout, then behaves like `Detour(1.0)`.
    FlakyFirst(usize),
}

/// Scripted backend that counts every call.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    latency: Duration,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            latency: Duration::ZERO,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn route(&self, from: Coord, to: Coord) -> Result<BackendRoute, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let km = match &self.behavior {
            Behavior::Detour(factor) => great_circle_km(from, to) * factor,
            Behavior::Fixed(km) => *km,
            Behavior::Table(rows) => rows
                .iter()
                .find(|(a, b, _)| (*a == from && *b == to) || (*a == to && *b == from))
                .map(|(_, _, km)| *km)
                .ok_or_else(|| BackendError::Status(404))?,
            Behavior::Fail(err) => return Err(err.clone()),
            Behavior::FlakyFirst(n) if call < *n => return Err(BackendError::Timeout),
            Behavior::FlakyFirst(_) => great_circle_km(from, to),
        };

        Ok(straight_route(from, to, km))
    }
}

/// A two-point geometry from `from` to `to` with the given length.
pub fn straight_route(from: Coord, to: Coord, km: f64) -> BackendRoute {
    BackendRoute {
        geometry: Polyline::new(vec![from.as_tuple(), to.as_tuple()]),
        distance_meters: km * 1000.0,
    }
}

/// Four stops with the textbook distances 0-1:10, 0-2:15, 0-3:20, 1-2:35,
/// 1-3:25, 2-3:30.
pub fn four_city_table() -> (Vec<Coord>, Vec<(Coord, Coord, f64)>) {
    let coords = vec![WARSAW, LODZ, RADOM, PLOCK];
    let rows = vec![
        (coords[0], coords[1], 10.0),
        (coords[0], coords[2], 15.0),
        (coords[0], coords[3], 20.0),
        (coords[1], coords[2], 35.0),
        (coords[1], coords[3], 25.0),
        (coords[2], coords[3], 30.0),
    ];
    (coords, rows)
}
