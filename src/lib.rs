//! route-planner core
//!
//! Durable route caches, a racing multi-backend resolver, tour heuristics
//! with parallel 2-opt, and daily segmentation of the chosen tour.

pub mod builder;
pub mod config;
pub mod construction;
pub mod error;
pub mod geo;
pub mod matrix;
pub mod osrm;
pub mod pair_cache;
pub mod persistence;
pub mod planner;
pub mod polyline;
pub mod report;
pub mod resolver;
pub mod result_cache;
pub mod segment;
pub mod solver;
pub mod tour;
pub mod traits;
pub mod two_opt;

pub use builder::MatrixBuilder;
pub use config::PlannerConfig;
pub use error::{BackendError, Error, Result};
pub use geo::{Coord, LocationPoint, great_circle_km};
pub use matrix::{DistanceMatrix, MatrixSnapshot, MatrixStore, RouteMatrix, location_set_key};
pub use pair_cache::{CacheStats, PairCache, PairKey, RouteRecord};
pub use persistence::PersistenceManager;
pub use planner::{PlanResult, RoutePlanner};
pub use polyline::Polyline;
pub use resolver::{ResolverOptions, RetryPolicy, RouteResolver};
pub use segment::{DaySegment, segment};
pub use solver::{Candidate, Coordinator, Heuristic, SolveOptions};
pub use tour::Tour;
pub use traits::{BackendRoute, RoutingBackend};
pub use two_opt::TwoOptImprover;
