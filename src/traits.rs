//! Seams to the outside world.

use crate::error::BackendError;
use crate::geo::Coord;
use crate::polyline::Polyline;

/// A route as a backend reports it, before unit normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRoute {
    pub geometry: Polyline,
    pub distance_meters: f64,
}

impl BackendRoute {
    /// A route is usable when its distance is a finite non-negative number and
    /// its geometry has at least both endpoints.
    pub fn is_valid(&self) -> bool {
        self.distance_meters.is_finite() && self.distance_meters >= 0.0 && self.geometry.len() >= 2
    }
}

/// A remote routing service. Several of them form the race set of the
/// resolver.
///
/// Implementations must be cheap to call from many threads at once and must
/// bound every request by their own timeout.
pub trait RoutingBackend: Send + Sync {
    /// Identifier used in logs, usually the base URL.
    fn name(&self) -> &str;

    fn route(&self, from: Coord, to: Coord) -> Result<BackendRoute, BackendError>;
}
