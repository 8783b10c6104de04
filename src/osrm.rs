//! OSRM HTTP adapter for point-to-point routes.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{BackendError, Result};
use crate::geo::Coord;
use crate::polyline::Polyline;
use crate::traits::{BackendRoute, RoutingBackend};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmBackend {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmBackend {
    pub fn new(config: OsrmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn route_url(&self, from: Coord, to: Coord) -> String {
        format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            from.lon,
            from.lat,
            to.lon,
            to.lat
        )
    }
}

impl RoutingBackend for OsrmBackend {
    fn name(&self) -> &str {
        &self.config.base_url
    }

    fn route(&self, from: Coord, to: Coord) -> std::result::Result<BackendRoute, BackendError> {
        let body = self
            .client
            .get(self.route_url(from, to))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())?;

        parse_route_body(&body)
    }
}

/// Extracts the first route of an OSRM `route` service response.
pub fn parse_route_body(body: &str) -> std::result::Result<BackendRoute, BackendError> {
    let response: OsrmRouteResponse =
        serde_json::from_str(body).map_err(|err| BackendError::Malformed(err.to_string()))?;

    if response.code != "Ok" {
        return Err(BackendError::Malformed(format!(
            "code {}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Malformed("no routes in response".to_string()))?;

    // GeoJSON orders positions as [lon, lat].
    let points = route
        .geometry
        .coordinates
        .into_iter()
        .map(|position| (position[1], position[0]))
        .collect();

    let parsed = BackendRoute {
        geometry: Polyline::new(points),
        distance_meters: route.distance,
    };

    if parsed.is_valid() {
        Ok(parsed)
    } else {
        Err(BackendError::Malformed(format!(
            "unusable route: distance={} points={}",
            parsed.distance_meters,
            parsed.geometry.len()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}
