//! Coordinates, indexed locations and great-circle distance.
//!
//! Great-circle distance is the last rung of the fallback ladder: it ignores
//! roads but never fails and never touches the network.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
///
/// Equality, ordering and hashing work on the exact bit pattern so coordinates
/// can key maps. Negative zero is folded into positive zero on construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat + 0.0,
            lon: lon + 0.0,
        }
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        let valid = self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon);

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidCoordinate {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

impl From<(f64, f64)> for Coord {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Coord {}

impl PartialOrd for Coord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lat
            .total_cmp(&other.lat)
            .then_with(|| self.lon.total_cmp(&other.lon))
    }
}

impl Hash for Coord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lon.to_bits().hash(state);
    }
}

/// A location with its position in the planning problem. Index 0 is the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub index: usize,
    pub coord: Coord,
}

impl LocationPoint {
    pub fn new(index: usize, coord: Coord) -> Self {
        Self { index, coord }
    }
}

/// Haversine distance between two points in kilometers.
pub fn great_circle_km(from: Coord, to: Coord) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_great_circle_same_point() {
        let here = Coord::new(52.2297, 21.0122);
        assert!(great_circle_km(here, here) < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_great_circle_known_distance() {
        // Warsaw to Krakow, roughly 252 km as the crow flies
        let dist = great_circle_km(Coord::new(52.2297, 21.0122), Coord::new(50.0647, 19.9450));
        assert!(dist > 245.0 && dist < 260.0, "Warsaw to Krakow should be ~252km, got {}", dist);
    }

    #[test]
    fn test_great_circle_symmetric() {
        let a = Coord::new(36.17, -115.14);
        let b = Coord::new(34.05, -118.24);
        assert_eq!(great_circle_km(a, b), great_circle_km(b, a));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(Coord::new(91.0, 0.0).validate().is_err());
        assert!(Coord::new(0.0, -180.5).validate().is_err());
        assert!(Coord::new(f64::NAN, 0.0).validate().is_err());
        assert!(Coord::new(-90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn test_negative_zero_is_normalized() {
        let mut set = HashSet::new();
        set.insert(Coord::new(0.0, 10.0));
        assert!(set.contains(&Coord::new(-0.0, 10.0)));
    }
}
