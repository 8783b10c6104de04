//! Closed visiting sequences over matrix indices.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;

/// Index of the start/end location.
pub const DEPOT: usize = 0;

/// A Hamiltonian cycle starting and ending at the depot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tour {
    stops: Vec<usize>,
}

impl Tour {
    /// Validates that `stops` visits each of `node_count` nodes once and
    /// returns to the depot.
    pub fn new(stops: Vec<usize>, node_count: usize) -> Result<Self> {
        if node_count == 0 {
            return Err(Error::invalid_input("tour over an empty location set"));
        }
        if stops.len() != node_count + 1 {
            return Err(Error::invalid_input(format!(
                "tour has {} stops, expected {}",
                stops.len(),
                node_count + 1
            )));
        }
        if stops.first() != Some(&DEPOT) || stops.last() != Some(&DEPOT) {
            return Err(Error::invalid_input("tour must start and end at the depot"));
        }

        let mut seen = vec![false; node_count];
        seen[DEPOT] = true;
        for &stop in &stops[1..stops.len() - 1] {
            if stop >= node_count || seen[stop] {
                return Err(Error::invalid_input(format!(
                    "stop {stop} is out of range or repeated"
                )));
            }
            seen[stop] = true;
        }

        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    pub fn into_stops(self) -> Vec<usize> {
        self.stops
    }

    /// Number of distinct locations, depot included.
    pub fn node_count(&self) -> usize {
        self.stops.len() - 1
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.stops.windows(2).map(|pair| (pair[0], pair[1]))
    }

    /// Total length; infinite if any edge is missing from the matrix.
    pub fn distance(&self, matrix: &DistanceMatrix) -> f64 {
        self.edges().map(|(from, to)| matrix.cost(from, to)).sum()
    }

    pub fn first_missing_edge(&self, matrix: &DistanceMatrix) -> Option<(usize, usize)> {
        self.edges().find(|&(from, to)| matrix.distance(from, to).is_none())
    }

    pub fn is_complete(&self, matrix: &DistanceMatrix) -> bool {
        self.first_missing_edge(matrix).is_none()
    }
}
