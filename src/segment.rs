//! Splits a tour into daily legs under a distance cap.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;
use crate::tour::Tour;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub distance_km: f64,
}

/// Consecutive tour edges driven on one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySegment {
    pub edges: Vec<Edge>,
    pub distance_km: f64,
}

impl DaySegment {
    fn push(&mut self, edge: Edge) {
        self.distance_km += edge.distance_km;
        self.edges.push(edge);
    }

    /// Location indices in driving order, both ends included.
    pub fn stops(&self) -> Vec<usize> {
        let mut stops: Vec<usize> = self.edges.iter().map(|edge| edge.from).collect();
        stops.extend(self.edges.last().map(|edge| edge.to));
        stops
    }
}

/// Greedy segmentation. A day is closed as soon as the next edge would push it
/// past `max_daily_km`; an edge longer than the cap still gets a day of its
/// own, edges are never split.
pub fn segment(tour: &Tour, matrix: &DistanceMatrix, max_daily_km: f64) -> Result<Vec<DaySegment>> {
    if !(max_daily_km.is_finite() && max_daily_km > 0.0) {
        return Err(Error::invalid_input(format!("daily cap must be positive, got {max_daily_km}")));
    }

    let mut days = Vec::new();
    let mut current = DaySegment::default();

    for (from, to) in tour.edges() {
        let distance_km = matrix.distance(from, to).ok_or(Error::IncompleteRoute { from, to })?;
        let edge = Edge { from, to, distance_km };

        if !current.edges.is_empty() && current.distance_km + distance_km > max_daily_km {
            days.push(std::mem::take(&mut current));
        }
        current.push(edge);
    }

    if !current.edges.is_empty() {
        days.push(current);
    }
    Ok(days)
}
