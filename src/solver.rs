//! Runs the tour heuristics side by side and picks the shortest tour.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::construction::{mst_preorder, nearest_neighbor};
use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;
use crate::tour::Tour;
use crate::two_opt::TwoOptImprover;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Threads for the 2-opt neighborhood scan.
    pub workers: usize,
    /// Upper bound on applied 2-opt moves.
    pub max_rounds: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_rounds: 1000,
        }
    }
}

/// Heuristics in selection priority: on equal distance the earlier one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Heuristic {
    TwoOptNearestNeighbor,
    NearestNeighbor,
    MstPreorder,
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Heuristic::TwoOptNearestNeighbor => "2-opt(nearest-neighbor)",
            Heuristic::NearestNeighbor => "nearest-neighbor",
            Heuristic::MstPreorder => "mst-preorder",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub heuristic: Heuristic,
    pub tour: Tour,
    pub distance_km: f64,
    /// Wall time to produce this tour, including any seed it was built from.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub best: Candidate,
    /// Every complete candidate, in priority order.
    pub candidates: Vec<Candidate>,
}

pub struct Coordinator {
    pool: rayon::ThreadPool,
    improver: TwoOptImprover,
}

impl Coordinator {
    pub fn new(options: SolveOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|idx| format!("tour-{idx}"))
            .build()?;
        let improver = TwoOptImprover::new(options.workers, options.max_rounds)?;

        Ok(Self { pool, improver })
    }

    /// Nearest-neighbor feeds straight into 2-opt while the MST tour is built
    /// on the other thread. Tours that use a missing edge are dropped; if none
    /// is left the first missing edge is reported.
    pub fn solve(&self, matrix: &DistanceMatrix) -> Result<SolveOutcome> {
        let started = Instant::now();

        let (greedy, mst) = self.pool.install(|| {
            rayon::join(
                || -> Result<(Candidate, Candidate)> {
                    let seed = nearest_neighbor(matrix)?;
                    let raw = candidate(Heuristic::NearestNeighbor, seed, matrix, started);
                    let improved = self.improver.improve(&raw.tour, matrix)?;
                    let improved =
                        candidate(Heuristic::TwoOptNearestNeighbor, improved, matrix, started);
                    Ok((improved, raw))
                },
                || -> Result<Candidate> {
                    let mst_started = Instant::now();
                    let tour = mst_preorder(matrix)?;
                    Ok(candidate(Heuristic::MstPreorder, tour, matrix, mst_started))
                },
            )
        });
        let (improved, raw) = greedy?;
        let mut finished = vec![improved, raw, mst?];

        for found in &finished {
            info!(
                heuristic = %found.heuristic,
                km = found.distance_km,
                elapsed_ms = found.elapsed.as_millis() as u64,
                "solver: candidate finished"
            );
        }

        let first_gap = finished[0].tour.first_missing_edge(matrix);
        finished.retain(|found| match found.tour.first_missing_edge(matrix) {
            None => true,
            Some((from, to)) => {
                warn!(
                    heuristic = %found.heuristic,
                    from,
                    to,
                    "solver: candidate uses a missing edge"
                );
                false
            }
        });
        finished.sort_by_key(|found| found.heuristic);

        let Some(best) = select_best(&finished).cloned() else {
            let (from, to) = first_gap.unwrap_or((0, 0));
            return Err(Error::IncompleteRoute { from, to });
        };

        info!(
            heuristic = %best.heuristic,
            km = best.distance_km,
            total_ms = started.elapsed().as_millis() as u64,
            "solver: selected tour"
        );

        Ok(SolveOutcome {
            best,
            candidates: finished,
        })
    }
}

/// Shortest candidate; ties go to the higher-priority heuristic.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.heuristic.cmp(&b.heuristic))
    })
}

fn candidate(
    heuristic: Heuristic,
    tour: Tour,
    matrix: &DistanceMatrix,
    started: Instant,
) -> Candidate {
    Candidate {
        heuristic,
        distance_km: tour.distance(matrix),
        tour,
        elapsed: started.elapsed(),
    }
}
