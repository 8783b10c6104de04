//! Parallel best-improvement 2-opt.
//!
//! Each round splits the first-position range across the worker pool, every
//! worker reports the best move in its slice, and only the single best move
//! overall is applied. Ties go to the lowest (i, j). Rounds stop when no move
//! improves the tour or the round cap is reached, so the result is never
//! longer than the seed.

use std::cmp::Ordering;
use std::ops::Range;

use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::matrix::DistanceMatrix;
use crate::tour::Tour;

/// Smallest gain accepted as an improvement.
const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Move {
    i: usize,
    j: usize,
    delta: f64,
}

impl Move {
    fn better_than(&self, other: &Move) -> bool {
        match self.delta.total_cmp(&other.delta) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => (self.i, self.j) < (other.i, other.j),
        }
    }
}

pub struct TwoOptImprover {
    pool: rayon::ThreadPool,
    workers: usize,
    max_rounds: usize,
}

impl TwoOptImprover {
    pub fn new(workers: usize, max_rounds: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("two-opt-{idx}"))
            .build()?;

        Ok(Self {
            pool,
            workers,
            max_rounds,
        })
    }

    pub fn improve(&self, seed: &Tour, matrix: &DistanceMatrix) -> Result<Tour> {
        let symmetric = matrix.is_symmetric();
        let mut stops = seed.stops().to_vec();
        let mut current = seed.distance(matrix);
        let mut rounds = 0;

        while rounds < self.max_rounds {
            let Some(best) = self.best_move(&stops, matrix, symmetric) else {
                break;
            };

            stops[best.i..=best.j].reverse();
            let updated = path_cost(&stops, matrix);
            if updated > current {
                // Rounding made a marginal move look like a gain.
                stops[best.i..=best.j].reverse();
                break;
            }

            rounds += 1;
            debug!(round = rounds, i = best.i, j = best.j, km = updated, "two-opt: applied move");
            current = updated;
        }

        debug!(rounds, km = current, "two-opt: converged");
        Tour::new(stops, seed.node_count())
    }

    fn best_move(&self, stops: &[usize], matrix: &DistanceMatrix, symmetric: bool) -> Option<Move> {
        let ranges = split_positions(stops.len(), self.workers);
        if ranges.is_empty() {
            return None;
        }

        self.pool.install(|| {
            ranges
                .into_par_iter()
                .filter_map(|range| best_in_range(stops, matrix, symmetric, range))
                .reduce_with(|a, b| if b.better_than(&a) { b } else { a })
        })
    }
}

/// Splits the valid first positions `1..len-2` into at most `workers` slices.
fn split_positions(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len < 4 {
        return Vec::new();
    }
    let (start, end) = (1, len - 2);
    let chunk = (end - start).div_ceil(workers.max(1));

    (start..end)
        .step_by(chunk)
        .map(|lo| lo..(lo + chunk).min(end))
        .collect()
}

fn best_in_range(
    stops: &[usize],
    matrix: &DistanceMatrix,
    symmetric: bool,
    range: Range<usize>,
) -> Option<Move> {
    let last = stops.len() - 1;
    let mut best: Option<Move> = None;

    for i in range {
        for j in i + 1..last {
            let Some(delta) = reversal_delta(stops, matrix, symmetric, i, j) else {
                continue;
            };
            if delta >= -MIN_GAIN {
                continue;
            }

            let candidate = Move { i, j, delta };
            if best.is_none_or(|current| candidate.better_than(&current)) {
                best = Some(candidate);
            }
        }
    }

    best
}

/// Cost change of reversing `stops[i..=j]`, or `None` when the reversed tour
/// would use a missing edge.
fn reversal_delta(
    stops: &[usize],
    matrix: &DistanceMatrix,
    symmetric: bool,
    i: usize,
    j: usize,
) -> Option<f64> {
    let (a, b, c, d) = (stops[i - 1], stops[i], stops[j], stops[j + 1]);

    let mut added = matrix.distance(a, c)? + matrix.distance(b, d)?;
    let mut removed = matrix.cost(a, b) + matrix.cost(c, d);

    if !symmetric {
        for k in i..j {
            added += matrix.distance(stops[k + 1], stops[k])?;
            removed += matrix.cost(stops[k], stops[k + 1]);
        }
    }

    Some(added - removed)
}

fn path_cost(stops: &[usize], matrix: &DistanceMatrix) -> f64 {
    stops.windows(2).map(|pair| matrix.cost(pair[0], pair[1])).sum()
}
