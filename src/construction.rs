//! Tour construction heuristics.

use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;
use crate::tour::{DEPOT, Tour};

/// Greedy tour: from the depot, always move to the closest unvisited node.
/// Ties go to the lowest index; missing distances count as unreachable but a
/// node is still chosen when nothing reachable is left.
pub fn nearest_neighbor(matrix: &DistanceMatrix) -> Result<Tour> {
    let n = matrix.size();
    if n == 0 {
        return Err(Error::invalid_input("cannot build a tour over zero locations"));
    }
    let mut stops = Vec::with_capacity(n + 1);
    let mut visited = vec![false; n];
    stops.push(DEPOT);
    visited[DEPOT] = true;

    let mut current = DEPOT;
    for _ in 1..n {
        let mut best: Option<(usize, f64)> = None;
        for candidate in (0..n).filter(|&node| !visited[node]) {
            let cost = matrix.cost(current, candidate);
            match best {
                Some((_, best_cost)) if cost >= best_cost => {}
                _ => best = Some((candidate, cost)),
            }
        }

        let Some((next, _)) = best else { break };
        visited[next] = true;
        stops.push(next);
        current = next;
    }
    stops.push(DEPOT);

    Tour::new(stops, n)
}

/// MST-based 2-approximation: Prim's tree rooted at the depot, walked in
/// depth-first preorder with children in index order.
pub fn mst_preorder(matrix: &DistanceMatrix) -> Result<Tour> {
    let n = matrix.size();
    if n == 0 {
        return Err(Error::invalid_input("cannot build a tour over zero locations"));
    }
    let children = minimum_spanning_tree(matrix);

    let mut stops = Vec::with_capacity(n + 1);
    let mut stack = vec![DEPOT];
    while let Some(node) = stack.pop() {
        stops.push(node);
        stack.extend(children[node].iter().rev());
    }
    stops.push(DEPOT);

    Tour::new(stops, n)
}

/// Children lists of the minimum spanning tree rooted at the depot.
///
/// Edge weight is the distance in index order, falling back to the opposite
/// direction; pairs with neither are infinite and only used when nothing
/// else connects the remaining nodes.
pub fn minimum_spanning_tree(matrix: &DistanceMatrix) -> Vec<Vec<usize>> {
    let n = matrix.size();
    let weight = |a: usize, b: usize| {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        matrix
            .distance(lo, hi)
            .or_else(|| matrix.distance(hi, lo))
            .unwrap_or(f64::INFINITY)
    };

    let mut children = vec![Vec::new(); n];
    if n == 0 {
        return children;
    }

    let mut in_tree = vec![false; n];
    let mut key: Vec<f64> = (0..n).map(|v| weight(DEPOT, v)).collect();
    let mut parent = vec![DEPOT; n];
    in_tree[DEPOT] = true;

    for _ in 1..n {
        let mut next: Option<usize> = None;
        for v in (0..n).filter(|&v| !in_tree[v]) {
            match next {
                Some(u) if key[v] >= key[u] => {}
                _ => next = Some(v),
            }
        }
        let Some(u) = next else { break };

        in_tree[u] = true;
        children[parent[u]].push(u);

        for v in (0..n).filter(|&v| !in_tree[v]) {
            let w = weight(u, v);
            if w < key[v] {
                key[v] = w;
                parent[v] = u;
            }
        }
    }

    for list in &mut children {
        list.sort_unstable();
    }
    children
}
