//! Yen's algorithm for K shortest loopless paths, plus a keyed cache.
//!
//! Spur searches for one iteration are independent, so they run in
//! parallel; candidate selection stays sequential and orders ties by
//! (cost, node sequence) to keep results reproducible.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::graph::RoadGraph;
use crate::search::path::path_weight;

/// One loopless path and its total cost under the chosen attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePath {
    pub nodes: Vec<i64>,
    pub cost: f64,
}

struct Candidate(RoutePath);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest candidate, with equal
        // costs broken by node sequence.
        other
            .0
            .cost
            .partial_cmp(&self.0.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.0.nodes.cmp(&self.0.nodes))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SpurEntry {
    node: i64,
    cost: f64,
}

impl Eq for SpurEntry {}

impl Ord for SpurEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SpurEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Uninstrumented Dijkstra that honors node and edge bans.
fn restricted_shortest(
    graph: &RoadGraph,
    source: i64,
    target: i64,
    weight_attr: &str,
    banned_nodes: &FxHashSet<i64>,
    banned_edges: &FxHashSet<(i64, i64)>,
) -> Option<RoutePath> {
    let mut dist: FxHashMap<i64, f64> = FxHashMap::default();
    let mut prev: FxHashMap<i64, i64> = FxHashMap::default();
    let mut visited: FxHashSet<i64> = FxHashSet::default();
    let mut frontier = BinaryHeap::new();

    dist.insert(source, 0.0);
    frontier.push(SpurEntry { node: source, cost: 0.0 });

    while let Some(SpurEntry { node: current, cost }) = frontier.pop() {
        if !visited.insert(current) {
            continue;
        }
        if current == target {
            let mut nodes = vec![target];
            let mut walk = target;
            while let Some(&p) = prev.get(&walk) {
                nodes.push(p);
                walk = p;
            }
            nodes.reverse();
            return Some(RoutePath { nodes, cost });
        }
        for (neighbor, attrs) in graph.out_edges(current) {
            if visited.contains(&neighbor)
                || banned_nodes.contains(&neighbor)
                || banned_edges.contains(&(current, neighbor))
            {
                continue;
            }
            let candidate = cost + attrs.weight(weight_attr);
            if candidate < dist.get(&neighbor).copied().unwrap_or(f64::INFINITY) {
                dist.insert(neighbor, candidate);
                prev.insert(neighbor, current);
                frontier.push(SpurEntry { node: neighbor, cost: candidate });
            }
        }
    }
    None
}

/// Compute up to `k` loopless paths from `source` to `target`, cheapest
/// first. Fewer than `k` paths is a normal outcome when the graph does
/// not contain that many distinct loopless routes.
pub fn k_shortest_paths(
    graph: &RoadGraph,
    source: i64,
    target: i64,
    k: usize,
    weight_attr: &str,
) -> Vec<RoutePath> {
    if k == 0 {
        return Vec::new();
    }
    let empty_nodes = FxHashSet::default();
    let empty_edges = FxHashSet::default();
    let Some(first) = restricted_shortest(graph, source, target, weight_attr, &empty_nodes, &empty_edges)
    else {
        return Vec::new();
    };

    let mut seen: FxHashSet<Vec<i64>> = FxHashSet::default();
    seen.insert(first.nodes.clone());
    let mut accepted = vec![first];
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();

    while accepted.len() < k {
        let Some(last) = accepted.last() else { break };
        let prev_nodes = last.nodes.clone();

        let spurs: Vec<RoutePath> = (0..prev_nodes.len().saturating_sub(1))
            .into_par_iter()
            .filter_map(|i| {
                let spur_node = prev_nodes[i];
                let root = &prev_nodes[..=i];

                // Ban the outgoing edge each already-accepted path with the
                // same root takes, plus the root nodes before the spur, so
                // the spur search yields a new loopless continuation.
                let mut banned_edges = FxHashSet::default();
                for path in &accepted {
                    if path.nodes.len() > i + 1 && path.nodes[..=i] == *root {
                        banned_edges.insert((path.nodes[i], path.nodes[i + 1]));
                    }
                }
                let banned_nodes: FxHashSet<i64> = root[..i].iter().copied().collect();

                let spur = restricted_shortest(
                    graph,
                    spur_node,
                    target,
                    weight_attr,
                    &banned_nodes,
                    &banned_edges,
                )?;
                let mut nodes = root[..i].to_vec();
                nodes.extend_from_slice(&spur.nodes);
                let cost = path_weight(graph, &nodes, weight_attr);
                Some(RoutePath { nodes, cost })
            })
            .collect();

        for spur in spurs {
            if seen.insert(spur.nodes.clone()) {
                candidates.push(Candidate(spur));
            }
        }

        match candidates.pop() {
            Some(Candidate(best)) => accepted.push(best),
            None => break,
        }
    }

    debug!(
        source,
        target,
        requested = k,
        found = accepted.len(),
        "k shortest paths computed"
    );
    accepted
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathKey {
    source: i64,
    target: i64,
    k: usize,
    weight_attr: String,
}

/// Cache of alternative-path results, keyed by the full query.
///
/// Owned by the session that owns the graph; a rebuild replaces the cache
/// wholesale and [`PathCache::invalidate`] clears it in place.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: FxHashMap<PathKey, Vec<RoutePath>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached paths for the query, computing and storing them on miss.
    pub fn get_or_compute(
        &mut self,
        graph: &RoadGraph,
        source: i64,
        target: i64,
        k: usize,
        weight_attr: &str,
    ) -> &[RoutePath] {
        let key = PathKey { source, target, k, weight_attr: weight_attr.to_string() };
        self.entries
            .entry(key)
            .or_insert_with(|| k_shortest_paths(graph, source, target, k, weight_attr))
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
