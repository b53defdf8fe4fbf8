//! Instrumented Dijkstra over non-negative edge weights.
//!
//! The frontier is a binary heap with lazy deletion: a node may be pushed
//! several times and stale entries are skipped when popped. Every pop,
//! settle, comparison and improvement is recorded in the trace.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::graph::RoadGraph;
use crate::search::trace::{StepTrace, TraceStep};
use crate::search::{DistanceMap, PredecessorMap, SearchRun};

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrontierEntry {
    node: i64,
    distance: f64,
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior in BinaryHeap.
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Run Dijkstra from `source`, stopping once `target` is settled.
///
/// A target that is never reached leaves the search to exhaust the
/// reachable component; the result then carries an infinite target
/// distance and an empty path on reconstruction.
pub fn dijkstra(graph: &RoadGraph, source: i64, target: i64, weight_attr: &str) -> SearchRun {
    let mut distances = DistanceMap::default();
    let mut predecessors = PredecessorMap::default();
    let mut steps = StepTrace::new();
    let mut visited: FxHashSet<i64> = FxHashSet::default();
    let mut frontier = BinaryHeap::new();

    distances.set(source, 0.0);
    frontier.push(FrontierEntry { node: source, distance: 0.0 });

    while let Some(FrontierEntry { node: current, distance }) = frontier.pop() {
        steps.push(TraceStep::Examine { node: current, distance });

        if !visited.insert(current) {
            steps.push(TraceStep::Skip { node: current });
            continue;
        }
        steps.push(TraceStep::Visit { node: current });

        if current == target {
            steps.push(TraceStep::TargetReached { node: current });
            break;
        }

        for (neighbor, attrs) in graph.out_edges(current) {
            if visited.contains(&neighbor) {
                continue;
            }
            let candidate = distances.get(current) + attrs.weight(weight_attr);
            let old = distances.get(neighbor);
            steps.push(TraceStep::CheckNeighbor {
                node: current,
                neighbor,
                old_distance: old,
                new_distance: candidate,
            });
            if candidate < old {
                distances.set(neighbor, candidate);
                predecessors.set(neighbor, current);
                frontier.push(FrontierEntry { node: neighbor, distance: candidate });
                steps.push(TraceStep::Update {
                    node: neighbor,
                    distance: candidate,
                    predecessor: current,
                });
            }
        }
    }

    trace!(
        source,
        target,
        steps = steps.len(),
        settled = visited.len(),
        "dijkstra finished"
    );
    SearchRun { source, target, distances, predecessors, trace: steps }
}
