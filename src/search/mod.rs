//! Instrumented shortest-path search: engines, traces and reconstruction.

pub mod bellman_ford;
pub mod dijkstra;
pub mod explain;
pub mod path;
pub mod trace;
pub mod yen;

pub use bellman_ford::bellman_ford;
pub use dijkstra::dijkstra;
pub use explain::{explain_negative_cycle, explain_run};
pub use path::{path_weight, reconstruct_path};
pub use trace::{StepTrace, TraceStep};
pub use yen::{k_shortest_paths, PathCache, RoutePath};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Engine selector carried through session and CLI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Dijkstra,
    BellmanFord,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Dijkstra => write!(f, "dijkstra"),
            Algorithm::BellmanFord => write!(f, "bellman-ford"),
        }
    }
}

/// Best known distances, with infinity for nodes never reached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceMap {
    inner: FxHashMap<i64, f64>,
}

impl DistanceMap {
    /// Distance of `node`, infinity when unreached.
    pub fn get(&self, node: i64) -> f64 {
        self.inner.get(&node).copied().unwrap_or(f64::INFINITY)
    }

    pub(crate) fn set(&mut self, node: i64, distance: f64) {
        self.inner.insert(node, distance);
    }

    /// Nodes with a finite distance, in no particular order.
    pub fn reached(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.inner.iter().map(|(&n, &d)| (n, d))
    }

    pub fn reached_count(&self) -> usize {
        self.inner.len()
    }
}

/// Shortest-path tree edges: each entry maps a node to its predecessor.
/// Nodes without an entry were never relaxed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredecessorMap {
    inner: FxHashMap<i64, i64>,
}

impl PredecessorMap {
    pub fn get(&self, node: i64) -> Option<i64> {
        self.inner.get(&node).copied()
    }

    pub(crate) fn set(&mut self, node: i64, predecessor: i64) {
        self.inner.insert(node, predecessor);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Output of a completed engine run.
#[derive(Debug, Clone)]
pub struct SearchRun {
    pub source: i64,
    pub target: i64,
    pub distances: DistanceMap,
    pub predecessors: PredecessorMap,
    pub trace: StepTrace,
}

impl SearchRun {
    /// Distance to the requested target, infinity when unreachable.
    pub fn target_distance(&self) -> f64 {
        self.distances.get(self.target)
    }
}

/// Failure result of Bellman-Ford: a negative-weight cycle makes shortest
/// distances undefined. The trace up to and including the detection step is
/// preserved for rendering.
#[derive(Debug, Clone, thiserror::Error)]
#[error("negative-weight cycle via edge {from} -> {to}")]
pub struct NegativeCycle {
    // Raw identifier opts out of thiserror's implicit `source()` inference:
    // this is a graph node id, not an inner error.
    pub r#source: i64,
    pub target: i64,
    pub from: i64,
    pub to: i64,
    pub trace: StepTrace,
}
