//! Path reconstruction from predecessor maps.

use crate::error::SearchError;
use crate::graph::RoadGraph;
use crate::search::PredecessorMap;

/// Walk the predecessor map from `target` back to `source`.
///
/// Returns the node sequence source..=target, or an empty sequence when no
/// path exists. A walk that runs longer than `node_count` steps means the
/// map contains a cycle and is reported as an error rather than looping.
pub fn reconstruct_path(
    predecessors: &PredecessorMap,
    source: i64,
    target: i64,
    node_count: usize,
) -> Result<Vec<i64>, SearchError> {
    if source == target {
        return Ok(vec![source]);
    }
    if predecessors.get(target).is_none() {
        return Ok(Vec::new());
    }

    let mut path = vec![target];
    let mut current = target;
    while let Some(previous) = predecessors.get(current) {
        path.push(previous);
        current = previous;
        if path.len() > node_count {
            return Err(SearchError::MalformedPredecessorMap {
                start: target,
                limit: node_count,
            });
        }
    }

    // A finished walk that never arrived at the source means the map was
    // built for a different source; treat it as no path.
    if path.last() != Some(&source) {
        return Ok(Vec::new());
    }

    path.reverse();
    Ok(path)
}

/// Total weight of a node sequence under the named attribute.
pub fn path_weight(graph: &RoadGraph, path: &[i64], weight_attr: &str) -> f64 {
    path.windows(2)
        .map(|pair| graph.weight(pair[0], pair[1], weight_attr))
        .sum()
}
