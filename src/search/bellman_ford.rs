//! Instrumented Bellman-Ford with early termination and cycle detection.
//!
//! Rounds are numbered from 1 and each edge test is recorded, so traces
//! grow as rounds * edges. After relaxation settles (or node-count minus
//! one rounds elapse) a final pass over all edges looks for one that
//! would still relax; finding one proves a reachable negative-weight
//! cycle and the run fails.

use tracing::trace;

use crate::graph::RoadGraph;
use crate::search::trace::{StepTrace, TraceStep};
use crate::search::{DistanceMap, NegativeCycle, PredecessorMap, SearchRun};

/// Run Bellman-Ford from `source`. Unlike Dijkstra this never stops at
/// `target` early; the target only shapes the returned run.
pub fn bellman_ford(
    graph: &RoadGraph,
    source: i64,
    target: i64,
    weight_attr: &str,
) -> Result<SearchRun, NegativeCycle> {
    let mut distances = DistanceMap::default();
    let mut predecessors = PredecessorMap::default();
    let mut steps = StepTrace::new();

    distances.set(source, 0.0);

    let rounds = graph.node_count().saturating_sub(1);
    for round in 1..=rounds {
        steps.push(TraceStep::Iteration { round });
        let mut updated = false;

        for (from, to, attrs) in graph.edges() {
            let weight = attrs.weight(weight_attr);
            let from_distance = distances.get(from);
            let to_distance = distances.get(to);
            steps.push(TraceStep::CheckEdge { from, to, from_distance, to_distance, weight });

            if from_distance.is_finite() && from_distance + weight < to_distance {
                let improved = from_distance + weight;
                distances.set(to, improved);
                predecessors.set(to, from);
                updated = true;
                steps.push(TraceStep::Update { node: to, distance: improved, predecessor: from });
            }
        }

        if !updated {
            steps.push(TraceStep::EarlyTermination { round });
            break;
        }
    }

    // Verification pass: any edge that still relaxes proves a cycle.
    for (from, to, attrs) in graph.edges() {
        let from_distance = distances.get(from);
        if from_distance.is_finite()
            && from_distance + attrs.weight(weight_attr) < distances.get(to)
        {
            steps.push(TraceStep::NegativeCycle { from, to });
            trace!(from, to, "negative-weight cycle detected");
            return Err(NegativeCycle { source, target, from, to, trace: steps });
        }
    }

    trace!(
        source,
        target,
        steps = steps.len(),
        reached = distances.reached_count(),
        "bellman-ford finished"
    );
    Ok(SearchRun { source, target, distances, predecessors, trace: steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, GraphLimits, RawEdge, RawNetwork, RawNode, RoadGraph};
    use crate::search::{dijkstra, reconstruct_path};

    fn weighted(from: i64, to: i64, w: f64) -> RawEdge {
        RawEdge { from, to, attrs: EdgeAttrs::new().with("length", w) }
    }

    fn graph(nodes: &[i64], edges: Vec<RawEdge>) -> RoadGraph {
        let network = RawNetwork {
            nodes: nodes
                .iter()
                .map(|&id| RawNode { id, lat: 0.0, lon: id as f64 })
                .collect(),
            edges,
        };
        RoadGraph::from_network(network, &GraphLimits::default()).unwrap()
    }

    #[test]
    fn test_matches_dijkstra_on_diamond() {
        let g = graph(
            &[1, 2, 3, 4],
            vec![weighted(1, 2, 2.0), weighted(2, 4, 3.0), weighted(1, 3, 4.0), weighted(3, 4, 5.0)],
        );
        let bf = bellman_ford(&g, 1, 4, "length").unwrap();
        let dj = dijkstra(&g, 1, 4, "length");
        assert_eq!(bf.target_distance(), dj.target_distance());

        let bf_path = reconstruct_path(&bf.predecessors, 1, 4, g.node_count()).unwrap();
        let dj_path = reconstruct_path(&dj.predecessors, 1, 4, g.node_count()).unwrap();
        assert_eq!(bf_path, dj_path);
    }

    #[test]
    fn test_rounds_are_one_based() {
        let g = graph(&[1, 2], vec![weighted(1, 2, 1.0)]);
        let run = bellman_ford(&g, 1, 2, "length").unwrap();
        assert_eq!(run.trace.steps()[0], TraceStep::Iteration { round: 1 });
    }

    #[test]
    fn test_early_termination_on_settled_round() {
        // A 3-node line settles in round 1; round 2 has no updates and
        // must end with the marker instead of running further rounds.
        let g = graph(&[1, 2, 3], vec![weighted(1, 2, 1.0), weighted(2, 3, 1.0)]);
        let run = bellman_ford(&g, 1, 3, "length").unwrap();
        assert!(run
            .trace
            .iter()
            .any(|s| matches!(s, TraceStep::EarlyTermination { round: 2 })));
        let rounds = run
            .trace
            .iter()
            .filter(|s| matches!(s, TraceStep::Iteration { .. }))
            .count();
        assert_eq!(rounds, 2);
    }

    #[test]
    fn test_handles_negative_edges_without_cycle() {
        // Dijkstra territory ends here: a negative edge shortens 1 -> 3.
        let g = graph(
            &[1, 2, 3],
            vec![weighted(1, 2, 5.0), weighted(2, 3, -3.0), weighted(1, 3, 4.0)],
        );
        let run = bellman_ford(&g, 1, 3, "length").unwrap();
        assert_eq!(run.target_distance(), 2.0);
        let path = reconstruct_path(&run.predecessors, 1, 3, g.node_count()).unwrap();
        assert_eq!(path, vec![1, 2, 3]);
    }

    #[test]
    fn test_negative_cycle_fails_the_run() {
        // 2 -> 3 -> 4 -> 2 sums to -1.
        let g = graph(
            &[1, 2, 3, 4],
            vec![
                weighted(1, 2, 1.0),
                weighted(2, 3, 2.0),
                weighted(3, 4, 2.0),
                weighted(4, 2, -5.0),
            ],
        );
        let err = bellman_ford(&g, 1, 4, "length").unwrap_err();
        assert!(g.has_edge(err.from, err.to));
        assert!(matches!(
            err.trace.steps().last(),
            Some(TraceStep::NegativeCycle { .. })
        ));
    }

    #[test]
    fn test_unreachable_component_stays_infinite() {
        let g = graph(&[1, 2, 3], vec![weighted(1, 2, 1.0)]);
        let run = bellman_ford(&g, 1, 3, "length").unwrap();
        assert_eq!(run.target_distance(), f64::INFINITY);
        assert_eq!(run.distances.get(2), 1.0);
    }

    #[test]
    fn test_single_node_graph() {
        let g = graph(&[1], vec![]);
        let run = bellman_ford(&g, 1, 1, "length").unwrap();
        assert_eq!(run.target_distance(), 0.0);
        assert!(run.trace.is_empty());
    }
}
