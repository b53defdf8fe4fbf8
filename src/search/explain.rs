//! Human-readable rendering of search traces.
//!
//! Every step kind gets one line, distances print with two decimals and
//! the infinity sign stands in for unreached nodes. Nodes appear under
//! their display labels, never raw ids.

use crate::error::SearchError;
use crate::graph::RoadGraph;
use crate::labels::NodeLabels;
use crate::search::path::{path_weight, reconstruct_path};
use crate::search::trace::{StepTrace, TraceStep};
use crate::search::{NegativeCycle, SearchRun};

const RULE_WIDTH: usize = 50;

fn fmt_distance(d: f64) -> String {
    if d.is_finite() {
        format!("{d:.2}")
    } else {
        "∞".to_string()
    }
}

fn header(labels: &NodeLabels, source: i64, target: i64) -> Vec<String> {
    vec![
        format!(
            "Finding shortest path from {} to {}",
            labels.name(source),
            labels.name(target)
        ),
        "=".repeat(RULE_WIDTH),
        String::new(),
    ]
}

fn step_lines(labels: &NodeLabels, trace: &StepTrace, lines: &mut Vec<String>) {
    for step in trace {
        match *step {
            TraceStep::Examine { node, distance } => {
                lines.push(format!(
                    "Examining {} (distance: {distance:.2})",
                    labels.name(node)
                ));
            }
            TraceStep::Visit { node } => {
                lines.push(format!("Visiting {}", labels.name(node)));
            }
            TraceStep::Skip { node } => {
                lines.push(format!("Skipping already visited {}", labels.name(node)));
            }
            TraceStep::CheckNeighbor { neighbor, old_distance, new_distance, .. } => {
                lines.push(format!(
                    "  Checking neighbor {}: current distance = {}, potential new distance = {new_distance:.2}",
                    labels.name(neighbor),
                    fmt_distance(old_distance)
                ));
            }
            TraceStep::Update { node, distance, predecessor } => {
                lines.push(format!(
                    "  → Updating {}: new distance = {distance:.2}, predecessor = {}",
                    labels.name(node),
                    labels.name(predecessor)
                ));
            }
            TraceStep::TargetReached { node } => {
                lines.push(String::new());
                lines.push(format!("Target {} reached!", labels.name(node)));
            }
            TraceStep::Iteration { round } => {
                lines.push(String::new());
                lines.push(format!("Iteration {round}:"));
            }
            TraceStep::CheckEdge { from, to, from_distance, to_distance, weight } => {
                lines.push(format!(
                    "  Checking edge {} → {}: distance[{}] = {}, distance[{}] = {}, weight = {weight:.2}",
                    labels.name(from),
                    labels.name(to),
                    labels.name(from),
                    fmt_distance(from_distance),
                    labels.name(to),
                    fmt_distance(to_distance)
                ));
            }
            TraceStep::EarlyTermination { round } => {
                lines.push(String::new());
                lines.push(format!(
                    "No updates in iteration {round}, algorithm terminating early"
                ));
            }
            TraceStep::NegativeCycle { from, to } => {
                lines.push(String::new());
                lines.push(format!(
                    "Negative cycle detected involving edge {} → {}",
                    labels.name(from),
                    labels.name(to)
                ));
            }
        }
    }
}

/// Render a completed run: header, one line per step, then the final path
/// with its total distance, or a no-path notice.
pub fn explain_run(
    graph: &RoadGraph,
    labels: &NodeLabels,
    run: &SearchRun,
    weight_attr: &str,
) -> Result<String, SearchError> {
    let mut lines = header(labels, run.source, run.target);
    step_lines(labels, &run.trace, &mut lines);

    lines.push(String::new());
    lines.push("=".repeat(RULE_WIDTH));

    let path = reconstruct_path(&run.predecessors, run.source, run.target, graph.node_count())?;
    if path.is_empty() {
        lines.push("No path found!".to_string());
    } else {
        lines.push("Final shortest path:".to_string());
        lines.push(
            path.iter()
                .map(|&n| labels.name(n))
                .collect::<Vec<_>>()
                .join(" → "),
        );
        lines.push(format!(
            "Total distance: {:.2}",
            path_weight(graph, &path, weight_attr)
        ));
    }
    Ok(lines.join("\n"))
}

/// Render a failed Bellman-Ford run. The trace already ends with the
/// negative-cycle step; the closing notice replaces the path section.
pub fn explain_negative_cycle(labels: &NodeLabels, cycle: &NegativeCycle) -> String {
    let mut lines = header(labels, cycle.source, cycle.target);
    step_lines(labels, &cycle.trace, &mut lines);

    lines.push(String::new());
    lines.push("=".repeat(RULE_WIDTH));
    lines.push("Negative cycle detected in the graph. Cannot find shortest path.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, GraphLimits, RawEdge, RawNetwork, RawNode, RoadGraph};
    use crate::search::{bellman_ford, dijkstra};

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
    fn test_dijkstra_explanation_structure() {
        let g = graph(
            &[10, 20, 30],
            vec![weighted(10, 20, 2.0), weighted(20, 30, 3.0)],
        );
        let labels = NodeLabels::assign(g.nodes(), 10);
        let run = dijkstra(&g, 10, 30, "length");
        let text = explain_run(&g, &labels, &run, "length").unwrap();

        assert!(text.starts_with("Finding shortest path from Node 1 to Node 3\n"));
        assert!(text.contains(&"=".repeat(50)));
        assert!(text.contains("Examining Node 1 (distance: 0.00)"));
        assert!(text.contains("current distance = ∞"));
        assert!(text.contains("Target Node 3 reached!"));
        assert!(text.contains("Final shortest path:"));
        assert!(text.contains("Node 1 → Node 2 → Node 3"));
        assert!(text.ends_with("Total distance: 5.00"));
        assert!(!text.contains("Node 10"), "raw ids must not leak: {text}");
    }

    #[test]
    fn test_no_path_notice() {
        let g = graph(&[1, 2, 3], vec![weighted(1, 2, 1.0)]);
        let labels = NodeLabels::assign(g.nodes(), 1);
        let run = dijkstra(&g, 1, 3, "length");
        let text = explain_run(&g, &labels, &run, "length").unwrap();
        assert!(text.ends_with("No path found!"));
        assert!(!text.contains("Final shortest path:"));
    }

    #[test]
    fn test_bellman_ford_explanation_has_iterations() {
        let g = graph(&[1, 2, 3], vec![weighted(1, 2, 1.0), weighted(2, 3, 1.0)]);
        let labels = NodeLabels::assign(g.nodes(), 1);
        let run = bellman_ford(&g, 1, 3, "length").unwrap();
        let text = explain_run(&g, &labels, &run, "length").unwrap();

        assert!(text.contains("Iteration 1:"));
        assert!(text.contains("Checking edge Node 1 → Node 2"));
        assert!(text.contains("weight = 1.00"));
        assert!(text.contains("No updates in iteration 2, algorithm terminating early"));
    }

    #[test]
    fn test_negative_cycle_explanation() {
        let g = graph(
            &[1, 2, 3],
            vec![weighted(1, 2, 1.0), weighted(2, 3, 1.0), weighted(3, 2, -4.0)],
        );
        let labels = NodeLabels::assign(g.nodes(), 1);
        let cycle = bellman_ford(&g, 1, 3, "length").unwrap_err();
        let text = explain_negative_cycle(&labels, &cycle);

        assert!(text.contains("Negative cycle detected involving edge"));
        assert!(text.ends_with("Negative cycle detected in the graph. Cannot find shortest path."));
    }
}
