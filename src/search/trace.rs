//! Step-by-step search traces.
//!
//! Every engine decision is recorded as one [`TraceStep`] in emission order.
//! The variant set is closed; renderers and serializers match exhaustively
//! so a new step kind is a compile-time event, not a silent gap.

use serde::{Deserialize, Serialize};

/// One recorded engine decision.
///
/// Serialized with a `kind` tag in snake case, e.g.
/// `{"kind":"check_neighbor","node":4,...}`. Infinite distances serialize
/// as `null` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceStep {
    /// A node was popped from the frontier with its tentative distance.
    Examine { node: i64, distance: f64 },
    /// The popped node was settled.
    Visit { node: i64 },
    /// The popped node was a stale frontier entry and was discarded.
    Skip { node: i64 },
    /// A neighbor's current and candidate distances were compared.
    CheckNeighbor { node: i64, neighbor: i64, old_distance: f64, new_distance: f64 },
    /// A node's distance improved; shared by both engines.
    Update { node: i64, distance: f64, predecessor: i64 },
    /// The target was settled and the search stopped.
    TargetReached { node: i64 },
    /// A relaxation round began (1-based).
    Iteration { round: usize },
    /// One directed edge was tested for relaxation.
    CheckEdge { from: i64, to: i64, from_distance: f64, to_distance: f64, weight: f64 },
    /// A full round produced no updates; remaining rounds are skipped.
    EarlyTermination { round: usize },
    /// The extra verification pass found a still-relaxable edge.
    NegativeCycle { from: i64, to: i64 },
}

/// Ordered sequence of trace steps from a single engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    steps: Vec<TraceStep>,
}

impl StepTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }
}

impl<'a> IntoIterator for &'a StepTrace {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl FromIterator<TraceStep> for StepTrace {
    fn from_iter<T: IntoIterator<Item = TraceStep>>(iter: T) -> Self {
        Self { steps: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_kind_tags() {
        let cases = [
            (TraceStep::Examine { node: 1, distance: 0.0 }, "examine"),
            (TraceStep::Visit { node: 1 }, "visit"),
            (TraceStep::Skip { node: 1 }, "skip"),
            (
                TraceStep::CheckNeighbor {
                    node: 1,
                    neighbor: 2,
                    old_distance: f64::INFINITY,
                    new_distance: 3.0,
                },
                "check_neighbor",
            ),
            (TraceStep::Update { node: 2, distance: 3.0, predecessor: 1 }, "update"),
            (TraceStep::TargetReached { node: 2 }, "target_reached"),
            (TraceStep::Iteration { round: 1 }, "iteration"),
            (
                TraceStep::CheckEdge {
                    from: 1,
                    to: 2,
                    from_distance: 0.0,
                    to_distance: f64::INFINITY,
                    weight: 3.0,
                },
                "check_edge",
            ),
            (TraceStep::EarlyTermination { round: 2 }, "early_termination"),
            (TraceStep::NegativeCycle { from: 2, to: 1 }, "negative_cycle"),
        ];
        for (step, tag) in cases {
            let json = serde_json::to_value(&step).unwrap();
            assert_eq!(json["kind"], tag, "wrong tag for {step:?}");
        }
    }

    #[test]
    fn test_update_roundtrips_through_json() {
        let step = TraceStep::Update { node: 5, distance: 2.5, predecessor: 3 };
        let json = serde_json::to_string(&step).unwrap();
        let back: TraceStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_infinite_distance_serializes_as_null() {
        let step = TraceStep::CheckNeighbor {
            node: 1,
            neighbor: 2,
            old_distance: f64::INFINITY,
            new_distance: 4.0,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert!(json["old_distance"].is_null());
        assert_eq!(json["new_distance"], 4.0);
    }

    #[test]
    fn test_trace_preserves_order() {
        let mut trace = StepTrace::new();
        trace.push(TraceStep::Iteration { round: 1 });
        trace.push(TraceStep::EarlyTermination { round: 1 });
        let kinds: Vec<_> = trace.iter().collect();
        assert!(matches!(kinds[0], TraceStep::Iteration { round: 1 }));
        assert!(matches!(kinds[1], TraceStep::EarlyTermination { round: 1 }));
    }
}
