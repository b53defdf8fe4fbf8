//! Viewport visibility: windowed edge sets, diffs and batched painting.
//!
//! The painter keeps three pieces of state under one lock: the visible
//! edge set, the map from edge id to draw handle, and the queue of edges
//! accepted but not yet drawn. Diffing and mutation happen in the same
//! critical section so a concurrent drain never sees a half-applied
//! update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::geo::ViewRect;
use crate::graph::{EdgeId, RoadGraph};
use crate::render::{DrawHandle, EndpointSlot, Renderer};

/// Tunables for viewport updates. Defaults match interactive map use.
#[derive(Debug, Clone)]
pub struct ViewportPolicy {
    /// Quiet period after the last viewport event before recomputing.
    pub debounce: Duration,
    /// Below this many windowed edges the fallback subset is shown instead.
    pub min_visible: usize,
    /// Removal-only diffs must exceed this count to be applied.
    pub removal_hysteresis: usize,
    /// Edges drawn per batch; the rest queue for the drain cadence.
    pub batch_size: usize,
    /// Interval between drain batches.
    pub drain_interval: Duration,
    /// Approximate size cap for the fallback subset.
    pub fallback_cap: usize,
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            min_visible: 20,
            removal_hysteresis: 10,
            batch_size: 500,
            drain_interval: Duration::from_millis(50),
            fallback_cap: 1000,
        }
    }
}

/// Evenly strided subset of all edges, shown when a window catches too
/// little of the graph to be useful.
pub fn fallback_subset(graph: &RoadGraph, cap: usize) -> Vec<EdgeId> {
    let total = graph.segments().len();
    if total == 0 || cap == 0 {
        return Vec::new();
    }
    let shown = total.min(cap);
    let step = (total / shown).max(1);
    (0..total).step_by(step).collect()
}

/// Difference between the current and target visible sets. The two sides
/// are disjoint by construction and sorted for reproducible application
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityDiff {
    pub to_add: Vec<EdgeId>,
    pub to_remove: Vec<EdgeId>,
}

impl VisibilityDiff {
    pub fn between(current: &FxHashSet<EdgeId>, target: &FxHashSet<EdgeId>) -> Self {
        let mut to_add: Vec<EdgeId> = target.difference(current).copied().collect();
        let mut to_remove: Vec<EdgeId> = current.difference(target).copied().collect();
        to_add.sort_unstable();
        to_remove.sort_unstable();
        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Whether a windowed update is worth applying: any addition counts,
    /// removals alone must beat the hysteresis threshold.
    pub fn should_apply(&self, removal_hysteresis: usize) -> bool {
        !self.to_add.is_empty() || self.to_remove.len() > removal_hysteresis
    }
}

/// How the target set for a refresh was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Edges intersecting the reported window.
    Windowed,
    /// Density fallback: the strided subset of all edges.
    Fallback,
}

/// Outcome of one refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub kind: RefreshKind,
    pub applied: bool,
    pub target_size: usize,
    pub drawn_now: usize,
    pub removed: usize,
    pub queued: usize,
}

/// Outcome of one drain batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub drawn: usize,
    pub remaining: usize,
}

#[derive(Default)]
struct PaintState {
    visible: FxHashSet<EdgeId>,
    drawn: FxHashMap<EdgeId, DrawHandle>,
    pending: Vec<EdgeId>,
    markers: FxHashMap<EndpointSlot, DrawHandle>,
    highlights: Vec<DrawHandle>,
    badges: Vec<DrawHandle>,
}

/// Owns every draw handle the session produces: visible edges, route
/// highlights, endpoint markers and text badges.
pub struct MapPainter {
    renderer: Arc<dyn Renderer>,
    policy: ViewportPolicy,
    state: Mutex<PaintState>,
    /// Set while queued additions remain; cleared by [`MapPainter::clear`]
    /// so in-flight drains stop after their current batch.
    loading: AtomicBool,
}

impl MapPainter {
    pub fn new(renderer: Arc<dyn Renderer>, policy: ViewportPolicy) -> Self {
        Self {
            renderer,
            policy,
            state: Mutex::new(PaintState::default()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &ViewportPolicy {
        &self.policy
    }

    /// Recompute visibility for `rect` and reconcile the drawn set.
    ///
    /// A missing or degenerate rect selects nothing, which on a non-empty
    /// graph lands in the fallback subset. Fallback updates skip the
    /// hysteresis gate; windowed updates honor it.
    pub fn refresh(&self, graph: &RoadGraph, rect: Option<ViewRect>) -> RefreshReport {
        let windowed: Vec<EdgeId> = rect
            .filter(ViewRect::is_valid)
            .map(|r| graph.edges_in(r))
            .unwrap_or_default();

        let (kind, target_ids) =
            if graph.edge_count() > 0 && windowed.len() < self.policy.min_visible {
                (RefreshKind::Fallback, fallback_subset(graph, self.policy.fallback_cap))
            } else {
                (RefreshKind::Windowed, windowed)
            };
        let target: FxHashSet<EdgeId> = target_ids.into_iter().collect();

        let mut st = self.state.lock();
        let diff = VisibilityDiff::between(&st.visible, &target);
        let applied = match kind {
            RefreshKind::Fallback => !diff.is_empty(),
            RefreshKind::Windowed => diff.should_apply(self.policy.removal_hysteresis),
        };
        if !applied {
            trace!(
                target = target.len(),
                to_add = diff.to_add.len(),
                to_remove = diff.to_remove.len(),
                "viewport diff below thresholds, skipped"
            );
            return RefreshReport {
                kind,
                applied: false,
                target_size: target.len(),
                drawn_now: 0,
                removed: 0,
                queued: st.pending.len(),
            };
        }

        for id in &diff.to_remove {
            if let Some(handle) = st.drawn.remove(id) {
                self.renderer.delete(handle);
            }
            st.visible.remove(id);
        }

        let mut drawn_now = 0;
        for &id in &diff.to_add {
            st.visible.insert(id);
            if drawn_now < self.policy.batch_size {
                if let Some(seg) = graph.segment(id) {
                    let handle = self.renderer.draw_edge(seg.a, seg.b);
                    st.drawn.insert(id, handle);
                    drawn_now += 1;
                }
            } else {
                st.pending.push(id);
            }
        }

        if !st.pending.is_empty() {
            self.loading.store(true, Ordering::Release);
        }
        debug!(
            kind = ?kind,
            target = target.len(),
            drawn_now,
            removed = diff.to_remove.len(),
            queued = st.pending.len(),
            "viewport refreshed"
        );
        RefreshReport {
            kind,
            applied: true,
            target_size: target.len(),
            drawn_now,
            removed: diff.to_remove.len(),
            queued: st.pending.len(),
        }
    }

    /// Draw one batch from the pending queue. Entries that went invisible
    /// or got drawn since queueing are dropped silently. Returns zero work
    /// when loading was cancelled.
    pub fn drain_batch(&self, graph: &RoadGraph) -> DrainReport {
        if !self.loading.load(Ordering::Acquire) {
            return DrainReport { drawn: 0, remaining: 0 };
        }

        let mut st = self.state.lock();
        let mut drawn = 0;
        let mut cursor = 0;
        while cursor < st.pending.len() && drawn < self.policy.batch_size {
            let id = st.pending[cursor];
            cursor += 1;
            if !st.visible.contains(&id) || st.drawn.contains_key(&id) {
                continue;
            }
            if let Some(seg) = graph.segment(id) {
                let handle = self.renderer.draw_edge(seg.a, seg.b);
                st.drawn.insert(id, handle);
                drawn += 1;
            }
        }
        st.pending.drain(..cursor);

        let remaining = st.pending.len();
        if remaining == 0 {
            self.loading.store(false, Ordering::Release);
        }
        trace!(drawn, remaining, "drained edge batch");
        DrainReport { drawn, remaining }
    }

    /// Drop every handle and all queued work. The loading flag goes down
    /// first so a racing drain gives up before touching the queue.
    pub fn clear(&self) {
        self.loading.store(false, Ordering::Release);
        let mut st = self.state.lock();
        for (_, handle) in st.drawn.drain() {
            self.renderer.delete(handle);
        }
        for handle in st.highlights.drain(..) {
            self.renderer.delete(handle);
        }
        for handle in st.badges.drain(..) {
            self.renderer.delete(handle);
        }
        let markers: Vec<DrawHandle> = st.markers.drain().map(|(_, h)| h).collect();
        for handle in markers {
            self.renderer.delete(handle);
        }
        st.visible.clear();
        st.pending.clear();
        debug!("painter cleared");
    }

    /// Replace the current route highlight with a polyline.
    pub fn highlight_path(&self, points: &[(f64, f64)]) -> usize {
        let mut st = self.state.lock();
        for handle in st.highlights.drain(..) {
            self.renderer.delete(handle);
        }
        for handle in st.badges.drain(..) {
            self.renderer.delete(handle);
        }
        let handles: Vec<DrawHandle> = points
            .windows(2)
            .map(|pair| self.renderer.draw_edge(pair[0], pair[1]))
            .collect();
        let count = handles.len();
        st.highlights = handles;
        count
    }

    /// Add a text badge (distance label, node label) tied to the current
    /// highlight. Cleared together with it.
    pub fn add_badge(&self, at: (f64, f64), label: &str) {
        let mut st = self.state.lock();
        let handle = self.renderer.draw_marker(at, label);
        st.badges.push(handle);
    }

    /// Place or replace the marker for an endpoint slot.
    pub fn set_marker(&self, slot: EndpointSlot, at: (f64, f64), label: &str) {
        let mut st = self.state.lock();
        if let Some(old) = st.markers.remove(&slot) {
            self.renderer.delete(old);
        }
        let handle = self.renderer.draw_marker(at, label);
        st.markers.insert(slot, handle);
    }

    pub fn visible_snapshot(&self) -> FxHashSet<EdgeId> {
        self.state.lock().visible.clone()
    }

    pub fn visible_count(&self) -> usize {
        self.state.lock().visible.len()
    }

    pub fn drawn_count(&self) -> usize {
        self.state.lock().drawn.len()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn highlight_len(&self) -> usize {
        self.state.lock().highlights.len()
    }

    pub fn badge_count(&self) -> usize {
        self.state.lock().badges.len()
    }

    pub fn has_marker(&self, slot: EndpointSlot) -> bool {
        self.state.lock().markers.contains_key(&slot)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MapPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapPainter")
            .field("visible", &self.visible_count())
            .field("drawn", &self.drawn_count())
            .field("pending", &self.pending_len())
            .field("loading", &self.is_loading())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, GraphLimits, RawEdge, RawNetwork, RawNode, RoadGraph};
    use crate::render::RecordingRenderer;

    /// Horizontal chain of `n + 1` nodes and `n` edges along the equator,
    /// one edge per 0.01 degrees of longitude.
    fn chain(n: usize) -> RoadGraph {
        let nodes = (0..=n as i64)
            .map(|i| RawNode { id: i, lat: 0.0, lon: i as f64 * 0.01 })
            .collect();
        let edges = (0..n as i64)
            .map(|i| RawEdge { from: i, to: i + 1, attrs: EdgeAttrs::new().with("length", 1.0) })
            .collect();
        RoadGraph::from_network(RawNetwork { nodes, edges }, &GraphLimits::default()).unwrap()
    }

    fn painter(policy: ViewportPolicy) -> (MapPainter, Arc<RecordingRenderer>) {
        let renderer = Arc::new(RecordingRenderer::new());
        (MapPainter::new(renderer.clone() as Arc<dyn Renderer>, policy), renderer)
    }

    fn window(graph: &RoadGraph) -> ViewRect {
        graph.bounds().unwrap()
    }

    #[test]
    fn test_diff_sides_are_disjoint_and_sorted() {
        let current: FxHashSet<EdgeId> = [1, 2, 3, 4].into_iter().collect();
        let target: FxHashSet<EdgeId> = [3, 4, 5, 6].into_iter().collect();
        let diff = VisibilityDiff::between(&current, &target);
        assert_eq!(diff.to_add, vec![5, 6]);
        assert_eq!(diff.to_remove, vec![1, 2]);
        for id in &diff.to_add {
            assert!(!diff.to_remove.contains(id));
        }
    }

    #[test]
    fn test_hysteresis_blocks_small_removals() {
        let diff = VisibilityDiff {
            to_add: vec![],
            to_remove: (0..10).collect(),
        };
        assert!(!diff.should_apply(10), "10 removals do not beat threshold 10");
        let bigger = VisibilityDiff {
            to_add: vec![],
            to_remove: (0..11).collect(),
        };
        assert!(bigger.should_apply(10));
        let with_add = VisibilityDiff { to_add: vec![1], to_remove: vec![] };
        assert!(with_add.should_apply(10));
    }

    #[test]
    fn test_fallback_subset_stride() {
        let g = chain(30);
        assert_eq!(fallback_subset(&g, 1000).len(), 30);
        let capped = fallback_subset(&g, 10);
        // stride 3 over 30 edges
        assert_eq!(capped, vec![0, 3, 6, 9, 12, 15, 18, 21, 24, 27]);
        assert!(fallback_subset(&chain(0), 10).is_empty());
    }

    #[test]
    fn test_refresh_draws_window_and_converges() {
        let g = chain(40);
        let (p, r) = painter(ViewportPolicy::default());
        let report = p.refresh(&g, Some(window(&g)));
        assert!(report.applied);
        assert_eq!(report.kind, RefreshKind::Windowed);
        assert_eq!(report.target_size, 40);
        assert_eq!(report.drawn_now, 40);
        assert_eq!(report.queued, 0);
        assert_eq!(r.edge_count(), 40);
        assert_eq!(p.visible_count(), p.drawn_count());
    }

    #[test]
    fn test_empty_window_falls_back_on_nonempty_graph() {
        let g = chain(50);
        let (p, _r) = painter(ViewportPolicy::default());
        // Valid window far away from the chain: zero windowed edges.
        let report = p.refresh(&g, Some(ViewRect::new(40.0, 40.0, 41.0, 41.0)));
        assert_eq!(report.kind, RefreshKind::Fallback);
        assert_eq!(report.target_size, 50);
        assert!(report.applied);

        // No rect at all behaves the same way.
        let p2 = painter(ViewportPolicy::default()).0;
        let report = p2.refresh(&g, None);
        assert_eq!(report.kind, RefreshKind::Fallback);
        assert_eq!(report.target_size, 50);
    }

    #[test]
    fn test_sparse_window_falls_back_below_min_density() {
        let g = chain(50);
        let (p, _r) = painter(ViewportPolicy::default());
        // Window over the first few edges only: under the default minimum
        // of 20, so the fallback subset wins.
        let report = p.refresh(&g, Some(ViewRect::new(-0.1, -0.001, 0.1, 0.035)));
        assert_eq!(report.kind, RefreshKind::Fallback);
        assert_eq!(report.target_size, 50);
    }

    #[test]
    fn test_batch_cap_queues_remainder_and_drains() {
        let g = chain(1200);
        let (p, r) = painter(ViewportPolicy::default());
        let report = p.refresh(&g, Some(window(&g)));
        assert!(report.applied);
        assert_eq!(report.target_size, 1200);
        assert_eq!(report.drawn_now, 500);
        assert_eq!(report.queued, 700);
        assert!(p.is_loading());

        let first = p.drain_batch(&g);
        assert_eq!(first, DrainReport { drawn: 500, remaining: 200 });
        let second = p.drain_batch(&g);
        assert_eq!(second, DrainReport { drawn: 200, remaining: 0 });
        assert!(!p.is_loading());

        // Converged: every visible edge is drawn.
        assert_eq!(p.visible_count(), 1200);
        assert_eq!(p.drawn_count(), 1200);
        assert_eq!(r.edge_count(), 1200);

        let idle = p.drain_batch(&g);
        assert_eq!(idle, DrainReport { drawn: 0, remaining: 0 });
    }

    #[test]
    fn test_clear_cancels_queued_work() {
        let g = chain(1200);
        let (p, r) = painter(ViewportPolicy::default());
        p.refresh(&g, Some(window(&g)));
        assert_eq!(p.pending_len(), 700);

        p.clear();
        assert!(!p.is_loading());
        assert_eq!(p.pending_len(), 0);
        assert_eq!(p.visible_count(), 0);
        assert_eq!(r.edge_count(), 0);

        let report = p.drain_batch(&g);
        assert_eq!(report, DrainReport { drawn: 0, remaining: 0 });
    }

    #[test]
    fn test_queued_edges_removed_before_drain_are_skipped() {
        let g = chain(1200);
        let mut policy = ViewportPolicy::default();
        policy.min_visible = 1;
        let (p, _r) = painter(policy);
        p.refresh(&g, Some(window(&g)));
        assert_eq!(p.pending_len(), 700);

        // Shrink to the first 100 edges; everything queued goes invisible.
        let report = p.refresh(&g, Some(ViewRect::new(-0.1, -0.001, 0.1, 0.9995)));
        assert!(report.applied);
        assert_eq!(p.visible_count(), 100);

        while p.drain_batch(&g).remaining > 0 {}
        assert_eq!(p.drawn_count(), 100);
    }

    #[test]
    fn test_refresh_skips_below_hysteresis() {
        let g = chain(40);
        let (p, r) = painter(ViewportPolicy::default());
        p.refresh(&g, Some(window(&g)));
        assert_eq!(r.edge_count(), 40);

        // Trim the window by a handful of edges: refreshing again would
        // remove fewer than the hysteresis threshold and must be skipped.
        let report = p.refresh(&g, Some(ViewRect::new(-0.1, -0.001, 0.1, 0.345)));
        assert_eq!(report.kind, RefreshKind::Windowed);
        assert!(!report.applied);
        assert_eq!(r.edge_count(), 40, "nothing was redrawn or deleted");
    }

    #[test]
    fn test_marker_slot_replacement() {
        let (p, r) = painter(ViewportPolicy::default());
        p.set_marker(EndpointSlot::Origin, (0.0, 0.0), "FROM");
        p.set_marker(EndpointSlot::Destination, (0.0, 0.05), "TO");
        assert_eq!(r.marker_count(), 2);

        p.set_marker(EndpointSlot::Origin, (0.0, 0.01), "FROM");
        assert_eq!(r.marker_count(), 2, "slot replaced, not accumulated");
        assert!(p.has_marker(EndpointSlot::Origin));
    }

    #[test]
    fn test_highlight_replaces_previous_and_badges() {
        let (p, r) = painter(ViewportPolicy::default());
        let first = p.highlight_path(&[(0.0, 0.0), (0.0, 0.1), (0.0, 0.2)]);
        assert_eq!(first, 2);
        p.add_badge((0.0, 0.1), "100 m");
        assert_eq!(p.badge_count(), 1);

        let second = p.highlight_path(&[(0.0, 0.0), (0.0, 0.3)]);
        assert_eq!(second, 1);
        assert_eq!(p.highlight_len(), 1);
        assert_eq!(p.badge_count(), 0, "badges die with their highlight");
        assert_eq!(r.edge_count(), 1);
    }
}
