//! Rendering seam between the visibility engine and a drawing surface.
//!
//! The crate never draws pixels itself. Collaborators implement
//! [`Renderer`] and hand back opaque handles; the built-in
//! [`RecordingRenderer`] keeps everything in memory for headless runs
//! and assertions.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Opaque identifier for one drawn object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawHandle(pub u64);

/// Endpoint slot a marker belongs to. Re-geocoding a slot replaces its
/// marker instead of accumulating one per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointSlot {
    Origin,
    Destination,
}

impl std::fmt::Display for EndpointSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointSlot::Origin => write!(f, "FROM"),
            EndpointSlot::Destination => write!(f, "TO"),
        }
    }
}

/// Drawing surface. Implementations must tolerate deletes of handles they
/// already dropped; coordinates are `(lat, lon)`.
pub trait Renderer: Send + Sync {
    fn draw_edge(&self, a: (f64, f64), b: (f64, f64)) -> DrawHandle;
    fn draw_marker(&self, at: (f64, f64), label: &str) -> DrawHandle;
    fn delete(&self, handle: DrawHandle);
}

#[derive(Debug, Default)]
struct RecorderState {
    next: u64,
    edges: FxHashMap<DrawHandle, ((f64, f64), (f64, f64))>,
    markers: FxHashMap<DrawHandle, ((f64, f64), String)>,
    deleted: u64,
}

/// In-memory renderer: records draws, honors deletes, answers counts.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    state: Mutex<RecorderState>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges currently alive (drawn and not deleted).
    pub fn edge_count(&self) -> usize {
        self.state.lock().edges.len()
    }

    /// Markers currently alive.
    pub fn marker_count(&self) -> usize {
        self.state.lock().markers.len()
    }

    /// Labels of live markers, sorted for stable assertions.
    pub fn marker_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .state
            .lock()
            .markers
            .values()
            .map(|(_, label)| label.clone())
            .collect();
        labels.sort();
        labels
    }

    /// Total handles ever issued.
    pub fn issued(&self) -> u64 {
        self.state.lock().next
    }

    /// Total delete calls that hit a live handle.
    pub fn deleted(&self) -> u64 {
        self.state.lock().deleted
    }
}

impl Renderer for RecordingRenderer {
    fn draw_edge(&self, a: (f64, f64), b: (f64, f64)) -> DrawHandle {
        let mut st = self.state.lock();
        let handle = DrawHandle(st.next);
        st.next += 1;
        st.edges.insert(handle, (a, b));
        handle
    }

    fn draw_marker(&self, at: (f64, f64), label: &str) -> DrawHandle {
        let mut st = self.state.lock();
        let handle = DrawHandle(st.next);
        st.next += 1;
        st.markers.insert(handle, (at, label.to_string()));
        handle
    }

    fn delete(&self, handle: DrawHandle) {
        let mut st = self.state.lock();
        if st.edges.remove(&handle).is_some() || st.markers.remove(&handle).is_some() {
            st.deleted += 1;
        }
    }
}
