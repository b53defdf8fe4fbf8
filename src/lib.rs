//! # Routelens
//!
//! Instrumented shortest-path search and incremental viewport rendering
//! over road networks.
//!
//! The crate splits into a search core ([`search`]) whose engines emit a
//! replayable step trace of every algorithmic decision, a spatial layer
//! ([`viewport`]) that keeps large edge sets responsive under a moving
//! viewport by diffing visibility and painting in bounded batches, and a
//! session facade ([`session`]) tying both to graph construction, keyed
//! caching and geocoding.

pub mod artifact;
pub mod cache;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod graph;
pub mod labels;
pub mod render;
pub mod search;
pub mod session;
pub mod viewport;

// Re-export the main types for library consumers
pub use cache::{CacheDisposition, GraphStore};
pub use error::{ArtifactError, BuildError, GeocodeError, SearchError, SessionError};
pub use geo::ViewRect;
pub use geocode::{Gazetteer, GeocodeOutcome, Geocoder};
pub use graph::{GraphLimits, GridSource, NetworkKind, NetworkSource, RoadGraph};
pub use labels::NodeLabels;
pub use render::{EndpointSlot, RecordingRenderer, Renderer};
pub use search::{Algorithm, RoutePath, StepTrace, TraceStep};
pub use session::{
    BuildSummary, MapSession, RouteReport, SessionConfig, SessionEvent, SessionHandle,
    SessionNotice,
};
pub use viewport::{DrainReport, MapPainter, RefreshKind, RefreshReport, ViewportPolicy};
