//! Session orchestration: endpoints in, painted routes out.
//!
//! [`MapSession`] owns the graph store, the painter and the per-session
//! caches, and exposes the synchronous build/route/alternatives flow.
//! [`MapSession::spawn`] moves the session into a coordinating event
//! loop that debounces viewport changes, drains queued edge batches on
//! a fixed cadence and answers geocode lookups through a worker pool,
//! reporting back over a notice channel instead of UI callbacks.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{CacheDisposition, GraphStore};
use crate::error::{BuildError, GeocodeError, SessionError};
use crate::geo::{
    coverage_radius, format_distance, haversine_distance, midpoint, simplify_polyline, ViewRect,
};
use crate::geocode::{Gazetteer, GeocodeOutcome, GeocodePool, Geocoder};
use crate::graph::{GraphLimits, GridSource, NetworkKind, NetworkSource, RoadGraph};
use crate::labels::NodeLabels;
use crate::render::{EndpointSlot, Renderer};
use crate::search::{
    bellman_ford, dijkstra, explain_negative_cycle, explain_run, reconstruct_path, Algorithm,
    PathCache, RoutePath, StepTrace,
};
use crate::viewport::{DrainReport, MapPainter, RefreshReport, ViewportPolicy};

/// Session-wide tunables. Component knobs nest under their own structs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Extra coverage around the endpoint disc, in meters.
    pub buffer_m: f64,
    /// Upper bound on K for alternative-path requests.
    pub max_paths: usize,
    /// Edge attribute the engines minimize.
    pub weight_attr: String,
    pub network_kind: NetworkKind,
    pub limits: GraphLimits,
    pub viewport: ViewportPolicy,
    /// Highlight simplification tolerance, in degrees.
    pub simplify_tolerance_deg: f64,
    pub geocode_workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_m: 1000.0,
            max_paths: 100,
            weight_attr: "length".to_string(),
            network_kind: NetworkKind::Drive,
            limits: GraphLimits::default(),
            viewport: ViewportPolicy::default(),
            simplify_tolerance_deg: 1e-4,
            geocode_workers: 4,
        }
    }
}

/// What a completed build request produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub nodes: usize,
    pub edges: usize,
    pub center: (f64, f64),
    pub radius_m: f64,
    pub disposition: CacheDisposition,
    /// Snapped origin node, raw id.
    pub origin: i64,
    /// Snapped destination node, raw id.
    pub destination: i64,
}

/// Result of one routing request, negative-cycle outcomes included.
///
/// An unreachable target is not an error: `path` is empty and `distance`
/// infinite. A detected negative cycle likewise comes back as a report,
/// with the offending edge in `negative_cycle` and no distances claimed.
#[derive(Debug, Clone)]
pub struct RouteReport {
    pub algorithm: Algorithm,
    pub source: i64,
    pub target: i64,
    /// Raw node ids along the path, empty when there is none.
    pub path: Vec<i64>,
    /// The same path in display ids (origin is 1).
    pub display_path: Vec<usize>,
    pub distance: f64,
    pub negative_cycle: Option<(i64, i64)>,
    /// Step-by-step text produced by the trace renderer.
    pub explanation: String,
    pub trace: StepTrace,
}

/// Everything derived from one build. Replaced wholesale by the next.
struct ActiveGraph {
    graph: Arc<RoadGraph>,
    labels: NodeLabels,
    origin: i64,
    destination: i64,
    paths: PathCache,
}

/// The coordinating facade over graph building, search and painting.
pub struct MapSession {
    config: SessionConfig,
    store: GraphStore,
    source: Arc<dyn NetworkSource>,
    geocoder: Arc<dyn Geocoder>,
    painter: MapPainter,
    /// Address lookups already answered this session. Transient failures
    /// are never stored, so retries reach the resolver.
    geocode_cache: FxHashMap<String, GeocodeOutcome>,
    active: Option<ActiveGraph>,
}

fn geocode_key(address: &str) -> String {
    address.trim().to_lowercase()
}

impl MapSession {
    /// Session over the built-in grid source and gazetteer.
    pub fn new(
        config: SessionConfig,
        cache_dir: impl Into<PathBuf>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self::with_parts(
            config,
            cache_dir,
            Arc::new(GridSource),
            Arc::new(Gazetteer::new()),
            renderer,
        )
    }

    /// Session with every collaborator supplied by the caller.
    pub fn with_parts(
        config: SessionConfig,
        cache_dir: impl Into<PathBuf>,
        source: Arc<dyn NetworkSource>,
        geocoder: Arc<dyn Geocoder>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let painter = MapPainter::new(renderer, config.viewport.clone());
        // Artifacts live under a per-profile subdirectory; the graph key
        // itself carries no network kind.
        let store = GraphStore::new(cache_dir.into().join(config.network_kind.to_string()));
        Self {
            store,
            source,
            geocoder,
            painter,
            geocode_cache: FxHashMap::default(),
            active: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn painter(&self) -> &MapPainter {
        &self.painter
    }

    pub fn is_built(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_graph(&self) -> Option<Arc<RoadGraph>> {
        self.active.as_ref().map(|a| Arc::clone(&a.graph))
    }

    pub fn graph_bounds(&self) -> Option<ViewRect> {
        self.active.as_ref().and_then(|a| a.graph.bounds())
    }

    pub fn labels(&self) -> Option<&NodeLabels> {
        self.active.as_ref().map(|a| &a.labels)
    }

    /// Snapped (origin, destination) of the active graph.
    pub fn endpoints(&self) -> Option<(i64, i64)> {
        self.active.as_ref().map(|a| (a.origin, a.destination))
    }

    /// Build (or fetch) the graph covering both endpoints and make it the
    /// active one. Center is the endpoint midpoint, radius half the
    /// great-circle distance plus the configured buffer.
    ///
    /// All painted state and derived caches belong to the previous graph
    /// and are discarded; endpoint markers are re-pinned to the snapped
    /// nodes of the new graph.
    pub fn build(&mut self, from: (f64, f64), to: (f64, f64)) -> Result<BuildSummary, SessionError> {
        let center = midpoint(from, to);
        let radius_m = coverage_radius(from, to, self.config.buffer_m);
        let (graph, disposition) = self.store.load_or_build(
            center,
            radius_m,
            self.config.network_kind,
            self.source.as_ref(),
            &self.config.limits,
        )?;

        self.painter.clear();
        self.active = None;

        let origin = graph.snap(from.0, from.1).ok_or(BuildError::EmptyNetwork)?;
        let destination = graph.snap(to.0, to.1).ok_or(BuildError::EmptyNetwork)?;
        let labels = NodeLabels::assign(graph.nodes(), origin);

        for (slot, node) in
            [(EndpointSlot::Origin, origin), (EndpointSlot::Destination, destination)]
        {
            if let Some(at) = graph.coord(node) {
                self.painter.set_marker(slot, at, &slot.to_string());
            }
        }

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            %disposition,
            "session graph ready"
        );
        let summary = BuildSummary {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            center,
            radius_m,
            disposition,
            origin,
            destination,
        };
        self.active = Some(ActiveGraph {
            graph,
            labels,
            origin,
            destination,
            paths: PathCache::new(),
        });
        Ok(summary)
    }

    /// Run the chosen engine between the snapped endpoints, render the
    /// explanation and highlight the path on the map.
    pub fn route(&self, algorithm: Algorithm) -> Result<RouteReport, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::GraphNotBuilt)?;
        let attr = self.config.weight_attr.as_str();

        let outcome = match algorithm {
            Algorithm::Dijkstra => {
                Ok(dijkstra(&active.graph, active.origin, active.destination, attr))
            }
            Algorithm::BellmanFord => {
                bellman_ford(&active.graph, active.origin, active.destination, attr)
            }
        };
        let run = match outcome {
            Ok(run) => run,
            Err(cycle) => {
                warn!(from = cycle.from, to = cycle.to, "negative cycle detected");
                let explanation = explain_negative_cycle(&active.labels, &cycle);
                return Ok(RouteReport {
                    algorithm,
                    source: cycle.source,
                    target: cycle.target,
                    path: Vec::new(),
                    display_path: Vec::new(),
                    distance: f64::INFINITY,
                    negative_cycle: Some((cycle.from, cycle.to)),
                    explanation,
                    trace: cycle.trace,
                });
            }
        };

        let explanation = explain_run(&active.graph, &active.labels, &run, attr)?;
        let path =
            reconstruct_path(&run.predecessors, run.source, run.target, active.graph.node_count())?;
        let distance = run.target_distance();
        let display_path: Vec<usize> =
            path.iter().filter_map(|&n| active.labels.display_id(n)).collect();

        if path.is_empty() {
            info!(source = run.source, target = run.target, "no path found");
        } else {
            self.paint_route(&active.graph, &active.labels, &path);
        }

        Ok(RouteReport {
            algorithm,
            source: run.source,
            target: run.target,
            path,
            display_path,
            distance,
            negative_cycle: None,
            explanation,
            trace: run.trace,
        })
    }

    /// Up to `k` alternative paths between the endpoints, served from the
    /// per-graph cache. `k` is clamped to the configured maximum.
    pub fn alternatives(&mut self, k: usize) -> Result<Vec<RoutePath>, SessionError> {
        let max_paths = self.config.max_paths;
        let attr = self.config.weight_attr.clone();
        let active = self.active.as_mut().ok_or(SessionError::GraphNotBuilt)?;
        let k = k.min(max_paths);
        let paths = active
            .paths
            .get_or_compute(&active.graph, active.origin, active.destination, k, &attr)
            .to_vec();
        Ok(paths)
    }

    /// Resolve an address and pin the slot marker to the result.
    pub fn resolve_endpoint(
        &mut self,
        slot: EndpointSlot,
        address: &str,
    ) -> Result<(f64, f64), GeocodeError> {
        match self.lookup(address) {
            GeocodeOutcome::Found { lat, lon, matched } => {
                self.painter.set_marker(slot, (lat, lon), &slot.to_string());
                info!(%slot, address, matched = %matched, "endpoint resolved");
                Ok((lat, lon))
            }
            GeocodeOutcome::NotFound { suggestion } => {
                Err(GeocodeError::NotFound { address: address.to_string(), suggestion })
            }
            GeocodeOutcome::Transient { reason } => Err(GeocodeError::Transient { reason }),
        }
    }

    /// Prefix completions for partial address input.
    pub fn suggest_addresses(&self, prefix: &str) -> Vec<String> {
        self.geocoder.suggest(prefix)
    }

    /// Recompute viewport visibility against the active graph.
    pub fn refresh_viewport(&self, rect: Option<ViewRect>) -> Result<RefreshReport, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::GraphNotBuilt)?;
        Ok(self.painter.refresh(&active.graph, rect))
    }

    /// Draw one queued edge batch.
    pub fn drain_pending(&self) -> Result<DrainReport, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::GraphNotBuilt)?;
        Ok(self.painter.drain_batch(&active.graph))
    }

    /// Wipe every painted object and forget cached paths. The active
    /// graph stays, so the next request needs no rebuild.
    pub fn clear(&mut self) {
        self.painter.clear();
        if let Some(active) = self.active.as_mut() {
            active.paths.invalidate();
        }
        debug!("session cleared");
    }

    fn lookup(&mut self, address: &str) -> GeocodeOutcome {
        let key = geocode_key(address);
        if let Some(outcome) = self.geocode_cache.get(&key) {
            debug!(address, "geocode cache hit");
            return outcome.clone();
        }
        let outcome = self.geocoder.resolve(address);
        if !matches!(outcome, GeocodeOutcome::Transient { .. }) {
            self.geocode_cache.insert(key, outcome.clone());
        }
        outcome
    }

    fn cached_outcome(&self, address: &str) -> Option<GeocodeOutcome> {
        self.geocode_cache.get(&geocode_key(address)).cloned()
    }

    /// Fold a finished lookup into the session: cache it, place the
    /// marker on success and phrase the status line.
    fn absorb_geocode(
        &mut self,
        slot: EndpointSlot,
        address: &str,
        outcome: GeocodeOutcome,
    ) -> SessionNotice {
        match &outcome {
            GeocodeOutcome::Found { lat, lon, .. } => {
                let (lat, lon) = (*lat, *lon);
                self.geocode_cache.insert(geocode_key(address), outcome.clone());
                self.painter.set_marker(slot, (lat, lon), &slot.to_string());
                SessionNotice::Status(format!("{slot} location set at ({lat:.5}, {lon:.5})."))
            }
            GeocodeOutcome::NotFound { suggestion } => {
                self.geocode_cache.insert(geocode_key(address), outcome.clone());
                let mut line = format!("Location {slot} not found for address: {address}");
                if let Some(hint) = suggestion {
                    line.push_str(&format!(" (did you mean {hint}?)"));
                }
                SessionNotice::Status(line)
            }
            GeocodeOutcome::Transient { reason } => {
                SessionNotice::Status(format!("Geocoding temporarily unavailable: {reason}"))
            }
        }
    }

    fn paint_route(&self, graph: &RoadGraph, labels: &NodeLabels, path: &[i64]) {
        let coords: Vec<(f64, f64)> = path.iter().filter_map(|&n| graph.coord(n)).collect();
        if coords.len() < 2 {
            return;
        }
        let outline = simplify_polyline(&coords, self.config.simplify_tolerance_deg);
        let segments = self.painter.highlight_path(&outline);

        // Interval distance badges roughly every tenth of the path.
        let stride = (path.len() / 10).max(1);
        for i in (stride..coords.len()).step_by(stride) {
            let a = coords[i - stride];
            let b = coords[i];
            let span = haversine_distance(a.0, a.1, b.0, b.1);
            self.painter.add_badge(midpoint(a, b), &format_distance(span));
        }
        for &node in path {
            if let Some(at) = graph.coord(node) {
                self.painter.add_badge(at, &labels.name(node));
            }
        }
        debug!(segments, badges = self.painter.badge_count(), "route highlighted");
    }

    /// Move the session into its coordinating event loop.
    pub fn spawn(self) -> SessionHandle {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (notice_tx, notice_rx) = mpsc::channel(64);
        let task = tokio::spawn(run_loop(self, event_rx, notice_tx));
        SessionHandle { events: event_tx, notices: notice_rx, task }
    }
}

impl std::fmt::Debug for MapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("built", &self.is_built())
            .field("painter", &self.painter)
            .field("geocode_cache", &self.geocode_cache.len())
            .finish()
    }
}

/// Inputs to the coordinating loop.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The front-end moved the map. Debounced and coalesced.
    ViewportChanged(ViewRect),
    /// Resolve an address for a marker slot via the worker pool.
    Geocode { slot: EndpointSlot, address: String },
    /// Complete a partial address for the front-end's input box.
    Suggest { prefix: String },
    Clear,
    Shutdown,
}

/// Outputs of the coordinating loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// Human-readable status line for whatever front-end is attached.
    Status(String),
    /// Completions answering a [`SessionEvent::Suggest`].
    Suggestions { prefix: String, matches: Vec<String> },
    Viewport(RefreshReport),
    Drain(DrainReport),
}

/// Control surface for a spawned session loop.
pub struct SessionHandle {
    pub events: mpsc::Sender<SessionEvent>,
    pub notices: mpsc::Receiver<SessionNotice>,
    task: JoinHandle<MapSession>,
}

impl SessionHandle {
    /// Stop the loop and take the session back. `None` when the loop
    /// task panicked.
    pub async fn shutdown(self) -> Option<MapSession> {
        let _ = self.events.send(SessionEvent::Shutdown).await;
        self.task.await.ok()
    }
}

async fn run_loop(
    mut session: MapSession,
    mut events: mpsc::Receiver<SessionEvent>,
    notices: mpsc::Sender<SessionNotice>,
) -> MapSession {
    let (pool, mut replies) =
        GeocodePool::spawn(Arc::clone(&session.geocoder), session.config.geocode_workers);
    let debounce = session.config.viewport.debounce;

    let mut pending_view: Option<ViewRect> = None;
    let view_timer = sleep(debounce);
    tokio::pin!(view_timer);

    let mut drain_tick = interval(session.config.viewport.drain_interval);
    drain_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut replies_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::ViewportChanged(rect)) => {
                    // Replace any scheduled recompute: only the latest
                    // viewport wins once the debounce window passes.
                    pending_view = Some(rect);
                    view_timer.as_mut().reset(Instant::now() + debounce);
                }
                Some(SessionEvent::Geocode { slot, address }) => {
                    let notice = if let Some(outcome) = session.cached_outcome(&address) {
                        Some(session.absorb_geocode(slot, &address, outcome))
                    } else if pool.submit(slot, address).await {
                        None
                    } else {
                        Some(SessionNotice::Status(
                            "Geocoding temporarily unavailable: worker pool closed".to_string(),
                        ))
                    };
                    if let Some(notice) = notice {
                        if notices.send(notice).await.is_err() {
                            break;
                        }
                    }
                }
                Some(SessionEvent::Suggest { prefix }) => {
                    // Completions come from the in-memory gazetteer, so
                    // answering inline keeps them ahead of pool replies.
                    let matches = session.suggest_addresses(&prefix);
                    let notice = SessionNotice::Suggestions { prefix, matches };
                    if notices.send(notice).await.is_err() {
                        break;
                    }
                }
                Some(SessionEvent::Clear) => {
                    session.clear();
                    if notices.send(SessionNotice::Status("Map cleared.".to_string())).await.is_err() {
                        break;
                    }
                }
                Some(SessionEvent::Shutdown) | None => break,
            },
            reply = replies.recv(), if replies_open => match reply {
                Some(reply) => {
                    let notice = session.absorb_geocode(reply.slot, &reply.address, reply.outcome);
                    if notices.send(notice).await.is_err() {
                        break;
                    }
                }
                None => replies_open = false,
            },
            () = view_timer.as_mut(), if pending_view.is_some() => {
                let rect = pending_view.take();
                match session.refresh_viewport(rect) {
                    Ok(report) => {
                        if notices.send(SessionNotice::Viewport(report)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(error = %err, "viewport refresh skipped"),
                }
            }
            _ = drain_tick.tick(), if session.painter.pending_len() > 0 => {
                if let Ok(report) = session.drain_pending() {
                    if notices.send(SessionNotice::Drain(report)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    session
}
