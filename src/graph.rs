//! Road network graph: petgraph core, spatial indexes and network sources.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BuildError;
use crate::geo::{self, ViewRect};

/// Weight used when an edge does not carry the requested attribute.
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Dense edge identifier, stable for the lifetime of a graph.
pub type EdgeId = usize;

/// Named weight attributes attached to a directed edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    attrs: FxHashMap<String, f64>,
}

impl EdgeAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used when assembling networks.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.attrs.insert(name.to_string(), value);
    }

    /// Attribute value, or [`DEFAULT_EDGE_WEIGHT`] when absent.
    pub fn weight(&self, name: &str) -> f64 {
        self.attrs.get(name).copied().unwrap_or(DEFAULT_EDGE_WEIGHT)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).copied()
    }
}

/// Raw node as produced by a network source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// Raw directed edge as produced by a network source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub from: i64,
    pub to: i64,
    pub attrs: EdgeAttrs,
}

/// Un-indexed network description, the input to [`RoadGraph::from_network`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNetwork {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
}

/// Safety ceilings applied while building a graph.
#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    /// Builds with more nodes than this are rejected outright.
    pub max_nodes: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self { max_nodes: 10_000 }
    }
}

/// Travel profile used by network sources to shape the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkKind {
    Drive,
    Bike,
    Foot,
}

impl NetworkKind {
    /// Lattice spacing in meters between adjacent intersections.
    pub fn spacing_m(self) -> f64 {
        match self {
            NetworkKind::Drive => 150.0,
            NetworkKind::Bike => 100.0,
            NetworkKind::Foot => 75.0,
        }
    }

    /// Nominal travel speed in meters per second.
    pub fn speed_mps(self) -> f64 {
        match self {
            NetworkKind::Drive => 13.9,
            NetworkKind::Bike => 4.2,
            NetworkKind::Foot => 1.4,
        }
    }
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Drive => write!(f, "drive"),
            NetworkKind::Bike => write!(f, "bike"),
            NetworkKind::Foot => write!(f, "foot"),
        }
    }
}

/// Produces a raw road network covering a disc around a center point.
pub trait NetworkSource: Send + Sync {
    fn build(
        &self,
        center: (f64, f64),
        radius_m: f64,
        kind: NetworkKind,
    ) -> Result<RawNetwork, BuildError>;
}

/// Deterministic synthetic source: a rectangular lattice trimmed to the
/// requested disc, with `length` and `travel_time` attributes per edge.
///
/// Node identity is derived from the grid position, so the same center,
/// radius and kind always reproduce the same network.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSource;

const GRID_BIAS: i64 = 2_000_000;
const GRID_SPAN: i64 = 4_000_000;

impl GridSource {
    fn node_id(row: i64, col: i64) -> i64 {
        (row + GRID_BIAS) * GRID_SPAN + (col + GRID_BIAS)
    }
}

impl NetworkSource for GridSource {
    fn build(
        &self,
        center: (f64, f64),
        radius_m: f64,
        kind: NetworkKind,
    ) -> Result<RawNetwork, BuildError> {
        let spacing = kind.spacing_m();
        let speed = kind.speed_mps();
        let half = (radius_m / spacing).ceil().max(0.0) as i64;

        let dlat = spacing / geo::M_PER_DEG_LAT;
        let dlon = spacing / (geo::M_PER_DEG_LAT * center.0.to_radians().cos().abs().max(1e-9));

        let coord_of = |row: i64, col: i64| -> (f64, f64) {
            (center.0 + row as f64 * dlat, center.1 + col as f64 * dlon)
        };

        let mut kept: FxHashSet<(i64, i64)> = FxHashSet::default();
        let mut nodes = Vec::new();
        for row in -half..=half {
            for col in -half..=half {
                let (lat, lon) = coord_of(row, col);
                let dist = geo::haversine_distance(center.0, center.1, lat, lon);
                if dist <= radius_m + spacing / 2.0 {
                    kept.insert((row, col));
                    nodes.push(RawNode { id: Self::node_id(row, col), lat, lon });
                }
            }
        }

        let mut edges = Vec::new();
        let mut link = |a: (i64, i64), b: (i64, i64)| {
            let (alat, alon) = coord_of(a.0, a.1);
            let (blat, blon) = coord_of(b.0, b.1);
            let length = geo::haversine_distance(alat, alon, blat, blon);
            let attrs = EdgeAttrs::new()
                .with("length", length)
                .with("travel_time", length / speed);
            edges.push(RawEdge {
                from: Self::node_id(a.0, a.1),
                to: Self::node_id(b.0, b.1),
                attrs: attrs.clone(),
            });
            edges.push(RawEdge {
                from: Self::node_id(b.0, b.1),
                to: Self::node_id(a.0, a.1),
                attrs,
            });
        };
        for &(row, col) in &kept {
            if kept.contains(&(row + 1, col)) {
                link((row, col), (row + 1, col));
            }
            if kept.contains(&(row, col + 1)) {
                link((row, col), (row, col + 1));
            }
        }
        // HashSet iteration order is arbitrary; sort for a reproducible
        // network regardless of hasher state.
        nodes.sort_by_key(|n| n.id);
        edges.sort_by(|a, b| (a.from, a.to).cmp(&(b.from, b.to)));

        Ok(RawNetwork { nodes, edges })
    }
}

/// One drawable edge segment, indexed by the viewport R-tree.
///
/// Endpoints are `(lat, lon)`; the envelope is `[lon, lat]` to match the
/// spatial index layout.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSegment {
    pub id: EdgeId,
    pub a: (f64, f64),
    pub b: (f64, f64),
}

impl RTreeObject for EdgeSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.a.1.min(self.b.1), self.a.0.min(self.b.0)],
            [self.a.1.max(self.b.1), self.a.0.max(self.b.0)],
        )
    }
}

/// Indexed road network with spatial lookup for nodes and edges.
pub struct RoadGraph {
    graph: DiGraph<i64, EdgeAttrs>,
    node_map: FxHashMap<i64, NodeIndex>,
    coords: FxHashMap<i64, (f64, f64)>,
    node_index: RTree<GeomWithData<[f64; 2], i64>>,
    edge_index: RTree<EdgeSegment>,
    segments: Vec<EdgeSegment>,
}

impl RoadGraph {
    /// Build an indexed graph from a raw network, enforcing the node ceiling
    /// before any indexing work happens.
    pub fn from_network(network: RawNetwork, limits: &GraphLimits) -> Result<Self, BuildError> {
        if network.nodes.len() > limits.max_nodes {
            return Err(BuildError::GraphTooLarge {
                nodes: network.nodes.len(),
                limit: limits.max_nodes,
            });
        }

        let mut graph = DiGraph::new();
        let mut node_map = FxHashMap::default();
        let mut coords = FxHashMap::default();
        for node in &network.nodes {
            if node_map.contains_key(&node.id) {
                debug!(node = node.id, "duplicate node in network, keeping first");
                continue;
            }
            let idx = graph.add_node(node.id);
            node_map.insert(node.id, idx);
            coords.insert(node.id, (node.lat, node.lon));
        }

        for edge in network.edges {
            match (node_map.get(&edge.from), node_map.get(&edge.to)) {
                (Some(&a), Some(&b)) => {
                    // Parallel edges collapse to the most recent attributes.
                    graph.update_edge(a, b, edge.attrs);
                }
                _ => {
                    debug!(from = edge.from, to = edge.to, "edge references unknown node, skipped");
                }
            }
        }

        let points: Vec<GeomWithData<[f64; 2], i64>> = coords
            .iter()
            .map(|(&id, &(lat, lon))| GeomWithData::new([lon, lat], id))
            .collect();

        let segments: Vec<EdgeSegment> = graph
            .edge_references()
            .map(|e| EdgeSegment {
                id: e.id().index(),
                a: coords[&graph[e.source()]],
                b: coords[&graph[e.target()]],
            })
            .collect();

        Ok(Self {
            graph,
            node_map,
            coords,
            node_index: RTree::bulk_load(points),
            edge_index: RTree::bulk_load(segments.clone()),
            segments,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, node: i64) -> bool {
        self.node_map.contains_key(&node)
    }

    /// Node ids in insertion order. This order is what display labels and
    /// snapshots are built from.
    pub fn nodes(&self) -> impl Iterator<Item = i64> + '_ {
        self.graph.node_indices().map(move |i| self.graph[i])
    }

    pub fn coord(&self, node: i64) -> Option<(f64, f64)> {
        self.coords.get(&node).copied()
    }

    /// Successors of a node. Unknown nodes yield an empty iterator.
    pub fn neighbors(&self, node: i64) -> impl Iterator<Item = i64> + '_ {
        self.node_map
            .get(&node)
            .into_iter()
            .flat_map(move |&idx| self.graph.edges(idx).map(move |e| self.graph[e.target()]))
    }

    /// Outgoing edges with their attributes, for relaxation loops.
    pub fn out_edges(&self, node: i64) -> impl Iterator<Item = (i64, &EdgeAttrs)> + '_ {
        self.node_map.get(&node).into_iter().flat_map(move |&idx| {
            self.graph
                .edges(idx)
                .map(move |e| (self.graph[e.target()], e.weight()))
        })
    }

    /// All directed edges in edge-id order.
    pub fn edges(&self) -> impl Iterator<Item = (i64, i64, &EdgeAttrs)> + '_ {
        self.graph
            .edge_references()
            .map(move |e| (self.graph[e.source()], self.graph[e.target()], e.weight()))
    }

    pub fn has_edge(&self, from: i64, to: i64) -> bool {
        match (self.node_map.get(&from), self.node_map.get(&to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// Weight of the `from -> to` edge under the named attribute, falling
    /// back to [`DEFAULT_EDGE_WEIGHT`] when the attribute is absent.
    pub fn weight(&self, from: i64, to: i64, attr: &str) -> f64 {
        match (self.node_map.get(&from), self.node_map.get(&to)) {
            (Some(&a), Some(&b)) => self
                .graph
                .find_edge(a, b)
                .and_then(|e| self.graph.edge_weight(e))
                .map(|attrs| attrs.weight(attr))
                .unwrap_or(DEFAULT_EDGE_WEIGHT),
            _ => DEFAULT_EDGE_WEIGHT,
        }
    }

    /// Nearest graph node to a coordinate, by great-circle proximity.
    pub fn snap(&self, lat: f64, lon: f64) -> Option<i64> {
        self.node_index.nearest_neighbor(&[lon, lat]).map(|p| p.data)
    }

    pub fn segments(&self) -> &[EdgeSegment] {
        &self.segments
    }

    pub fn segment(&self, id: EdgeId) -> Option<&EdgeSegment> {
        self.segments.get(id)
    }

    /// Edge ids whose envelope intersects the window, in ascending order.
    pub fn edges_in(&self, rect: ViewRect) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .edge_index
            .locate_in_envelope_intersecting(&rect.aabb())
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Smallest window containing every node, or `None` for an empty graph.
    pub fn bounds(&self) -> Option<ViewRect> {
        let mut it = self.coords.values();
        let &(lat, lon) = it.next()?;
        let mut rect = ViewRect::new(lat, lon, lat, lon);
        for &(lat, lon) in it {
            rect.south = rect.south.min(lat);
            rect.west = rect.west.min(lon);
            rect.north = rect.north.max(lat);
            rect.east = rect.east.max(lon);
        }
        Some(rect)
    }
}

impl std::fmt::Debug for RoadGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> RoadGraph {
        // 1 -> 2 -> 4, 1 -> 3 -> 4 with distinct lengths.
        let network = RawNetwork {
            nodes: vec![
                RawNode { id: 1, lat: 0.0, lon: 0.0 },
                RawNode { id: 2, lat: 0.0, lon: 1.0 },
                RawNode { id: 3, lat: 1.0, lon: 0.0 },
                RawNode { id: 4, lat: 1.0, lon: 1.0 },
            ],
            edges: vec![
                RawEdge { from: 1, to: 2, attrs: EdgeAttrs::new().with("length", 2.0) },
                RawEdge { from: 2, to: 4, attrs: EdgeAttrs::new().with("length", 3.0) },
                RawEdge { from: 1, to: 3, attrs: EdgeAttrs::new().with("length", 4.0) },
                RawEdge { from: 3, to: 4, attrs: EdgeAttrs::new().with("length", 5.0) },
            ],
        };
        RoadGraph::from_network(network, &GraphLimits::default()).unwrap()
    }

    #[test]
    fn test_weight_defaults_to_one() {
        let g = diamond();
        assert_eq!(g.weight(1, 2, "length"), 2.0);
        assert_eq!(g.weight(1, 2, "travel_time"), DEFAULT_EDGE_WEIGHT);
        assert_eq!(g.weight(2, 1, "length"), DEFAULT_EDGE_WEIGHT);
    }

    #[test]
    fn test_parallel_edges_last_write_wins() {
        let network = RawNetwork {
            nodes: vec![
                RawNode { id: 10, lat: 0.0, lon: 0.0 },
                RawNode { id: 11, lat: 0.0, lon: 1.0 },
            ],
            edges: vec![
                RawEdge { from: 10, to: 11, attrs: EdgeAttrs::new().with("length", 7.0) },
                RawEdge { from: 10, to: 11, attrs: EdgeAttrs::new().with("length", 9.0) },
            ],
        };
        let g = RoadGraph::from_network(network, &GraphLimits::default()).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.weight(10, 11, "length"), 9.0);
    }

    #[test]
    fn test_node_ceiling_rejects_build() {
        let nodes = (0..5)
            .map(|i| RawNode { id: i, lat: 0.0, lon: i as f64 })
            .collect();
        let network = RawNetwork { nodes, edges: vec![] };
        let err = RoadGraph::from_network(network, &GraphLimits { max_nodes: 4 }).unwrap_err();
        assert!(matches!(err, BuildError::GraphTooLarge { nodes: 5, limit: 4 }));
    }

    #[test]
    fn test_edge_to_unknown_node_is_skipped() {
        let network = RawNetwork {
            nodes: vec![RawNode { id: 1, lat: 0.0, lon: 0.0 }],
            edges: vec![RawEdge { from: 1, to: 99, attrs: EdgeAttrs::new() }],
        };
        let g = RoadGraph::from_network(network, &GraphLimits::default()).unwrap();
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_snap_returns_nearest_node() {
        let g = diamond();
        assert_eq!(g.snap(0.1, 0.1), Some(1));
        assert_eq!(g.snap(0.9, 1.2), Some(4));
    }

    #[test]
    fn test_edges_in_window() {
        let g = diamond();
        // Window around node 1 catches the two edges leaving it.
        let ids = g.edges_in(ViewRect::new(-0.1, -0.1, 0.5, 0.5));
        assert!(!ids.is_empty());
        for id in &ids {
            let seg = g.segment(*id).unwrap();
            assert!(seg.a == (0.0, 0.0) || seg.b == (0.0, 0.0));
        }
        // Far-away window sees nothing.
        assert!(g.edges_in(ViewRect::new(10.0, 10.0, 11.0, 11.0)).is_empty());
    }

    #[test]
    fn test_neighbors_of_unknown_node_is_empty() {
        let g = diamond();
        assert_eq!(g.neighbors(999).count(), 0);
    }

    #[test]
    fn test_grid_source_is_deterministic() {
        let src = GridSource;
        let a = src.build((52.52, 13.405), 400.0, NetworkKind::Drive).unwrap();
        let b = src.build((52.52, 13.405), 400.0, NetworkKind::Drive).unwrap();
        assert_eq!(a, b);
        assert!(!a.nodes.is_empty());
        assert!(!a.edges.is_empty());
    }

    #[test]
    fn test_grid_source_edges_carry_both_attributes() {
        let src = GridSource;
        let net = src.build((52.52, 13.405), 300.0, NetworkKind::Foot).unwrap();
        let edge = &net.edges[0];
        let length = edge.attrs.get("length").unwrap();
        let time = edge.attrs.get("travel_time").unwrap();
        assert!(length > 0.0);
        assert!((time - length / NetworkKind::Foot.speed_mps()).abs() < 1e-9);
    }

    #[test]
    fn test_grid_source_snaps_center() {
        let src = GridSource;
        let net = src.build((52.52, 13.405), 300.0, NetworkKind::Drive).unwrap();
        let g = RoadGraph::from_network(net, &GraphLimits::default()).unwrap();
        let center = g.snap(52.52, 13.405).unwrap();
        let (lat, lon) = g.coord(center).unwrap();
        assert!(crate::geo::haversine_distance(52.52, 13.405, lat, lon) < 1.0);
    }

    #[test]
    fn test_bounds_cover_all_nodes() {
        let g = diamond();
        let b = g.bounds().unwrap();
        assert_eq!((b.south, b.west, b.north, b.east), (0.0, 0.0, 1.0, 1.0));
    }
}
