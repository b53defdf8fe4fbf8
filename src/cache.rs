//! Two-level graph cache: in-memory by quantized key, artifacts on disk.
//!
//! Keys quantize the build center to five decimal places (about one meter)
//! and the radius to whole meters, so nearby float inputs share one entry.
//! Eviction is explicit only; callers decide when a rebuild is wanted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::artifact;
use crate::error::BuildError;
use crate::graph::{GraphLimits, NetworkKind, NetworkSource, RoadGraph};

/// Quantized cache key for one built graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphKey {
    lat_e5: i64,
    lon_e5: i64,
    radius_m: i64,
}

impl GraphKey {
    pub fn quantize(center: (f64, f64), radius_m: f64) -> Self {
        Self {
            lat_e5: (center.0 * 1e5).round() as i64,
            lon_e5: (center.1 * 1e5).round() as i64,
            radius_m: radius_m.round() as i64,
        }
    }

    /// Artifact file name for this key, e.g. `pt_52.52000_13.40500_1200.graph`.
    pub fn file_name(&self) -> String {
        format!(
            "pt_{:.5}_{:.5}_{}.graph",
            self.lat_e5 as f64 / 1e5,
            self.lon_e5 as f64 / 1e5,
            self.radius_m
        )
    }
}

/// Where a served graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    Memory,
    Disk,
    Built,
}

impl std::fmt::Display for CacheDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheDisposition::Memory => write!(f, "memory hit"),
            CacheDisposition::Disk => write!(f, "disk hit"),
            CacheDisposition::Built => write!(f, "built fresh"),
        }
    }
}

/// Graph store backed by a directory of artifacts plus an in-memory map.
/// Keys carry geometry only; callers serving several network kinds give
/// each kind its own store directory.
#[derive(Debug)]
pub struct GraphStore {
    dir: PathBuf,
    memory: FxHashMap<GraphKey, Arc<RoadGraph>>,
}

impl GraphStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), memory: FxHashMap::default() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serve the graph for `(center, radius)`: memory first, then disk, then
    /// a fresh build through `source`. Unreadable artifacts are rebuilt and
    /// overwritten rather than surfaced as errors.
    pub fn load_or_build(
        &mut self,
        center: (f64, f64),
        radius_m: f64,
        kind: NetworkKind,
        source: &dyn NetworkSource,
        limits: &GraphLimits,
    ) -> Result<(Arc<RoadGraph>, CacheDisposition), BuildError> {
        let key = GraphKey::quantize(center, radius_m);
        if let Some(graph) = self.memory.get(&key) {
            debug!(file = %key.file_name(), "graph cache hit (memory)");
            return Ok((Arc::clone(graph), CacheDisposition::Memory));
        }

        let path = self.dir.join(key.file_name());
        if path.exists() {
            match artifact::read_artifact(&path, limits) {
                Ok(graph) => {
                    debug!(file = %key.file_name(), "graph cache hit (disk)");
                    let graph = Arc::new(graph);
                    self.memory.insert(key, Arc::clone(&graph));
                    return Ok((graph, CacheDisposition::Disk));
                }
                Err(BuildError::Artifact(err)) => {
                    warn!(file = %key.file_name(), error = %err, "artifact unreadable, rebuilding");
                }
                Err(err) => return Err(err),
            }
        }

        let network = source.build(center, radius_m, kind)?;
        let graph = RoadGraph::from_network(network, limits)?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            file = %key.file_name(),
            "built road graph"
        );

        std::fs::create_dir_all(&self.dir).map_err(crate::error::ArtifactError::from)?;
        artifact::write_artifact(&path, &graph)?;

        let graph = Arc::new(graph);
        self.memory.insert(key, Arc::clone(&graph));
        Ok((graph, CacheDisposition::Built))
    }

    /// Drop every in-memory entry. Disk artifacts stay in place.
    pub fn invalidate(&mut self) {
        self.memory.clear();
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GridSource;

    const CENTER: (f64, f64) = (52.52, 13.405);

    #[test]
    fn test_key_quantization_merges_nearby_inputs() {
        let a = GraphKey::quantize((52.520001, 13.405002), 1200.3);
        let b = GraphKey::quantize((52.520003, 13.404998), 1199.9);
        assert_eq!(a, b);
        let c = GraphKey::quantize((52.5201, 13.405), 1200.0);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_file_name_format() {
        let key = GraphKey::quantize((52.52, -13.405), 1200.0);
        assert_eq!(key.file_name(), "pt_52.52000_-13.40500_1200.graph");
    }

    #[test]
    fn test_store_serves_memory_then_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = GraphStore::new(dir.path());
        let limits = GraphLimits::default();

        let (_, first) = store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(first, CacheDisposition::Built);

        let (_, second) = store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(second, CacheDisposition::Memory);

        // A fresh store over the same directory finds the artifact.
        let mut cold = GraphStore::new(dir.path());
        let (_, third) = cold
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(third, CacheDisposition::Disk);
    }

    #[test]
    fn test_invalidate_clears_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = GraphStore::new(dir.path());
        let limits = GraphLimits::default();

        store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(store.memory_len(), 1);

        store.invalidate();
        assert_eq!(store.memory_len(), 0);

        let (_, after) = store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(after, CacheDisposition::Disk);
    }

    #[test]
    fn test_corrupt_artifact_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = GraphStore::new(dir.path());
        let limits = GraphLimits::default();

        store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        store.invalidate();

        let path = dir.path().join(GraphKey::quantize(CENTER, 300.0).file_name());
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let (_, disposition) = store
            .load_or_build(CENTER, 300.0, NetworkKind::Drive, &GridSource, &limits)
            .unwrap();
        assert_eq!(disposition, CacheDisposition::Built);
    }
}
