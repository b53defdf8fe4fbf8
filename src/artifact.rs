//! Graph artifacts: versioned, checksummed snapshots persisted with bincode.
//!
//! An artifact is a header (format version, build timestamp, CRC-64 of the
//! payload) followed by the bincode-encoded graph snapshot. Node and edge
//! order is preserved, so display labels survive a save/load cycle.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use crc::{Crc, CRC_64_GO_ISO};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArtifactError, BuildError};
use crate::graph::{EdgeAttrs, GraphLimits, RawEdge, RawNetwork, RawNode, RoadGraph};

/// Bump when the snapshot encoding changes shape.
pub const ARTIFACT_VERSION: u16 = 1;

/// CRC-64/GO-ISO, the checksum used for artifact payloads.
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Calculate the CRC-64 checksum of a byte slice.
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactHeader {
    version: u16,
    built_at: DateTime<Utc>,
    checksum: u64,
}

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    header: ArtifactHeader,
    payload: Vec<u8>,
}

/// Flat graph encoding: nodes as `(id, lat, lon)` in insertion order, edges
/// as `(from, to, attrs)` in edge-id order.
#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    nodes: Vec<(i64, f64, f64)>,
    edges: Vec<(i64, i64, EdgeAttrs)>,
}

impl GraphSnapshot {
    fn from_graph(graph: &RoadGraph) -> Self {
        let nodes = graph
            .nodes()
            .filter_map(|id| graph.coord(id).map(|(lat, lon)| (id, lat, lon)))
            .collect();
        let edges = graph
            .edges()
            .map(|(from, to, attrs)| (from, to, attrs.clone()))
            .collect();
        Self { nodes, edges }
    }

    fn into_network(self) -> RawNetwork {
        RawNetwork {
            nodes: self
                .nodes
                .into_iter()
                .map(|(id, lat, lon)| RawNode { id, lat, lon })
                .collect(),
            edges: self
                .edges
                .into_iter()
                .map(|(from, to, attrs)| RawEdge { from, to, attrs })
                .collect(),
        }
    }
}

/// Persist a graph snapshot to `path`, overwriting any existing artifact.
pub fn write_artifact(path: &Path, graph: &RoadGraph) -> Result<(), ArtifactError> {
    let payload = bincode::serialize(&GraphSnapshot::from_graph(graph))?;
    let header = ArtifactHeader {
        version: ARTIFACT_VERSION,
        built_at: Utc::now(),
        checksum: checksum(&payload),
    };
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &ArtifactFile { header, payload })?;
    Ok(())
}

/// Load a graph from an artifact, verifying format version and checksum
/// before decoding the payload.
pub fn read_artifact(path: &Path, limits: &GraphLimits) -> Result<RoadGraph, BuildError> {
    let file = File::open(path).map_err(ArtifactError::from)?;
    let reader = BufReader::new(file);
    let ArtifactFile { header, payload } =
        bincode::deserialize_from(reader).map_err(ArtifactError::from)?;

    if header.version != ARTIFACT_VERSION {
        return Err(ArtifactError::VersionMismatch {
            found: header.version,
            expected: ARTIFACT_VERSION,
        }
        .into());
    }
    let computed = checksum(&payload);
    if computed != header.checksum {
        return Err(ArtifactError::ChecksumMismatch { stored: header.checksum, computed }.into());
    }

    debug!(version = header.version, built_at = %header.built_at, "loaded graph artifact");
    let snapshot: GraphSnapshot = bincode::deserialize(&payload).map_err(ArtifactError::from)?;
    RoadGraph::from_network(snapshot.into_network(), limits)
}
