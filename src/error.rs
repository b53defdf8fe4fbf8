//! Typed errors for graph building, artifact storage, search and geocoding.

use thiserror::Error;

use crate::search::NegativeCycle;

/// Errors raised while assembling a road graph from a network source.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The source produced more nodes than the configured safety ceiling.
    /// No partial graph is retained.
    #[error("network of {nodes} nodes exceeds the safety limit of {limit}")]
    GraphTooLarge { nodes: usize, limit: usize },

    /// The source produced a graph with no usable nodes.
    #[error("network source produced an empty graph")]
    EmptyNetwork,

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Errors raised while reading or writing cached graph artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    /// Stored payload no longer matches its checksum.
    #[error("artifact checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("artifact format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },
}

/// Errors raised by the search engines and path reconstruction.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    NegativeCycle(#[from] NegativeCycle),

    /// The predecessor walk did not terminate within node-count steps.
    #[error("predecessor walk from node {start} exceeded {limit} steps")]
    MalformedPredecessorMap { start: i64, limit: usize },
}

/// Errors raised while resolving an address to coordinates.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("no match for address {address:?}")]
    NotFound {
        address: String,
        /// Closest fuzzy match, when one scored above the threshold.
        suggestion: Option<String>,
    },

    /// The resolver failed in a way that may succeed on retry. Never cached.
    #[error("geocoding temporarily unavailable: {reason}")]
    Transient { reason: String },
}

/// Session-level error covering the full build/search/geocode pipeline.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no graph has been built yet")]
    GraphNotBuilt,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::GraphTooLarge { nodes: 12_000, limit: 10_000 };
        assert_eq!(
            err.to_string(),
            "network of 12000 nodes exceeds the safety limit of 10000"
        );
    }

    #[test]
    fn test_checksum_error_is_hex_formatted() {
        let err = ArtifactError::ChecksumMismatch { stored: 0xdead, computed: 0xbeef };
        let msg = err.to_string();
        assert!(msg.contains("0x000000000000dead"), "{msg}");
        assert!(msg.contains("0x000000000000beef"), "{msg}");
    }

    #[test]
    fn test_session_error_wraps_build_error() {
        let err: SessionError = BuildError::EmptyNetwork.into();
        assert_eq!(err.to_string(), "network source produced an empty graph");
    }
}
