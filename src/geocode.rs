//! Address resolution: the geocoder seam, a built-in gazetteer and an
//! async worker pool for lookups off the session loop.

use std::sync::Arc;

use strsim::jaro_winkler;
use tokio::sync::mpsc;
use tracing::debug;

use crate::render::EndpointSlot;

/// Minimum characters before prefix completion kicks in.
pub const MIN_PREFIX_LEN: usize = 3;
/// Maximum completions returned per query.
pub const MAX_SUGGESTIONS: usize = 5;
/// Fuzzy matches below this similarity are not worth suggesting.
const FUZZY_THRESHOLD: f64 = 0.85;

/// Result of one address lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    /// Resolved to a coordinate; `matched` is the canonical place name.
    Found { lat: f64, lon: f64, matched: String },
    /// No resolution; `suggestion` carries the closest fuzzy match if any.
    NotFound { suggestion: Option<String> },
    /// Lookup failed in a retryable way. Must not be cached.
    Transient { reason: String },
}

/// Resolves addresses to coordinates. Implementations are called from
/// worker tasks and must be cheap to share.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, address: &str) -> GeocodeOutcome;

    /// Prefix completions for partial input. Defaults to none.
    fn suggest(&self, prefix: &str) -> Vec<String> {
        let _ = prefix;
        Vec::new()
    }
}

const BUILTIN_PLACES: &[(&str, f64, f64)] = &[
    ("Amsterdam", 52.3676, 4.9041),
    ("Barcelona", 41.3874, 2.1686),
    ("Berlin", 52.5200, 13.4050),
    ("Brussels", 50.8503, 4.3517),
    ("Cologne", 50.9375, 6.9603),
    ("Copenhagen", 55.6761, 12.5683),
    ("Dublin", 53.3498, -6.2603),
    ("Frankfurt", 50.1109, 8.6821),
    ("Hamburg", 53.5511, 9.9937),
    ("Helsinki", 60.1699, 24.9384),
    ("Lisbon", 38.7223, -9.1393),
    ("London", 51.5074, -0.1278),
    ("Madrid", 40.4168, -3.7038),
    ("Milan", 45.4642, 9.1900),
    ("Munich", 48.1351, 11.5820),
    ("New York", 40.7128, -74.0060),
    ("Oslo", 59.9139, 10.7522),
    ("Paris", 48.8566, 2.3522),
    ("Prague", 50.0755, 14.4378),
    ("Rome", 41.9028, 12.4964),
    ("Stockholm", 59.3293, 18.0686),
    ("Vienna", 48.2082, 16.3738),
    ("Warsaw", 52.2297, 21.0122),
    ("Zurich", 47.3769, 8.5417),
];

/// In-memory gazetteer with exact, prefix and fuzzy lookup.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: Vec<(String, f64, f64)>,
}

impl Gazetteer {
    /// Gazetteer over the built-in place table.
    pub fn new() -> Self {
        Self {
            places: BUILTIN_PLACES
                .iter()
                .map(|&(name, lat, lon)| (name.to_string(), lat, lon))
                .collect(),
        }
    }

    /// Gazetteer over a custom table, mostly for tests and demos.
    pub fn from_entries(entries: Vec<(String, f64, f64)>) -> Self {
        Self { places: entries }
    }

    fn best_fuzzy(&self, query: &str) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;
        for (name, _, _) in &self.places {
            let score = jaro_winkler(query, &name.to_lowercase());
            if score >= FUZZY_THRESHOLD && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, name));
            }
        }
        best.map(|(_, name)| name.to_string())
    }
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for Gazetteer {
    fn resolve(&self, address: &str) -> GeocodeOutcome {
        let query = address.trim().to_lowercase();
        if query.is_empty() {
            return GeocodeOutcome::NotFound { suggestion: None };
        }
        for (name, lat, lon) in &self.places {
            if name.to_lowercase() == query {
                return GeocodeOutcome::Found { lat: *lat, lon: *lon, matched: name.clone() };
            }
        }
        GeocodeOutcome::NotFound { suggestion: self.best_fuzzy(&query) }
    }

    fn suggest(&self, prefix: &str) -> Vec<String> {
        let query = prefix.trim().to_lowercase();
        if query.len() < MIN_PREFIX_LEN {
            return Vec::new();
        }
        self.places
            .iter()
            .filter(|(name, _, _)| name.to_lowercase().starts_with(&query))
            .take(MAX_SUGGESTIONS)
            .map(|(name, _, _)| name.clone())
            .collect()
    }
}

/// One queued lookup.
#[derive(Debug)]
pub struct GeocodeJob {
    pub slot: EndpointSlot,
    pub address: String,
}

/// Completed lookup, delivered to the session loop.
#[derive(Debug, Clone)]
pub struct GeocodeReply {
    pub slot: EndpointSlot,
    pub address: String,
    pub outcome: GeocodeOutcome,
}

/// Fixed pool of worker tasks resolving addresses concurrently.
///
/// Workers share one job receiver and push [`GeocodeReply`] messages to
/// the receiver returned by [`GeocodePool::spawn`]. Dropping the pool
/// closes the job channel and the workers exit.
pub struct GeocodePool {
    jobs: mpsc::Sender<GeocodeJob>,
}

impl GeocodePool {
    /// Start `workers` tasks on the current runtime.
    pub fn spawn(
        geocoder: Arc<dyn Geocoder>,
        workers: usize,
    ) -> (Self, mpsc::Receiver<GeocodeReply>) {
        let (job_tx, job_rx) = mpsc::channel::<GeocodeJob>(32);
        let (reply_tx, reply_rx) = mpsc::channel::<GeocodeReply>(32);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        for worker in 0..workers.max(1) {
            let geocoder = Arc::clone(&geocoder);
            let job_rx = Arc::clone(&job_rx);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                loop {
                    // Lock only to receive, so workers take turns pulling
                    // jobs without serializing the lookups themselves.
                    let job = { job_rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let outcome = geocoder.resolve(&job.address);
                    debug!(worker, slot = %job.slot, address = %job.address, "geocode job resolved");
                    let reply =
                        GeocodeReply { slot: job.slot, address: job.address, outcome };
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
        (Self { jobs: job_tx }, reply_rx)
    }

    /// Queue a lookup. Returns false when the pool has shut down.
    pub async fn submit(&self, slot: EndpointSlot, address: String) -> bool {
        self.jobs.send(GeocodeJob { slot, address }).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_case_and_whitespace() {
        let g = Gazetteer::new();
        let outcome = g.resolve("  bErLiN ");
        assert_eq!(
            outcome,
            GeocodeOutcome::Found { lat: 52.52, lon: 13.405, matched: "Berlin".to_string() }
        );
    }

    #[test]
    fn test_empty_address_is_not_found() {
        let g = Gazetteer::new();
        assert_eq!(g.resolve("   "), GeocodeOutcome::NotFound { suggestion: None });
    }

    #[test]
    fn test_typo_yields_suggestion() {
        let g = Gazetteer::new();
        match g.resolve("Berln") {
            GeocodeOutcome::NotFound { suggestion } => {
                assert_eq!(suggestion.as_deref(), Some("Berlin"));
            }
            other => panic!("expected NotFound with suggestion, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_has_no_suggestion() {
        let g = Gazetteer::new();
        assert_eq!(g.resolve("qqxxzz"), GeocodeOutcome::NotFound { suggestion: None });
    }

    #[test]
    fn test_prefix_needs_three_characters() {
        let g = Gazetteer::new();
        assert!(g.suggest("be").is_empty());
        assert_eq!(g.suggest("ber"), vec!["Berlin".to_string()]);
        assert_eq!(g.suggest("NEW"), vec!["New York".to_string()]);
    }

    #[test]
    fn test_suggestions_are_capped() {
        let entries = (0..8)
            .map(|i| (format!("Testville {i}"), 1.0 + i as f64, 2.0))
            .collect();
        let g = Gazetteer::from_entries(entries);
        let hits = g.suggest("test");
        assert_eq!(hits.len(), MAX_SUGGESTIONS);
        assert_eq!(hits[0], "Testville 0");
    }

    #[tokio::test]
    async fn test_pool_resolves_jobs() {
        let (pool, mut replies) = GeocodePool::spawn(Arc::new(Gazetteer::new()), 4);
        assert!(pool.submit(EndpointSlot::Origin, "Berlin".to_string()).await);
        assert!(pool.submit(EndpointSlot::Destination, "Paris".to_string()).await);

        let mut seen = Vec::new();
        for _ in 0..2 {
            let reply = replies.recv().await.expect("worker reply");
            assert!(matches!(reply.outcome, GeocodeOutcome::Found { .. }));
            seen.push(reply.address);
        }
        seen.sort();
        assert_eq!(seen, vec!["Berlin".to_string(), "Paris".to_string()]);
    }

    #[tokio::test]
    async fn test_pool_reports_not_found() {
        let (pool, mut replies) = GeocodePool::spawn(Arc::new(Gazetteer::new()), 2);
        assert!(pool.submit(EndpointSlot::Origin, "Atlantis".to_string()).await);
        let reply = replies.recv().await.expect("worker reply");
        assert!(matches!(reply.outcome, GeocodeOutcome::NotFound { .. }));
        assert_eq!(reply.slot, EndpointSlot::Origin);
    }
}
