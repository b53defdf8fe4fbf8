//! # Routelens CLI
//!
//! Command-line interface for the routelens library: build road graphs,
//! run instrumented shortest-path searches, enumerate alternatives and
//! replay scripted viewport sweeps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::error;

use routelens::{
    Algorithm, EndpointSlot, GeocodeError, MapSession, NetworkKind, RecordingRenderer,
    SessionConfig, SessionEvent, SessionNotice, ViewRect,
};

/// Command-line interface for routelens
#[derive(Parser)]
#[command(name = "routelens")]
#[command(about = "Instrumented shortest-path search over road networks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or fetch from cache) the graph covering two coordinates
    Build {
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
        #[command(flatten)]
        graph: GraphOpts,
    },
    /// Find the shortest path between two addresses
    Route {
        /// Start address, or a literal "lat,lon"
        #[arg(long)]
        from: String,
        /// End address, or a literal "lat,lon"
        #[arg(long)]
        to: String,
        /// Search engine to run
        #[arg(long, value_enum, default_value_t = AlgorithmArg::Dijkstra)]
        algorithm: AlgorithmArg,
        /// Print the step-by-step explanation
        #[arg(long)]
        explain: bool,
        /// Emit the result as JSON, trace included
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        graph: GraphOpts,
    },
    /// Enumerate alternative paths between two addresses
    Alternatives {
        /// Start address, or a literal "lat,lon"
        #[arg(long)]
        from: String,
        /// End address, or a literal "lat,lon"
        #[arg(long)]
        to: String,
        /// How many paths to enumerate
        #[arg(short, default_value_t = 3)]
        k: usize,
        #[command(flatten)]
        graph: GraphOpts,
    },
    /// Replay a scripted viewport sweep and report batch behavior
    View {
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
        /// Number of sweep frames
        #[arg(long, default_value_t = 8)]
        frames: usize,
        #[command(flatten)]
        graph: GraphOpts,
    },
}

/// Options shared by every graph-building subcommand.
#[derive(Args)]
struct GraphOpts {
    /// Extra coverage around the endpoints, in meters
    #[arg(long, default_value_t = 1000.0)]
    buffer: f64,
    /// Travel profile for the network
    #[arg(long, value_enum, default_value_t = KindArg::Drive)]
    kind: KindArg,
    /// Directory for persisted graph artifacts
    #[arg(long, default_value = "graphs")]
    cache_dir: PathBuf,
    /// Safety ceiling on graph size
    #[arg(long, default_value_t = 10_000)]
    max_nodes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Drive,
    Bike,
    Foot,
}

impl From<KindArg> for NetworkKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Drive => NetworkKind::Drive,
            KindArg::Bike => NetworkKind::Bike,
            KindArg::Foot => NetworkKind::Foot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AlgorithmArg {
    Dijkstra,
    BellmanFord,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(algorithm: AlgorithmArg) -> Self {
        match algorithm {
            AlgorithmArg::Dijkstra => Algorithm::Dijkstra,
            AlgorithmArg::BellmanFord => Algorithm::BellmanFord,
        }
    }
}

/// Parse a "lat,lon" coordinate pair.
fn parse_coord(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("coordinate must be in format 'lat,lon'");
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok((lat, lon))
}

fn session_for(opts: &GraphOpts) -> (MapSession, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::new());
    let mut config = SessionConfig::default();
    config.buffer_m = opts.buffer;
    config.network_kind = opts.kind.into();
    config.limits.max_nodes = opts.max_nodes;
    let session = MapSession::new(config, &opts.cache_dir, renderer.clone());
    (session, renderer)
}

/// Turn one endpoint argument into coordinates: literal "lat,lon" first,
/// then the gazetteer, surfacing its suggestion on a miss.
fn resolve(session: &mut MapSession, slot: EndpointSlot, address: &str) -> Result<(f64, f64)> {
    if let Ok(coord) = parse_coord(address) {
        println!("{slot}: {address} -> ({:.5}, {:.5})", coord.0, coord.1);
        return Ok(coord);
    }
    match session.resolve_endpoint(slot, address) {
        Ok(coord) => {
            println!("{slot}: {address} -> ({:.5}, {:.5})", coord.0, coord.1);
            Ok(coord)
        }
        Err(GeocodeError::NotFound { address, suggestion: Some(hint) }) => {
            anyhow::bail!("no match for address {address:?} (did you mean {hint}?)")
        }
        Err(err) => Err(err).with_context(|| format!("resolving {slot} address")),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Logging goes to stderr so piped output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { from, to, graph } => build_graph(&from, &to, &graph),
        Commands::Route { from, to, algorithm, explain, json, graph } => {
            route(&from, &to, algorithm.into(), explain, json, &graph)
        }
        Commands::Alternatives { from, to, k, graph } => alternatives(&from, &to, k, &graph),
        Commands::View { from, to, frames, graph } => view(&from, &to, frames, &graph).await,
    }
}

fn build_graph(from: &str, to: &str, opts: &GraphOpts) -> Result<()> {
    let from = parse_coord(from)?;
    let to = parse_coord(to)?;
    let (mut session, _renderer) = session_for(opts);

    let start = Instant::now();
    let summary = session.build(from, to)?;
    println!(
        "Built graph: {} nodes, {} edges ({})",
        summary.nodes, summary.edges, summary.disposition
    );
    println!(
        "Center ({:.5}, {:.5}), radius {:.0} m",
        summary.center.0, summary.center.1, summary.radius_m
    );
    println!("Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn route(
    from: &str,
    to: &str,
    algorithm: Algorithm,
    explain: bool,
    json: bool,
    opts: &GraphOpts,
) -> Result<()> {
    let (mut session, _renderer) = session_for(opts);
    let origin = resolve(&mut session, EndpointSlot::Origin, from)?;
    let destination = resolve(&mut session, EndpointSlot::Destination, to)?;
    session.build(origin, destination)?;

    let start = Instant::now();
    let report = session.route(algorithm)?;

    if json {
        let out = json!({
            "algorithm": report.algorithm,
            "source": report.source,
            "target": report.target,
            "distance": report.distance,
            "path": report.display_path,
            "negative_cycle": report.negative_cycle,
            "steps": report.trace,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if explain {
        println!("{}", report.explanation);
        return Ok(());
    }

    if let Some((cycle_from, cycle_to)) = report.negative_cycle {
        println!("Negative cycle detected via edge {cycle_from} -> {cycle_to}; no shortest path exists.");
        return Ok(());
    }
    if report.path.is_empty() {
        println!("No path found between {from} and {to}.");
        return Ok(());
    }

    let ids: Vec<String> = report.display_path.iter().map(|id| format!("Node {id}")).collect();
    println!("Route found in {:.3}s", start.elapsed().as_secs_f64());
    println!("Path: {}", ids.join(" → "));
    println!("Distance: {:.2} over {} nodes", report.distance, report.path.len());
    Ok(())
}

fn alternatives(from: &str, to: &str, k: usize, opts: &GraphOpts) -> Result<()> {
    let (mut session, _renderer) = session_for(opts);
    let origin = resolve(&mut session, EndpointSlot::Origin, from)?;
    let destination = resolve(&mut session, EndpointSlot::Destination, to)?;
    session.build(origin, destination)?;

    let paths = session.alternatives(k)?;
    if paths.is_empty() {
        println!("No path found between {from} and {to}.");
        return Ok(());
    }

    let labels = session.labels().context("no active graph")?;
    for (i, path) in paths.iter().enumerate() {
        let ids: Vec<String> = path.nodes.iter().map(|&n| labels.name(n)).collect();
        println!("{}. cost {:.2}: {}", i + 1, path.cost, ids.join(" → "));
    }
    if paths.len() < k {
        println!("Only {} simple paths exist.", paths.len());
    }
    Ok(())
}

/// Feed a scripted zoom to the session loop and watch it coalesce the
/// burst into one refresh, then drain the queued backlog to convergence.
async fn view(from: &str, to: &str, frames: usize, opts: &GraphOpts) -> Result<()> {
    let from = parse_coord(from)?;
    let to = parse_coord(to)?;
    let (mut session, renderer) = session_for(opts);
    let summary = session.build(from, to)?;
    println!(
        "Built graph: {} nodes, {} edges ({})",
        summary.nodes, summary.edges, summary.disposition
    );

    let bounds = session.graph_bounds().context("graph reported no bounds")?;
    let mut handle = session.spawn();

    let frames = frames.max(1);
    for frame in 0..frames {
        // Zoom from the full extent toward the southwest corner, ending
        // on a quarter-size window.
        let t = if frames == 1 { 0.0 } else { frame as f64 / (frames - 1) as f64 };
        let north = bounds.south + (bounds.north - bounds.south) * (1.0 - 0.75 * t);
        let east = bounds.west + (bounds.east - bounds.west) * (1.0 - 0.75 * t);
        let rect = ViewRect::new(bounds.south, bounds.west, north, east);
        if handle.events.send(SessionEvent::ViewportChanged(rect)).await.is_err() {
            anyhow::bail!("session loop closed while sending frames");
        }
    }
    println!("Sent {frames} viewport frames; the debounce keeps only the newest.");

    let report = loop {
        match handle.notices.recv().await {
            Some(SessionNotice::Viewport(report)) => break report,
            Some(_) => {}
            None => anyhow::bail!("session loop closed before the refresh"),
        }
    };
    println!(
        "refresh: {:?}, target {}, drawn {}, removed {}, queued {}{}",
        report.kind,
        report.target_size,
        report.drawn_now,
        report.removed,
        report.queued,
        if report.applied { "" } else { " (skipped)" }
    );

    let mut queued = report.queued;
    while queued > 0 {
        match handle.notices.recv().await {
            Some(SessionNotice::Drain(drain)) => {
                println!("  drained {} ({} still queued)", drain.drawn, drain.remaining);
                queued = drain.remaining;
            }
            Some(_) => {}
            None => anyhow::bail!("session loop closed mid-drain"),
        }
    }

    let session = handle.shutdown().await.context("session loop panicked")?;
    let visible = session.painter().visible_count();
    let drawn = session.painter().drawn_count();
    println!(
        "Converged: {visible} visible, {drawn} drawn, {} live on renderer",
        renderer.edge_count()
    );
    if visible != drawn {
        anyhow::bail!("viewport failed to converge: {visible} visible vs {drawn} drawn");
    }
    Ok(())
}
