//! Peer-to-peer simulator CLI
//!
//! Run a deterministic bootstrap + discovery + gossip scenario.
//!
//! # Example
//!
//! ```bash
//! # Run a deterministic simulation with a fixed seed
//! p2psim --seed 42 -b 2 -p 100 -d 60
//!
//! # Dump the final topology as Graphviz DOT
//! p2psim -p 30 --dot > topology.dot
//! ```

use clap::Parser;
use p2psim_services::{ConnectionManagerConfig, GossipConfig};
use p2psim_simulator::{Scenario, ScenarioConfig};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Peer-to-peer simulator
///
/// Single-threaded, reproducible when the same seed is used.
#[derive(Parser, Debug)]
#[command(name = "p2psim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of bootstrap servers
    #[arg(short = 'b', long, default_value = "1")]
    bootstrap: usize,

    /// Number of ordinary peers
    #[arg(short = 'p', long, default_value = "20")]
    peers: usize,

    /// Simulation duration in seconds
    #[arg(short = 'd', long, default_value = "30")]
    duration: u64,

    /// Random seed for reproducible results. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Neighbours each gossip message is forwarded to
    #[arg(long, default_value = "3")]
    fanout: usize,

    /// Hops a gossip message may travel
    #[arg(long, default_value = "4")]
    ttl: u32,

    /// Seconds between messages produced by each peer (0 disables production)
    #[arg(long, default_value = "2")]
    produce_interval: u64,

    /// Peers below this many connections look for more
    #[arg(long, default_value = "4")]
    min_peers: usize,

    /// Discovery stops at this many connections
    #[arg(long, default_value = "8")]
    max_peers: usize,

    /// Packet loss rate (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    packet_loss: f64,

    /// Print the final topology in Graphviz DOT format instead of the report
    #[arg(long)]
    dot: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,p2psim_simulator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!(
        bootstrap = args.bootstrap,
        peers = args.peers,
        duration_secs = args.duration,
        seed,
        fanout = args.fanout,
        ttl = args.ttl,
        "Starting simulation"
    );

    let mut gossip = GossipConfig::default()
        .with_fanout(args.fanout)
        .with_ttl(args.ttl);
    if args.produce_interval > 0 {
        gossip = gossip.with_produce_interval(Duration::from_secs(args.produce_interval));
    }

    let config = ScenarioConfig::new(args.bootstrap, args.peers)
        .with_seed(seed)
        .with_duration(Duration::from_secs(args.duration))
        .with_connection_manager(
            ConnectionManagerConfig::default()
                .with_min_peers(args.min_peers)
                .with_max_peers(args.max_peers),
        )
        .with_gossip(gossip);
    let network = config.network.clone().with_packet_loss_rate(args.packet_loss);
    let config = config.with_network(network);

    let mut scenario = match Scenario::new(config) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!(error = %e, "Failed to create scenario");
            return ExitCode::FAILURE;
        }
    };
    let report = match scenario.run() {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Simulation failed");
            return ExitCode::FAILURE;
        }
    };

    if args.dot {
        println!("{}", scenario.dot());
    } else {
        report.print_summary();
    }
    ExitCode::SUCCESS
}
