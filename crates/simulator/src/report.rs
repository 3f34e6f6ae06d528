//! End-of-run summary.

use p2psim_simulation::SimulationStats;
use std::time::Duration;

/// What a scenario run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub seed: u64,
    pub simulated_time: Duration,
    pub bootstrap_servers: usize,
    /// Ordinary peers.
    pub peers: usize,
    /// Links between ordinary peers.
    pub edges: usize,
    /// Connected components of the graph without bootstrap servers.
    pub components: usize,
    pub min_degree: usize,
    pub max_degree: usize,
    /// Mbit/s over every connection entry, bootstrap links included.
    pub avg_bandwidth: Option<f64>,
    pub median_bandwidth: Option<f64>,
    /// Distinct gossip messages seen by at least one ordinary peer.
    pub messages_produced: usize,
    /// Mean fraction of ordinary peers each message reached.
    pub avg_coverage: f64,
    /// Messages every ordinary peer stored.
    pub fully_covered: usize,
    pub stats: SimulationStats,
}

impl ScenarioReport {
    /// Print a human-readable summary.
    pub fn print_summary(&self) {
        println!("\n=== Scenario Report ===");
        println!("Seed: {}", self.seed);
        println!("Simulated time: {:.2}s", self.simulated_time.as_secs_f64());
        println!(
            "Peers: {} (+{} bootstrap servers)",
            self.peers, self.bootstrap_servers
        );

        println!("\n=== Topology ===");
        println!("Links: {}", self.edges);
        println!("Connected components: {}", self.components);
        println!("Degree: min {} / max {}", self.min_degree, self.max_degree);
        match (self.avg_bandwidth, self.median_bandwidth) {
            (Some(avg), Some(median)) => {
                println!("Bandwidth: avg {avg:.2} Mbit/s, median {median:.2} Mbit/s")
            }
            _ => println!("Bandwidth: no connections"),
        }

        println!("\n=== Gossip ===");
        println!("Messages: {}", self.messages_produced);
        println!("Average coverage: {:.1}%", self.avg_coverage * 100.0);
        println!(
            "Fully covered: {}/{}",
            self.fully_covered, self.messages_produced
        );

        println!("\n=== Traffic ===");
        println!("Events processed: {}", self.stats.events_processed);
        println!(
            "Messages: {} sent, {} delivered, {} dropped ({} lost, {} over closed links)",
            self.stats.messages_sent,
            self.stats.messages_delivered,
            self.stats.messages_dropped(),
            self.stats.messages_dropped_loss,
            self.stats.messages_dropped_disconnected
        );
        println!("Bytes sent: {}", self.stats.bytes_sent);
        for (message_type, count) in &self.stats.messages_by_type {
            println!("  {message_type}: {count}");
        }
    }
}
