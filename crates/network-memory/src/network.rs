//! Simulated network with deterministic latency and packet loss.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Floor for a sampled one-way latency.
const MIN_LATENCY: Duration = Duration::from_millis(1);

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base latency between locations without an explicit entry.
    pub default_latency: Duration,
    /// Base latency per location pair. Entries are symmetric when added
    /// through [`NetworkConfig::with_latency`].
    pub latencies: BTreeMap<(String, String), Duration>,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_latency: Duration::from_millis(50),
            latencies: BTreeMap::new(),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

impl NetworkConfig {
    /// Set the base latency between two locations, in both directions.
    pub fn with_latency(
        mut self,
        a: impl Into<String>,
        b: impl Into<String>,
        latency: Duration,
    ) -> Self {
        let (a, b) = (a.into(), b.into());
        self.latencies.insert((b.clone(), a.clone()), latency);
        self.latencies.insert((a, b), latency);
        self
    }

    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_packet_loss_rate(mut self, rate: f64) -> Self {
        self.packet_loss_rate = rate.clamp(0.0, 1.0);
        self
    }
}

/// Simulated network for deterministic message delivery.
///
/// Supports:
/// - Per-location-pair base latency with jitter
/// - Packet loss (probabilistic message drops)
/// - Transmission delay from message size and link bandwidth
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    // ─── Packet Loss ───

    /// Check if a packet should be dropped based on the configured loss rate.
    /// Returns true if the packet should be dropped.
    pub fn should_drop_packet(&self, rng: &mut ChaCha8Rng) -> bool {
        self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate
    }

    /// Set the packet loss rate (0.0 - 1.0).
    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn packet_loss_rate(&self) -> f64 {
        self.config.packet_loss_rate
    }

    // ─── Delay ───

    /// Base latency between two locations, before jitter.
    pub fn base_latency(&self, from: &str, to: &str) -> Duration {
        self.config
            .latencies
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(self.config.default_latency)
    }

    /// Sample a one-way latency between two locations.
    pub fn sample_latency(&self, from: &str, to: &str, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.base_latency(from, to);

        let jitter_range = base.as_secs_f64() * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        let latency = Duration::from_secs_f64((base.as_secs_f64() + jitter).max(0.0));
        latency.max(MIN_LATENCY)
    }

    /// Time to push `size_bytes` through a link of `bandwidth` Mbit/s.
    ///
    /// A non-positive bandwidth is treated as unconstrained.
    pub fn transmission_delay(size_bytes: u64, bandwidth: f64) -> Duration {
        if bandwidth <= 0.0 || !bandwidth.is_finite() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(size_bytes as f64 * 8.0 / (bandwidth * 1_000_000.0))
    }

    // ─── Message Delivery Decision ───

    /// Determine if a message should be delivered between two locations.
    /// Returns `None` if the message is lost, otherwise the total delay:
    /// sampled latency plus transmission delay.
    pub fn should_deliver(
        &self,
        from: &str,
        to: &str,
        size_bytes: u64,
        bandwidth: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<Duration> {
        if self.should_drop_packet(rng) {
            trace!(from, to, "Message lost");
            return None;
        }
        let latency = self.sample_latency(from, to, rng);
        Some(latency + Self::transmission_delay(size_bytes, bandwidth))
    }
}
