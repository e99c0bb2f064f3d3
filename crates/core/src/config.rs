//! Tunable defaults. Every field has a spec-mandated default; all are
//! overridable so tests can bind ephemeral ports without colliding.

use std::time::Duration;

/// Default TCP port for the session transport.
pub const DEFAULT_TCP_PORT: u16 = 6789;
/// Default UDP port for discovery.
pub const DEFAULT_UDP_PORT: u16 = 6790;
/// Default per-connection write queue back-pressure threshold.
pub const DEFAULT_WRITE_QUEUE_CAP: usize = 1024;
/// Default discovery wall-clock timeout.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
/// Default bound on a document's pending-update queue.
pub const DEFAULT_PENDING_QUEUE_CAP: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_port: u16,
    pub udp_port: u16,
    pub write_queue_cap: usize,
    pub discovery_timeout: Duration,
    pub pending_queue_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            write_queue_cap: DEFAULT_WRITE_QUEUE_CAP,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            pending_queue_cap: DEFAULT_PENDING_QUEUE_CAP,
        }
    }
}

impl Config {
    /// Applies `SVSMATE_TCP_PORT` / `SVSMATE_UDP_PORT` overrides on top of
    /// `self`, ignoring unset or unparsable variables.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SVSMATE_TCP_PORT") {
            if let Ok(port) = v.parse() {
                self.tcp_port = port;
            }
        }
        if let Ok(v) = std::env::var("SVSMATE_UDP_PORT") {
            if let Ok(port) = v.parse() {
                self.udp_port = port;
            }
        }
        self
    }
}
