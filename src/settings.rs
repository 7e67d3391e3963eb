//! ringjoin application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;
use crate::transport::RetryPolicy;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT: u16 = 1060;
pub const DEFAULT_PORT: &str = "1060";
pub const STANDARD_POOL_SIZE: u32 = 50;
pub const DEFAULT_POOL_SIZE: &str = "50";
pub const DEFAULT_INITIAL_WAIT_MS: &str = "200";
pub const DEFAULT_MAX_WAIT_MS: &str = "10000";
pub const DEFAULT_INTERFACE: &str = "0.0.0.0";

/// Largest datagram either role will read.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

#[derive(Clone, Debug)]
pub struct RendezvousSettings {
    // Address the directory socket binds to
    pub listen: SocketAddr,

    // Number of identifiers in the pool (K)
    pub pool_size: u32,

    // Treat an acknowledgment for an unknown identifier as fatal
    pub strict_acks: bool,

    // Fixed RNG seed for identifier allocation
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct PeerSettings {
    // Host running the rendezvous
    pub rendezvous_host: String,

    // Well-known rendezvous port
    pub port: u16,

    pub retry: RetryPolicy,
}

#[derive(Clone, Debug)]
pub enum Role {
    Rendezvous(RendezvousSettings),
    Peer(PeerSettings),
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Rendezvous(_) => write!(f, "rendezvous"),
            Role::Peer(_) => write!(f, "peer"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub role: Role,

    // Emit logs as JSON lines
    pub log_json: bool,
}

impl RendezvousSettings {
    pub fn new(interface: IpAddr, port: u16, pool_size: u32) -> Result<Self> {
        if pool_size == 0 {
            return Err(config_error!("Identifier pool size must be at least 1"));
        }
        Ok(Self {
            listen: SocketAddr::new(interface, port),
            pool_size,
            strict_acks: false,
            seed: None,
        })
    }
}

impl Default for RendezvousSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], STANDARD_PORT)),
            pool_size: STANDARD_POOL_SIZE,
            strict_acks: false,
            seed: None,
        }
    }
}

impl PeerSettings {
    /// Resolve the rendezvous host to a socket address.
    pub async fn rendezvous_addr(&self) -> Result<SocketAddr> {
        tokio::net::lookup_host((self.rendezvous_host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| config_error!("Host {} did not resolve", self.rendezvous_host))
    }
}

/// Build a retry policy from millisecond options.
pub fn retry_policy(initial_wait_ms: u64, max_wait_ms: u64) -> Result<RetryPolicy> {
    RetryPolicy::new(
        Duration::from_millis(initial_wait_ms),
        Duration::from_millis(max_wait_ms),
    )
}
