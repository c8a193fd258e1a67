//! Lockstep Network Layer
//!
//! Host-authoritative lockstep over an unreliable datagram channel: role
//! election, peer handshake, per-tick input transport and world snapshots.

pub mod authority;
pub mod engine;
pub mod handshake;
pub mod memory;
pub mod peer;
pub mod port;
pub mod replication;
pub mod stats;
pub mod wire;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

pub use engine::{EngineState, LockstepEngine, ObserverId, TickEvent};
pub use port::{Datagram, DatagramPort, UdpPort};

/// Default UDP port for both the Host listener and the Client's target.
pub const DEFAULT_PORT: u16 = 7777;

/// Peer identifier. 0 is always the local process; the Host hands out 1..=255.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PeerId(pub u8);

impl PeerId {
    pub const SELF: PeerId = PeerId(0);

    pub fn is_self(self) -> bool {
        self == Self::SELF
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Decided once at startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Port the Host listens on and Clients send to.
    pub port: u16,
    /// Address Clients use to reach the Host.
    pub host_address: IpAddr,
    /// Interface the Host binds.
    pub bind_address: IpAddr,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}
