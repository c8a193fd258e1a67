//! Datagram port
//!
//! Minimal unreliable send/receive over one socket per process. Everything is
//! non-blocking: receiving returns whatever is already queued, sending is fire
//! and forget, and a failed send is indistinguishable from a lost packet.

use crate::wire::MAX_PACKET_LEN;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use thiserror::Error;

/// Receive buffer; fits the largest snapshot.
pub const RECV_BUFFER_LEN: usize = 4096;

const _: () = assert!(MAX_PACKET_LEN <= RECV_BUFFER_LEN);

/// Startup failures. Nothing after startup is reported as an error.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to configure socket: {0}")]
    Configure(#[source] std::io::Error),
}

impl PortError {
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, PortError::Bind { source, .. } if source.kind() == ErrorKind::AddrInUse)
    }
}

/// One received datagram and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: SocketAddr,
    pub bytes: Vec<u8>,
}

pub trait DatagramPort {
    /// Send to the default destination (the connected peer, or the first
    /// sender seen on a listening port). Returns `false` if nothing went out.
    fn send(&mut self, bytes: &[u8]) -> bool;

    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> bool;

    /// Everything queued right now; empty when nothing is waiting.
    fn receive_all(&mut self) -> Vec<Datagram>;

    /// Drop the socket. In-flight data is lost; later calls do nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Opens ports: listen on an address, or reach a remote one.
pub trait Transport {
    type Port: DatagramPort;

    fn bind(&self, addr: SocketAddr) -> Result<Self::Port, PortError>;

    fn connect(&self, remote: SocketAddr) -> Result<Self::Port, PortError>;
}

/// Real UDP sockets.
#[derive(Debug, Copy, Clone, Default)]
pub struct Udp;

impl Transport for Udp {
    type Port = UdpPort;

    fn bind(&self, addr: SocketAddr) -> Result<UdpPort, PortError> {
        UdpPort::bind(addr)
    }

    fn connect(&self, remote: SocketAddr) -> Result<UdpPort, PortError> {
        UdpPort::connect(remote)
    }
}

/// Non-blocking UDP socket.
#[derive(Debug)]
pub struct UdpPort {
    socket: Option<UdpSocket>,
    default_destination: Option<SocketAddr>,
    rx_buf: Box<[u8; RECV_BUFFER_LEN]>,
}

impl UdpPort {
    /// Listen on `addr`. The default destination is learned from the first
    /// inbound datagram.
    pub fn bind(addr: SocketAddr) -> Result<Self, PortError> {
        let socket = UdpSocket::bind(addr).map_err(|source| PortError::Bind { addr, source })?;
        socket.set_nonblocking(true).map_err(PortError::Configure)?;
        tracing::info!("udp listening on {}", addr);
        Ok(Self::from_socket(socket, None))
    }

    /// Bind an ephemeral local port and fix `remote` as the destination.
    pub fn connect(remote: SocketAddr) -> Result<Self, PortError> {
        let local = SocketAddr::new(unspecified_like(remote.ip()), 0);
        let socket = UdpSocket::bind(local).map_err(|source| PortError::Bind {
            addr: local,
            source,
        })?;
        socket
            .connect(remote)
            .map_err(|source| PortError::Connect {
                addr: remote,
                source,
            })?;
        socket.set_nonblocking(true).map_err(PortError::Configure)?;
        tracing::info!("udp client -> {}", remote);
        Ok(Self::from_socket(socket, Some(remote)))
    }

    fn from_socket(socket: UdpSocket, default_destination: Option<SocketAddr>) -> Self {
        Self {
            socket: Some(socket),
            default_destination,
            rx_buf: Box::new([0u8; RECV_BUFFER_LEN]),
        }
    }

    pub fn default_destination(&self) -> Option<SocketAddr> {
        self.default_destination
    }
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

impl DatagramPort for UdpPort {
    fn send(&mut self, bytes: &[u8]) -> bool {
        let Some(to) = self.default_destination else {
            tracing::debug!("send dropped: no destination yet");
            return false;
        };
        self.send_to(bytes, to)
    }

    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };

        // a connected socket refuses send_to on some platforms
        let result = if socket.peer_addr().ok() == Some(to) {
            socket.send(bytes)
        } else {
            socket.send_to(bytes, to)
        };

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("send to {} swallowed: {}", to, e);
                false
            }
        }
    }

    fn receive_all(&mut self) -> Vec<Datagram> {
        let mut out = Vec::new();
        let Some(socket) = &self.socket else {
            return out;
        };

        loop {
            match socket.recv_from(&mut self.rx_buf[..]) {
                Ok((len, from)) => {
                    if self.default_destination.is_none() {
                        self.default_destination = Some(from);
                    }
                    out.push(Datagram {
                        from,
                        bytes: self.rx_buf[..len].to_vec(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    // e.g. ICMP port unreachable surfacing on a connected socket
                    tracing::debug!("receive swallowed: {}", e);
                    break;
                }
            }
        }
        out
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            self.default_destination = None;
            tracing::info!("udp port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()?.local_addr().ok()
    }
}

impl Drop for UdpPort {
    fn drop(&mut self) {
        self.close();
    }
}
