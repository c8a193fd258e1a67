//! In-process datagram network
//!
//! Deterministic stand-in for UDP used by tests and local simulations. Ports
//! are keyed by port number on the loopback address; binding a taken port fails
//! the same way a real socket does. Delivery to a port can be blocked to
//! simulate loss.

use crate::port::{Datagram, DatagramPort, PortError, Transport};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

const EPHEMERAL_START: u16 = 49152;

#[derive(Debug, Default)]
struct Inner {
    inboxes: HashMap<u16, VecDeque<Datagram>>,
    blocked: HashSet<u16>,
    next_ephemeral: u16,
    delivered: u64,
    dropped: u64,
}

impl Inner {
    fn deliver(&mut self, from: u16, to: u16, bytes: &[u8]) -> bool {
        if self.blocked.contains(&to) {
            self.dropped += 1;
            // the sender cannot tell a blocked link from a working one
            return true;
        }
        let Some(inbox) = self.inboxes.get_mut(&to) else {
            self.dropped += 1;
            return true;
        };
        inbox.push_back(Datagram {
            from: loopback(from),
            bytes: bytes.to_vec(),
        });
        self.delivered += 1;
        true
    }

    fn ephemeral(&mut self) -> u16 {
        if self.next_ephemeral < EPHEMERAL_START {
            self.next_ephemeral = EPHEMERAL_START;
        }
        while self.inboxes.contains_key(&self.next_ephemeral) {
            self.next_ephemeral = self.next_ephemeral.checked_add(1).unwrap_or(EPHEMERAL_START);
        }
        let port = self.next_ephemeral;
        self.next_ephemeral = self.next_ephemeral.checked_add(1).unwrap_or(EPHEMERAL_START);
        port
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Shared in-memory network. Cloning yields another handle to the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop (or resume) every datagram addressed to `addr`'s port.
    pub fn set_blocked(&self, addr: SocketAddr, blocked: bool) {
        let mut inner = self.inner.borrow_mut();
        if blocked {
            inner.blocked.insert(addr.port());
        } else {
            inner.blocked.remove(&addr.port());
        }
    }

    /// Datagrams sitting in inboxes, not yet received.
    pub fn in_flight(&self) -> usize {
        self.inner.borrow().inboxes.values().map(VecDeque::len).sum()
    }

    pub fn delivered(&self) -> u64 {
        self.inner.borrow().delivered
    }

    pub fn dropped(&self) -> u64 {
        self.inner.borrow().dropped
    }

    fn open(&self, port: u16, default_destination: Option<SocketAddr>) -> MemoryPort {
        self.inner.borrow_mut().inboxes.insert(port, VecDeque::new());
        MemoryPort {
            net: self.inner.clone(),
            port,
            default_destination,
            open: true,
        }
    }
}

impl Transport for MemoryNetwork {
    type Port = MemoryPort;

    fn bind(&self, addr: SocketAddr) -> Result<MemoryPort, PortError> {
        let port = if addr.port() == 0 {
            self.inner.borrow_mut().ephemeral()
        } else {
            addr.port()
        };
        if self.inner.borrow().inboxes.contains_key(&port) {
            return Err(PortError::Bind {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }
        Ok(self.open(port, None))
    }

    fn connect(&self, remote: SocketAddr) -> Result<MemoryPort, PortError> {
        let port = self.inner.borrow_mut().ephemeral();
        Ok(self.open(port, Some(loopback(remote.port()))))
    }
}

/// One endpoint on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryPort {
    net: Rc<RefCell<Inner>>,
    port: u16,
    default_destination: Option<SocketAddr>,
    open: bool,
}

impl MemoryPort {
    pub fn default_destination(&self) -> Option<SocketAddr> {
        self.default_destination
    }
}

impl DatagramPort for MemoryPort {
    fn send(&mut self, bytes: &[u8]) -> bool {
        match self.default_destination {
            Some(to) => self.send_to(bytes, to),
            None => false,
        }
    }

    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> bool {
        if !self.open {
            return false;
        }
        self.net.borrow_mut().deliver(self.port, to.port(), bytes)
    }

    fn receive_all(&mut self) -> Vec<Datagram> {
        if !self.open {
            return Vec::new();
        }
        let received: Vec<Datagram> = self
            .net
            .borrow_mut()
            .inboxes
            .get_mut(&self.port)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default();

        if self.default_destination.is_none() {
            self.default_destination = received.first().map(|d| d.from);
        }
        received
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.default_destination = None;
            self.net.borrow_mut().inboxes.remove(&self.port);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.open.then(|| loopback(self.port))
    }
}

impl Drop for MemoryPort {
    fn drop(&mut self) {
        self.close();
    }
}
