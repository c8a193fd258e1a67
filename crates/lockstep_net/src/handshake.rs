//! HELLO / ACK_ID handshake
//!
//! A Client says HELLO once; the Host answers with the id it allocated.
//! The Host keeps no per-peer handshake state: every HELLO, even a repeat from
//! the same address, gets a fresh id.

use crate::peer::PeerRegistry;
use crate::wire::Packet;
use crate::PeerId;

/// Client side of the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ClientHandshake {
    #[default]
    Unjoined,
    AwaitingAck,
    Joined(PeerId),
}

impl ClientHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// The HELLO to send, if one is due. Only the first call yields one.
    pub fn hello(&mut self) -> Option<Packet> {
        match self {
            ClientHandshake::Unjoined => {
                *self = ClientHandshake::AwaitingAck;
                Some(Packet::Hello)
            }
            _ => None,
        }
    }

    /// Handle ACK_ID. Returns the id when this ack completed the join;
    /// acks arriving before HELLO or after joining are ignored.
    pub fn on_ack(&mut self, id: PeerId) -> Option<PeerId> {
        match self {
            ClientHandshake::AwaitingAck => {
                *self = ClientHandshake::Joined(id);
                Some(id)
            }
            _ => None,
        }
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        match *self {
            ClientHandshake::Joined(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.peer_id().is_some()
    }
}

/// Host-side id source: 1, 2, ... 255 in join order, then exhausted.
#[derive(Debug, Clone)]
pub struct PeerIdAllocator {
    next: u16,
}

impl PeerIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> Option<PeerId> {
        let id = u8::try_from(self.next).ok()?;
        self.next += 1;
        Some(PeerId(id))
    }

    pub fn remaining(&self) -> usize {
        (u8::MAX as usize + 1).saturating_sub(self.next as usize)
    }
}

impl Default for PeerIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Host reaction to a HELLO: allocate, register, and build the ACK_ID reply.
/// `None` once every id is taken.
pub fn accept_hello(
    allocator: &mut PeerIdAllocator,
    registry: &mut PeerRegistry,
) -> Option<(PeerId, Packet)> {
    let id = allocator.allocate()?;
    registry.register_peer(id);
    Some((id, Packet::AckId { peer: id }))
}
