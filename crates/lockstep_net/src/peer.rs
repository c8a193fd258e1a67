//! Peer registry
//!
//! Every peer this process knows about, each with a circular buffer of the
//! most recent [`RING_SIZE`] ticks of input.

use crate::PeerId;
use lockstep_core::{PackedInput, Tick};
use std::collections::BTreeMap;

/// Ticks of input retained per peer (≈4.27s at 60 Hz).
pub const RING_SIZE: usize = 256;

const RING_MASK: Tick = RING_SIZE as Tick - 1;

/// Per-peer slot.
#[derive(Debug, Clone)]
pub struct PeerState {
    id: PeerId,
    ring: [PackedInput; RING_SIZE],
    last_recv_tick: Option<Tick>,
}

impl PeerState {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            ring: [PackedInput::NONE; RING_SIZE],
            last_recv_tick: None,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Newest tick received from this peer over the network.
    pub fn last_recv_tick(&self) -> Option<Tick> {
        self.last_recv_tick
    }

    /// Overwrites whatever occupies `tick`'s slot, regardless of its tick.
    pub fn write(&mut self, tick: Tick, input: PackedInput) {
        self.ring[slot(tick)] = input;
    }

    /// Whatever occupies `tick`'s slot. If nothing was written for this tick
    /// since it last wrapped, that is the input of `tick - 256 * k`.
    pub fn read(&self, tick: Tick) -> PackedInput {
        self.ring[slot(tick)]
    }
}

fn slot(tick: Tick) -> usize {
    (tick & RING_MASK) as usize
}

/// Known peers keyed by id. Peers are never removed while the session lives.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<PeerId, PeerState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_self(&mut self) {
        self.register_peer(PeerId::SELF);
    }

    /// Registers `id` with an empty ring. Re-registering keeps the existing state.
    pub fn register_peer(&mut self, id: PeerId) -> &mut PeerState {
        self.peers.entry(id).or_insert_with(|| PeerState::new(id))
    }

    /// Store `input` for `tick`. Returns `false` for an unknown peer.
    pub fn record_input(&mut self, peer: PeerId, tick: Tick, input: PackedInput) -> bool {
        let Some(state) = self.peers.get_mut(&peer) else {
            return false;
        };

        state.write(tick, input);
        if !peer.is_self() && state.last_recv_tick.map_or(true, |last| tick > last) {
            state.last_recv_tick = Some(tick);
        }
        true
    }

    /// Input in `tick`'s slot for `peer`, stale or not. `None` for an unknown peer.
    pub fn input_at(&self, peer: PeerId, tick: Tick) -> Option<PackedInput> {
        self.peers.get(&peer).map(|s| s.read(tick))
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerState> {
        self.peers.get(&peer)
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// All ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    /// Every id except self, ascending.
    pub fn remote_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.ids().filter(|id| !id.is_self())
    }

    pub fn has_remote_peers(&self) -> bool {
        self.remote_ids().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Reconstruct a full tick from its low 16 bits: the tick nearest `reference`
/// that shares them. Ticks never go below zero.
pub fn widen_tick(low: u16, reference: Tick) -> Tick {
    let diff = low.wrapping_sub(reference as u16) as i16;
    reference
        .checked_add_signed(diff as i32)
        .unwrap_or(low as Tick)
}
