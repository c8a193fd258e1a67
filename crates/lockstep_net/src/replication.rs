//! State replication
//!
//! The Host owns authoritative positions and publishes them once per tick as a
//! [`WorldSnapshot`]; Clients copy snapshot positions into their own store.
//! Rendering is someone else's job: this module only moves coordinates.

use crate::peer::PeerRegistry;
use crate::wire::MAX_SNAPSHOT_ENTRIES;
use crate::PeerId;
use lockstep_core::math::Position;
use lockstep_core::Tick;
use std::collections::HashMap;

/// Where positions live. The engine only ever goes through these three calls.
pub trait EntityStore {
    type Handle: Copy;

    /// Handle for `peer`'s entity, spawning it on first use.
    fn get_or_create(&mut self, peer: PeerId) -> Self::Handle;
    fn read(&self, handle: Self::Handle) -> Position;
    fn write(&mut self, handle: Self::Handle, position: Position);
}

/// Index into a [`PositionStore`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityHandle(usize);

/// Plain in-memory entity store: one position per peer.
#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    spawn_at: Position,
    positions: Vec<Position>,
    owners: Vec<PeerId>,
    by_peer: HashMap<PeerId, usize>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// New entities start at `spawn_at` instead of the origin.
    pub fn with_spawn(spawn_at: Position) -> Self {
        Self {
            spawn_at,
            ..Self::default()
        }
    }

    pub fn position(&self, peer: PeerId) -> Option<Position> {
        self.by_peer.get(&peer).map(|&i| self.positions[i])
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Entities in spawn order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, Position)> + '_ {
        self.owners.iter().copied().zip(self.positions.iter().copied())
    }
}

impl EntityStore for PositionStore {
    type Handle = EntityHandle;

    fn get_or_create(&mut self, peer: PeerId) -> EntityHandle {
        if let Some(&i) = self.by_peer.get(&peer) {
            return EntityHandle(i);
        }

        let i = self.positions.len();
        self.positions.push(self.spawn_at);
        self.owners.push(peer);
        self.by_peer.insert(peer, i);
        tracing::debug!("spawned entity for {}", peer);
        EntityHandle(i)
    }

    fn read(&self, handle: EntityHandle) -> Position {
        self.positions[handle.0]
    }

    fn write(&mut self, handle: EntityHandle, position: Position) {
        self.positions[handle.0] = position;
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub peer: PeerId,
    pub position: Position,
}

/// Authoritative positions for one tick. Built fresh every Host tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub entries: Vec<SnapshotEntry>,
}

impl WorldSnapshot {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            entries: Vec::new(),
        }
    }

    /// Returns `false` once the one-byte count is exhausted.
    pub fn push(&mut self, peer: PeerId, position: Position) -> bool {
        if self.entries.len() >= MAX_SNAPSHOT_ENTRIES {
            return false;
        }
        self.entries.push(SnapshotEntry { peer, position });
        true
    }

    pub fn position_of(&self, peer: PeerId) -> Option<Position> {
        self.entries
            .iter()
            .find(|e| e.peer == peer)
            .map(|e| e.position)
    }

    /// Snapshot of every registered peer (self included), in id order.
    pub fn capture<S: EntityStore>(tick: Tick, registry: &PeerRegistry, store: &mut S) -> Self {
        let mut snapshot = Self::new(tick);
        for peer in registry.ids() {
            let handle = store.get_or_create(peer);
            if !snapshot.push(peer, store.read(handle)) {
                tracing::warn!(tick, "snapshot full, {} and later peers omitted", peer);
                break;
            }
        }
        snapshot
    }

    /// Copy every entry into `store`.
    pub fn apply<S: EntityStore>(&self, store: &mut S) {
        for entry in &self.entries {
            let handle = store.get_or_create(entry.peer);
            store.write(handle, entry.position);
        }
    }
}
