//! Lockstep engine
//!
//! Owns the clock, the peer registry, the entity store and the port, and is
//! driven by one caller-owned frame loop:
//!
//! ```ignore
//! let mut engine = LockstepEngine::new(role, port, PositionStore::new());
//! engine.start()?;
//! loop {
//!     engine.frame(frame_start.elapsed());
//! }
//! ```
//!
//! Each frame drains the port, then runs every tick the clock has pending.
//! Per tick, in order:
//! 1. sample local input into peer 0's ring slot
//! 2. Client (once joined): send INPUT for this tick
//! 3. Host: advance every remote peer with the input in its ring slot for this
//!    tick (stale or not), then send one SNAP of every known peer to each
//!    remote address (skipped while no one has joined)
//! 4. advance the local entity, then notify tick observers
//!
//! Since step 4 runs after the SNAP is built, a Host's own entry in the SNAP
//! for tick T still holds its tick T-1 position; remote entries hold tick T.
//!
//! Nothing blocks and nothing waits for late input: a tick uses whatever input
//! is in the slot when it runs.

use crate::handshake::{accept_hello, ClientHandshake, PeerIdAllocator};
use crate::peer::{widen_tick, PeerRegistry};
use crate::port::{Datagram, DatagramPort};
use crate::replication::{EntityStore, PositionStore, WorldSnapshot};
use crate::stats::LinkStats;
use crate::wire::{Packet, INPUT_LEN};
use crate::{PeerId, Role};
use lockstep_core::math::Position;
use lockstep_core::motion::unit_motion;
use lockstep_core::{InputSource, PackedInput, Tick, TickClock};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// `simulate(previous, input) -> next`, one tick for one entity.
pub type Simulation = Box<dyn Fn(Position, PackedInput) -> Position>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error("engine is shut down")]
    Shutdown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Shutdown,
}

/// Published to observers once per tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickEvent {
    pub tick: Tick,
    pub input: PackedInput,
    pub role: Role,
}

/// Handle returned by [`LockstepEngine::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&TickEvent)>;

pub struct LockstepEngine<P: DatagramPort, S: EntityStore = PositionStore> {
    role: Role,
    state: EngineState,
    clock: TickClock,
    port: P,
    store: S,
    input: Box<dyn InputSource>,
    simulate: Simulation,
    drive_local: bool,

    registry: PeerRegistry,
    // host side
    allocator: PeerIdAllocator,
    peer_addrs: BTreeMap<PeerId, SocketAddr>,
    // client side
    handshake: ClientHandshake,
    last_snapshot: Option<WorldSnapshot>,

    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
    stats: LinkStats,
    tx_buf: Vec<u8>,
}

impl<P: DatagramPort, S: EntityStore> LockstepEngine<P, S> {
    /// Idle engine with no local input and the unit-speed motion rule.
    pub fn new(role: Role, port: P, store: S) -> Self {
        let mut registry = PeerRegistry::new();
        registry.register_self();

        Self {
            role,
            state: EngineState::Idle,
            clock: TickClock::new(),
            port,
            store,
            input: Box::new(PackedInput::NONE),
            simulate: Box::new(unit_motion),
            drive_local: true,
            registry,
            allocator: PeerIdAllocator::new(),
            peer_addrs: BTreeMap::new(),
            handshake: ClientHandshake::new(),
            last_snapshot: None,
            observers: Vec::new(),
            next_observer: 0,
            stats: LinkStats::default(),
            tx_buf: Vec::with_capacity(crate::wire::MAX_PACKET_LEN),
        }
    }

    pub fn with_input(mut self, input: impl InputSource + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn with_simulation(
        mut self,
        simulate: impl Fn(Position, PackedInput) -> Position + 'static,
    ) -> Self {
        self.simulate = Box::new(simulate);
        self
    }

    /// Whether step 4 advances the local entity (default on).
    pub fn with_local_driving(mut self, enabled: bool) -> Self {
        self.drive_local = enabled;
        self
    }

    /// Idle → Running. A Client says HELLO here.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Idle => {}
            EngineState::Running => return Err(EngineError::AlreadyStarted),
            EngineState::Shutdown => return Err(EngineError::Shutdown),
        }
        self.state = EngineState::Running;

        if self.role == Role::Client {
            if let Some(hello) = self.handshake.hello() {
                self.send(&hello, None);
                tracing::info!("sent HELLO");
            }
        }
        Ok(())
    }

    /// Terminal. Closes the port; anything in flight is lost.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::Shutdown {
            return;
        }
        self.state = EngineState::Shutdown;
        self.port.close();
        tracing::info!("{} shut down at tick {}: {}", self.role, self.clock.tick(), self.stats);
    }

    /// One frame: drain the port, then run every pending tick.
    /// Returns how many ticks ran. Does nothing unless running.
    pub fn frame(&mut self, elapsed: Duration) -> u32 {
        if self.state != EngineState::Running {
            return 0;
        }

        self.poll();

        let mut ran = 0;
        if self.clock.step(elapsed) {
            loop {
                self.run_tick();
                ran += 1;
                if !self.clock.step(Duration::ZERO) {
                    break;
                }
            }
        }
        ran
    }

    /// Receive and dispatch everything queued on the port.
    pub fn poll(&mut self) {
        for datagram in self.port.receive_all() {
            self.stats.received += 1;
            self.on_packet(&datagram);
        }
    }

    /// Dispatch one datagram by opcode. Anything malformed or not meant for
    /// this role is dropped without a reply.
    pub fn on_packet(&mut self, datagram: &Datagram) {
        let packet = match Packet::decode(&datagram.bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!("dropped datagram from {}: {}", datagram.from, e);
                return;
            }
        };

        match (self.role, packet) {
            (Role::Host, Packet::Hello) => self.handle_hello(datagram.from),
            (Role::Client, Packet::AckId { peer }) => self.handle_ack(peer),
            (Role::Host, Packet::Input { peer, tick, input }) => {
                if datagram.bytes.len() != INPUT_LEN {
                    self.stats.malformed += 1;
                    tracing::debug!("dropped INPUT of {} bytes", datagram.bytes.len());
                    return;
                }
                self.handle_input(peer, tick, input);
            }
            (Role::Client, Packet::Snapshot(snapshot)) => self.handle_snapshot(snapshot),
            (role, other) => {
                self.stats.unexpected += 1;
                tracing::debug!("{} ignored opcode 0x{:02X}", role, other.opcode());
            }
        }
    }

    fn handle_hello(&mut self, from: SocketAddr) {
        let Some((id, reply)) = accept_hello(&mut self.allocator, &mut self.registry) else {
            self.stats.unexpected += 1;
            tracing::warn!("HELLO from {} refused: peer ids exhausted", from);
            return;
        };

        self.peer_addrs.insert(id, from);
        self.send(&reply, Some(from));
        tracing::info!("client joined -> id {} ({})", id.0, from);
    }

    fn handle_ack(&mut self, peer: PeerId) {
        match self.handshake.on_ack(peer) {
            Some(id) => tracing::info!("got peer id = {}", id.0),
            None => {
                self.stats.unexpected += 1;
                tracing::debug!("ignored ACK_ID {} in {:?}", peer.0, self.handshake);
            }
        }
    }

    fn handle_input(&mut self, peer: PeerId, low_tick: u16, input: PackedInput) {
        let tick = widen_tick(low_tick, self.clock.tick());
        if peer.is_self() || !self.registry.record_input(peer, tick, input) {
            self.stats.unknown_peer += 1;
            tracing::debug!("INPUT for unknown {} dropped", peer);
            return;
        }
        tracing::trace!("input {} @{} = 0x{:016X}", peer, tick, input.packed);
    }

    fn handle_snapshot(&mut self, snapshot: WorldSnapshot) {
        if let Some(last) = &self.last_snapshot {
            if snapshot.tick <= last.tick {
                self.stats.stale += 1;
                tracing::debug!("stale SNAP {} (have {})", snapshot.tick, last.tick);
                return;
            }
        }
        snapshot.apply(&mut self.store);
        self.last_snapshot = Some(snapshot);
    }

    fn run_tick(&mut self) {
        let tick = self.clock.tick();

        let input = self.input.current();
        self.registry.record_input(PeerId::SELF, tick, input);

        match self.role {
            Role::Client => {
                if let Some(id) = self.handshake.peer_id() {
                    let packet = Packet::Input {
                        peer: id,
                        tick: tick as u16,
                        input,
                    };
                    self.send(&packet, None);
                }
            }
            Role::Host => {
                self.advance_remote_peers(tick);
                self.broadcast_snapshot(tick);
            }
        }

        if self.drive_local {
            if let Some(id) = self.local_peer_id() {
                self.advance(id, input);
            }
        }

        let event = TickEvent {
            tick,
            input,
            role: self.role,
        };
        tracing::trace!("tick {} 0x{:016X}", tick, input.packed);
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    fn advance_remote_peers(&mut self, tick: Tick) {
        for peer in self.registry.remote_ids() {
            // stale slots are used as-is
            let input = self.registry.input_at(peer, tick).unwrap_or_default();
            let handle = self.store.get_or_create(peer);
            let next = (self.simulate)(self.store.read(handle), input);
            self.store.write(handle, next);
        }
    }

    fn advance(&mut self, peer: PeerId, input: PackedInput) {
        let handle = self.store.get_or_create(peer);
        let next = (self.simulate)(self.store.read(handle), input);
        self.store.write(handle, next);
    }

    fn broadcast_snapshot(&mut self, tick: Tick) {
        if !self.registry.has_remote_peers() {
            return;
        }

        let snapshot = WorldSnapshot::capture(tick, &self.registry, &mut self.store);
        self.tx_buf.clear();
        Packet::Snapshot(snapshot).encode_into(&mut self.tx_buf);

        // one origin may hold several ids after repeated HELLOs
        let destinations: BTreeSet<SocketAddr> = self.peer_addrs.values().copied().collect();
        for addr in destinations {
            let ok = self.port.send_to(&self.tx_buf, addr);
            self.stats.record_send(ok);
        }
    }

    fn send(&mut self, packet: &Packet, to: Option<SocketAddr>) {
        self.tx_buf.clear();
        packet.encode_into(&mut self.tx_buf);
        let ok = match to {
            Some(addr) => self.port.send_to(&self.tx_buf, addr),
            None => self.port.send(&self.tx_buf),
        };
        self.stats.record_send(ok);
    }

    /// Register a tick observer. Observers run in registration order.
    pub fn subscribe(&mut self, observer: impl FnMut(&TickEvent) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn tick(&self) -> Tick {
        self.clock.tick()
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Id of this process's own entity: 0 on the Host, the assigned id on a
    /// joined Client, `None` before joining.
    pub fn local_peer_id(&self) -> Option<PeerId> {
        match self.role {
            Role::Host => Some(PeerId::SELF),
            Role::Client => self.handshake.peer_id(),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.local_peer_id().is_some()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Address a joined peer said HELLO from (Host only).
    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peer_addrs.get(&peer).copied()
    }

    /// Last snapshot applied (Client only).
    pub fn last_snapshot(&self) -> Option<&WorldSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P: DatagramPort> LockstepEngine<P, PositionStore> {
    /// Engine over a fresh [`PositionStore`].
    pub fn with_positions(role: Role, port: P) -> Self {
        Self::new(role, port, PositionStore::new())
    }
}
