//! Host + Client sessions over the in-memory network and real loopback UDP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use lockstep_core::glam::Vec3;
use lockstep_core::time::TICK_DURATION;
use lockstep_core::{Button, PackedInput};
use lockstep_net::authority::negotiate;
use lockstep_net::memory::{MemoryNetwork, MemoryPort};
use lockstep_net::port::{Transport, Udp};
use lockstep_net::replication::WorldSnapshot;
use lockstep_net::wire::Packet;
use lockstep_net::{DatagramPort, LockstepEngine, NetConfig, PeerId, Role};

const STEP: f32 = 1.0 / 60.0;

fn forward() -> PackedInput {
    PackedInput::NONE.with_button(Button::Forward)
}

fn memory_session(
    net: &MemoryNetwork,
    client_input: PackedInput,
) -> (LockstepEngine<MemoryPort>, LockstepEngine<MemoryPort>) {
    let config = NetConfig::default();

    let h = negotiate(net, &config).unwrap();
    assert_eq!(h.role, Role::Host);
    let mut host = LockstepEngine::with_positions(h.role, h.port);

    let c = negotiate(net, &config).unwrap();
    assert_eq!(c.role, Role::Client);
    let mut client = LockstepEngine::with_positions(c.role, c.port).with_input(client_input);

    host.start().unwrap();
    client.start().unwrap();

    // HELLO -> ACK_ID without advancing either clock
    host.frame(Duration::ZERO);
    client.frame(Duration::ZERO);
    assert_eq!(client.local_peer_id(), Some(PeerId(1)));

    (host, client)
}

#[test]
fn handshake_allocates_fresh_ids_per_hello() {
    let net = MemoryNetwork::new();
    let config = NetConfig::default();
    let h = negotiate(&net, &config).unwrap();
    let mut host = LockstepEngine::with_positions(h.role, h.port);
    host.start().unwrap();

    let mut a = net.connect(h_addr(&config)).unwrap();
    let mut b = net.connect(h_addr(&config)).unwrap();
    a.send(&Packet::Hello.encode());
    b.send(&Packet::Hello.encode());
    host.poll();

    assert_eq!(Packet::decode(&a.receive_all()[0].bytes), Ok(Packet::AckId { peer: PeerId(1) }));
    assert_eq!(Packet::decode(&b.receive_all()[0].bytes), Ok(Packet::AckId { peer: PeerId(2) }));

    // same origin again: no dedup, a third id
    a.send(&Packet::Hello.encode());
    host.poll();
    assert_eq!(Packet::decode(&a.receive_all()[0].bytes), Ok(Packet::AckId { peer: PeerId(3) }));
    assert_eq!(host.registry().remote_ids().count(), 3);
}

#[test]
fn repeated_hello_from_one_origin_gets_one_snapshot_per_tick() {
    let net = MemoryNetwork::new();
    let config = NetConfig::default();
    let h = negotiate(&net, &config).unwrap();
    let mut host = LockstepEngine::with_positions(h.role, h.port);
    host.start().unwrap();

    let mut origin = net.connect(h_addr(&config)).unwrap();
    origin.send(&Packet::Hello.encode());
    origin.send(&Packet::Hello.encode());
    host.frame(Duration::ZERO);
    assert_eq!(origin.receive_all().len(), 2);
    assert_eq!(host.peer_addr(PeerId(1)), host.peer_addr(PeerId(2)));

    for tick in 1..=3 {
        host.frame(TICK_DURATION);
        let snaps = origin.receive_all();
        assert_eq!(snaps.len(), 1, "tick {tick}");
        let Ok(Packet::Snapshot(snap)) = Packet::decode(&snaps[0].bytes) else {
            panic!("expected SNAP");
        };
        assert_eq!(snap.tick, tick);
        assert_eq!(snap.entries.len(), 3);
    }
}

fn h_addr(config: &NetConfig) -> SocketAddr {
    SocketAddr::new(config.host_address, config.port)
}

#[test]
fn ten_ticks_of_forward_move_client_entity_on_host() {
    let net = MemoryNetwork::new();
    let (mut host, mut client) = memory_session(&net, forward());

    // client ticks first so each INPUT is queued before the host's tick
    for _ in 0..10 {
        assert_eq!(client.frame(TICK_DURATION), 1);
        assert_eq!(host.frame(TICK_DURATION), 1);
    }
    client.frame(Duration::ZERO);

    let snap: &WorldSnapshot = client.last_snapshot().unwrap();
    assert_eq!(snap.tick, 10);

    let remote = snap.position_of(PeerId(1)).unwrap();
    assert!((remote.z - 10.0 * STEP).abs() < 1e-5, "z = {}", remote.z);
    assert_eq!((remote.x, remote.y), (0.0, 0.0));

    // host gave no local input: its entity never moved
    assert_eq!(snap.position_of(PeerId::SELF), Some(Vec3::ZERO));

    let authoritative = host.store().position(PeerId(1)).unwrap();
    assert_eq!(authoritative, remote);
}

#[test]
fn client_drives_own_entity_between_snapshots() {
    let net = MemoryNetwork::new();
    let (mut host, mut client) = memory_session(&net, forward());

    client.frame(TICK_DURATION);
    host.frame(TICK_DURATION);
    client.frame(TICK_DURATION);

    // snapshot for tick 1 applied, then tick 2 driven locally
    let own = client.store().position(PeerId(1)).unwrap();
    assert!((own.z - 2.0 * STEP).abs() < 1e-5);
}

#[test]
fn host_reuses_stale_slot_when_input_is_lost() {
    let net = MemoryNetwork::new();
    let (mut host, mut client) = memory_session(&net, forward());
    let host_addr = h_addr(&NetConfig::default());

    for _ in 0..3 {
        client.frame(TICK_DURATION);
        host.frame(TICK_DURATION);
    }

    // Client's INPUT for ticks 4..=6 never arrives. Those slots still hold
    // the zero input from startup, so the Host simulates "no input" for them
    // rather than waiting.
    net.set_blocked(host_addr, true);
    for _ in 0..3 {
        client.frame(TICK_DURATION);
        host.frame(TICK_DURATION);
    }
    net.set_blocked(host_addr, false);

    let z = host.store().position(PeerId(1)).unwrap().z;
    assert!((z - 3.0 * STEP).abs() < 1e-5, "z = {z}");

    // after 256 ticks the slots are reused: a lost tick now replays the
    // input recorded 256 ticks earlier
    for _ in 0..256 {
        client.frame(TICK_DURATION);
        host.frame(TICK_DURATION);
    }
    let before = host.store().position(PeerId(1)).unwrap().z;
    net.set_blocked(host_addr, true);
    client.frame(TICK_DURATION);
    host.frame(TICK_DURATION);
    let after = host.store().position(PeerId(1)).unwrap().z;
    assert!((after - before - STEP).abs() < 1e-5);
}

#[test]
fn lost_input_is_not_waited_for() {
    let net = MemoryNetwork::new();
    let (mut host, mut client) = memory_session(&net, forward());
    let host_addr = h_addr(&NetConfig::default());

    // Client's INPUT for tick 1 is lost; the host runs tick 1 anyway.
    net.set_blocked(host_addr, true);
    client.frame(TICK_DURATION);
    host.frame(TICK_DURATION);
    net.set_blocked(host_addr, false);

    assert_eq!(host.store().position(PeerId(1)), Some(Vec3::ZERO));
    assert_eq!(host.registry().get(PeerId(1)).unwrap().last_recv_tick(), None);

    client.frame(TICK_DURATION);
    host.frame(TICK_DURATION);
    assert_eq!(host.registry().get(PeerId(1)).unwrap().last_recv_tick(), Some(2));
}

#[test]
fn snapshots_reach_every_joined_client() {
    let net = MemoryNetwork::new();
    let config = NetConfig::default();

    let h = negotiate(&net, &config).unwrap();
    let mut host = LockstepEngine::with_positions(h.role, h.port);
    host.start().unwrap();

    let mut clients: Vec<_> = (0..2)
        .map(|_| {
            let c = negotiate(&net, &config).unwrap();
            let mut engine = LockstepEngine::with_positions(c.role, c.port);
            engine.start().unwrap();
            engine
        })
        .collect();

    host.frame(Duration::ZERO);
    for c in clients.iter_mut() {
        c.frame(Duration::ZERO);
    }
    let mut ids: Vec<_> = clients.iter().filter_map(|c| c.local_peer_id()).collect();
    ids.sort();
    assert_eq!(ids, vec![PeerId(1), PeerId(2)]);

    host.frame(TICK_DURATION);
    for c in clients.iter_mut() {
        c.frame(Duration::ZERO);
        let snap = c.last_snapshot().unwrap();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.entries.len(), 3);
    }
}

#[test]
fn shutdown_drops_traffic() {
    let net = MemoryNetwork::new();
    let (mut host, mut client) = memory_session(&net, forward());

    host.shutdown();
    client.frame(TICK_DURATION);

    assert_eq!(host.frame(TICK_DURATION), 0);
    assert!(!host.port().is_open());
    assert_eq!(net.in_flight(), 0);
}

// ---------------------------------------------------------------------------
// Real sockets
// ---------------------------------------------------------------------------

fn free_port() -> u16 {
    let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    probe.local_addr().unwrap().port()
}

fn pump_until(
    host: &mut LockstepEngine<lockstep_net::UdpPort>,
    client: &mut LockstepEngine<lockstep_net::UdpPort>,
    mut done: impl FnMut(&LockstepEngine<lockstep_net::UdpPort>) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        host.frame(Duration::ZERO);
        client.frame(Duration::ZERO);
        if done(&*client) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn udp_loopback_session() {
    let config = NetConfig {
        port: free_port(),
        host_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
    };

    let h = negotiate(&Udp, &config).unwrap();
    assert_eq!(h.role, Role::Host);
    let c = negotiate(&Udp, &config).unwrap();
    assert_eq!(c.role, Role::Client);

    let mut host = LockstepEngine::with_positions(h.role, h.port);
    let mut client = LockstepEngine::with_positions(c.role, c.port).with_input(forward());
    host.start().unwrap();
    client.start().unwrap();

    assert!(pump_until(&mut host, &mut client, |c| c.is_joined()));
    assert_eq!(client.local_peer_id(), Some(PeerId(1)));

    client.frame(TICK_DURATION);
    // wait for INPUT to land before the host ticks
    let deadline = Instant::now() + Duration::from_secs(5);
    while host.registry().get(PeerId(1)).unwrap().last_recv_tick().is_none() {
        assert!(Instant::now() < deadline, "INPUT never arrived");
        host.poll();
        thread::sleep(Duration::from_millis(2));
    }
    host.frame(TICK_DURATION);

    assert!(pump_until(&mut host, &mut client, |c| c.last_snapshot().is_some()));
    let snap = client.last_snapshot().unwrap();
    assert_eq!(snap.tick, 1);
    assert!((snap.position_of(PeerId(1)).unwrap().z - STEP).abs() < 1e-6);

    host.shutdown();
    client.shutdown();
    assert!(!host.port().is_open());
}
