//! Multi-node tests for `Fabric`: socket lifecycle, forwarding and the
//! loss paths.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::error::{SimError, SimResult};
use crate::event::Event;
use crate::fabric::{
    Delivery, Fabric, MediumKind, NodeId, SocketId, WiredConfig, WirelessConfig, DEFAULT_TTL,
};
use crate::runtime::NetEvent;
use crate::simulation::{Simulation, SimulationContext};
use crate::time::VirtualTime;
use crate::topology::TopologyBuilder;
use crate::traffic::GeneratorId;

// ── Helpers ───────────────────────────────────────────────────────────

fn lan(nodes: u32) -> Fabric {
    let mut b = TopologyBuilder::new();
    let m = b.medium(
        MediumKind::Wired(WiredConfig::default()),
        "10.1.2.0/24".parse().unwrap(),
    );
    for n in b.nodes(nodes) {
        b.attach(n, m);
    }
    b.build().unwrap()
}

fn addr(last: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, last), port)
}

/// Sends one `size`-byte packet from `socket` at t=1s and runs to
/// completion. Returns each delivery with its arrival time.
fn send_once(fabric: &mut Fabric, socket: SocketId, size: u32) -> Vec<(VirtualTime, Delivery)> {
    let mut delivered = Vec::new();
    let mut sim = Simulation::new();
    sim.schedule(
        Duration::from_secs(1),
        NetEvent::Generate {
            generator: GeneratorId::new(0),
        },
    )
    .unwrap();
    sim.run(
        VirtualTime::MAX,
        &mut |ctx: &mut SimulationContext<'_, NetEvent>, e: Event<NetEvent>| -> SimResult<()> {
            match e.action {
                NetEvent::Generate { .. } => {
                    fabric.send(ctx, socket, size)?;
                }
                NetEvent::Arrive { device, packet } => {
                    if let Some(d) = fabric.on_arrival(ctx, device, packet)? {
                        delivered.push((ctx.now(), d));
                    }
                }
            }
            Ok(())
        },
    )
    .unwrap();
    delivered
}

// ── Delivery ──────────────────────────────────────────────────────────

#[test]
fn test_on_link_delivery_timing() {
    let mut fabric = lan(2);
    let rx = fabric.create_socket(NodeId::new(1)).unwrap();
    fabric.bind(rx, 80).unwrap();
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.connect(tx, addr(2, 80)).unwrap();

    let delivered = send_once(&mut fabric, tx, 967);

    assert_eq!(delivered.len(), 1);
    let (at, d) = &delivered[0];
    assert_eq!(*at, VirtualTime::from_micros(1_003_592));
    assert_eq!(d.socket, rx);
    assert_eq!(d.packet.src, addr(1, 49153));
    assert_eq!(d.packet.ttl, DEFAULT_TTL);
    assert_eq!(fabric.socket(rx).unwrap().rx_packets(), 1);
    assert_eq!(fabric.socket(tx).unwrap().tx_packets(), 1);
    assert_eq!(fabric.stats().packets_delivered, 1);
    assert_eq!(fabric.stats().dropped(), 0);
}

#[test]
fn test_loopback_delivery() {
    let mut fabric = lan(1);
    let rx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.bind(rx, 9).unwrap();
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.connect(tx, addr(1, 9)).unwrap();

    let delivered = send_once(&mut fabric, tx, 10);

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, VirtualTime::from_secs(1));
    assert_eq!(fabric.stats().frames_transmitted, 0);
}

#[test]
fn test_multi_hop_over_link_state() {
    // N0 -(A)- N1 -(B)- N2, each hop on its own medium.
    let mut b = TopologyBuilder::new();
    let a = b.medium(
        MediumKind::Wired(WiredConfig::default()),
        "10.1.1.0/24".parse().unwrap(),
    );
    let m = b.medium(
        MediumKind::Wired(WiredConfig::default()),
        "10.1.2.0/24".parse().unwrap(),
    );
    let nodes = b.nodes(3);
    b.attach(nodes[0], a)
        .attach(nodes[1], a)
        .attach(nodes[1], m)
        .attach(nodes[2], m);
    let mut fabric = b.build().unwrap();

    let rx = fabric.create_socket(nodes[2]).unwrap();
    fabric.bind(rx, 80).unwrap();
    let tx = fabric.create_socket(nodes[0]).unwrap();
    let dest = fabric.address_on(nodes[2], m).unwrap();
    fabric.connect(tx, SocketAddrV4::new(dest, 80)).unwrap();

    let delivered = send_once(&mut fabric, tx, 967);

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1.packet.ttl, DEFAULT_TTL - 1);
    assert_eq!(delivered[0].0, VirtualTime::from_micros(1_007_184));
    assert_eq!(fabric.stats().frames_transmitted, 2);
}

// ── Loss paths ────────────────────────────────────────────────────────

#[test]
fn test_closed_destination_drops() {
    let mut fabric = lan(2);
    let rx = fabric.create_socket(NodeId::new(1)).unwrap();
    fabric.bind(rx, 80).unwrap();
    assert!(fabric.close(rx).unwrap());
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.connect(tx, addr(2, 80)).unwrap();

    assert!(send_once(&mut fabric, tx, 100).is_empty());
    assert_eq!(fabric.stats().dropped_no_socket, 1);
    assert_eq!(fabric.socket(rx).unwrap().rx_packets(), 0);
}

#[test]
fn test_unbound_port_drops() {
    let mut fabric = lan(2);
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.connect(tx, addr(2, 81)).unwrap();

    assert!(send_once(&mut fabric, tx, 100).is_empty());
    assert_eq!(fabric.stats().dropped_no_socket, 1);
}

#[test]
fn test_no_route_drops() {
    let mut fabric = lan(2);
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric
        .connect(tx, SocketAddrV4::new(Ipv4Addr::new(192, 168, 7, 7), 80))
        .unwrap();

    assert!(send_once(&mut fabric, tx, 100).is_empty());
    assert_eq!(fabric.stats().dropped_no_route, 1);
    // The send itself still counts.
    assert_eq!(fabric.socket(tx).unwrap().tx_packets(), 1);
}

#[test]
fn test_weak_signal_drops() {
    let mut b = TopologyBuilder::new();
    let air = b.medium(
        MediumKind::Wireless(WirelessConfig {
            rss_dbm: -110.0,
            ..WirelessConfig::default()
        }),
        "10.1.1.0/24".parse().unwrap(),
    );
    for n in b.nodes(2) {
        b.attach(n, air);
    }
    let mut fabric = b.build().unwrap();
    let rx = fabric.create_socket(NodeId::new(1)).unwrap();
    fabric.bind(rx, 80).unwrap();
    let tx = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric
        .connect(tx, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 80))
        .unwrap();

    assert!(send_once(&mut fabric, tx, 100).is_empty());
    assert_eq!(fabric.stats().dropped_signal, 1);
}

#[test]
fn test_routing_loop_ends_on_ttl() {
    let mut b = TopologyBuilder::new();
    let m = b.medium(
        MediumKind::Wired(WiredConfig::default()),
        "10.1.2.0/24".parse().unwrap(),
    );
    let nodes = b.nodes(2);
    b.attach(nodes[0], m)
        .attach(nodes[1], m)
        .default_route_via(nodes[0], nodes[1], m)
        .default_route_via(nodes[1], nodes[0], m);
    let mut fabric = b.build().unwrap();
    let tx = fabric.create_socket(nodes[0]).unwrap();
    fabric
        .connect(tx, SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 1), 80))
        .unwrap();

    assert!(send_once(&mut fabric, tx, 100).is_empty());
    assert_eq!(fabric.stats().dropped_ttl, 1);
    assert_eq!(fabric.stats().frames_transmitted, u64::from(DEFAULT_TTL));
}

// ── Socket lifecycle ──────────────────────────────────────────────────

#[test]
fn test_bind_conflict() {
    let mut fabric = lan(1);
    let a = fabric.create_socket(NodeId::new(0)).unwrap();
    let b = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.bind(a, 80).unwrap();
    assert!(matches!(
        fabric.bind(b, 80),
        Err(SimError::PortInUse { port: 80, .. })
    ));
    // Closing releases the port.
    fabric.close(a).unwrap();
    fabric.bind(b, 80).unwrap();
}

#[test]
fn test_close_is_idempotent() {
    let mut fabric = lan(1);
    let s = fabric.create_socket(NodeId::new(0)).unwrap();
    assert!(fabric.close(s).unwrap());
    assert!(!fabric.close(s).unwrap());
    assert!(matches!(
        fabric.close(SocketId::new(42)),
        Err(SimError::UnknownSocket(_))
    ));
}

#[test]
fn test_send_errors() {
    let mut fabric = lan(2);
    let unconnected = fabric.create_socket(NodeId::new(0)).unwrap();
    let closed = fabric.create_socket(NodeId::new(0)).unwrap();
    fabric.connect(closed, addr(2, 80)).unwrap();
    fabric.close(closed).unwrap();

    let mut errors = Vec::new();
    let mut sim = Simulation::new();
    sim.schedule(
        Duration::ZERO,
        NetEvent::Generate {
            generator: GeneratorId::new(0),
        },
    )
    .unwrap();
    sim.run(
        VirtualTime::MAX,
        &mut |ctx: &mut SimulationContext<'_, NetEvent>, _e: Event<NetEvent>| -> SimResult<()> {
            for s in [unconnected, closed] {
                if let Err(e) = fabric.send(ctx, s, 10) {
                    errors.push(e);
                }
            }
            Ok(())
        },
    )
    .unwrap();

    assert!(matches!(errors[0], SimError::SocketNotConnected(_)));
    assert!(matches!(errors[1], SimError::SocketClosed(_)));
    assert!(matches!(
        fabric.connect(closed, addr(2, 80)),
        Err(SimError::SocketClosed(_))
    ));
}

#[test]
fn test_create_socket_on_unknown_node() {
    let mut fabric = lan(1);
    assert!(matches!(
        fabric.create_socket(NodeId::new(9)),
        Err(SimError::Topology(_))
    ));
}
