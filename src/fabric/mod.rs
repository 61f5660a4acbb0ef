//! Network fabric: nodes, devices, media, sockets and routing.
//!
//! The fabric is the collaborator the simulation core talks to. From the
//! core's point of view `send` is fire-and-forget: it resolves a route and
//! schedules an [`NetEvent::Arrive`] on the next hop, and nothing else.
//! Packets the fabric cannot carry (no route, weak signal, TTL expiry,
//! closed destination) are dropped silently and only show up in
//! [`FabricStats`].
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`], [`DeviceId`], [`MediumId`], [`SocketId`] |
//! | [`address`] | [`Ipv4Prefix`], [`AddressPool`] |
//! | [`medium`] | [`Medium`], [`MediumKind`], delay model |
//! | [`packet`] | [`Packet`] |
//! | [`socket`] | [`Socket`], [`SocketState`] |
//! | [`routing`] | [`RoutingStack`] and its strategies |

pub mod address;
pub mod id;
pub mod medium;
pub mod packet;
pub mod routing;
pub mod socket;

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::runtime::NetEvent;
use crate::simulation::SimulationContext;

pub use address::{AddressPool, Ipv4Prefix};
pub use id::{DeviceId, MediumId, NodeId, SocketId};
pub use medium::{GridLayout, Medium, MediumKind, PhyMode, Position, TxOutcome, WiredConfig, WirelessConfig};
pub use packet::{Packet, DEFAULT_TTL};
pub use routing::{LinkStateRouting, Route, RoutingStack, RoutingStrategy, StaticRouting};
pub use socket::{Socket, SocketState};

/// First port handed out to sockets that send without binding.
const EPHEMERAL_PORT_START: u16 = 49153;

// ── Node / Device ─────────────────────────────────────────────────────

/// A participant in the network. Owns devices and a routing stack.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) devices: Vec<DeviceId>,
    pub(crate) position: Option<Position>,
    pub(crate) routing: RoutingStack,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn routing(&self) -> &RoutingStack {
        &self.routing
    }
}

/// Binds a node to a medium under one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) node: NodeId,
    pub(crate) medium: MediumId,
    pub(crate) address: Ipv4Addr,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn medium(&self) -> MediumId {
        self.medium
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }
}

// ── Stats / Delivery ──────────────────────────────────────────────────

/// Fabric-level diagnostics. Never consulted by the throughput computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FabricStats {
    /// Frames put on a medium (one per hop).
    pub frames_transmitted: u64,
    /// Packets handed to a destination socket.
    pub packets_delivered: u64,
    pub dropped_no_route: u64,
    pub dropped_signal: u64,
    pub dropped_ttl: u64,
    pub dropped_no_socket: u64,
}

impl FabricStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_no_route + self.dropped_signal + self.dropped_ttl + self.dropped_no_socket
    }
}

/// A packet that reached an open socket bound to its destination port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub socket: SocketId,
    pub packet: Packet,
}

// ── Fabric ────────────────────────────────────────────────────────────

/// All fabric state. Built by `topology::TopologyBuilder`.
#[derive(Debug)]
pub struct Fabric {
    nodes: Vec<Node>,
    devices: Vec<Device>,
    media: Vec<Medium>,
    sockets: BTreeMap<SocketId, Socket>,
    next_socket: u32,
    next_ephemeral_port: u16,
    next_packet_uid: u64,
    stats: FabricStats,
}

impl Fabric {
    pub(crate) fn from_parts(nodes: Vec<Node>, devices: Vec<Device>, media: Vec<Medium>) -> Self {
        Fabric {
            nodes,
            devices,
            media,
            sockets: BTreeMap::new(),
            next_socket: 0,
            next_ephemeral_port: EPHEMERAL_PORT_START,
            next_packet_uid: 0,
            stats: FabricStats::default(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.index())
    }

    pub fn medium(&self, id: MediumId) -> Option<&Medium> {
        self.media.get(id.index())
    }

    pub fn media(&self) -> &[Medium] {
        &self.media
    }

    pub fn socket(&self, id: SocketId) -> Option<&Socket> {
        self.sockets.get(&id)
    }

    pub fn stats(&self) -> FabricStats {
        self.stats
    }

    /// Addresses of all devices on `node`, in attachment order.
    pub fn addresses(&self, node: NodeId) -> Vec<Ipv4Addr> {
        self.node(node)
            .map(|n| {
                n.devices
                    .iter()
                    .filter_map(|d| self.device(*d))
                    .map(|d| d.address)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Address of `node` on `medium`, if attached.
    pub fn address_on(&self, node: NodeId, medium: MediumId) -> Option<Ipv4Addr> {
        self.node(node)?
            .devices
            .iter()
            .filter_map(|d| self.device(*d))
            .find(|d| d.medium == medium)
            .map(|d| d.address)
    }

    fn owns_address(&self, node: NodeId, address: Ipv4Addr) -> bool {
        self.node(node).is_some_and(|n| {
            n.devices
                .iter()
                .filter_map(|d| self.device(*d))
                .any(|d| d.address == address)
        })
    }

    // ── Sockets ───────────────────────────────────────────────────

    pub fn create_socket(&mut self, node: NodeId) -> SimResult<SocketId> {
        if self.node(node).is_none() {
            return Err(crate::error::TopologyError::UnknownNode(node).into());
        }
        let id = SocketId::new(self.next_socket);
        self.next_socket += 1;
        self.sockets.insert(id, Socket::new(id, node));
        debug!(socket = %id, node = %node, "socket created");
        Ok(id)
    }

    /// Bind to `port` on every address of the socket's node.
    pub fn bind(&mut self, id: SocketId, port: u16) -> SimResult<()> {
        let node = self.open_socket(id)?.node;
        let taken = self
            .sockets
            .values()
            .any(|s| s.node == node && s.is_open() && s.local_port == Some(port));
        if taken {
            let address = self
                .addresses(node)
                .first()
                .copied()
                .ok_or(SimError::NoAddress(node))?;
            return Err(SimError::PortInUse { address, port });
        }
        if let Some(socket) = self.sockets.get_mut(&id) {
            socket.local_port = Some(port);
        }
        Ok(())
    }

    /// Set the default destination used by `send`.
    pub fn connect(&mut self, id: SocketId, remote: SocketAddrV4) -> SimResult<()> {
        self.open_socket(id)?;
        if let Some(socket) = self.sockets.get_mut(&id) {
            socket.remote = Some(remote);
        }
        Ok(())
    }

    /// Close a socket. Returns `false` if it was already closed.
    pub fn close(&mut self, id: SocketId) -> SimResult<bool> {
        let socket = self.sockets.get_mut(&id).ok_or(SimError::UnknownSocket(id))?;
        let was_open = socket.is_open();
        socket.state = SocketState::Closed;
        if was_open {
            debug!(socket = %id, "socket closed");
        }
        Ok(was_open)
    }

    fn open_socket(&self, id: SocketId) -> SimResult<&Socket> {
        let socket = self.sockets.get(&id).ok_or(SimError::UnknownSocket(id))?;
        if !socket.is_open() {
            return Err(SimError::SocketClosed(id));
        }
        Ok(socket)
    }

    // ── Data path ─────────────────────────────────────────────────

    /// Send a `size`-byte datagram to the socket's connected remote.
    ///
    /// Returns as soon as the first hop is scheduled. Delivery, if any,
    /// happens later through `NetEvent::Arrive` events.
    pub fn send(
        &mut self,
        ctx: &mut SimulationContext<'_, NetEvent>,
        id: SocketId,
        size: u32,
    ) -> SimResult<Packet> {
        let socket = self.open_socket(id)?;
        let node = socket.node;
        let remote = socket.remote.ok_or(SimError::SocketNotConnected(id))?;
        let bound_port = socket.local_port;
        let local_port = match bound_port {
            Some(port) => port,
            None => {
                let port = self.next_ephemeral_port;
                self.next_ephemeral_port = self
                    .next_ephemeral_port
                    .wrapping_add(1)
                    .max(EPHEMERAL_PORT_START);
                if let Some(s) = self.sockets.get_mut(&id) {
                    s.local_port = Some(port);
                }
                port
            }
        };

        let uid = self.next_packet_uid;
        self.next_packet_uid += 1;
        if let Some(s) = self.sockets.get_mut(&id) {
            s.tx_packets += 1;
        }

        // The source address is filled in from the route's outgoing device.
        let mut packet = Packet {
            uid,
            src: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port),
            dst: remote,
            size,
            ttl: DEFAULT_TTL,
            created_at: ctx.now(),
        };

        if self.owns_address(node, *remote.ip()) {
            // Loopback: deliver on the same node without touching a medium.
            packet.src.set_ip(*remote.ip());
            let device = self
                .node(node)
                .and_then(|n| n.devices.first().copied())
                .ok_or(SimError::NoAddress(node))?;
            ctx.schedule_arrival(node, device, Duration::ZERO, packet.clone())?;
            return Ok(packet);
        }

        if let Some((route, _)) = self.node(node).and_then(|n| n.routing.resolve(*remote.ip())) {
            packet.src.set_ip(route.source);
        }
        self.forward(ctx, node, packet.clone())?;
        Ok(packet)
    }

    /// Route `packet` from `node` to its next hop.
    fn forward(
        &mut self,
        ctx: &mut SimulationContext<'_, NetEvent>,
        node: NodeId,
        packet: Packet,
    ) -> SimResult<()> {
        let dest = *packet.dst.ip();
        let Some((route, layer)) = self.node(node).and_then(|n| n.routing.resolve(dest)) else {
            self.stats.dropped_no_route += 1;
            debug!(node = %node, %packet, "no route, dropping");
            return Ok(());
        };

        let Some(tx_device) = self.device(route.device).copied() else {
            self.stats.dropped_no_route += 1;
            return Ok(());
        };
        let Some(medium) = self.medium(tx_device.medium) else {
            self.stats.dropped_no_route += 1;
            return Ok(());
        };
        let Some(rx_device) = medium
            .devices
            .iter()
            .filter_map(|d| self.device(*d))
            .find(|d| d.address == route.next_hop && d.id != tx_device.id)
            .copied()
        else {
            self.stats.dropped_no_route += 1;
            debug!(node = %node, next_hop = %route.next_hop, "next hop not on medium, dropping");
            return Ok(());
        };

        let from = self.node(node).and_then(|n| n.position);
        let to = self.node(rx_device.node).and_then(|n| n.position);
        let outcome = medium.transmit(packet.size, from, to);
        let medium_label = medium.kind.label();
        match outcome {
            TxOutcome::Delivered { delay } => {
                self.stats.frames_transmitted += 1;
                trace!(
                    from = %node,
                    to = %rx_device.node,
                    layer,
                    medium = medium_label,
                    ?delay,
                    %packet,
                    "frame transmitted"
                );
                ctx.schedule_arrival(rx_device.node, rx_device.id, delay, packet)?;
            }
            TxOutcome::BelowSensitivity { rss_dbm } => {
                self.stats.dropped_signal += 1;
                debug!(from = %node, rss_dbm, %packet, "signal below sensitivity, dropping");
            }
        }
        Ok(())
    }

    /// Handle a packet arriving on `device`.
    ///
    /// Returns the delivery when the packet reached an open socket bound to
    /// its destination port on this node; forwards it otherwise.
    pub fn on_arrival(
        &mut self,
        ctx: &mut SimulationContext<'_, NetEvent>,
        device: DeviceId,
        mut packet: Packet,
    ) -> SimResult<Option<Delivery>> {
        let Some(node) = self.device(device).map(|d| d.node) else {
            return Ok(None);
        };

        if self.owns_address(node, *packet.dst.ip()) {
            let port = packet.dst.port();
            let target = self
                .sockets
                .values_mut()
                .find(|s| s.node == node && s.is_open() && s.local_port == Some(port));
            return match target {
                Some(socket) => {
                    socket.rx_packets += 1;
                    self.stats.packets_delivered += 1;
                    Ok(Some(Delivery {
                        socket: socket.id,
                        packet,
                    }))
                }
                None => {
                    self.stats.dropped_no_socket += 1;
                    debug!(node = %node, %packet, "no open socket on port, dropping");
                    Ok(None)
                }
            };
        }

        packet.ttl = packet.ttl.saturating_sub(1);
        if packet.ttl == 0 {
            self.stats.dropped_ttl += 1;
            debug!(node = %node, %packet, "ttl expired, dropping");
            return Ok(None);
        }
        self.forward(ctx, node, packet)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests;
