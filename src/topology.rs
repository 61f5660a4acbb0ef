//! Topology construction.
//!
//! `TopologyBuilder` records media, nodes and attachments, then `build`
//! validates the whole description at once, assigns addresses and installs
//! routing. Nothing is scheduled here: a topology is fully built before the
//! first event runs, so every failure surfaces as a `TopologyError` at
//! build time.
//!
//! `Topology::hybrid` builds the standard layout used by the scenario: a
//! group of wireless nodes on a grid, a group of wired nodes, and one
//! wireless node bridging the two.

use tracing::{debug, trace};

use crate::error::TopologyError;
use crate::fabric::routing::{
    Adjacency, LinkStateDb, LINK_STATE_PRIORITY, STATIC_PRIORITY,
};
use crate::fabric::{
    AddressPool, Device, DeviceId, Fabric, GridLayout, Ipv4Prefix, LinkStateRouting, Medium,
    MediumId, MediumKind, Node, NodeId, Position, RoutingStack, StaticRouting, WiredConfig,
    WirelessConfig,
};

// ── TopologyBuilder ───────────────────────────────────────────────────

#[derive(Debug)]
struct MediumSpec {
    kind: MediumKind,
    prefix: Ipv4Prefix,
}

#[derive(Debug, Clone, Copy)]
struct GatewaySpec {
    node: NodeId,
    via: NodeId,
    medium: MediumId,
}

/// Collects a topology description and builds a [`Fabric`] from it.
///
/// # Example
/// ```rust
/// use hybridsim::fabric::{MediumKind, WiredConfig};
/// use hybridsim::topology::TopologyBuilder;
///
/// let mut builder = TopologyBuilder::new();
/// let lan = builder.medium(MediumKind::Wired(WiredConfig::default()), "10.1.2.0/24".parse().unwrap());
/// let nodes = builder.nodes(2);
/// for &n in &nodes {
///     builder.attach(n, lan);
/// }
/// let fabric = builder.build().unwrap();
/// assert_eq!(fabric.nodes().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    media: Vec<MediumSpec>,
    positions: Vec<Option<Position>>,
    attachments: Vec<(NodeId, MediumId)>,
    gateways: Vec<GatewaySpec>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Description ───────────────────────────────────────────

    /// Add a medium with its own address pool.
    pub fn medium(&mut self, kind: MediumKind, prefix: Ipv4Prefix) -> MediumId {
        let id = MediumId::new(self.media.len() as u32);
        self.media.push(MediumSpec { kind, prefix });
        id
    }

    pub fn node(&mut self) -> NodeId {
        let id = NodeId::new(self.positions.len() as u32);
        self.positions.push(None);
        id
    }

    /// Add `count` nodes with consecutive ids.
    pub fn nodes(&mut self, count: u32) -> Vec<NodeId> {
        (0..count).map(|_| self.node()).collect()
    }

    /// Give a node a fixed position. Unplaced nodes have no propagation delay.
    pub fn place(&mut self, node: NodeId, position: Position) -> &mut Self {
        if let Some(slot) = self.positions.get_mut(node.index()) {
            *slot = Some(position);
        }
        self
    }

    /// Attach `node` to `medium` through a new device.
    ///
    /// Devices on a medium get addresses in attachment order.
    pub fn attach(&mut self, node: NodeId, medium: MediumId) -> &mut Self {
        self.attachments.push((node, medium));
        self
    }

    /// Route everything `node` cannot reach on-link through `via`'s address
    /// on `medium`.
    pub fn default_route_via(&mut self, node: NodeId, via: NodeId, medium: MediumId) -> &mut Self {
        self.gateways.push(GatewaySpec { node, via, medium });
        self
    }

    // ── Build ─────────────────────────────────────────────────

    /// Validate the description and build the fabric.
    pub fn build(self) -> Result<Fabric, TopologyError> {
        self.validate()?;

        let mut pools: Vec<AddressPool> = self
            .media
            .iter()
            .map(|m| AddressPool::new(m.prefix))
            .collect();
        let mut media: Vec<Medium> = self
            .media
            .iter()
            .enumerate()
            .map(|(i, spec)| Medium {
                id: MediumId::new(i as u32),
                kind: spec.kind,
                prefix: spec.prefix,
                devices: Vec::new(),
            })
            .collect();
        let mut nodes: Vec<Node> = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| Node {
                id: NodeId::new(i as u32),
                devices: Vec::new(),
                position: *position,
                routing: RoutingStack::new(),
            })
            .collect();

        let mut devices = Vec::with_capacity(self.attachments.len());
        for &(node, medium) in &self.attachments {
            let address = pools[medium.index()].allocate()?;
            let device = Device {
                id: DeviceId::new(devices.len() as u32),
                node,
                medium,
                address,
            };
            nodes[node.index()].devices.push(device.id);
            media[medium.index()].devices.push(device.id);
            debug!(node = %node, device = %device.id, medium = %medium, %address, "device attached");
            devices.push(device);
        }

        let db = link_state_db(&media, &devices);
        for node in &mut nodes {
            let mut static_routes = StaticRouting::new();
            for device in node.devices.iter().map(|d| &devices[d.index()]) {
                let prefix = media[device.medium.index()].prefix;
                static_routes.add_network_route(prefix, device.id, device.address);
            }
            for gw in self.gateways.iter().filter(|g| g.node == node.id) {
                let local = device_on(&devices, gw.node, gw.medium);
                let remote = device_on(&devices, gw.via, gw.medium);
                let (Some(local), Some(remote)) = (local, remote) else {
                    return Err(TopologyError::UnreachableGateway {
                        node: gw.node,
                        gateway: gw.via,
                        medium: gw.medium,
                    });
                };
                static_routes.add_default_route(remote.address, local.id, local.address);
            }
            node.routing.add(STATIC_PRIORITY, Box::new(static_routes));
            let link_state = LinkStateRouting::compute(node.id, &db);
            trace!(
                node = %link_state.origin(),
                routes = link_state.route_count(),
                "link-state table computed"
            );
            node.routing.add(LINK_STATE_PRIORITY, Box::new(link_state));
        }

        debug!(
            nodes = nodes.len(),
            devices = devices.len(),
            media = media.len(),
            "topology built"
        );
        Ok(Fabric::from_parts(nodes, devices, media))
    }

    fn validate(&self) -> Result<(), TopologyError> {
        for (i, a) in self.media.iter().enumerate() {
            for b in &self.media[i + 1..] {
                if a.prefix.overlaps(&b.prefix) {
                    return Err(TopologyError::OverlappingPools {
                        a: a.prefix.to_string(),
                        b: b.prefix.to_string(),
                    });
                }
            }
        }

        for (i, &(node, medium)) in self.attachments.iter().enumerate() {
            if node.index() >= self.positions.len() {
                return Err(TopologyError::UnknownNode(node));
            }
            if medium.index() >= self.media.len() {
                return Err(TopologyError::UnknownMedium(medium));
            }
            if self.attachments[..i].contains(&(node, medium)) {
                return Err(TopologyError::DuplicateAttachment { node, medium });
            }
        }

        for gw in &self.gateways {
            if gw.node.index() >= self.positions.len() {
                return Err(TopologyError::UnknownNode(gw.node));
            }
            if gw.via.index() >= self.positions.len() {
                return Err(TopologyError::UnknownNode(gw.via));
            }
            if gw.medium.index() >= self.media.len() {
                return Err(TopologyError::UnknownMedium(gw.medium));
            }
        }

        for i in 0..self.positions.len() {
            let node = NodeId::new(i as u32);
            if !self.attachments.iter().any(|(n, _)| *n == node) {
                return Err(TopologyError::DetachedNode(node));
            }
        }
        for i in 0..self.media.len() {
            let medium = MediumId::new(i as u32);
            if !self.attachments.iter().any(|(_, m)| *m == medium) {
                return Err(TopologyError::EmptyMedium(medium));
            }
        }
        Ok(())
    }
}

fn device_on(devices: &[Device], node: NodeId, medium: MediumId) -> Option<&Device> {
    devices.iter().find(|d| d.node == node && d.medium == medium)
}

/// Every pair of devices sharing a usable medium is an adjacency.
fn link_state_db(media: &[Medium], devices: &[Device]) -> LinkStateDb {
    let mut db = LinkStateDb::new();
    for device in devices {
        db.add_address(device.node, device.address);
    }
    for medium in media.iter().filter(|m| m.link_usable()) {
        for &a in &medium.devices {
            for &b in &medium.devices {
                let (a, b) = (&devices[a.index()], &devices[b.index()]);
                if a.node == b.node {
                    continue;
                }
                db.add_adjacency(
                    a.node,
                    Adjacency {
                        neighbor: b.node,
                        local_device: a.id,
                        local_address: a.address,
                        neighbor_address: b.address,
                    },
                );
            }
        }
    }
    db
}

// ── Hybrid layout ─────────────────────────────────────────────────────

/// Parameters of the standard wireless + wired layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct HybridLayout {
    pub wireless_nodes: u32,
    pub wired_nodes: u32,
    pub wireless: WirelessConfig,
    pub wired: WiredConfig,
    pub grid: GridLayout,
    pub wireless_prefix: Ipv4Prefix,
    pub wired_prefix: Ipv4Prefix,
}

impl Default for HybridLayout {
    fn default() -> Self {
        HybridLayout {
            wireless_nodes: 5,
            wired_nodes: 2,
            wireless: WirelessConfig::default(),
            wired: WiredConfig::default(),
            grid: GridLayout::default(),
            wireless_prefix: Ipv4Prefix::slash_24(10, 1, 1),
            wired_prefix: Ipv4Prefix::slash_24(10, 1, 2),
        }
    }
}

/// A built hybrid network and the roles of its nodes.
#[derive(Debug)]
pub struct Topology {
    pub fabric: Fabric,
    /// Wireless nodes in grid order.
    pub wireless: Vec<NodeId>,
    /// Wired-only nodes.
    pub wired: Vec<NodeId>,
    /// The wireless node also attached to the wired medium.
    pub gateway: NodeId,
    pub wireless_medium: MediumId,
    pub wired_medium: MediumId,
}

impl Topology {
    /// Build the hybrid layout.
    ///
    /// Wireless nodes are placed on the grid and share the wireless medium.
    /// Wired nodes share the wired medium with the gateway (the last
    /// wireless node) and default-route through it. Wired nodes are
    /// attached before the gateway, so the first wired node gets the first
    /// wired address.
    pub fn hybrid(layout: &HybridLayout) -> Result<Self, TopologyError> {
        let mut builder = TopologyBuilder::new();
        let wireless_medium =
            builder.medium(MediumKind::Wireless(layout.wireless), layout.wireless_prefix);
        let wired_medium = builder.medium(MediumKind::Wired(layout.wired), layout.wired_prefix);

        let wireless = builder.nodes(layout.wireless_nodes);
        let wired = builder.nodes(layout.wired_nodes);

        for (i, &node) in wireless.iter().enumerate() {
            builder
                .attach(node, wireless_medium)
                .place(node, layout.grid.position(i as u32));
        }
        let Some(&gateway) = wireless.last() else {
            return Err(TopologyError::EmptyMedium(wireless_medium));
        };
        for &node in &wired {
            builder
                .attach(node, wired_medium)
                .default_route_via(node, gateway, wired_medium);
        }
        builder.attach(gateway, wired_medium);

        let fabric = builder.build()?;
        Ok(Topology {
            fabric,
            wireless,
            wired,
            gateway,
            wireless_medium,
            wired_medium,
        })
    }
}
