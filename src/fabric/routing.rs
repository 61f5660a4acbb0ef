//! Layered routing.
//!
//! Each node carries a [`RoutingStack`]: an ordered list of strategies,
//! each able to resolve a next hop or decline. The stack asks them in
//! ascending priority value and the first answer wins, so a static layer
//! at priority 0 overrides a link-state layer at priority 10.
//!
//! The link-state layer is proactive: its table is computed up front from
//! a [`LinkStateDb`] snapshot of the topology (shortest hop count, ties
//! broken by node id) rather than on demand.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;

use super::address::Ipv4Prefix;
use super::id::{DeviceId, NodeId};

/// Where to send a packet next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Outgoing device.
    pub device: DeviceId,
    /// Address of the neighbour to hand the packet to.
    pub next_hop: Ipv4Addr,
    /// Address of the outgoing device, used as the packet source.
    pub source: Ipv4Addr,
}

/// A routing strategy: resolve the next hop toward a destination or decline.
pub trait RoutingStrategy: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn resolve(&self, dest: Ipv4Addr) -> Option<Route>;
}

// ── Static routing ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StaticEntry {
    prefix: Ipv4Prefix,
    gateway: Option<Ipv4Addr>,
    device: DeviceId,
    source: Ipv4Addr,
}

/// Longest-prefix-match table of configured routes.
#[derive(Debug, Clone, Default)]
pub struct StaticRouting {
    entries: Vec<StaticEntry>,
}

impl StaticRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directly connected network: destinations inside `prefix` are
    /// reached on-link through `device`.
    pub fn add_network_route(&mut self, prefix: Ipv4Prefix, device: DeviceId, source: Ipv4Addr) {
        self.entries.push(StaticEntry {
            prefix,
            gateway: None,
            device,
            source,
        });
    }

    /// Destinations inside `prefix` are reached through `gateway`.
    pub fn add_gateway_route(
        &mut self,
        prefix: Ipv4Prefix,
        gateway: Ipv4Addr,
        device: DeviceId,
        source: Ipv4Addr,
    ) {
        self.entries.push(StaticEntry {
            prefix,
            gateway: Some(gateway),
            device,
            source,
        });
    }

    pub fn add_default_route(&mut self, gateway: Ipv4Addr, device: DeviceId, source: Ipv4Addr) {
        self.add_gateway_route(Ipv4Prefix::default_route(), gateway, device, source);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RoutingStrategy for StaticRouting {
    fn name(&self) -> &'static str {
        "static"
    }

    fn resolve(&self, dest: Ipv4Addr) -> Option<Route> {
        // Longest prefix wins; among equals, the first configured.
        let mut best: Option<&StaticEntry> = None;
        for entry in self.entries.iter().filter(|e| e.prefix.contains(dest)) {
            if best.map_or(true, |b| entry.prefix.prefix_len() > b.prefix.prefix_len()) {
                best = Some(entry);
            }
        }
        best.map(|e| Route {
            device: e.device,
            next_hop: e.gateway.unwrap_or(dest),
            source: e.source,
        })
    }
}

// ── Link-state database ───────────────────────────────────────────────

/// One usable link from a node to a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub neighbor: NodeId,
    pub local_device: DeviceId,
    pub local_address: Ipv4Addr,
    pub neighbor_address: Ipv4Addr,
}

/// Topology snapshot the proactive layer computes routes from.
#[derive(Debug, Clone, Default)]
pub struct LinkStateDb {
    adjacencies: BTreeMap<NodeId, Vec<Adjacency>>,
    addresses: BTreeMap<NodeId, Vec<Ipv4Addr>>,
}

impl LinkStateDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_adjacency(&mut self, node: NodeId, adjacency: Adjacency) {
        self.adjacencies.entry(node).or_default().push(adjacency);
    }

    pub fn add_address(&mut self, node: NodeId, address: Ipv4Addr) {
        self.addresses.entry(node).or_default().push(address);
    }

    pub fn neighbors(&self, node: NodeId) -> &[Adjacency] {
        self.adjacencies.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn addresses(&self, node: NodeId) -> &[Ipv4Addr] {
        self.addresses.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ── Link-state routing ────────────────────────────────────────────────

/// Proactive shortest-path routing over a [`LinkStateDb`].
#[derive(Debug, Clone)]
pub struct LinkStateRouting {
    origin: NodeId,
    table: BTreeMap<Ipv4Addr, (Route, u32)>,
}

impl LinkStateRouting {
    /// Compute the full table for `origin` with a breadth-first search.
    pub fn compute(origin: NodeId, db: &LinkStateDb) -> Self {
        let mut first_hop: BTreeMap<NodeId, (Adjacency, u32)> = BTreeMap::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut queue = VecDeque::from([origin]);

        while let Some(current) = queue.pop_front() {
            let mut neighbors = db.neighbors(current).to_vec();
            neighbors.sort_by_key(|a| a.neighbor);
            for adj in neighbors {
                if adj.neighbor == origin || first_hop.contains_key(&adj.neighbor) {
                    continue;
                }
                let hop = if current == origin {
                    (adj, 1)
                } else {
                    let (via, hops) = first_hop[&current];
                    (via, hops + 1)
                };
                first_hop.insert(adj.neighbor, hop);
                order.push(adj.neighbor);
                queue.push_back(adj.neighbor);
            }
        }

        let mut table = BTreeMap::new();
        for node in order {
            let (via, hops) = first_hop[&node];
            for &address in db.addresses(node) {
                table.entry(address).or_insert((
                    Route {
                        device: via.local_device,
                        next_hop: via.neighbor_address,
                        source: via.local_address,
                    },
                    hops,
                ));
            }
        }

        LinkStateRouting { origin, table }
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Hop count to `dest`, if reachable.
    pub fn distance(&self, dest: Ipv4Addr) -> Option<u32> {
        self.table.get(&dest).map(|(_, hops)| *hops)
    }

    /// Number of reachable destination addresses.
    pub fn route_count(&self) -> usize {
        self.table.len()
    }
}

impl RoutingStrategy for LinkStateRouting {
    fn name(&self) -> &'static str {
        "link-state"
    }

    fn resolve(&self, dest: Ipv4Addr) -> Option<Route> {
        self.table.get(&dest).map(|(route, _)| *route)
    }
}

// ── Stack ─────────────────────────────────────────────────────────────

/// Priority value of the static layer. Lower values are consulted first.
pub const STATIC_PRIORITY: i16 = 0;
/// Priority value of the proactive link-state layer.
pub const LINK_STATE_PRIORITY: i16 = 10;

#[derive(Debug)]
struct RoutingLayer {
    priority: i16,
    strategy: Box<dyn RoutingStrategy>,
}

/// Ordered list of strategies tried in ascending priority value.
#[derive(Debug, Default)]
pub struct RoutingStack {
    layers: Vec<RoutingLayer>,
}

impl RoutingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a layer. Layers with equal priority keep insertion order.
    pub fn add(&mut self, priority: i16, strategy: Box<dyn RoutingStrategy>) {
        let at = self.layers.partition_point(|l| l.priority <= priority);
        self.layers.insert(at, RoutingLayer { priority, strategy });
    }

    /// First answer in priority order, along with the layer that gave it.
    pub fn resolve(&self, dest: Ipv4Addr) -> Option<(Route, &'static str)> {
        self.layers.iter().find_map(|layer| {
            layer
                .strategy
                .resolve(dest)
                .map(|route| (route, layer.strategy.name()))
        })
    }

    /// `(priority, name)` of each layer, in consultation order.
    pub fn layers(&self) -> Vec<(i16, &'static str)> {
        self.layers
            .iter()
            .map(|l| (l.priority, l.strategy.name()))
            .collect()
    }
}
