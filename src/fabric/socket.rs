//! Datagram sockets owned by nodes.

use std::net::SocketAddrV4;

use super::id::{NodeId, SocketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SocketState {
    Open,
    Closed,
}

/// A UDP-like endpoint.
///
/// A socket is bound to a port on every address of its node, and may be
/// connected to one remote endpoint for `send`. Once closed it neither
/// sends nor receives.
#[derive(Debug, Clone)]
pub struct Socket {
    pub(crate) id: SocketId,
    pub(crate) node: NodeId,
    pub(crate) local_port: Option<u16>,
    pub(crate) remote: Option<SocketAddrV4>,
    pub(crate) state: SocketState,
    pub(crate) tx_packets: u64,
    pub(crate) rx_packets: u64,
}

impl Socket {
    pub(crate) fn new(id: SocketId, node: NodeId) -> Self {
        Socket {
            id,
            node,
            local_port: None,
            remote: None,
            state: SocketState::Open,
            tx_packets: 0,
            rx_packets: 0,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn remote(&self) -> Option<SocketAddrV4> {
        self.remote
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SocketState::Open
    }

    /// Datagrams handed to the fabric by this socket.
    pub fn tx_packets(&self) -> u64 {
        self.tx_packets
    }

    /// Datagrams delivered to this socket.
    pub fn rx_packets(&self) -> u64 {
        self.rx_packets
    }
}
