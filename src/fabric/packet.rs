//! Application packets carried through the fabric.

use std::net::SocketAddrV4;

use crate::time::VirtualTime;

/// Hop limit given to every new packet.
pub const DEFAULT_TTL: u8 = 64;

/// A UDP datagram in flight.
///
/// Payload bytes are never materialised; only the size travels, since the
/// fabric's delay model and the throughput computation need nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    pub uid: u64,
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub size: u32,
    pub ttl: u8,
    pub created_at: VirtualTime,
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pkt#{} {} → {} ({} bytes, ttl {})",
            self.uid, self.src, self.dst, self.size, self.ttl
        )
    }
}
