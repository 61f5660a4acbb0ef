//! IPv4 prefixes and per-medium address pools.

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::TopologyError;

/// An IPv4 network such as `10.1.1.0/24`. Host bits are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    len: u8,
}

fn mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

impl Ipv4Prefix {
    /// Build a prefix, clearing any host bits of `addr`.
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, TopologyError> {
        if len > 32 {
            return Err(TopologyError::InvalidPrefix(len));
        }
        Ok(Ipv4Prefix {
            network: Ipv4Addr::from(u32::from(addr) & mask(len)),
            len,
        })
    }

    /// The `/24` network `a.b.c.0/24`.
    pub const fn slash_24(a: u8, b: u8, c: u8) -> Self {
        Ipv4Prefix {
            network: Ipv4Addr::new(a, b, c, 0),
            len: 24,
        }
    }

    /// `0.0.0.0/0`.
    pub fn default_route() -> Self {
        Ipv4Prefix {
            network: Ipv4Addr::UNSPECIFIED,
            len: 0,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.len) == u32::from(self.network)
    }

    /// Two prefixes overlap when the shorter one contains the longer one.
    pub fn overlaps(&self, other: &Ipv4Prefix) -> bool {
        let m = mask(self.len.min(other.len));
        u32::from(self.network) & m == u32::from(other.network) & m
    }

    /// Number of addresses in the prefix, including network and broadcast.
    fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.len))
    }
}

impl std::fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in a.b.c.d/len form", s))?;
        let addr: Ipv4Addr = addr.parse().map_err(|e| format!("'{}': {}", s, e))?;
        let len: u8 = len.parse().map_err(|e| format!("'{}': {}", s, e))?;
        Ipv4Prefix::new(addr, len).map_err(|e| e.to_string())
    }
}

/// Hands out host addresses from a prefix in ascending order.
///
/// Skips the network and broadcast addresses when the prefix has room for
/// them (anything shorter than /31).
#[derive(Debug, Clone)]
pub struct AddressPool {
    prefix: Ipv4Prefix,
    next: u64,
}

impl AddressPool {
    pub fn new(prefix: Ipv4Prefix) -> Self {
        let first = if prefix.size() > 2 { 1 } else { 0 };
        AddressPool { prefix, next: first }
    }

    pub fn prefix(&self) -> Ipv4Prefix {
        self.prefix
    }

    /// Hosts still available.
    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.next)
    }

    fn end(&self) -> u64 {
        let size = self.prefix.size();
        if size > 2 {
            size - 1
        } else {
            size
        }
    }

    pub fn allocate(&mut self) -> Result<Ipv4Addr, TopologyError> {
        if self.next >= self.end() {
            return Err(TopologyError::PoolExhausted(self.prefix.to_string()));
        }
        // `next` < 2^32 here, so the sum stays in range.
        let host = u32::from(self.prefix.network) as u64 + self.next;
        self.next += 1;
        Ok(Ipv4Addr::from(host as u32))
    }
}
