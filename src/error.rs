//! Structured error types.
//!
//! All fallible public APIs return `SimResult<T>`. Configuration problems
//! (bad delays, bad topologies, bad CLI values) are reported before any
//! simulated time elapses; a failing event callback aborts the run and
//! surfaces as `CallbackFailed`. There are no retryable errors: packets the
//! fabric loses are simply never counted.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::event::EventId;
use crate::fabric::{MediumId, NodeId, SocketId};
use crate::time::VirtualTime;

/// Failures detected while building a topology. Always build-time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("address pools {a} and {b} overlap")]
    OverlappingPools { a: String, b: String },

    #[error("node {0} has no medium attached")]
    DetachedNode(NodeId),

    #[error("medium {0} has no devices attached")]
    EmptyMedium(MediumId),

    #[error("node {node} is already attached to medium {medium}")]
    DuplicateAttachment { node: NodeId, medium: MediumId },

    #[error("address pool {0} is exhausted")]
    PoolExhausted(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown medium {0}")]
    UnknownMedium(MediumId),

    #[error("invalid prefix length /{0}")]
    InvalidPrefix(u8),

    #[error("node {node} cannot reach gateway {gateway} on medium {medium}")]
    UnreachableGateway {
        node: NodeId,
        gateway: NodeId,
        medium: MediumId,
    },
}

/// The top-level error type.
#[derive(Debug, Error)]
pub enum SimError {
    // ── Configuration errors ──────────────────────────────

    /// A delay was negative, non-finite, overflowed the clock, or pointed
    /// before the current time.
    #[error("invalid delay: {reason}")]
    InvalidDelay { reason: String },

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Fabric misuse ─────────────────────────────────────

    #[error("socket {0} does not exist")]
    UnknownSocket(SocketId),

    #[error("socket {0} is closed")]
    SocketClosed(SocketId),

    #[error("socket {0} has no remote endpoint")]
    SocketNotConnected(SocketId),

    #[error("port {port} is already bound on {address}")]
    PortInUse { address: Ipv4Addr, port: u16 },

    #[error("node {0} has no address to bind")]
    NoAddress(NodeId),

    #[error("traffic generator #{0} does not exist")]
    UnknownGenerator(usize),

    // ── Run errors ────────────────────────────────────────

    /// A callback returned an error during `run`. The run stops here.
    #[error("event {event} at {at} failed: {source}")]
    CallbackFailed {
        event: EventId,
        at: VirtualTime,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    /// The innermost error, unwrapping any `CallbackFailed` layers.
    pub fn root_cause(&self) -> &SimError {
        match self {
            SimError::CallbackFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
