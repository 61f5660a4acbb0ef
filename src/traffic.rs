/// Periodic traffic generation.
///
/// A `TrafficGenerator` is a small state machine driven by
/// `NetEvent::Generate` events. Each invocation either sends one packet and
/// reschedules itself after the configured interval, or, once the count
/// has run out, closes its socket and ends the chain. The invocation that
/// observes a zero count is the one that closes, so a generator with count
/// N runs N + 1 times.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::SimResult;
use crate::fabric::{Fabric, SocketId};
use crate::runtime::NetEvent;
use crate::sink::Counters;
use crate::simulation::SimulationContext;

/// Index of a generator inside a `HybridNetwork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneratorId(usize);

impl GeneratorId {
    pub fn new(index: usize) -> Self {
        GeneratorId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum GeneratorState {
    /// Packets still to send. Zero means the next invocation closes.
    Sending { remaining: u32 },
    Closed,
}

/// Sends a fixed number of packets at a fixed interval, then closes.
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    socket: SocketId,
    packet_size: u32,
    interval: Duration,
    state: GeneratorState,
    sent: u32,
}

impl TrafficGenerator {
    pub fn new(socket: SocketId, packet_size: u32, count: u32, interval: Duration) -> Self {
        TrafficGenerator {
            socket,
            packet_size,
            interval,
            state: GeneratorState::Sending { remaining: count },
            sent: 0,
        }
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Packets sent so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn is_closed(&self) -> bool {
        self.state == GeneratorState::Closed
    }

    /// Run one invocation.
    ///
    /// `id` is this generator's own id, used to reschedule the next
    /// invocation. The follow-up event inherits the running context.
    pub fn fire(
        &mut self,
        id: GeneratorId,
        ctx: &mut SimulationContext<'_, NetEvent>,
        fabric: &mut Fabric,
        counters: &mut Counters,
    ) -> SimResult<()> {
        match self.state {
            GeneratorState::Closed => {
                debug!(generator = %id, "invocation on closed generator ignored");
            }
            GeneratorState::Sending { remaining: 0 } => {
                fabric.close(self.socket)?;
                self.state = GeneratorState::Closed;
                info!(generator = %id, socket = %self.socket, sent = self.sent, "traffic done, socket closed");
            }
            GeneratorState::Sending { remaining } => {
                let packet = fabric.send(ctx, self.socket, self.packet_size)?;
                counters.packets_sent += 1;
                self.sent += 1;
                self.state = GeneratorState::Sending {
                    remaining: remaining - 1,
                };
                debug!(generator = %id, %packet, remaining = remaining - 1, "packet sent");
                ctx.schedule_generate(id, self.interval)?;
            }
        }
        Ok(())
    }
}
