/// Network runtime: dispatches `NetEvent`s to the fabric, the traffic
/// generators and the delivery handlers.
///
/// `HybridNetwork` owns all per-run state (fabric, counters, generators,
/// handler registry) and implements `EventHandler<NetEvent>`, so a run is
/// just `Simulation::run(stop, &mut network)`.

use std::time::Duration;

use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventHandle};
use crate::fabric::{DeviceId, Fabric, NodeId, Packet, SocketId};
use crate::simulation::{EventHandler, SimulationContext};
use crate::sink::{Counters, DeliveryHandler, HandlerRegistry};
use crate::traffic::{GeneratorId, TrafficGenerator};

// ── NetEvent ──────────────────────────────────────────────────────────

/// Events dispatched by the network runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// Invoke a traffic generator.
    Generate { generator: GeneratorId },
    /// A packet reaches a device after crossing a medium.
    Arrive { device: DeviceId, packet: Packet },
}

// ── SimulationContext network extensions ──────────────────────────────

impl SimulationContext<'_, NetEvent> {
    /// Schedule the arrival of `packet` on `device` after `delay`, under the
    /// receiving node's context.
    pub fn schedule_arrival(
        &mut self,
        node: NodeId,
        device: DeviceId,
        delay: Duration,
        packet: Packet,
    ) -> SimResult<EventHandle> {
        self.schedule_with_context(node.into(), delay, NetEvent::Arrive { device, packet })
    }

    /// Schedule the next invocation of `generator` after `delay`.
    pub fn schedule_generate(
        &mut self,
        generator: GeneratorId,
        delay: Duration,
    ) -> SimResult<EventHandle> {
        self.schedule(delay, NetEvent::Generate { generator })
    }
}

// ── HybridNetwork ─────────────────────────────────────────────────────

/// All state touched by network events during a run.
#[derive(Debug)]
pub struct HybridNetwork {
    fabric: Fabric,
    counters: Counters,
    generators: Vec<TrafficGenerator>,
    handlers: HandlerRegistry,
}

impl HybridNetwork {
    pub fn new(fabric: Fabric) -> Self {
        HybridNetwork {
            fabric,
            counters: Counters::default(),
            generators: Vec::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    pub fn fabric_mut(&mut self) -> &mut Fabric {
        &mut self.fabric
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn add_generator(&mut self, generator: TrafficGenerator) -> GeneratorId {
        self.generators.push(generator);
        GeneratorId::new(self.generators.len() - 1)
    }

    pub fn generator(&self, id: GeneratorId) -> Option<&TrafficGenerator> {
        self.generators.get(id.index())
    }

    /// Register a delivery handler for `socket`, replacing any previous one.
    pub fn set_recv_handler<H>(&mut self, socket: SocketId, handler: H) -> SimResult<bool>
    where
        H: DeliveryHandler + 'static,
    {
        if self.fabric.socket(socket).is_none() {
            return Err(SimError::UnknownSocket(socket));
        }
        Ok(self.handlers.register(socket, Box::new(handler)))
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

impl EventHandler<NetEvent> for HybridNetwork {
    fn handle(
        &mut self,
        ctx: &mut SimulationContext<'_, NetEvent>,
        event: Event<NetEvent>,
    ) -> SimResult<()> {
        match event.action {
            NetEvent::Generate { generator } => {
                let gen = self
                    .generators
                    .get_mut(generator.index())
                    .ok_or(SimError::UnknownGenerator(generator.index()))?;
                gen.fire(generator, ctx, &mut self.fabric, &mut self.counters)
            }
            NetEvent::Arrive { device, packet } => {
                trace!(device = %device, %packet, "arrival");
                if let Some(delivery) = self.fabric.on_arrival(ctx, device, packet)? {
                    self.handlers
                        .dispatch(ctx.now(), &delivery, &mut self.counters)?;
                }
                Ok(())
            }
        }
    }
}
