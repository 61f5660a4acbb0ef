/// Delivery handling and run counters.
///
/// `Counters` is owned by the running network and handed by `&mut` to
/// whatever needs to update it. There is no global state: two runs in the
/// same process never share counters.
///
/// Delivery notification goes through a `HandlerRegistry` keyed by socket.
/// Registering a second handler for the same socket replaces the first.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::SimResult;
use crate::fabric::{Delivery, SocketId};
use crate::time::VirtualTime;

// ── Counters ──────────────────────────────────────────────────────────

/// Application-level counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Counters {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Time of the most recent delivery, if any.
    pub last_delivery: Option<VirtualTime>,
}

// ── DeliveryHandler ───────────────────────────────────────────────────

/// Invoked once per packet delivered to a registered socket.
pub trait DeliveryHandler {
    fn on_delivery(
        &mut self,
        now: VirtualTime,
        delivery: &Delivery,
        counters: &mut Counters,
    ) -> SimResult<()>;
}

impl<F> DeliveryHandler for F
where
    F: FnMut(VirtualTime, &Delivery, &mut Counters) -> SimResult<()>,
{
    fn on_delivery(
        &mut self,
        now: VirtualTime,
        delivery: &Delivery,
        counters: &mut Counters,
    ) -> SimResult<()> {
        (self)(now, delivery, counters)
    }
}

/// The standard receiver: counts every delivery exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliverySink;

impl DeliveryHandler for DeliverySink {
    fn on_delivery(
        &mut self,
        now: VirtualTime,
        delivery: &Delivery,
        counters: &mut Counters,
    ) -> SimResult<()> {
        counters.packets_received += 1;
        counters.bytes_received += u64::from(delivery.packet.size);
        counters.last_delivery = Some(now);
        info!(
            socket = %delivery.socket,
            from = %delivery.packet.src,
            bytes = delivery.packet.size,
            time = %now,
            "Received one packet!"
        );
        Ok(())
    }
}

// ── HandlerRegistry ───────────────────────────────────────────────────

/// Socket-keyed delivery handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<SocketId, Box<dyn DeliveryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `socket`. Returns `true` if it replaced an
    /// existing handler.
    pub fn register(&mut self, socket: SocketId, handler: Box<dyn DeliveryHandler>) -> bool {
        let replaced = self.handlers.insert(socket, handler).is_some();
        if replaced {
            debug!(socket = %socket, "delivery handler replaced");
        }
        replaced
    }

    pub fn unregister(&mut self, socket: SocketId) -> bool {
        self.handlers.remove(&socket).is_some()
    }

    pub fn contains(&self, socket: SocketId) -> bool {
        self.handlers.contains_key(&socket)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `delivery` to its socket's handler.
    ///
    /// Returns `Ok(false)` when no handler is registered; the packet is
    /// then consumed without notification.
    pub fn dispatch(
        &mut self,
        now: VirtualTime,
        delivery: &Delivery,
        counters: &mut Counters,
    ) -> SimResult<bool> {
        match self.handlers.get_mut(&delivery.socket) {
            Some(handler) => {
                handler.on_delivery(now, delivery, counters)?;
                Ok(true)
            }
            None => {
                debug!(socket = %delivery.socket, "no delivery handler registered");
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("sockets", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use tracing_test::traced_test;

    use super::*;
    use crate::fabric::Packet;

    fn delivery(socket: u32) -> Delivery {
        Delivery {
            socket: SocketId::new(socket),
            packet: Packet {
                uid: 0,
                src: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
                dst: SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, 1), 80),
                size: 967,
                ttl: 63,
                created_at: VirtualTime::from_secs(15),
            },
        }
    }

    #[test]
    #[traced_test]
    fn test_sink_counts_and_logs() {
        let mut counters = Counters::default();
        let mut sink = DeliverySink;
        let now = VirtualTime::from_millis(15_012);

        sink.on_delivery(now, &delivery(0), &mut counters).unwrap();

        assert_eq!(counters.packets_received, 1);
        assert_eq!(counters.bytes_received, 967);
        assert_eq!(counters.last_delivery, Some(now));
        assert!(logs_contain("Received one packet!"));
    }

    #[test]
    fn test_registry_dispatches_by_socket() {
        let mut registry = HandlerRegistry::new();
        registry.register(SocketId::new(1), Box::new(DeliverySink));
        let mut counters = Counters::default();

        assert!(registry
            .dispatch(VirtualTime::ZERO, &delivery(1), &mut counters)
            .unwrap());
        assert!(!registry
            .dispatch(VirtualTime::ZERO, &delivery(2), &mut counters)
            .unwrap());
        assert_eq!(counters.packets_received, 1);
    }

    #[test]
    fn test_registry_last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        let socket = SocketId::new(0);
        assert!(!registry.register(socket, Box::new(DeliverySink)));
        let replaced = registry.register(
            socket,
            Box::new(|_now: VirtualTime, d: &Delivery, c: &mut Counters| -> SimResult<()> {
                c.bytes_received += u64::from(d.packet.size) * 10;
                Ok(())
            }),
        );
        assert!(replaced);
        assert_eq!(registry.len(), 1);

        let mut counters = Counters::default();
        registry
            .dispatch(VirtualTime::ZERO, &delivery(0), &mut counters)
            .unwrap();
        assert_eq!(counters.packets_received, 0);
        assert_eq!(counters.bytes_received, 9670);
    }

    #[test]
    fn test_unregister() {
        let mut registry = HandlerRegistry::new();
        registry.register(SocketId::new(3), Box::new(DeliverySink));
        assert!(registry.contains(SocketId::new(3)));
        assert!(registry.unregister(SocketId::new(3)));
        assert!(registry.is_empty());
        assert!(!registry.unregister(SocketId::new(3)));
    }
}
