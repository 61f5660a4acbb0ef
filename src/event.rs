/// Event records for the discrete-event scheduler.
///
/// An `Event` pairs an ordering key `(fire_time, sequence id)` with an
/// action payload. The payload type is generic: the network runtime uses an
/// enum of domain events, while `callback::Callback` carries a boxed closure.

use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing sequence number assigned at enqueue time.
///
/// Breaks ties between events sharing a fire time: the event enqueued
/// first runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Mints event IDs. Never reuses a value, even after cancellation.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Context ───────────────────────────────────────────────────────────

/// Execution-context tag attached to an event.
///
/// Used for attribution in logs only; it never influences ordering.
/// The network runtime uses the id of the node an event runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextId(u32);

impl ContextId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        ContextId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

// ── Key / Handle ──────────────────────────────────────────────────────

/// Total order of pending events: earliest `fire_time` first, then lowest
/// sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub fire_time: VirtualTime,
    pub id: EventId,
}

/// Returned by scheduling calls; presented to `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) key: EventKey,
}

impl EventHandle {
    pub fn id(&self) -> EventId {
        self.key.id
    }

    pub fn fire_time(&self) -> VirtualTime {
        self.key.fire_time
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single pending or dispatched event.
#[derive(Debug)]
pub struct Event<A> {
    pub id: EventId,
    pub fire_time: VirtualTime,
    pub context: Option<ContextId>,
    pub action: A,
}

impl<A> Event<A> {
    pub fn key(&self) -> EventKey {
        EventKey {
            fire_time: self.fire_time,
            id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_monotonic() {
        let mut gen = EventIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(gen.peek().raw(), 2);
        let c = gen.next_id();
        assert_eq!((a.raw(), b.raw(), c.raw()), (0, 1, 2));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_key_orders_by_time_first() {
        let early = EventKey {
            fire_time: VirtualTime::from_secs(1),
            id: EventId::new(9),
        };
        let late = EventKey {
            fire_time: VirtualTime::from_secs(2),
            id: EventId::new(0),
        };
        assert!(early < late);
    }

    #[test]
    fn test_key_tiebreak_by_id() {
        let first = EventKey {
            fire_time: VirtualTime::from_secs(1),
            id: EventId::new(3),
        };
        let second = EventKey {
            fire_time: VirtualTime::from_secs(1),
            id: EventId::new(4),
        };
        assert!(first < second);
    }

    #[test]
    fn test_display() {
        assert_eq!(EventId::new(42).to_string(), "E#42");
        assert_eq!(ContextId::new(3).to_string(), "ctx3");
    }
}
