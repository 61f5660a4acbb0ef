/// Pending-event queue.
///
/// Keyed by `(fire_time, event_id)` in a `BTreeMap`, which gives ordered
/// pops and O(log n) removal for cancellation. Event IDs are strictly
/// increasing, so events sharing a fire time leave in enqueue order.

use std::collections::BTreeMap;

use crate::event::{ContextId, Event, EventHandle, EventIdGen, EventKey};
use crate::time::VirtualTime;

/// Owns the queue and the ID generator. All enqueueing goes through here.
#[derive(Debug)]
pub struct Scheduler<A> {
    queue: BTreeMap<EventKey, Event<A>>,
    id_gen: EventIdGen,
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Scheduler {
            queue: BTreeMap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Enqueue `action` at the absolute time `at`.
    ///
    /// Causality is checked by `Simulation`, which knows the current time.
    pub fn schedule(
        &mut self,
        at: VirtualTime,
        context: Option<ContextId>,
        action: A,
    ) -> EventHandle {
        let id = self.id_gen.next_id();
        let event = Event {
            id,
            fire_time: at,
            context,
            action,
        };
        let key = event.key();
        self.queue.insert(key, event);
        EventHandle { key }
    }

    /// Remove a pending event. Returns `false` if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.queue.remove(&handle.key).is_some()
    }

    /// Whether the event behind `handle` is still queued.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.contains_key(&handle.key)
    }

    /// Pop the next event (earliest time, lowest ID).
    pub fn pop_next(&mut self) -> Option<Event<A>> {
        self.queue.pop_first().map(|(_, event)| event)
    }

    /// Fire time of the next event, if any.
    pub fn peek_time(&self) -> Option<VirtualTime> {
        self.queue.first_key_value().map(|(key, _)| key.fire_time)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drop every pending event without running it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// Drain all events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event<A>> {
        std::mem::take(&mut self.queue).into_values().collect()
    }
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> VirtualTime {
        VirtualTime::from_secs(secs)
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();

        sched.schedule(at(10), None, "first");
        sched.schedule(at(10), None, "second");
        sched.schedule(at(10), None, "third");

        let e1 = sched.pop_next().unwrap();
        let e2 = sched.pop_next().unwrap();
        let e3 = sched.pop_next().unwrap();

        assert!(e1.id < e2.id && e2.id < e3.id);
        assert_eq!([e1.action, e2.action, e3.action], ["first", "second", "third"]);
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();

        sched.schedule(at(30), None, "late");
        sched.schedule(at(10), None, "early");
        sched.schedule(at(20), None, "mid");

        let order: Vec<_> = sched.drain_ordered().into_iter().map(|e| e.action).collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_mixed_ordering() {
        let mut sched = Scheduler::new();
        for secs in [50, 10, 10, 30, 10] {
            sched.schedule(at(secs), None, ());
        }

        let events = sched.drain_ordered();
        for window in events.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            assert!(
                (a.fire_time, a.id) < (b.fire_time, b.id),
                "events out of order: {:?} vs {:?}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_cancel_pending_and_fired() {
        let mut sched = Scheduler::new();
        let h1 = sched.schedule(at(1), None, 1);
        let h2 = sched.schedule(at(2), None, 2);

        assert!(sched.is_pending(h2));
        assert!(sched.cancel(h2));
        assert!(!sched.is_pending(h2));
        // Second cancel is a no-op.
        assert!(!sched.cancel(h2));

        let fired = sched.pop_next().unwrap();
        assert_eq!(fired.id, h1.id());
        // Cancelling an already-fired event is a no-op too.
        assert!(!sched.cancel(h1));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_cancel() {
        let mut sched = Scheduler::new();
        let h = sched.schedule(at(1), None, ());
        sched.cancel(h);
        let h2 = sched.schedule(at(1), None, ());
        assert!(h2.id() > h.id());
    }

    #[test]
    fn test_peek_and_clear() {
        let mut sched = Scheduler::new();
        assert!(sched.peek_time().is_none());
        sched.schedule(at(7), None, ());
        sched.schedule(at(3), Some(ContextId::new(1)), ());
        assert_eq!(sched.peek_time(), Some(at(3)));
        assert_eq!(sched.len(), 2);
        assert_eq!(sched.clear(), 2);
        assert!(sched.is_empty());
        assert!(sched.pop_next().is_none());
    }

    #[test]
    fn test_context_is_carried() {
        let mut sched = Scheduler::new();
        sched.schedule(at(1), Some(ContextId::new(4)), ());
        let e = sched.pop_next().unwrap();
        assert_eq!(e.context, Some(ContextId::new(4)));
    }
}
