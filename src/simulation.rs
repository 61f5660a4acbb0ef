/// Simulation execution loop.
///
/// Drives the scheduler: pops events in `(fire_time, id)` order, advances
/// the virtual clock, and dispatches to a handler. The loop is synchronous
/// and single-threaded, so handlers may mutate shared state without locks:
/// callbacks never overlap.

use std::time::Duration;

use tracing::{debug, trace_span};

use crate::error::{SimError, SimResult};
use crate::event::{ContextId, Event, EventHandle, EventId};
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Reacts to dispatched events.
///
/// The handler receives the event by value (so closure payloads can be
/// consumed) and a context through which it can schedule follow-ups.
/// Returning an error aborts the run.
pub trait EventHandler<A> {
    fn handle(&mut self, ctx: &mut SimulationContext<'_, A>, event: Event<A>) -> SimResult<()>;
}

/// A handler backed by a closure. Handy in tests.
impl<A, F> EventHandler<A> for F
where
    F: FnMut(&mut SimulationContext<'_, A>, Event<A>) -> SimResult<()>,
{
    fn handle(&mut self, ctx: &mut SimulationContext<'_, A>, event: Event<A>) -> SimResult<()> {
        (self)(ctx, event)
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable context passed to the handler on every dispatch.
///
/// Borrows the scheduler mutably, so a handler can only influence ordering
/// through the scheduling API.
pub struct SimulationContext<'a, A> {
    pub(crate) scheduler: &'a mut Scheduler<A>,
    pub(crate) now: VirtualTime,
    pub(crate) context: Option<ContextId>,
    pub(crate) stop_requested: &'a mut bool,
}

impl<A> SimulationContext<'_, A> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Context of the event being dispatched.
    #[inline]
    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    /// Schedule `action` after `delay`. The new event inherits the context
    /// of the running one.
    pub fn schedule(&mut self, delay: Duration, action: A) -> SimResult<EventHandle> {
        let context = self.context;
        enqueue(self.scheduler, self.now, context, delay, action)
    }

    /// Schedule `action` after `delay` under an explicit context.
    pub fn schedule_with_context(
        &mut self,
        context: ContextId,
        delay: Duration,
        action: A,
    ) -> SimResult<EventHandle> {
        enqueue(self.scheduler, self.now, Some(context), delay, action)
    }

    /// Schedule at an absolute time. Fails if `at` is in the past.
    pub fn schedule_at(&mut self, at: VirtualTime, action: A) -> SimResult<EventHandle> {
        let context = self.context;
        enqueue_at(self.scheduler, self.now, context, at, action)
    }

    /// Cancel a pending event. No-op (returns `false`) if it already ran or
    /// was already cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    /// Ask the loop to halt once the current callback returns.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }

    /// Number of pending events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

fn enqueue<A>(
    scheduler: &mut Scheduler<A>,
    now: VirtualTime,
    context: Option<ContextId>,
    delay: Duration,
    action: A,
) -> SimResult<EventHandle> {
    let at = now.checked_add(delay)?;
    Ok(scheduler.schedule(at, context, action))
}

fn enqueue_at<A>(
    scheduler: &mut Scheduler<A>,
    now: VirtualTime,
    context: Option<ContextId>,
    at: VirtualTime,
    action: A,
) -> SimResult<EventHandle> {
    if at.is_before(now) {
        return Err(SimError::InvalidDelay {
            reason: format!("cannot schedule at {} when current time is {}", at, now),
        });
    }
    Ok(scheduler.schedule(at, context, action))
}

// ── Run report ────────────────────────────────────────────────────────

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Nothing left to dispatch.
    QueueEmpty,
    /// The next event lies beyond the stop time; it stays queued.
    StopTimeReached,
    /// A callback called `SimulationContext::stop`.
    Stopped,
}

/// Summary of one `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub events_processed: u64,
    pub halt: HaltReason,
    /// Clock value when the loop returned (fire time of the last event run).
    pub now: VirtualTime,
}

/// Metadata of a dispatched event, returned by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub id: EventId,
    pub fire_time: VirtualTime,
    pub context: Option<ContextId>,
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the scheduler and the virtual clock. Seed events with `schedule*`,
/// call `run` with a stop time, then `destroy` to discard what is left.
#[derive(Debug)]
pub struct Simulation<A> {
    scheduler: Scheduler<A>,
    now: VirtualTime,
    events_processed: u64,
    stop_requested: bool,
}

impl<A> Simulation<A> {
    /// Create a new simulation starting at time zero.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            now: VirtualTime::ZERO,
            events_processed: 0,
            stop_requested: false,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Total events dispatched over the simulation's lifetime.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn next_fire_time(&self) -> Option<VirtualTime> {
        self.scheduler.peek_time()
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.scheduler.is_pending(handle)
    }

    /// Schedule `action` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, action: A) -> SimResult<EventHandle> {
        enqueue(&mut self.scheduler, self.now, None, delay, action)
    }

    /// Like `schedule`, tagging the event with `context` for attribution.
    pub fn schedule_with_context(
        &mut self,
        context: ContextId,
        delay: Duration,
        action: A,
    ) -> SimResult<EventHandle> {
        enqueue(&mut self.scheduler, self.now, Some(context), delay, action)
    }

    /// Schedule at an absolute time. Fails if `at` is before `now`.
    pub fn schedule_at(&mut self, at: VirtualTime, action: A) -> SimResult<EventHandle> {
        enqueue_at(&mut self.scheduler, self.now, None, at, action)
    }

    /// Cancel a pending event. Cancelling twice, or after it fired, is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    /// Dispatch exactly one event.
    ///
    /// Returns `Ok(None)` if the queue is empty. Ignores any stop time.
    pub fn step(&mut self, handler: &mut dyn EventHandler<A>) -> SimResult<Option<EventRecord>> {
        let Some(event) = self.scheduler.pop_next() else {
            return Ok(None);
        };

        // Virtual time must never go backward.
        debug_assert!(
            event.fire_time >= self.now,
            "time went backward: now={}, event={}",
            self.now,
            event.fire_time
        );
        self.now = event.fire_time;
        self.events_processed += 1;

        let record = EventRecord {
            id: event.id,
            fire_time: event.fire_time,
            context: event.context,
        };

        let span = trace_span!(
            "event",
            id = record.id.raw(),
            time = %record.fire_time,
            context = record.context.map(|c| c.raw()),
        );
        let _enter = span.enter();

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.now,
            context: record.context,
            stop_requested: &mut self.stop_requested,
        };
        handler
            .handle(&mut ctx, event)
            .map_err(|source| SimError::CallbackFailed {
                event: record.id,
                at: record.fire_time,
                source: Box::new(source),
            })?;

        Ok(Some(record))
    }

    /// Run until the queue is empty, the next event lies beyond `stop_time`,
    /// or a callback calls `stop`.
    ///
    /// A callback error aborts the run immediately and is returned; events
    /// still queued stay queued until `destroy`.
    pub fn run(
        &mut self,
        stop_time: VirtualTime,
        handler: &mut dyn EventHandler<A>,
    ) -> SimResult<RunReport> {
        self.stop_requested = false;
        let start = self.events_processed;

        let halt = loop {
            if self.stop_requested {
                break HaltReason::Stopped;
            }
            match self.scheduler.peek_time() {
                None => break HaltReason::QueueEmpty,
                Some(next) if next > stop_time => break HaltReason::StopTimeReached,
                Some(_) => {
                    self.step(handler)?;
                }
            }
        };

        let report = RunReport {
            events_processed: self.events_processed - start,
            halt,
            now: self.now,
        };
        debug!(
            events = report.events_processed,
            halt = ?report.halt,
            now = %report.now,
            pending = self.scheduler.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Discard every pending event without invoking it.
    ///
    /// Returns the number of events discarded.
    pub fn destroy(&mut self) -> usize {
        let discarded = self.scheduler.clear();
        debug!(discarded, "simulation destroyed");
        discarded
    }
}

impl<A> Default for Simulation<A> {
    fn default() -> Self {
        Self::new()
    }
}
