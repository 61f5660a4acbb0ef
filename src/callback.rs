//! Closure events.
//!
//! `Callback<S>` lets a caller schedule plain closures instead of an enum of
//! domain events. Each closure receives the simulation context and a
//! mutable reference to caller-owned state `S`, which `CallbackDispatcher`
//! threads through the run. No state is captured by reference, so nothing
//! hidden outlives the run.

use crate::error::SimResult;
use crate::event::Event;
use crate::simulation::{EventHandler, SimulationContext};

type CallbackFn<S> = dyn FnOnce(&mut SimulationContext<'_, Callback<S>>, &mut S) -> SimResult<()>;

/// A one-shot closure scheduled as an event.
pub struct Callback<S> {
    f: Box<CallbackFn<S>>,
}

impl<S> Callback<S> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut SimulationContext<'_, Callback<S>>, &mut S) -> SimResult<()> + 'static,
    {
        Callback { f: Box::new(f) }
    }

    /// Invoke the closure, consuming it.
    pub fn invoke(self, ctx: &mut SimulationContext<'_, Callback<S>>, state: &mut S) -> SimResult<()> {
        (self.f)(ctx, state)
    }
}

impl<S> std::fmt::Debug for Callback<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Runs `Callback` events against a borrowed state value.
pub struct CallbackDispatcher<'s, S> {
    state: &'s mut S,
}

impl<'s, S> CallbackDispatcher<'s, S> {
    pub fn new(state: &'s mut S) -> Self {
        CallbackDispatcher { state }
    }
}

impl<S> EventHandler<Callback<S>> for CallbackDispatcher<'_, S> {
    fn handle(
        &mut self,
        ctx: &mut SimulationContext<'_, Callback<S>>,
        event: Event<Callback<S>>,
    ) -> SimResult<()> {
        event.action.invoke(ctx, self.state)
    }
}
