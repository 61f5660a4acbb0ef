//! # hybridsim: Hybrid Network Throughput Simulation
//!
//! A discrete-event simulation of wireless nodes bridged to a wired
//! segment. A single ordered event queue drives everything: periodic
//! traffic, packet hops across media, deliveries and the final
//! measurement. Everything runs on one thread against a virtual clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │           Scenario            │ ← config, setup, throughput
//! │  ┌────────────────────────┐  │
//! │  │     HybridNetwork       │  │ ← dispatches NetEvents
//! │  │  ┌──────────────────┐  │  │
//! │  │  │ Fabric           │  │  │ ← nodes, media, sockets, routing
//! │  │  ├──────────────────┤  │  │
//! │  │  │ TrafficGenerator │  │  │ ← send / reschedule / close
//! │  │  ├──────────────────┤  │  │
//! │  │  │ HandlerRegistry  │  │  │ ← per-socket delivery sinks
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! │  ┌────────────────────────┐  │
//! │  │      Simulation         │  │ ← execution loop
//! │  │  ┌──────────────────┐  │  │
//! │  │  │ Scheduler        │  │  │ ← (fire_time, id) ordered queue
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```

pub mod callback;
pub mod error;
pub mod event;
pub mod fabric;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod sink;
pub mod stats;
pub mod time;
pub mod topology;
pub mod traffic;

// Re-exports for convenience.
pub use callback::{Callback, CallbackDispatcher};
pub use error::{SimError, SimResult, TopologyError};
pub use event::{ContextId, Event, EventHandle, EventId};
pub use runtime::{HybridNetwork, NetEvent};
pub use scenario::{Scenario, ScenarioConfig, ScenarioOutcome};
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, HaltReason, RunReport, Simulation, SimulationContext};
pub use sink::{Counters, DeliveryHandler, DeliverySink};
pub use stats::{compute_throughput, Mbps};
pub use time::VirtualTime;
pub use topology::{Topology, TopologyBuilder};
pub use traffic::{GeneratorId, TrafficGenerator};
