//! The throughput scenario: configuration, setup, run and outcome.
//!
//! A wireless source (the first wireless node) sends a fixed number of
//! packets to a sink on the first wired node, crossing the gateway. The
//! first send is scheduled under the source node's context at the start
//! offset; the run stops at the stop time and whatever is still queued is
//! discarded.
//!
//! ```rust
//! use hybridsim::scenario::{Scenario, ScenarioConfig};
//!
//! let outcome = Scenario::build(ScenarioConfig::default())?.run()?;
//! assert_eq!(outcome.counters.packets_received, 2);
//! assert_eq!(outcome.throughput()?.to_string(), "0.0030944");
//! # Ok::<(), hybridsim::error::SimError>(())
//! ```

use std::net::SocketAddrV4;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{SimError, SimResult, TopologyError};
use crate::fabric::{FabricStats, PhyMode, SocketId, WiredConfig, WirelessConfig};
use crate::runtime::{HybridNetwork, NetEvent};
use crate::simulation::{RunReport, Simulation};
use crate::sink::{Counters, DeliverySink};
use crate::stats::{compute_throughput, Mbps};
use crate::time::VirtualTime;
use crate::topology::{HybridLayout, Topology};
use crate::traffic::TrafficGenerator;

// ── Configuration ─────────────────────────────────────────────────────

/// Every tunable of the scenario. `Default` gives the reference run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ScenarioConfig {
    pub phy_mode: PhyMode,
    /// Received signal strength on the wireless medium (dBm).
    pub rss_dbm: f64,
    /// Application payload per packet (bytes).
    pub packet_size: u32,
    pub num_packets: u32,
    pub interval: Duration,
    pub wireless_nodes: u32,
    pub wired_nodes: u32,
    /// Destination UDP port of the sink.
    pub port: u16,
    /// Offset of the first generator invocation.
    pub start: Duration,
    /// The run dispatches nothing scheduled after this time.
    pub stop: Duration,
    pub wired: WiredConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            phy_mode: PhyMode::DsssRate1Mbps,
            rss_dbm: -67.0,
            packet_size: 967,
            num_packets: 2,
            interval: Duration::from_secs(2),
            wireless_nodes: 5,
            wired_nodes: 2,
            port: 80,
            start: Duration::from_secs(15),
            stop: Duration::from_secs(20),
            wired: WiredConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Reject values the scenario cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        if self.packet_size == 0 {
            return Err(SimError::InvalidConfig("packetSize must be positive".into()));
        }
        if self.interval.is_zero() {
            return Err(SimError::InvalidConfig("interval must be positive".into()));
        }
        if self.wireless_nodes == 0 {
            return Err(SimError::InvalidConfig("numOlsrNodes must be positive".into()));
        }
        if self.wired_nodes == 0 {
            return Err(SimError::InvalidConfig("at least one wired node is required".into()));
        }
        if !self.rss_dbm.is_finite() {
            return Err(SimError::InvalidConfig(format!("rss {} is not finite", self.rss_dbm)));
        }
        Ok(())
    }

    /// Seconds between the first send and the stop time.
    pub fn observation_window(&self) -> SimResult<f64> {
        let window = self.stop.checked_sub(self.start).unwrap_or_default();
        if window.is_zero() {
            return Err(SimError::InvalidConfig(format!(
                "stop time {:?} must lie after start time {:?}",
                self.stop, self.start
            )));
        }
        Ok(window.as_secs_f64())
    }

    fn layout(&self) -> HybridLayout {
        HybridLayout {
            wireless_nodes: self.wireless_nodes,
            wired_nodes: self.wired_nodes,
            wireless: WirelessConfig {
                phy_mode: self.phy_mode,
                rss_dbm: self.rss_dbm,
                ..WirelessConfig::default()
            },
            wired: self.wired,
            ..HybridLayout::default()
        }
    }
}

// ── Scenario ──────────────────────────────────────────────────────────

/// A fully set-up scenario, ready to run.
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    sim: Simulation<NetEvent>,
    network: HybridNetwork,
    source: SocketId,
    sink: SocketId,
}

impl Scenario {
    /// Build the topology, the sockets and the generator, and schedule the
    /// first send. No simulated time elapses here.
    pub fn build(config: ScenarioConfig) -> SimResult<Self> {
        config.validate()?;

        let topology = Topology::hybrid(&config.layout())?;
        let source_node = topology.wireless[0];
        let sink_node = topology.wired[0];
        let sink_address = topology
            .fabric
            .address_on(sink_node, topology.wired_medium)
            .ok_or(TopologyError::DetachedNode(sink_node))?;

        let mut network = HybridNetwork::new(topology.fabric);

        let sink = network.fabric_mut().create_socket(sink_node)?;
        network.fabric_mut().bind(sink, config.port)?;
        network.set_recv_handler(sink, DeliverySink)?;

        let source = network.fabric_mut().create_socket(source_node)?;
        network
            .fabric_mut()
            .connect(source, SocketAddrV4::new(sink_address, config.port))?;

        let generator = network.add_generator(TrafficGenerator::new(
            source,
            config.packet_size,
            config.num_packets,
            config.interval,
        ));

        let mut sim = Simulation::new();
        sim.schedule_with_context(
            source_node.into(),
            config.start,
            NetEvent::Generate { generator },
        )?;

        info!(
            phy_mode = %config.phy_mode,
            rss_dbm = config.rss_dbm,
            packet_size = config.packet_size,
            num_packets = config.num_packets,
            interval = ?config.interval,
            wireless_nodes = config.wireless_nodes,
            source = %source_node,
            sink = %sink_node,
            %sink_address,
            "scenario ready"
        );

        Ok(Scenario {
            config,
            sim,
            network,
            source,
            sink,
        })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn network(&self) -> &HybridNetwork {
        &self.network
    }

    pub fn source(&self) -> SocketId {
        self.source
    }

    pub fn sink(&self) -> SocketId {
        self.sink
    }

    /// Events waiting to run.
    pub fn pending_count(&self) -> usize {
        self.sim.pending_count()
    }

    /// Run to the stop time, then destroy the simulation.
    pub fn run(mut self) -> SimResult<ScenarioOutcome> {
        let stop = VirtualTime::from(self.config.stop);
        let report = self.sim.run(stop, &mut self.network)?;
        let discarded = self.sim.destroy();

        let counters = self.network.counters();
        debug_assert!(counters.packets_received <= counters.packets_sent);
        let fabric = self.network.fabric().stats();
        debug!(?fabric, "fabric statistics");
        info!(
            sent = counters.packets_sent,
            received = counters.packets_received,
            events = report.events_processed,
            discarded,
            "run complete"
        );

        Ok(ScenarioOutcome {
            config: self.config,
            counters,
            report,
            discarded,
            fabric,
        })
    }
}

// ── Outcome ───────────────────────────────────────────────────────────

/// What a completed run leaves behind.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub config: ScenarioConfig,
    pub counters: Counters,
    pub report: RunReport,
    /// Events still queued at the stop time.
    pub discarded: usize,
    pub fabric: FabricStats,
}

impl ScenarioOutcome {
    /// Throughput over the observation window.
    pub fn throughput(&self) -> SimResult<Mbps> {
        compute_throughput(
            &self.counters,
            self.config.packet_size,
            self.config.observation_window()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::event::Event;
    use crate::simulation::{EventHandler, HaltReason, SimulationContext};

    fn run(config: ScenarioConfig) -> ScenarioOutcome {
        Scenario::build(config).unwrap().run().unwrap()
    }

    #[test]
    #[traced_test]
    fn test_default_scenario() {
        let outcome = run(ScenarioConfig::default());

        assert_eq!(outcome.counters.packets_sent, 2);
        assert_eq!(outcome.counters.packets_received, 2);
        assert_eq!(outcome.counters.bytes_received, 2 * 967);
        assert_eq!(outcome.throughput().unwrap().value(), 0.0030944);
        assert_eq!(outcome.report.halt, HaltReason::QueueEmpty);
        assert_eq!(outcome.discarded, 0);
        assert!(logs_contain("Received one packet!"));
    }

    #[test]
    fn test_scenario_seeds_one_event() {
        let scenario = Scenario::build(ScenarioConfig::default()).unwrap();
        assert_eq!(scenario.pending_count(), 1);
        assert_ne!(scenario.source(), scenario.sink());
        assert!(scenario.network().handlers().contains(scenario.sink()));
    }

    #[test]
    fn test_zero_packets() {
        let outcome = run(ScenarioConfig {
            num_packets: 0,
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_sent, 0);
        assert_eq!(outcome.counters.packets_received, 0);
        // Only the closing invocation ran.
        assert_eq!(outcome.report.events_processed, 1);
        assert_eq!(outcome.throughput().unwrap().value(), 0.0);
    }

    #[test]
    fn test_stop_before_first_send() {
        let outcome = run(ScenarioConfig {
            stop: Duration::from_secs(10),
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_sent, 0);
        assert_eq!(outcome.report.events_processed, 0);
        assert_eq!(outcome.report.halt, HaltReason::StopTimeReached);
        assert_eq!(outcome.discarded, 1);
        assert!(matches!(
            outcome.throughput(),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stop_before_close_discards_generator() {
        // Sends at 15 s and 17 s; the closing invocation at 19 s is cut off.
        let outcome = run(ScenarioConfig {
            stop: Duration::from_secs(18),
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_sent, 2);
        assert_eq!(outcome.counters.packets_received, 2);
        assert_eq!(outcome.discarded, 1);
    }

    #[test]
    fn test_weak_signal_delivers_nothing() {
        let outcome = run(ScenarioConfig {
            rss_dbm: -110.0,
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_sent, 2);
        assert_eq!(outcome.counters.packets_received, 0);
        assert!(outcome.fabric.dropped() > 0);
    }

    #[test]
    fn test_received_never_exceeds_sent() {
        for n in [0, 1, 3, 5] {
            let config = ScenarioConfig {
                num_packets: n,
                interval: Duration::from_millis(500),
                ..ScenarioConfig::default()
            };
            let stop = VirtualTime::from(config.stop);
            let Scenario {
                mut sim,
                mut network,
                ..
            } = Scenario::build(config).unwrap();

            let mut snapshots = 0;
            let mut checked =
                |ctx: &mut SimulationContext<'_, NetEvent>, e: Event<NetEvent>| -> SimResult<()> {
                    network.handle(ctx, e)?;
                    let c = network.counters();
                    assert!(c.packets_received <= c.packets_sent, "after {}: {:?}", ctx.now(), c);
                    snapshots += 1;
                    Ok(())
                };
            sim.run(stop, &mut checked).unwrap();

            assert!(snapshots > 0);
            assert_eq!(network.counters().packets_sent, u64::from(n));
            assert_eq!(network.counters().packets_received, u64::from(n));
        }
    }

    #[test]
    fn test_largest_packet_size_runs() {
        // Each frame is on the air for hours, so nothing lands by 20 s.
        let outcome = run(ScenarioConfig {
            packet_size: u32::MAX,
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_sent, 2);
        assert_eq!(outcome.counters.packets_received, 0);
        assert_eq!(outcome.report.halt, HaltReason::StopTimeReached);

        let outcome = run(ScenarioConfig {
            packet_size: u32::MAX,
            stop: Duration::from_secs(100_000),
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_received, 2);
        assert_eq!(outcome.counters.bytes_received, 2 * u64::from(u32::MAX));
    }

    #[test]
    fn test_faster_phy_mode_same_count() {
        let outcome = run(ScenarioConfig {
            phy_mode: PhyMode::DsssRate11Mbps,
            wireless_nodes: 3,
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_received, 2);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = [
            ScenarioConfig {
                packet_size: 0,
                ..ScenarioConfig::default()
            },
            ScenarioConfig {
                interval: Duration::ZERO,
                ..ScenarioConfig::default()
            },
            ScenarioConfig {
                wireless_nodes: 0,
                ..ScenarioConfig::default()
            },
            ScenarioConfig {
                rss_dbm: f64::NAN,
                ..ScenarioConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                Scenario::build(config),
                Err(SimError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_single_wireless_node_is_its_own_gateway() {
        let outcome = run(ScenarioConfig {
            wireless_nodes: 1,
            ..ScenarioConfig::default()
        });
        assert_eq!(outcome.counters.packets_received, 2);
    }
}
