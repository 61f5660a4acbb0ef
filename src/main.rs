//! Hybrid network throughput simulator CLI.
//!
//! Builds a group of wireless nodes bridged to a small wired segment, sends
//! a burst of UDP packets from a wireless node to a wired sink and prints
//! the measured throughput.
//!
//! # Example
//!
//! ```bash
//! hybridsim --numPackets 4 --interval=0.5 --rss -80
//! RUST_LOG=hybridsim=debug hybridsim --phyMode DsssRate11Mbps
//! ```

use std::process::ExitCode;

use clap::Parser;
use hybridsim::error::SimResult;
use hybridsim::fabric::PhyMode;
use hybridsim::scenario::{Scenario, ScenarioConfig};
use hybridsim::time::delay_from_secs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Hybrid wireless/wired throughput simulation.
///
/// Logs go to stderr; stdout carries only the throughput line.
#[derive(Parser, Debug)]
#[command(name = "hybridsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Wireless modulation profile (DsssRate1Mbps, DsssRate2Mbps, DsssRate5_5Mbps, DsssRate11Mbps)
    #[arg(long = "phyMode", default_value = "DsssRate1Mbps")]
    phy_mode: String,

    /// Received signal strength in dBm
    #[arg(long, default_value = "-67", allow_negative_numbers = true)]
    rss: f64,

    /// Size of each application packet in bytes
    #[arg(long = "packetSize", default_value = "967")]
    packet_size: u32,

    /// Number of packets to send
    #[arg(long = "numPackets", default_value = "2")]
    num_packets: u32,

    /// Seconds between packets
    #[arg(long, default_value = "2.0", allow_negative_numbers = true)]
    interval: f64,

    /// Number of wireless nodes
    #[arg(long = "numOlsrNodes", default_value = "5")]
    num_olsr_nodes: u32,
}

impl Args {
    fn into_config(self) -> SimResult<ScenarioConfig> {
        let interval = delay_from_secs(self.interval)?;
        let config = ScenarioConfig {
            phy_mode: self.phy_mode.parse::<PhyMode>()?,
            rss_dbm: self.rss,
            packet_size: self.packet_size,
            num_packets: self.num_packets,
            interval,
            wireless_nodes: self.num_olsr_nodes,
            ..ScenarioConfig::default()
        };
        config.validate()?;
        config.observation_window()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,hybridsim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(?args, "starting simulation");

    match run(args) {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "simulation failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> SimResult<String> {
    let config = args.into_config()?;
    let outcome = Scenario::build(config)?.run()?;
    let throughput = outcome.throughput()?;
    Ok(format!("Total Throughput: {} Mbps", throughput))
}
