//! Transmission media: a shared wireless channel or a wired link.
//!
//! The delay model is fully deterministic: serialization time at the
//! medium's bit rate plus a propagation delay. Wireless reception uses a
//! fixed received-signal-strength model: every receiver sees the
//! configured RSS, and frames below the receiver sensitivity are lost.
//! Frames never collide.

use std::str::FromStr;
use std::time::Duration;

use crate::error::SimError;

use super::address::Ipv4Prefix;
use super::id::{DeviceId, MediumId};

/// IPv4 (20 bytes) + UDP (8 bytes) headers added to every payload on the air.
pub const HEADER_OVERHEAD_BYTES: u32 = 28;

const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

// ── Wireless ──────────────────────────────────────────────────────────

/// 802.11b DSSS/CCK modulation profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PhyMode {
    DsssRate1Mbps,
    DsssRate2Mbps,
    DsssRate5_5Mbps,
    DsssRate11Mbps,
}

impl PhyMode {
    pub fn data_rate_bps(self) -> u64 {
        match self {
            PhyMode::DsssRate1Mbps => 1_000_000,
            PhyMode::DsssRate2Mbps => 2_000_000,
            PhyMode::DsssRate5_5Mbps => 5_500_000,
            PhyMode::DsssRate11Mbps => 11_000_000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PhyMode::DsssRate1Mbps => "DsssRate1Mbps",
            PhyMode::DsssRate2Mbps => "DsssRate2Mbps",
            PhyMode::DsssRate5_5Mbps => "DsssRate5_5Mbps",
            PhyMode::DsssRate11Mbps => "DsssRate11Mbps",
        }
    }
}

impl std::fmt::Display for PhyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PhyMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DsssRate1Mbps" => Ok(PhyMode::DsssRate1Mbps),
            "DsssRate2Mbps" => Ok(PhyMode::DsssRate2Mbps),
            "DsssRate5_5Mbps" => Ok(PhyMode::DsssRate5_5Mbps),
            "DsssRate11Mbps" => Ok(PhyMode::DsssRate11Mbps),
            other => Err(SimError::InvalidConfig(format!("unknown phy mode '{}'", other))),
        }
    }
}

/// Configuration of a wireless channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WirelessConfig {
    pub phy_mode: PhyMode,
    /// Received signal strength seen by every receiver (dBm).
    pub rss_dbm: f64,
    /// Frames received below this power are lost (dBm).
    pub rx_sensitivity_dbm: f64,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        WirelessConfig {
            phy_mode: PhyMode::DsssRate1Mbps,
            rss_dbm: -67.0,
            rx_sensitivity_dbm: -101.0,
        }
    }
}

// ── Wired ─────────────────────────────────────────────────────────────

/// Configuration of a wired broadcast link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WiredConfig {
    pub data_rate_bps: u64,
    pub delay: Duration,
}

impl Default for WiredConfig {
    fn default() -> Self {
        WiredConfig {
            data_rate_bps: 5_000_000,
            delay: Duration::from_millis(2),
        }
    }
}

// ── Positions ─────────────────────────────────────────────────────────

/// A fixed 2-D position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Row-first grid placement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GridLayout {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Positions per row. Zero is treated as one.
    pub width: u32,
}

impl GridLayout {
    /// Position of the `index`-th node.
    pub fn position(&self, index: u32) -> Position {
        let width = self.width.max(1);
        let col = index % width;
        let row = index / width;
        Position {
            x: self.min_x + f64::from(col) * self.delta_x,
            y: self.min_y + f64::from(row) * self.delta_y,
        }
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        GridLayout {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 5.0,
            delta_y: 10.0,
            width: 2,
        }
    }
}

// ── Medium ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MediumKind {
    Wireless(WirelessConfig),
    Wired(WiredConfig),
}

impl MediumKind {
    pub fn label(&self) -> &'static str {
        match self {
            MediumKind::Wireless(_) => "wireless",
            MediumKind::Wired(_) => "wired",
        }
    }
}

/// The outcome of putting one frame on a medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TxOutcome {
    /// The frame reaches the receiver after `delay`.
    Delivered { delay: Duration },
    /// The receiver cannot decode the frame.
    BelowSensitivity { rss_dbm: f64 },
}

/// A medium with its attached devices and address prefix.
#[derive(Debug, Clone)]
pub struct Medium {
    pub(crate) id: MediumId,
    pub(crate) kind: MediumKind,
    pub(crate) prefix: Ipv4Prefix,
    pub(crate) devices: Vec<DeviceId>,
}

impl Medium {
    pub fn id(&self) -> MediumId {
        self.id
    }

    pub fn kind(&self) -> &MediumKind {
        &self.kind
    }

    pub fn prefix(&self) -> Ipv4Prefix {
        self.prefix
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Whether two devices on this medium can hear each other at all.
    ///
    /// The link-state layer only sees adjacencies over usable links.
    pub fn link_usable(&self) -> bool {
        match self.kind {
            MediumKind::Wireless(cfg) => cfg.rss_dbm >= cfg.rx_sensitivity_dbm,
            MediumKind::Wired(_) => true,
        }
    }

    /// Delay of one frame carrying `payload_bytes` between two positions.
    pub fn transmit(
        &self,
        payload_bytes: u32,
        from: Option<Position>,
        to: Option<Position>,
    ) -> TxOutcome {
        let bits = (u64::from(payload_bytes) + u64::from(HEADER_OVERHEAD_BYTES)) * 8;
        match self.kind {
            MediumKind::Wired(cfg) => TxOutcome::Delivered {
                delay: serialization_time(bits, cfg.data_rate_bps) + cfg.delay,
            },
            MediumKind::Wireless(cfg) => {
                if cfg.rss_dbm < cfg.rx_sensitivity_dbm {
                    return TxOutcome::BelowSensitivity { rss_dbm: cfg.rss_dbm };
                }
                // Non-finite positions contribute no propagation delay.
                let propagation = match (from, to) {
                    (Some(a), Some(b)) => {
                        Duration::try_from_secs_f64(a.distance_to(&b) / SPEED_OF_LIGHT_M_PER_S)
                            .unwrap_or(Duration::ZERO)
                    }
                    _ => Duration::ZERO,
                };
                TxOutcome::Delivered {
                    delay: serialization_time(bits, cfg.phy_mode.data_rate_bps()) + propagation,
                }
            }
        }
    }
}

fn serialization_time(bits: u64, rate_bps: u64) -> Duration {
    if rate_bps == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(bits) * 1_000_000_000 / u128::from(rate_bps);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
