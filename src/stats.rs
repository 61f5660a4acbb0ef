//! Post-run throughput computation.

use crate::error::{SimError, SimResult};
use crate::sink::Counters;

/// A throughput in megabits per second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Mbps(f64);

impl Mbps {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for Mbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `received × packet_size × 8 / (window × 10⁶)`.
///
/// Uses the configured packet size rather than the bytes actually received.
/// The window must be positive and finite.
pub fn compute_throughput(
    counters: &Counters,
    packet_size_bytes: u32,
    window_seconds: f64,
) -> SimResult<Mbps> {
    if !window_seconds.is_finite() || window_seconds <= 0.0 {
        return Err(SimError::InvalidConfig(format!(
            "observation window must be positive, got {} s",
            window_seconds
        )));
    }
    let bits = counters.packets_received as f64 * f64::from(packet_size_bytes) * 8.0;
    Ok(Mbps(bits / (window_seconds * 1_000_000.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(n: u64) -> Counters {
        Counters {
            packets_sent: n,
            packets_received: n,
            ..Counters::default()
        }
    }

    #[test]
    fn test_default_scenario_value() {
        let mbps = compute_throughput(&received(2), 967, 5.0).unwrap();
        assert_eq!(mbps.value(), 0.0030944);
        assert_eq!(mbps.to_string(), "0.0030944");
    }

    #[test]
    fn test_nothing_received_is_zero() {
        let mbps = compute_throughput(&Counters::default(), 967, 5.0).unwrap();
        assert_eq!(mbps.value(), 0.0);
        assert_eq!(mbps.to_string(), "0");
    }

    #[test]
    fn test_uses_configured_size_not_received_bytes() {
        let counters = Counters {
            packets_received: 1,
            bytes_received: 1,
            ..Counters::default()
        };
        let mbps = compute_throughput(&counters, 1000, 1.0).unwrap();
        assert_eq!(mbps.value(), 0.008);
    }

    #[test]
    fn test_rejects_bad_window() {
        for window in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compute_throughput(&received(1), 967, window),
                Err(SimError::InvalidConfig(_))
            ));
        }
    }
}
