/// Virtual time for the discrete-event simulation.
///
/// Represents a point on the simulated clock with nanosecond resolution and
/// no dependency on wall-clock time. Time advances only when the scheduler
/// dequeues an event.

use std::time::Duration;

use crate::error::{SimError, SimResult};

/// An absolute instant on the simulated clock, in nanoseconds since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The last representable instant. Running until `MAX` drains the queue.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    /// Create a `VirtualTime` from a raw nanosecond count.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        VirtualTime(micros * 1_000)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis * 1_000_000)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs * 1_000_000_000)
    }

    /// Convert a fractional second count into an instant.
    ///
    /// Negative or non-finite values are rejected with `InvalidDelay`.
    pub fn from_secs_f64(secs: f64) -> SimResult<Self> {
        delay_from_secs(secs).and_then(|d| VirtualTime::ZERO.checked_add(d))
    }

    /// Raw nanosecond count.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Offset from the start of the simulation.
    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// The instant `delay` after `self`.
    ///
    /// Fails with `InvalidDelay` if the result does not fit on the clock.
    pub fn checked_add(self, delay: Duration) -> SimResult<VirtualTime> {
        u64::try_from(delay.as_nanos())
            .ok()
            .and_then(|d| self.0.checked_add(d))
            .map(VirtualTime)
            .ok_or_else(|| SimError::InvalidDelay {
                reason: format!("{:?} after {} overflows the clock", delay, self),
            })
    }

    /// Returns the span between two instants, or `None` if `earlier` is later.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }
}

impl From<Duration> for VirtualTime {
    /// Saturates at `VirtualTime::MAX` for spans beyond ~584 years.
    fn from(d: Duration) -> Self {
        VirtualTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={:.6}s", self.as_secs_f64())
    }
}

/// Convert a (possibly user-supplied) second count into a scheduling delay.
pub fn delay_from_secs(secs: f64) -> SimResult<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(SimError::InvalidDelay {
            reason: format!("delay of {} seconds is not a non-negative finite value", secs),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| SimError::InvalidDelay {
        reason: e.to_string(),
    })
}
