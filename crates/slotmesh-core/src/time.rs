//! Time primitives for SlotMesh
//!
//! Every node runs on its own free-running clock:
//! - `LocalTime`: monotonic microseconds since node start
//! - `PhaseAnchor`: the local instant that is "time zero" of a period,
//!   moved by synchronization but never rescaled

use std::ops::{Add, Sub};
use std::time::Duration;

/// Local monotonic time, microseconds since node start
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalTime(pub u64);

impl LocalTime {
    pub const ZERO: LocalTime = LocalTime(0);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        LocalTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        LocalTime(millis * 1000)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0 / 1000
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        LocalTime(self.0.saturating_add(duration.as_micros() as u64))
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: LocalTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for LocalTime {
    type Output = LocalTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        LocalTime(self.0 + rhs.as_micros() as u64)
    }
}

impl Sub<LocalTime> for LocalTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: LocalTime) -> Self::Output {
        self.since(rhs)
    }
}

impl std::fmt::Debug for LocalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({:.3}ms)", self.0 as f64 / 1000.0)
    }
}

/// Local instant (signed microseconds) at which some period begins.
///
/// Any instant congruent to the anchor modulo the period is equally a period
/// start; only the phase matters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhaseAnchor(pub i64);

impl PhaseAnchor {
    #[inline]
    pub fn at(t: LocalTime) -> Self {
        PhaseAnchor(t.0 as i64)
    }

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        PhaseAnchor(micros)
    }

    #[inline]
    pub fn as_micros(self) -> i64 {
        self.0
    }

    /// Anchor `ahead` after `now`
    #[inline]
    pub fn after(now: LocalTime, ahead: Duration) -> Self {
        PhaseAnchor(now.0 as i64 + ahead.as_micros() as i64)
    }

    /// Shift by a signed number of microseconds
    #[inline]
    pub fn shifted(self, micros: i64) -> Self {
        PhaseAnchor(self.0 + micros)
    }

    /// Locate `now` within the period grid defined by this anchor
    pub fn position(self, now: LocalTime, period: Duration) -> PeriodPosition {
        let period_us = period.as_micros() as i64;
        let elapsed = now.0 as i64 - self.0;
        PeriodPosition {
            period: elapsed.div_euclid(period_us),
            offset: Duration::from_micros(elapsed.rem_euclid(period_us) as u64),
        }
    }

    /// Time from `now` until the next period start
    pub fn remaining(self, now: LocalTime, period: Duration) -> Duration {
        let pos = self.position(now, period);
        period - pos.offset
    }

    /// The instant congruent to `other` (mod period) closest to `self`,
    /// expressed as a signed shift from `self`
    pub fn phase_error_to(self, other: PhaseAnchor, period: Duration) -> i64 {
        let period_us = period.as_micros() as i64;
        let mut delta = (other.0 - self.0).rem_euclid(period_us);
        if delta > period_us / 2 {
            delta -= period_us;
        }
        delta
    }
}

impl std::fmt::Debug for PhaseAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anchor({:.3}ms)", self.0 as f64 / 1000.0)
    }
}

/// Position of a local instant within the period grid
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodPosition {
    /// Period index relative to the anchor (negative before it)
    pub period: i64,
    /// Offset into that period
    pub offset: Duration,
}
