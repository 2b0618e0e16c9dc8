//! Monotonic time arithmetic.
//!
//! Fades measure elapsed durations, never time-of-day, so every timestamp
//! here is sampled from the monotonic clock and is immune to wall-clock
//! adjustments.
//!
//! A [`Time`] is a `(seconds, nanoseconds)` pair with the nanosecond part
//! always normalised to `0..NANOS_PER_SEC`. Arithmetic carries and borrows
//! across that boundary, so differences of two timestamps may be negative
//! in the seconds part while the nanoseconds stay in range.

use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Process-wide anchor for monotonic sampling.
static MONOTONIC_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// A monotonic timestamp or time span with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Time {
    secs: i64,
    nanos: u32,
}

impl Time {
    /// The zero timestamp.
    pub const ZERO: Self = Self { secs: 0, nanos: 0 };

    /// Create a time from seconds and nanoseconds, normalising the nanosecond
    /// part.
    #[must_use]
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self {
            secs: secs + (nanos / NANOS_PER_SEC) as i64,
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Sample the monotonic system clock.
    #[must_use]
    pub fn now() -> Self {
        let anchor = MONOTONIC_ANCHOR.get_or_init(Instant::now);
        Self::from(anchor.elapsed())
    }

    /// Create a time from a floating number of seconds, splitting it into
    /// integral and fractional parts.
    ///
    /// Non-finite input yields [`Time::ZERO`].
    #[must_use]
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() {
            return Self::ZERO;
        }
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * f64::from(NANOS_PER_SEC)) as u32;
        // Rounding can land exactly on the boundary.
        Self::new(whole as i64, nanos.min(NANOS_PER_SEC))
    }

    /// Whole seconds.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        self.secs
    }

    /// Nanoseconds past the whole seconds, always `< NANOS_PER_SEC`.
    #[must_use]
    pub const fn nanoseconds(&self) -> u32 {
        self.nanos
    }

    /// Floating representation in seconds.
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) / f64::from(NANOS_PER_SEC)
    }
}

impl From<Duration> for Time {
    fn from(duration: Duration) -> Self {
        Self {
            secs: duration.as_secs() as i64,
            nanos: duration.subsec_nanos(),
        }
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Self) {
        let nanos = self.nanos + rhs.nanos;
        self.secs += rhs.secs + i64::from(nanos / NANOS_PER_SEC);
        self.nanos = nanos % NANOS_PER_SEC;
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Self) {
        if self.nanos < rhs.nanos {
            self.secs -= 1;
            self.nanos += NANOS_PER_SEC;
        }
        self.nanos -= rhs.nanos;
        self.secs -= rhs.secs;
    }
}

impl Add for Time {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sub for Time {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

/// Source of monotonic timestamps.
///
/// The resource manager samples time through this trait so that fades can be
/// driven deterministically in tests.
pub trait Clock: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Time;
}

/// Clock backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Time {
        Time::now()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current: Arc<Mutex<Time>>,
}

impl ManualClock {
    /// Create a clock starting at [`Time::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Time) {
        *self.current.lock() += by;
    }

    /// Move the clock forward by a floating number of seconds.
    pub fn advance_secs(&self, seconds: f64) {
        self.advance(Time::from_secs_f64(seconds));
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: Time) {
        *self.current.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        *self.current.lock()
    }
}
