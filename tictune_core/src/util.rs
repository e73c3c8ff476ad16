//! Tick pacing helpers.

use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Interval between control ticks at `hz`.
///
/// `hz == 0` is treated as 1 Hz; the result is never shorter than 1 µs.
#[inline]
pub fn tick_period(hz: u32) -> Duration {
    let ns = NANOS_PER_SEC / u64::from(hz.max(1));
    Duration::from_nanos(ns.max(1_000))
}
