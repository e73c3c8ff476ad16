use std::time::{Duration, Instant};

/// Time source for the control loop: paces ticks and stamps elapsed time.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block until `d` has passed. Simulated clocks jump instead.
    fn sleep(&self, d: Duration);

    /// Seconds since `epoch` as the tick loop consumes them; 0.0 if `epoch` is ahead.
    fn secs_since(&self, epoch: Instant) -> f64 {
        self.now().saturating_duration_since(epoch).as_secs_f64()
    }
}

/// Wall-clock pacing backed by `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::{Clock, Duration, Instant};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Simulated clock: `sleep` moves time forward instantly, so a
    /// 150 s training script runs in microseconds under test.
    ///
    /// Clones share the same timeline.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        start: Instant,
        elapsed_ns: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed_ns: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn advance(&self, d: Duration) {
            let ns = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
            let _ = self
                .elapsed_ns
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                    Some(cur.saturating_add(ns))
                });
        }

        /// Jump to an absolute point on the timeline, backwards included.
        pub fn set_elapsed(&self, d: Duration) {
            let ns = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
            self.elapsed_ns.store(ns, Ordering::Relaxed);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.start + Duration::from_nanos(self.elapsed_ns.load(Ordering::Relaxed))
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}
