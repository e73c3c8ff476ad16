//! Bounded time series with running statistics, and the feeds built on them.

use std::collections::VecDeque;

use crate::protocol::ControllerState;
use crate::protocol::units::speed_to_steps_per_sec;

/// Fixed-capacity ring buffer of `(time, value)` samples.
///
/// Min, max and sum are recomputed over the live samples on every insert, so
/// the statistics always describe exactly what the window holds.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    capacity: usize,
    samples: VecDeque<(f64, f64)>,
    min: f64,
    max: f64,
    sum: f64,
}

impl TelemetryWindow {
    /// A zero capacity is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            min: 0.0,
            max: 0.0,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, t: f64, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((t, value));
        self.recompute();
    }

    fn recompute(&mut self) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &(_, v) in &self.samples {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        self.min = min;
        self.max = max;
        self.sum = sum;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl ExactSizeIterator<Item = (f64, f64)> + '_ {
        self.samples.iter().copied()
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        self.samples.back().copied()
    }

    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    pub fn average(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.sum / self.samples.len() as f64)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.recompute();
    }
}

/// Every series the display reads, fed once per unpaused tick.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub target: TelemetryWindow,
    pub position: TelemetryWindow,
    /// velocity minus max speed, steps/s
    pub velocity_offset: TelemetryWindow,
    /// volts
    pub vin: TelemetryWindow,
    /// Running minimum of the VIN window, volts.
    pub vin_min: TelemetryWindow,
    /// Running maximum of the VIN window, volts.
    pub vin_max: TelemetryWindow,
    /// VIN window average as a percentage of the instantaneous VIN.
    pub vin_avg_pct: TelemetryWindow,
    pub vin_min_pct: TelemetryWindow,
    pub vin_max_pct: TelemetryWindow,
}

impl Telemetry {
    pub fn new(capacity: usize) -> Self {
        let w = || TelemetryWindow::new(capacity);
        Self {
            target: w(),
            position: w(),
            velocity_offset: w(),
            vin: w(),
            vin_min: w(),
            vin_max: w(),
            vin_avg_pct: w(),
            vin_min_pct: w(),
            vin_max_pct: w(),
        }
    }

    pub fn record(&mut self, t: f64, state: &ControllerState, target: Option<i32>) {
        if let Some(target) = target {
            self.target.push(t, f64::from(target));
        }
        self.position.push(t, f64::from(state.current_position));
        let offset = speed_to_steps_per_sec(i64::from(state.current_velocity))
            - speed_to_steps_per_sec(i64::from(state.max_speed));
        self.velocity_offset.push(t, offset);

        let vin = state.vin_volts();
        self.vin.push(t, vin);
        let (Some(lo), Some(hi), Some(avg)) = (self.vin.min(), self.vin.max(), self.vin.average())
        else {
            return;
        };
        self.vin_min.push(t, lo);
        self.vin_max.push(t, hi);

        // Ratios against the instantaneous reading; undefined at 0 V.
        if vin > 0.0 {
            self.vin_avg_pct.push(t, avg / vin * 100.0);
            self.vin_min_pct.push(t, lo / vin * 100.0);
            self.vin_max_pct.push(t, hi / vin * 100.0);
        }
    }

    pub fn clear(&mut self) {
        for w in [
            &mut self.target,
            &mut self.position,
            &mut self.velocity_offset,
            &mut self.vin,
            &mut self.vin_min,
            &mut self.vin_max,
            &mut self.vin_avg_pct,
            &mut self.vin_min_pct,
            &mut self.vin_max_pct,
        ] {
            w.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_stats() {
        let w = TelemetryWindow::new(4);
        assert_eq!(w.min(), None);
        assert_eq!(w.average(), None);
    }

    #[test]
    fn zero_capacity_keeps_one_sample() {
        let mut w = TelemetryWindow::new(0);
        w.push(0.0, 1.0);
        w.push(1.0, 2.0);
        assert_eq!(w.len(), 1);
        assert_eq!(w.min(), Some(2.0));
    }

    #[test]
    fn eviction_updates_extremes() {
        let mut w = TelemetryWindow::new(2);
        w.push(0.0, -10.0);
        w.push(1.0, 0.0);
        w.push(2.0, 1.0);
        assert_eq!(w.min(), Some(0.0));
        assert_eq!(w.max(), Some(1.0));
    }
}
