//! Normalized request to absolute target position.

use crate::protocol::StepMode;

/// Travel range in steps at a given step mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepModeRange {
    pub lower: i32,
    pub upper: i32,
}

/// Rescales `[-1, 1]` onto the step-mode-scaled travel range.
///
/// The range is derived from the step mode on every call; nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetMapper {
    base_lower: i32,
    base_upper: i32,
}

impl Default for TargetMapper {
    fn default() -> Self {
        Self::new(-5500, 200)
    }
}

impl TargetMapper {
    /// Base bounds are in full steps. Callers validate `lower < upper` and
    /// that the 32x range fits in i32 (see `tictune_config`).
    pub fn new(base_lower: i32, base_upper: i32) -> Self {
        Self {
            base_lower: base_lower.min(base_upper),
            base_upper: base_upper.max(base_lower),
        }
    }

    pub fn range(&self, step_mode: StepMode) -> StepModeRange {
        let m = step_mode.range_multiplier();
        StepModeRange {
            lower: self.base_lower.saturating_mul(m),
            upper: self.base_upper.saturating_mul(m),
        }
    }

    /// `lower + ((request + 1) / 2) * (upper - lower)`, rounded to the nearest step.
    pub fn map(&self, request: f64, step_mode: StepMode) -> i32 {
        let r = if request.is_finite() {
            request.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let StepModeRange { lower, upper } = self.range(step_mode);
        let span = f64::from(upper) - f64::from(lower);
        let t = f64::from(lower) + ((r + 1.0) / 2.0) * span;
        (t.round() as i64).clamp(i64::from(lower), i64::from(upper)) as i32
    }

    /// Clamp an operator-supplied absolute target into the current range.
    pub fn clamp(&self, target: i32, step_mode: StepMode) -> i32 {
        let StepModeRange { lower, upper } = self.range(step_mode);
        target.clamp(lower, upper)
    }
}
