//! Configuration types for the tuner.
//!
//! These are the runtime structs used by `Tuner` and the runner.
//! They are separate from the TOML-deserialized config in `tictune_config`.

use crate::target::TargetMapper;

/// Loop pacing and travel range.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Ticks per second.
    pub tick_hz: u32,
    /// Base travel bounds in full steps.
    pub lower_range: i32,
    pub upper_range: i32,
    /// Per-exchange transport timeout (ms), handed to the transport.
    pub io_timeout_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            lower_range: -5500,
            upper_range: 200,
            io_timeout_ms: 100,
        }
    }
}

impl ControlCfg {
    pub fn mapper(&self) -> TargetMapper {
        TargetMapper::new(self.lower_range, self.upper_range)
    }
}

/// Training script timing.
#[derive(Debug, Clone)]
pub struct TrainingCfg {
    /// Collect window per phase in seconds.
    pub phase_secs: f64,
}

impl Default for TrainingCfg {
    fn default() -> Self {
        Self { phase_secs: 30.0 }
    }
}

/// Pending-setting edits applied when the tuner starts. `None` keeps the
/// device value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorOverrides {
    pub max_speed: Option<u32>,
    pub starting_speed: Option<u32>,
    pub max_accel: Option<u32>,
    pub max_decel: Option<u32>,
    pub step_mode: Option<u8>,
    pub current_limit_ma: Option<u32>,
    pub decay_mode: Option<u8>,
    pub input_invert: Option<bool>,
    pub link_decel: bool,
    pub auto_apply: bool,
}

impl MotorOverrides {
    /// True when any setting value is overridden.
    pub fn any(&self) -> bool {
        self.max_speed.is_some()
            || self.starting_speed.is_some()
            || self.max_accel.is_some()
            || self.max_decel.is_some()
            || self.step_mode.is_some()
            || self.current_limit_ma.is_some()
            || self.decay_mode.is_some()
            || self.input_invert.is_some()
    }
}

/// Everything `Tuner` needs besides the session.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    pub control: ControlCfg,
    pub training: TrainingCfg,
    /// Samples per telemetry series.
    pub window: usize,
    pub motor: MotorOverrides,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            control: ControlCfg::default(),
            training: TrainingCfg::default(),
            window: 1500,
            motor: MotorOverrides::default(),
        }
    }
}
