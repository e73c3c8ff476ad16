//! `From` implementations bridging `tictune_config` types to `tictune_core` types.

use crate::config::{ControlCfg, MotorOverrides, TrainingCfg, TunerConfig};
use crate::target::TargetMapper;

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&tictune_config::ControlCfg> for ControlCfg {
    fn from(c: &tictune_config::ControlCfg) -> Self {
        Self {
            tick_hz: c.tick_hz,
            lower_range: c.lower_range,
            upper_range: c.upper_range,
            io_timeout_ms: c.io_timeout_ms,
        }
    }
}

impl From<&tictune_config::ControlCfg> for TargetMapper {
    fn from(c: &tictune_config::ControlCfg) -> Self {
        Self::new(c.lower_range, c.upper_range)
    }
}

// ── TrainingCfg ──────────────────────────────────────────────────────────────

impl From<&tictune_config::TrainingCfg> for TrainingCfg {
    fn from(c: &tictune_config::TrainingCfg) -> Self {
        Self {
            phase_secs: c.phase_secs,
        }
    }
}

// ── MotorOverrides ───────────────────────────────────────────────────────────

impl From<&tictune_config::MotorCfg> for MotorOverrides {
    fn from(c: &tictune_config::MotorCfg) -> Self {
        Self {
            max_speed: c.max_speed,
            starting_speed: c.starting_speed,
            max_accel: c.max_accel,
            max_decel: c.max_decel,
            step_mode: c.step_mode,
            current_limit_ma: c.current_limit_ma,
            decay_mode: c.decay_mode,
            input_invert: c.input_invert,
            link_decel: c.link_decel,
            auto_apply: c.auto_apply,
        }
    }
}

// ── TunerConfig ──────────────────────────────────────────────────────────────

impl From<&tictune_config::Config> for TunerConfig {
    fn from(c: &tictune_config::Config) -> Self {
        Self {
            control: (&c.control).into(),
            training: (&c.training).into(),
            window: c.telemetry.window,
            motor: (&c.motor).into(),
        }
    }
}
