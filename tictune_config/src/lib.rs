#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the tuner.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section is optional; defaults reproduce the stock tuning rig
//!   (60 Hz ticks, travel range 200 / -5500 steps, 30 s training phases).
use eyre::WrapErr;
use serde::Deserialize;
use std::path::Path;

/// Product family override. Normally the family is read from the device.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    T825,
    N825,
    T834,
    T500,
    T249,
    #[serde(rename = "36v4")]
    Tic36v4,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DeviceCfg {
    /// Open only the controller with this serial number.
    pub serial_number: Option<String>,
    /// Force a product family instead of trusting the reported product id.
    pub product: Option<Product>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Control ticks per second (one tick per display frame).
    pub tick_hz: u32,
    /// Base upper travel bound in full steps.
    pub upper_range: i32,
    /// Base lower travel bound in full steps.
    pub lower_range: i32,
    /// Per-exchange timeout handed to the transport (ms).
    pub io_timeout_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            upper_range: 200,
            lower_range: -5500,
            io_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrainingCfg {
    /// Collect window per training phase, in seconds.
    pub phase_secs: f64,
}

impl Default for TrainingCfg {
    fn default() -> Self {
        Self { phase_secs: 30.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Samples kept per telemetry series.
    pub window: usize,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self { window: 1500 }
    }
}

/// Pending motor settings pushed at startup. Unset fields keep the device value.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MotorCfg {
    /// steps/s x 10000
    pub max_speed: Option<u32>,
    /// steps/s x 10000
    pub starting_speed: Option<u32>,
    /// steps/s^2 x 100
    pub max_accel: Option<u32>,
    /// steps/s^2 x 100
    pub max_decel: Option<u32>,
    /// Raw step mode code (0 = full, 1 = 1/2, ... 5 = 1/32).
    pub step_mode: Option<u8>,
    pub current_limit_ma: Option<u32>,
    pub decay_mode: Option<u8>,
    pub input_invert: Option<bool>,
    /// Deceleration follows acceleration.
    pub link_decel: bool,
    /// Push pending edits automatically on the next tick.
    pub auto_apply: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub control: ControlCfg,
    pub training: TrainingCfg,
    pub telemetry: TelemetryCfg,
    pub motor: MotorCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_path(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parsing config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.tick_hz == 0 || self.control.tick_hz > 1000 {
            eyre::bail!("control.tick_hz must be in 1..=1000");
        }
        if self.control.lower_range >= self.control.upper_range {
            eyre::bail!("control.lower_range must be < control.upper_range");
        }
        // The widest step-mode multiplier is 32; the scaled range must stay in i32.
        let lower = i64::from(self.control.lower_range).abs();
        let upper = i64::from(self.control.upper_range).abs();
        let widest = lower.max(upper) * 32;
        if widest > i64::from(i32::MAX) {
            eyre::bail!("control range is too large once scaled by the 1/32 step multiplier");
        }
        if self.control.io_timeout_ms == 0 {
            eyre::bail!("control.io_timeout_ms must be >= 1");
        }

        // Training
        if !(self.training.phase_secs.is_finite() && self.training.phase_secs > 0.0) {
            eyre::bail!("training.phase_secs must be > 0");
        }
        if self.training.phase_secs > 3600.0 {
            eyre::bail!("training.phase_secs is unreasonably large (>1h)");
        }

        // Telemetry
        if self.telemetry.window == 0 || self.telemetry.window > 100_000 {
            eyre::bail!("telemetry.window must be in 1..=100000");
        }

        // Motor
        if let Some(mode) = self.motor.step_mode
            && mode > 9
        {
            eyre::bail!("motor.step_mode must be in 0..=9");
        }
        if let Some(speed) = self.motor.max_speed
            && speed > 500_000_000
        {
            eyre::bail!("motor.max_speed must be <= 500000000");
        }
        if let Some(accel) = self.motor.max_accel
            && accel < 100
        {
            eyre::bail!("motor.max_accel must be >= 100");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
