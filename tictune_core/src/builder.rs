//! Builder for `Tuner`.
//!
//! `try_build()` checks the configuration and then runs the startup sequence
//! against the device, so a built tuner always starts de-energized with its
//! settings editor seeded from the device.

use eyre::WrapErr;
use tictune_traits::DeviceSession;

use crate::config::{ControlCfg, MotorOverrides, TrainingCfg, TunerConfig};
use crate::error::{BuildError, Report, Result};
use crate::protocol::ProductVariant;
use crate::session::OpenedSession;
use crate::tuner::Tuner;
use crate::waveform::WaveformMode;

pub struct TunerBuilder<S> {
    session: Option<(S, ProductVariant)>,
    config: TunerConfig,
    mode: WaveformMode,
}

impl<S> Default for TunerBuilder<S> {
    fn default() -> Self {
        Self {
            session: None,
            config: TunerConfig::default(),
            mode: WaveformMode::None,
        }
    }
}

impl<S: DeviceSession> Tuner<S> {
    /// Start building a Tuner.
    pub fn builder() -> TunerBuilder<S> {
        TunerBuilder::default()
    }
}

impl<S: DeviceSession> TunerBuilder<S> {
    pub fn with_session(mut self, session: S, variant: ProductVariant) -> Self {
        self.session = Some((session, variant));
        self
    }

    pub fn with_opened(self, opened: OpenedSession<S>) -> Self {
        self.with_session(opened.session, opened.variant)
    }

    pub fn with_config(mut self, config: TunerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.config.control = control;
        self
    }

    pub fn with_training(mut self, training: TrainingCfg) -> Self {
        self.config.training = training;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    pub fn with_motor(mut self, motor: MotorOverrides) -> Self {
        self.config.motor = motor;
        self
    }

    /// Initial waveform mode.
    pub fn with_mode(mut self, mode: WaveformMode) -> Self {
        self.mode = mode;
        self
    }

    fn validate(cfg: &TunerConfig) -> std::result::Result<(), BuildError> {
        if cfg.control.tick_hz == 0 {
            return Err(BuildError::InvalidConfig("tick_hz must be >= 1"));
        }
        if cfg.control.lower_range >= cfg.control.upper_range {
            return Err(BuildError::InvalidConfig("lower_range must be < upper_range"));
        }
        if !(cfg.training.phase_secs.is_finite() && cfg.training.phase_secs > 0.0) {
            return Err(BuildError::InvalidConfig("phase_secs must be > 0"));
        }
        if cfg.window == 0 {
            return Err(BuildError::InvalidConfig("telemetry window must be >= 1"));
        }
        Ok(())
    }

    pub fn try_build(self) -> Result<Tuner<S>> {
        let Some((session, variant)) = self.session else {
            return Err(Report::new(BuildError::MissingSession));
        };
        Self::validate(&self.config).map_err(Report::new)?;
        Tuner::start(session, variant, self.config, self.mode)
            .map_err(Report::new)
            .wrap_err("tuner startup failed")
    }
}
