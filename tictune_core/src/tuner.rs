//! Operator-facing façade: one session, one sequencer, the waveform, training,
//! telemetry and the settings editor, advanced together once per tick.

use tictune_traits::DeviceSession;

use crate::config::{MotorOverrides, TunerConfig};
use crate::error::{ControllerError, ProtocolError};
use crate::protocol::{
    ControllerSettings, ControllerState, Opcode, ProductVariant, StepMode, VariantLayout,
    decode_settings, encode_command, settings_diff,
};
use crate::sequencer::{SafetySequencer, SequencerState};
use crate::status::TickStatus;
use crate::telemetry::Telemetry;
use crate::training::{TrainingEffect, TrainingPhase, TrainingSupervisor};
use crate::transport_error;
use crate::waveform::{WaveformGenerator, WaveformMode};

/// What one `Tuner::tick` did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub status: TickStatus,
    /// Pause-aware elapsed seconds used for waveforms, training and telemetry.
    pub elapsed: f64,
    pub phase: Option<TrainingPhase>,
}

pub struct Tuner<S> {
    pub(crate) session: S,
    pub(crate) variant: ProductVariant,
    pub(crate) sequencer: SafetySequencer,
    pub(crate) generator: WaveformGenerator,
    pub(crate) training: Option<TrainingSupervisor>,
    pub(crate) telemetry: Telemetry,
    pub(crate) applied: ControllerSettings,
    pub(crate) pending: ControllerSettings,
    pub(crate) config: TunerConfig,
    pub(crate) link_decel: bool,
    pub(crate) auto_apply: bool,
    pub(crate) paused: bool,
    pub(crate) elapsed: f64,
    pub(crate) last_now: Option<f64>,
    /// Training energize/de-energize that failed to reach the device.
    pub(crate) undelivered: Option<TrainingEffect>,
}

impl<S> core::fmt::Debug for Tuner<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tuner")
            .field("variant", &self.variant)
            .field("sequencer", &self.sequencer.state())
            .field("mode", &self.generator.mode())
            .field("phase", &self.training.as_ref().map(TrainingSupervisor::phase))
            .field("elapsed", &self.elapsed)
            .field("paused", &self.paused)
            .finish()
    }
}

fn read_settings<S: DeviceSession + ?Sized>(
    session: &mut S,
    layout: &VariantLayout,
) -> Result<ControllerSettings, ControllerError> {
    let raw = transport_error::query(session, Opcode::GetSetting.code(), layout.settings_len)?;
    Ok(decode_settings(layout, &raw)?)
}

impl<S: DeviceSession> Tuner<S> {
    /// Startup: read variables and settings, seed the editor, de-energize,
    /// then push any configured motor overrides.
    pub(crate) fn start(
        mut session: S,
        variant: ProductVariant,
        config: TunerConfig,
        mode: WaveformMode,
    ) -> Result<Self, ControllerError> {
        let layout = variant.layout();
        let mut sequencer = SafetySequencer::new(layout.clone(), config.control.mapper());
        sequencer.refresh(&mut session, false)?;
        let applied = read_settings(&mut session, &layout)?;
        sequencer.set_input_invert(Some(applied.input_invert));
        sequencer.deenergize(&mut session)?;

        let overrides = config.motor.clone();
        let mut tuner = Self {
            session,
            variant,
            sequencer,
            generator: WaveformGenerator::new(mode),
            training: None,
            telemetry: Telemetry::new(config.window),
            pending: applied.clone(),
            applied,
            link_decel: overrides.link_decel,
            auto_apply: overrides.auto_apply,
            config,
            paused: false,
            elapsed: 0.0,
            last_now: None,
            undelivered: None,
        };
        tuner.set_link_decel(overrides.link_decel);
        if overrides.any() || tuner.has_pending_changes() {
            tuner.apply_overrides(&overrides)?;
            tuner.apply_settings()?;
        }
        tracing::info!(%variant, %mode, "tuner ready");
        Ok(tuner)
    }

    fn apply_overrides(&mut self, o: &MotorOverrides) -> Result<(), ControllerError> {
        if let Some(v) = o.max_speed {
            self.set_max_speed(v);
        }
        if let Some(v) = o.starting_speed {
            self.set_starting_speed(v);
        }
        if let Some(v) = o.max_accel {
            self.set_max_accel(v);
        }
        if let Some(v) = o.max_decel {
            self.set_max_decel(v);
        }
        if let Some(code) = o.step_mode {
            self.set_step_mode(StepMode::from_code(code)?)?;
        }
        if let Some(ma) = o.current_limit_ma {
            self.set_current_limit_ma(ma);
        }
        if let Some(v) = o.decay_mode {
            self.set_decay_mode(v)?;
        }
        if let Some(v) = o.input_invert {
            self.set_input_invert(v);
        }
        Ok(())
    }

    // ── Control loop ─────────────────────────────────────────────────────────

    /// One control tick at `now` seconds since the loop started.
    ///
    /// Only protocol errors are returned; link failures show up in the report.
    pub fn tick(&mut self, now: f64) -> Result<TickReport, ControllerError> {
        if self.auto_apply && self.pending != self.applied {
            match self.apply_settings() {
                Ok(_) | Err(ControllerError::CommunicationFailure(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let dt = self.last_now.map_or(0.0, |prev| (now - prev).max(0.0));
        self.last_now = Some(now);
        if !self.paused {
            self.elapsed += dt;
        }

        if let Some(effect) = self.undelivered
            && self.training.is_some()
        {
            tracing::debug!(?effect, "re-issuing training step");
            self.perform(effect)?;
        }

        if !self.paused
            && let Some(training) = self.training.as_mut()
        {
            let effects = training.step(self.elapsed, &self.telemetry.vin);
            for effect in effects {
                self.perform(effect)?;
            }
        }

        let request = match self.generator.mode() {
            WaveformMode::None => None,
            _ => Some(self.generator.request(self.elapsed)),
        };
        let status = self.sequencer.tick(&mut self.session, request)?;

        if !self.paused
            && !matches!(status, TickStatus::CommunicationFailure(_))
            && let Some(state) = self.sequencer.controller()
        {
            self.telemetry
                .record(self.elapsed, state, self.sequencer.last_sent());
        }

        Ok(TickReport {
            status,
            elapsed: self.elapsed,
            phase: self.training.as_ref().map(TrainingSupervisor::phase),
        })
    }

    /// Perform one training effect. An energize/de-energize that fails to
    /// reach the device is kept and re-issued on following ticks; until it
    /// lands the current phase cannot produce a valid result.
    fn perform(&mut self, effect: TrainingEffect) -> Result<(), ControllerError> {
        let res = match effect {
            TrainingEffect::Energize => self.sequencer.energize(&mut self.session),
            TrainingEffect::Deenergize => self.sequencer.deenergize(&mut self.session),
            TrainingEffect::SelectMode(mode) => {
                self.generator.set_mode(mode);
                return Ok(());
            }
            TrainingEffect::Snapshot(_) => return Ok(()),
        };
        match res {
            Ok(()) => self.undelivered = None,
            Err(ControllerError::CommunicationFailure(e)) => {
                tracing::warn!(error = %e, ?effect, "training step not delivered; will retry");
                self.undelivered = Some(effect);
            }
            Err(e) => return Err(e),
        }
        self.sync_outstanding();
        Ok(())
    }

    fn clear_undelivered(&mut self) {
        self.undelivered = None;
        self.sync_outstanding();
    }

    fn sync_outstanding(&mut self) {
        if let Some(training) = self.training.as_mut() {
            training.set_setup_outstanding(self.undelivered.is_some());
        }
    }

    // ── Operator commands ────────────────────────────────────────────────────

    pub fn energize(&mut self) -> Result<(), ControllerError> {
        self.sequencer.energize(&mut self.session)?;
        self.clear_undelivered();
        Ok(())
    }

    pub fn deenergize(&mut self) -> Result<(), ControllerError> {
        self.sequencer.deenergize(&mut self.session)?;
        self.clear_undelivered();
        Ok(())
    }

    pub fn set_mode(&mut self, mode: WaveformMode) {
        if mode != self.generator.mode() {
            tracing::info!(%mode, "waveform selected");
        }
        self.generator.set_mode(mode);
    }

    /// Absolute target used while the waveform mode is `None`.
    pub fn set_target_override(&mut self, target: Option<i32>) {
        self.sequencer.set_override_target(target);
    }

    /// Start (or restart) the training script at the current elapsed time.
    pub fn start_training(&mut self) {
        match self.training.as_mut() {
            Some(t) => t.restart(),
            None => self.training = Some(TrainingSupervisor::new(self.config.training.phase_secs)),
        }
        self.undelivered = None;
        tracing::info!(elapsed = self.elapsed, "training started");
    }

    /// Abandon training: stop motion and de-energize.
    pub fn stop_training(&mut self) -> Result<(), ControllerError> {
        self.training = None;
        self.undelivered = None;
        self.generator.set_mode(WaveformMode::None);
        self.sequencer.deenergize(&mut self.session)
    }

    /// Refresh with the clear-errors-occurred read.
    pub fn clear_errors_occurred(&mut self) -> Result<(), ControllerError> {
        self.sequencer.refresh(&mut self.session, true)?;
        tracing::info!("errors occurred cleared");
        Ok(())
    }

    /// While paused, elapsed time and telemetry stand still; ticks continue.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    // ── Settings editor ──────────────────────────────────────────────────────

    pub fn set_link_decel(&mut self, link: bool) {
        self.link_decel = link;
        if link {
            self.pending.max_decel = self.pending.max_accel;
        }
    }

    pub fn set_auto_apply(&mut self, auto: bool) {
        self.auto_apply = auto;
    }

    pub fn set_max_speed(&mut self, v: u32) {
        self.pending.max_speed = v;
    }

    pub fn set_starting_speed(&mut self, v: u32) {
        self.pending.starting_speed = v;
    }

    pub fn set_max_accel(&mut self, v: u32) {
        self.pending.max_accel = v;
        if self.link_decel {
            self.pending.max_decel = v;
        }
    }

    /// Ignored while deceleration is linked to acceleration.
    pub fn set_max_decel(&mut self, v: u32) {
        if !self.link_decel {
            self.pending.max_decel = v;
        }
    }

    pub fn set_step_mode(&mut self, mode: StepMode) -> Result<(), ProtocolError> {
        let layout = self.sequencer.layout();
        if !layout.supports_step_mode(mode) {
            return Err(ProtocolError::FieldNotSupported {
                field: "step mode",
                variant: layout.variant.name(),
            });
        }
        self.pending.step_mode = mode;
        Ok(())
    }

    /// Rounded down to the nearest code the product supports.
    pub fn set_current_limit_ma(&mut self, ma: u32) {
        let layout = self.sequencer.layout();
        self.pending.current_limit_code = layout.current.ma_to_code(ma, layout.max_current_ma);
    }

    pub fn set_decay_mode(&mut self, mode: u8) -> Result<(), ProtocolError> {
        let layout = self.sequencer.layout();
        if layout.decay_mode_setting.is_none() {
            return Err(ProtocolError::FieldNotSupported {
                field: "decay mode",
                variant: layout.variant.name(),
            });
        }
        self.pending.decay_mode = Some(mode);
        Ok(())
    }

    pub fn set_input_invert(&mut self, invert: bool) {
        self.pending.input_invert = invert;
    }

    /// Write the changed setting bytes, reinitialize, and re-read.
    /// Returns the number of bytes written.
    pub fn apply_settings(&mut self) -> Result<usize, ControllerError> {
        let layout = self.sequencer.layout().clone();
        let diff = settings_diff(&layout, &self.applied, &self.pending)?;
        if diff.is_empty() {
            return Ok(0);
        }
        for write in &diff {
            let frame = encode_command(
                Opcode::SetSetting,
                &[i64::from(write.offset), i64::from(write.value)],
            )?;
            transport_error::send(&mut self.session, &frame)?;
        }
        let frame = encode_command(Opcode::Reinitialize, &[])?;
        transport_error::send(&mut self.session, &frame)?;
        tracing::info!(bytes = diff.len(), "settings applied");
        self.refresh_settings()?;
        Ok(diff.len())
    }

    /// Re-read settings from the device, discarding pending edits.
    pub fn refresh_settings(&mut self) -> Result<(), ControllerError> {
        let settings = read_settings(&mut self.session, self.sequencer.layout())?;
        self.sequencer.set_input_invert(Some(settings.input_invert));
        self.pending = settings.clone();
        self.applied = settings;
        Ok(())
    }

    // ── Read-only views ──────────────────────────────────────────────────────

    pub fn variant(&self) -> ProductVariant {
        self.variant
    }

    pub fn state(&self) -> Option<&ControllerState> {
        self.sequencer.controller()
    }

    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    pub fn sequencer(&self) -> &SafetySequencer {
        &self.sequencer
    }

    /// Last target position sent to the device.
    pub fn target(&self) -> Option<i32> {
        self.sequencer.last_sent()
    }

    pub fn mode(&self) -> WaveformMode {
        self.generator.mode()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn training(&self) -> Option<&TrainingSupervisor> {
        self.training.as_ref()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.applied
    }

    pub fn pending_settings(&self) -> &ControllerSettings {
        &self.pending
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending != self.applied
    }

    pub fn link_decel(&self) -> bool {
        self.link_decel
    }

    pub fn auto_apply(&self) -> bool {
        self.auto_apply
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Training energize/de-energize still waiting to reach the device.
    pub fn undelivered_training_step(&self) -> Option<TrainingEffect> {
        self.undelivered
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }
}
