//! Supervisory state machine that owns every motion-affecting command.
//!
//! Per energized tick the side effects are strictly ordered:
//! refresh -> fault check -> exit safe start -> set target (only if changed).
//! Idle and faulted ticks refresh for telemetry and send nothing else.

use tictune_traits::DeviceSession;

use crate::error::{ControllerError, FaultReason, TransportError};
use crate::protocol::{ControllerState, Opcode, VariantLayout, decode_variables, encode_command};
use crate::status::TickStatus;
use crate::target::TargetMapper;
use crate::transport_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Energized,
    Faulted,
}

#[derive(Debug, Clone)]
pub struct SafetySequencer {
    layout: VariantLayout,
    mapper: TargetMapper,
    state: SequencerState,
    fault: Option<FaultReason>,
    controller: Option<ControllerState>,
    input_invert: Option<bool>,
    last_sent: Option<i32>,
    override_target: Option<i32>,
}

impl SafetySequencer {
    pub fn new(layout: VariantLayout, mapper: TargetMapper) -> Self {
        Self {
            layout,
            mapper,
            state: SequencerState::Idle,
            fault: None,
            controller: None,
            input_invert: None,
            last_sent: None,
            override_target: None,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn fault(&self) -> Option<FaultReason> {
        self.fault
    }

    /// Last refreshed controller state.
    pub fn controller(&self) -> Option<&ControllerState> {
        self.controller.as_ref()
    }

    pub fn layout(&self) -> &VariantLayout {
        &self.layout
    }

    pub fn mapper(&self) -> &TargetMapper {
        &self.mapper
    }

    /// Last target position actually sent to the device.
    pub fn last_sent(&self) -> Option<i32> {
        self.last_sent
    }

    pub fn override_target(&self) -> Option<i32> {
        self.override_target
    }

    /// Operator target used when no waveform request is active.
    pub fn set_override_target(&mut self, target: Option<i32>) {
        self.override_target = target;
    }

    /// Input invert comes from the settings block; carried into every refresh.
    pub fn set_input_invert(&mut self, invert: Option<bool>) {
        self.input_invert = invert;
        if let Some(c) = self.controller.as_mut() {
            c.input_invert = invert;
        }
    }

    fn send<S: DeviceSession + ?Sized>(
        session: &mut S,
        opcode: Opcode,
        operands: &[i64],
    ) -> Result<(), ControllerError> {
        let frame = encode_command(opcode, operands)?;
        transport_error::send(session, &frame)?;
        Ok(())
    }

    /// Read and decode the variable block, replacing the stored state.
    ///
    /// With `clear_errors_occurred` the sticky error bits are reset by the read.
    pub fn refresh<S: DeviceSession + ?Sized>(
        &mut self,
        session: &mut S,
        clear_errors_occurred: bool,
    ) -> Result<&ControllerState, ControllerError> {
        let opcode = if clear_errors_occurred {
            Opcode::GetVariableAndClearErrorsOccurred
        } else {
            Opcode::GetVariable
        };
        let raw = transport_error::query(session, opcode.code(), self.layout.variables_len)?;
        let mut decoded = decode_variables(&self.layout, &raw)?;
        decoded.input_invert = self.input_invert;
        Ok(self.controller.insert(decoded))
    }

    /// Energize from any state. Clears a latched fault; the interlock is left
    /// for the next tick to clear.
    ///
    /// Re-energizing while already energized keeps the last sent target, so an
    /// unchanged target is not sent again.
    pub fn energize<S: DeviceSession + ?Sized>(
        &mut self,
        session: &mut S,
    ) -> Result<(), ControllerError> {
        Self::send(session, Opcode::Energize, &[])?;
        if let Some(reason) = self.fault.take() {
            tracing::info!(%reason, "re-armed after fault");
        }
        if self.state != SequencerState::Energized {
            self.state = SequencerState::Energized;
            self.last_sent = None;
            tracing::info!("energized");
        }
        Ok(())
    }

    /// Always succeeds locally: the sequencer is Idle afterwards even if the
    /// command could not be delivered.
    pub fn deenergize<S: DeviceSession + ?Sized>(
        &mut self,
        session: &mut S,
    ) -> Result<(), ControllerError> {
        self.state = SequencerState::Idle;
        self.last_sent = None;
        self.override_target = None;
        let res = Self::send(session, Opcode::Deenergize, &[]);
        match &res {
            Ok(()) => tracing::info!("de-energized"),
            Err(e) => tracing::warn!(error = %e, "de-energize command not delivered"),
        }
        res
    }

    fn target_for(&self, state: &ControllerState, request: Option<f64>) -> Option<i32> {
        match (request, self.override_target) {
            (Some(r), _) => Some(self.mapper.map(r, state.step_mode)),
            (None, Some(t)) => Some(self.mapper.clamp(t, state.step_mode)),
            (None, None) => None,
        }
    }

    fn comm_failure(e: TransportError) -> TickStatus {
        tracing::warn!(error = %e, "communication failure; motion suspended this tick");
        TickStatus::CommunicationFailure(e)
    }

    /// One control tick. `request` is the waveform value in [-1, 1], if any.
    ///
    /// Transport errors become `TickStatus::CommunicationFailure`; only
    /// protocol errors are returned as `Err`.
    pub fn tick<S: DeviceSession + ?Sized>(
        &mut self,
        session: &mut S,
        request: Option<f64>,
    ) -> Result<TickStatus, ControllerError> {
        let refreshed = match self.refresh(session, false) {
            Ok(s) => s.clone(),
            Err(ControllerError::CommunicationFailure(e)) => return Ok(Self::comm_failure(e)),
            Err(e) => return Err(e),
        };

        match self.state {
            SequencerState::Idle => return Ok(TickStatus::Idle),
            SequencerState::Faulted => {
                let reason = self.fault.or_else(|| refreshed.fault());
                return Ok(reason.map_or(TickStatus::Idle, TickStatus::Faulted));
            }
            SequencerState::Energized => {}
        }

        if let Some(reason) = refreshed.fault() {
            tracing::warn!(%reason, "fault detected; motion stopped until re-energized");
            self.state = SequencerState::Faulted;
            self.fault = Some(reason);
            return Ok(TickStatus::Faulted(reason));
        }

        match Self::send(session, Opcode::ExitSafeStart, &[]) {
            Ok(()) => {}
            Err(ControllerError::CommunicationFailure(e)) => return Ok(Self::comm_failure(e)),
            Err(e) => return Err(e),
        }

        let Some(target) = self.target_for(&refreshed, request) else {
            return Ok(TickStatus::Holding);
        };
        if self.last_sent == Some(target) {
            tracing::trace!(target, "target unchanged");
            return Ok(TickStatus::Holding);
        }
        match Self::send(session, Opcode::SetTargetPosition, &[i64::from(target)]) {
            Ok(()) => {
                tracing::debug!(target, "target sent");
                self.last_sent = Some(target);
                Ok(TickStatus::Moved { target })
            }
            Err(ControllerError::CommunicationFailure(e)) => Ok(Self::comm_failure(e)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Exchange, RecordingSession};
    use crate::protocol::ProductVariant;

    fn seq() -> SafetySequencer {
        SafetySequencer::new(ProductVariant::T825.layout(), TargetMapper::default())
    }

    #[test]
    fn idle_tick_only_refreshes() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        assert_eq!(s.tick(&mut dev, Some(1.0)).unwrap(), TickStatus::Idle);
        assert_eq!(
            dev.take_log(),
            vec![Exchange::Query {
                opcode: 0xA1,
                size: 0x56
            }]
        );
    }

    #[test]
    fn energized_tick_orders_refresh_clear_target() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        s.energize(&mut dev).unwrap();
        dev.take_log();
        assert_eq!(s.tick(&mut dev, Some(1.0)).unwrap(), TickStatus::Moved { target: 200 });
        let log = dev.take_log();
        assert!(matches!(log[0], Exchange::Query { opcode: 0xA1, .. }));
        assert_eq!(log[1], Exchange::Send(vec![0x83]));
        assert!(matches!(&log[2], Exchange::Send(f) if f[0] == 0xE0));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn unchanged_target_is_not_resent() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        s.energize(&mut dev).unwrap();
        s.tick(&mut dev, Some(0.5)).unwrap();
        assert_eq!(s.tick(&mut dev, Some(0.5)).unwrap(), TickStatus::Holding);
        assert_eq!(dev.sent_targets().len(), 1);
    }

    #[test]
    fn fault_latches_until_energize() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        s.energize(&mut dev).unwrap();
        dev.set_error_status(0x0008);
        assert!(s.tick(&mut dev, Some(0.0)).unwrap().is_fault());
        dev.set_error_status(0);
        dev.take_log();
        assert!(s.tick(&mut dev, Some(0.3)).unwrap().is_fault());
        assert!(dev.take_log().iter().all(|e| matches!(e, Exchange::Query { .. })));
        s.energize(&mut dev).unwrap();
        assert!(matches!(s.tick(&mut dev, Some(0.3)).unwrap(), TickStatus::Moved { .. }));
    }

    #[test]
    fn transport_failure_suspends_one_tick() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        s.energize(&mut dev).unwrap();
        dev.fail_next_queries(1);
        assert!(matches!(
            s.tick(&mut dev, Some(0.0)).unwrap(),
            TickStatus::CommunicationFailure(TransportError::Timeout)
        ));
        assert_eq!(s.state(), SequencerState::Energized);
        assert!(matches!(s.tick(&mut dev, Some(0.0)).unwrap(), TickStatus::Moved { .. }));
    }

    #[test]
    fn deenergize_clears_override_even_if_undelivered() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        s.energize(&mut dev).unwrap();
        s.set_override_target(Some(-100));
        dev.fail_next_sends(1);
        assert!(s.deenergize(&mut dev).is_err());
        assert_eq!(s.state(), SequencerState::Idle);
        assert_eq!(s.override_target(), None);
    }

    #[test]
    fn protocol_error_propagates() {
        let mut s = seq();
        let mut dev = RecordingSession::new(ProductVariant::T825);
        dev.set_operation_state(3);
        assert!(matches!(
            s.tick(&mut dev, None),
            Err(ControllerError::Protocol(_))
        ));
    }
}
