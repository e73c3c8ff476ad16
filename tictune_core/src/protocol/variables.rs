//! Variable block decoding into `ControllerState`.

use std::fmt;

use crate::error::{FaultReason, ProtocolError};
use crate::protocol::layout::VariantLayout;
use crate::protocol::units::StepMode;

pub const VAR_OPERATION_STATE: usize = 0x00;
pub const VAR_MISC_FLAGS1: usize = 0x01;
pub const VAR_ERROR_STATUS: usize = 0x02;
pub const VAR_ERRORS_OCCURRED: usize = 0x04;
pub const VAR_PLANNING_MODE: usize = 0x09;
pub const VAR_TARGET_POSITION: usize = 0x0A;
pub const VAR_TARGET_VELOCITY: usize = 0x0E;
pub const VAR_STARTING_SPEED: usize = 0x12;
pub const VAR_MAX_SPEED: usize = 0x16;
pub const VAR_MAX_DECEL: usize = 0x1A;
pub const VAR_MAX_ACCEL: usize = 0x1E;
pub const VAR_CURRENT_POSITION: usize = 0x22;
pub const VAR_CURRENT_VELOCITY: usize = 0x26;
pub const VAR_ACTING_TARGET_POSITION: usize = 0x2A;
pub const VAR_DEVICE_RESET: usize = 0x32;
pub const VAR_VIN_VOLTAGE: usize = 0x33;
pub const VAR_UP_TIME: usize = 0x35;
pub const VAR_STEP_MODE: usize = 0x49;
pub const VAR_CURRENT_LIMIT: usize = 0x4A;
pub const VAR_DECAY_MODE: usize = 0x4B;
pub const VAR_INPUT_STATE: usize = 0x4C;
pub const VAR_LAST_MOTOR_DRIVER_ERROR: usize = 0x55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Reset,
    Deenergized,
    SoftError,
    WaitingForErrLine,
    StartingUp,
    Normal,
}

impl OperationState {
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0 => Self::Reset,
            2 => Self::Deenergized,
            4 => Self::SoftError,
            6 => Self::WaitingForErrLine,
            8 => Self::StartingUp,
            10 => Self::Normal,
            other => {
                return Err(ProtocolError::InvalidValue {
                    field: "operation state",
                    value: i64::from(other),
                });
            }
        })
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::Deenergized => 2,
            Self::SoftError => 4,
            Self::WaitingForErrLine => 6,
            Self::StartingUp => 8,
            Self::Normal => 10,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reset => "reset",
            Self::Deenergized => "de-energized",
            Self::SoftError => "soft error",
            Self::WaitingForErrLine => "waiting for ERR line",
            Self::StartingUp => "starting up",
            Self::Normal => "normal",
        };
        f.write_str(s)
    }
}

/// Error bitfield. Unknown bits are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorBits(pub u32);

impl ErrorBits {
    pub const INTENTIONALLY_DEENERGIZED: u32 = 1 << 0;
    pub const MOTOR_DRIVER_ERROR: u32 = 1 << 1;
    pub const LOW_VIN: u32 = 1 << 2;
    pub const KILL_SWITCH: u32 = 1 << 3;
    pub const REQUIRED_INPUT_INVALID: u32 = 1 << 4;
    pub const SERIAL_ERROR: u32 = 1 << 5;
    pub const COMMAND_TIMEOUT: u32 = 1 << 6;
    pub const SAFE_START_VIOLATION: u32 = 1 << 7;
    pub const ERR_LINE_HIGH: u32 = 1 << 8;
    pub const SERIAL_FRAMING: u32 = 1 << 16;
    pub const SERIAL_RX_OVERRUN: u32 = 1 << 17;
    pub const SERIAL_FORMAT: u32 = 1 << 18;
    pub const SERIAL_CRC: u32 = 1 << 19;
    pub const ENCODER_SKIP: u32 = 1 << 20;

    /// Bits the sequencer produces or clears itself.
    pub const EXPECTED: u32 = Self::INTENTIONALLY_DEENERGIZED | Self::SAFE_START_VIOLATION;

    const NAMES: [(u32, &'static str); 14] = [
        (Self::INTENTIONALLY_DEENERGIZED, "intentionally de-energized"),
        (Self::MOTOR_DRIVER_ERROR, "motor driver error"),
        (Self::LOW_VIN, "low VIN"),
        (Self::KILL_SWITCH, "kill switch"),
        (Self::REQUIRED_INPUT_INVALID, "required input invalid"),
        (Self::SERIAL_ERROR, "serial error"),
        (Self::COMMAND_TIMEOUT, "command timeout"),
        (Self::SAFE_START_VIOLATION, "safe start violation"),
        (Self::ERR_LINE_HIGH, "ERR line high"),
        (Self::SERIAL_FRAMING, "serial framing"),
        (Self::SERIAL_RX_OVERRUN, "serial RX overrun"),
        (Self::SERIAL_FORMAT, "serial format"),
        (Self::SERIAL_CRC, "serial CRC"),
        (Self::ENCODER_SKIP, "encoder skip"),
    ];

    #[inline]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// Bits other than the expected ones.
    #[inline]
    pub const fn unexpected(self) -> Self {
        Self(self.0 & !Self::EXPECTED)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the known bits that are set.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for ErrorBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "0x{:08X}", self.0)
        } else {
            write!(f, "{} (0x{:08X})", names.join(", "), self.0)
        }
    }
}

/// Decoded variable block. Replaced wholesale on each refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub operation_state: OperationState,
    pub misc_flags: u8,
    pub error_status: ErrorBits,
    /// Sticky until read with the clear-errors opcode.
    pub errors_occurred: ErrorBits,
    pub planning_mode: u8,
    pub target_position: i32,
    pub target_velocity: i32,
    pub starting_speed: u32,
    pub max_speed: u32,
    pub max_decel: u32,
    pub max_accel: u32,
    pub current_position: i32,
    /// steps/s x 10000
    pub current_velocity: i32,
    pub acting_target_position: i32,
    pub device_reset: u8,
    pub vin_mv: u16,
    pub uptime_ms: u32,
    pub step_mode: StepMode,
    pub current_limit_code: u8,
    pub current_limit_ma: u32,
    /// Raw decay mode; meaning depends on the product.
    pub decay_mode: u8,
    pub input_state: u8,
    pub last_motor_driver_error: u8,
    pub agc_mode: Option<u8>,
    /// Lives in the settings block; `None` until merged from a settings read.
    pub input_invert: Option<bool>,
}

impl ControllerState {
    pub const MISC_ENERGIZED: u8 = 1 << 0;
    pub const MISC_POSITION_UNCERTAIN: u8 = 1 << 1;

    pub fn energized(&self) -> bool {
        self.misc_flags & Self::MISC_ENERGIZED != 0
    }

    /// Fault classification used by the sequencer.
    pub fn fault(&self) -> Option<FaultReason> {
        if self.operation_state == OperationState::WaitingForErrLine {
            return Some(FaultReason::OperationState(self.operation_state));
        }
        let unexpected = self.error_status.unexpected();
        (!unexpected.is_empty()).then_some(FaultReason::DeviceErrors(unexpected))
    }

    pub fn vin_volts(&self) -> f64 {
        crate::protocol::units::millivolts_to_volts(self.vin_mv)
    }
}

pub(crate) fn read_u16(raw: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([raw[off], raw[off + 1]])
}

pub(crate) fn read_u32(raw: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

fn read_i32(raw: &[u8], off: usize) -> i32 {
    read_u32(raw, off) as i32
}

/// Decode a variable block read from a device of the given layout.
pub fn decode_variables(
    layout: &VariantLayout,
    raw: &[u8],
) -> Result<ControllerState, ProtocolError> {
    if raw.len() < layout.variables_len {
        return Err(ProtocolError::Truncated {
            needed: layout.variables_len,
            got: raw.len(),
        });
    }
    let current_limit_code = raw[VAR_CURRENT_LIMIT];
    Ok(ControllerState {
        operation_state: OperationState::from_code(raw[VAR_OPERATION_STATE])?,
        misc_flags: raw[VAR_MISC_FLAGS1],
        error_status: ErrorBits(u32::from(read_u16(raw, VAR_ERROR_STATUS))),
        errors_occurred: ErrorBits(read_u32(raw, VAR_ERRORS_OCCURRED)),
        planning_mode: raw[VAR_PLANNING_MODE],
        target_position: read_i32(raw, VAR_TARGET_POSITION),
        target_velocity: read_i32(raw, VAR_TARGET_VELOCITY),
        starting_speed: read_u32(raw, VAR_STARTING_SPEED),
        max_speed: read_u32(raw, VAR_MAX_SPEED),
        max_decel: read_u32(raw, VAR_MAX_DECEL),
        max_accel: read_u32(raw, VAR_MAX_ACCEL),
        current_position: read_i32(raw, VAR_CURRENT_POSITION),
        current_velocity: read_i32(raw, VAR_CURRENT_VELOCITY),
        acting_target_position: read_i32(raw, VAR_ACTING_TARGET_POSITION),
        device_reset: raw[VAR_DEVICE_RESET],
        vin_mv: read_u16(raw, VAR_VIN_VOLTAGE),
        uptime_ms: read_u32(raw, VAR_UP_TIME),
        step_mode: StepMode::from_code(raw[VAR_STEP_MODE])?,
        current_limit_code,
        current_limit_ma: layout.current.code_to_ma(current_limit_code)?,
        decay_mode: raw[VAR_DECAY_MODE],
        input_state: raw[VAR_INPUT_STATE],
        last_motor_driver_error: raw[VAR_LAST_MOTOR_DRIVER_ERROR],
        agc_mode: layout.agc_mode_variable.map(|off| raw[off]),
        input_invert: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::layout::ProductVariant;

    fn block(len: usize) -> Vec<u8> {
        let mut raw = vec![0u8; len];
        raw[VAR_OPERATION_STATE] = 10;
        raw[VAR_MISC_FLAGS1] = 1;
        raw
    }

    #[test]
    fn decodes_little_endian_fields() {
        let layout = ProductVariant::T825.layout();
        let mut raw = block(layout.variables_len);
        raw[VAR_CURRENT_POSITION..VAR_CURRENT_POSITION + 4]
            .copy_from_slice(&(-1234i32).to_le_bytes());
        raw[VAR_VIN_VOLTAGE..VAR_VIN_VOLTAGE + 2].copy_from_slice(&12_345u16.to_le_bytes());
        raw[VAR_MAX_SPEED..VAR_MAX_SPEED + 4].copy_from_slice(&2_000_000u32.to_le_bytes());
        raw[VAR_STEP_MODE] = 3;
        raw[VAR_CURRENT_LIMIT] = 10;
        let s = decode_variables(&layout, &raw).unwrap();
        assert_eq!(s.operation_state, OperationState::Normal);
        assert!(s.energized());
        assert_eq!(s.current_position, -1234);
        assert_eq!(s.vin_mv, 12_345);
        assert_eq!(s.max_speed, 2_000_000);
        assert_eq!(s.step_mode, StepMode::Micro8);
        assert_eq!(s.current_limit_ma, 320);
        assert_eq!(s.agc_mode, None);
        assert!(s.fault().is_none());
    }

    #[test]
    fn unknown_error_bits_survive() {
        let layout = ProductVariant::T825.layout();
        let mut raw = block(layout.variables_len);
        raw[VAR_ERRORS_OCCURRED..VAR_ERRORS_OCCURRED + 4]
            .copy_from_slice(&0x8000_0001u32.to_le_bytes());
        let s = decode_variables(&layout, &raw).unwrap();
        assert_eq!(s.errors_occurred.0, 0x8000_0001);
    }

    #[test]
    fn truncated_block_is_rejected() {
        let layout = ProductVariant::T249.layout();
        let raw = block(0x56);
        assert_eq!(
            decode_variables(&layout, &raw),
            Err(ProtocolError::Truncated {
                needed: 0x5A,
                got: 0x56
            })
        );
    }

    #[test]
    fn agc_mode_only_on_t249() {
        let layout = ProductVariant::T249.layout();
        let mut raw = block(layout.variables_len);
        raw[0x56] = 2;
        assert_eq!(decode_variables(&layout, &raw).unwrap().agc_mode, Some(2));
    }

    #[test]
    fn fault_classification_ignores_expected_bits() {
        let layout = ProductVariant::T825.layout();
        let mut raw = block(layout.variables_len);
        raw[VAR_OPERATION_STATE] = 4;
        raw[VAR_ERROR_STATUS] = 0x81;
        assert!(decode_variables(&layout, &raw).unwrap().fault().is_none());

        raw[VAR_ERROR_STATUS] = 0x88;
        let fault = decode_variables(&layout, &raw).unwrap().fault();
        assert_eq!(fault, Some(FaultReason::DeviceErrors(ErrorBits(ErrorBits::KILL_SWITCH))));

        raw[VAR_ERROR_STATUS] = 0;
        raw[VAR_OPERATION_STATE] = 6;
        assert!(matches!(
            decode_variables(&layout, &raw).unwrap().fault(),
            Some(FaultReason::OperationState(OperationState::WaitingForErrLine))
        ));
    }

    #[test]
    fn error_bits_display_names_known_bits() {
        let s = ErrorBits(ErrorBits::LOW_VIN | ErrorBits::KILL_SWITCH).to_string();
        assert!(s.contains("low VIN"));
        assert!(s.contains("kill switch"));
    }
}
