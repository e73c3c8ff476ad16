//! Setting block codec and the explicit settings diff.
//!
//! `ControllerSettings` keeps the raw block it was decoded from, so encoding
//! writes the known fields over the original bytes and leaves everything this
//! crate does not model (pin config, homing, serial options) untouched.

use crate::error::ProtocolError;
use crate::protocol::layout::VariantLayout;
use crate::protocol::units::{
    MAX_ALLOWED_ACCEL, MAX_ALLOWED_COMMAND_TIMEOUT, MAX_ALLOWED_SPEED, MIN_ALLOWED_ACCEL, StepMode,
};
use crate::protocol::variables::{read_u16, read_u32};

pub const SETTING_CONTROL_MODE: usize = 0x01;
pub const SETTING_DISABLE_SAFE_START: usize = 0x03;
pub const SETTING_IGNORE_ERR_LINE_HIGH: usize = 0x04;
pub const SETTING_SERIAL_BAUD_RATE_GENERATOR: usize = 0x05;
pub const SETTING_SERIAL_DEVICE_NUMBER: usize = 0x07;
pub const SETTING_AUTO_CLEAR_DRIVER_ERROR: usize = 0x08;
pub const SETTING_COMMAND_TIMEOUT: usize = 0x09;
pub const SETTING_INVERT_MOTOR_DIRECTION: usize = 0x1B;
pub const SETTING_INPUT_INVERT: usize = 0x21;
pub const SETTING_CURRENT_LIMIT: usize = 0x40;
pub const SETTING_STEP_MODE: usize = 0x41;
pub const SETTING_STARTING_SPEED: usize = 0x43;
pub const SETTING_MAX_SPEED: usize = 0x47;
pub const SETTING_MAX_DECEL: usize = 0x4B;
pub const SETTING_MAX_ACCEL: usize = 0x4F;

/// Persisted device settings. Local edits have no effect until applied and
/// the device is reinitialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub control_mode: u8,
    pub disable_safe_start: bool,
    pub ignore_err_line_high: bool,
    pub serial_baud_rate_generator: u16,
    pub serial_device_number: u8,
    pub auto_clear_driver_error: bool,
    pub command_timeout_ms: u16,
    pub invert_motor_direction: bool,
    pub input_invert: bool,
    pub current_limit_code: u8,
    pub step_mode: StepMode,
    /// `None` on products without a decay setting.
    pub decay_mode: Option<u8>,
    /// steps/s x 10000
    pub starting_speed: u32,
    /// steps/s x 10000
    pub max_speed: u32,
    /// steps/s^2 x 100; 0 means "same as max_accel".
    pub max_decel: u32,
    /// steps/s^2 x 100
    pub max_accel: u32,
    /// T249 only.
    pub agc_mode: Option<u8>,
    /// 36v4 only.
    pub hp_unrestricted_current_limits: Option<bool>,
    raw: Vec<u8>,
}

impl ControllerSettings {
    /// The bytes this value was decoded from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Effective deceleration (a stored 0 follows acceleration).
    pub fn effective_decel(&self) -> u32 {
        if self.max_decel == 0 {
            self.max_accel
        } else {
            self.max_decel
        }
    }
}

pub fn decode_settings(
    layout: &VariantLayout,
    raw: &[u8],
) -> Result<ControllerSettings, ProtocolError> {
    if raw.len() < layout.settings_len {
        return Err(ProtocolError::Truncated {
            needed: layout.settings_len,
            got: raw.len(),
        });
    }
    Ok(ControllerSettings {
        control_mode: raw[SETTING_CONTROL_MODE],
        disable_safe_start: raw[SETTING_DISABLE_SAFE_START] != 0,
        ignore_err_line_high: raw[SETTING_IGNORE_ERR_LINE_HIGH] != 0,
        serial_baud_rate_generator: read_u16(raw, SETTING_SERIAL_BAUD_RATE_GENERATOR),
        serial_device_number: raw[SETTING_SERIAL_DEVICE_NUMBER],
        auto_clear_driver_error: raw[SETTING_AUTO_CLEAR_DRIVER_ERROR] != 0,
        command_timeout_ms: read_u16(raw, SETTING_COMMAND_TIMEOUT),
        invert_motor_direction: raw[SETTING_INVERT_MOTOR_DIRECTION] != 0,
        input_invert: raw[SETTING_INPUT_INVERT] != 0,
        current_limit_code: raw[SETTING_CURRENT_LIMIT],
        step_mode: StepMode::from_code(raw[SETTING_STEP_MODE])?,
        decay_mode: layout.decay_mode_setting.map(|off| raw[off]),
        starting_speed: read_u32(raw, SETTING_STARTING_SPEED),
        max_speed: read_u32(raw, SETTING_MAX_SPEED),
        max_decel: read_u32(raw, SETTING_MAX_DECEL),
        max_accel: read_u32(raw, SETTING_MAX_ACCEL),
        agc_mode: layout.agc_mode_setting.map(|off| raw[off]),
        hp_unrestricted_current_limits: layout.hp_unrestricted_setting.map(|off| raw[off] != 0),
        raw: raw[..layout.settings_len].to_vec(),
    })
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ProtocolError> {
    if value < min || value > max {
        return Err(ProtocolError::SettingOutOfRange {
            field,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        });
    }
    Ok(())
}

fn not_supported(field: &'static str, layout: &VariantLayout) -> ProtocolError {
    ProtocolError::FieldNotSupported {
        field,
        variant: layout.variant.name(),
    }
}

/// Encode settings into a full block for the given layout.
pub fn encode_settings(
    layout: &VariantLayout,
    settings: &ControllerSettings,
) -> Result<Vec<u8>, ProtocolError> {
    check_range("max speed", settings.max_speed, 0, MAX_ALLOWED_SPEED)?;
    check_range("starting speed", settings.starting_speed, 0, settings.max_speed)?;
    check_range("max accel", settings.max_accel, MIN_ALLOWED_ACCEL, MAX_ALLOWED_ACCEL)?;
    if settings.max_decel != 0 {
        check_range("max decel", settings.max_decel, MIN_ALLOWED_ACCEL, MAX_ALLOWED_ACCEL)?;
    }
    check_range(
        "command timeout",
        u32::from(settings.command_timeout_ms),
        0,
        u32::from(MAX_ALLOWED_COMMAND_TIMEOUT),
    )?;
    check_range(
        "current limit code",
        u32::from(settings.current_limit_code),
        0,
        u32::from(layout.max_current_code()),
    )?;
    if !layout.supports_step_mode(settings.step_mode) {
        return Err(not_supported("step mode", layout));
    }

    let mut raw = settings.raw.clone();
    raw.resize(layout.settings_len, 0);
    raw[SETTING_CONTROL_MODE] = settings.control_mode;
    raw[SETTING_DISABLE_SAFE_START] = u8::from(settings.disable_safe_start);
    raw[SETTING_IGNORE_ERR_LINE_HIGH] = u8::from(settings.ignore_err_line_high);
    raw[SETTING_SERIAL_BAUD_RATE_GENERATOR..SETTING_SERIAL_BAUD_RATE_GENERATOR + 2]
        .copy_from_slice(&settings.serial_baud_rate_generator.to_le_bytes());
    raw[SETTING_SERIAL_DEVICE_NUMBER] = settings.serial_device_number;
    raw[SETTING_AUTO_CLEAR_DRIVER_ERROR] = u8::from(settings.auto_clear_driver_error);
    raw[SETTING_COMMAND_TIMEOUT..SETTING_COMMAND_TIMEOUT + 2]
        .copy_from_slice(&settings.command_timeout_ms.to_le_bytes());
    raw[SETTING_INVERT_MOTOR_DIRECTION] = u8::from(settings.invert_motor_direction);
    raw[SETTING_INPUT_INVERT] = u8::from(settings.input_invert);
    raw[SETTING_CURRENT_LIMIT] = settings.current_limit_code;
    raw[SETTING_STEP_MODE] = settings.step_mode.code();
    raw[SETTING_STARTING_SPEED..SETTING_STARTING_SPEED + 4]
        .copy_from_slice(&settings.starting_speed.to_le_bytes());
    raw[SETTING_MAX_SPEED..SETTING_MAX_SPEED + 4]
        .copy_from_slice(&settings.max_speed.to_le_bytes());
    raw[SETTING_MAX_DECEL..SETTING_MAX_DECEL + 4]
        .copy_from_slice(&settings.max_decel.to_le_bytes());
    raw[SETTING_MAX_ACCEL..SETTING_MAX_ACCEL + 4]
        .copy_from_slice(&settings.max_accel.to_le_bytes());

    match (layout.decay_mode_setting, settings.decay_mode) {
        (Some(off), Some(v)) => raw[off] = v,
        (None, Some(_)) => return Err(not_supported("decay mode", layout)),
        _ => {}
    }
    match (layout.agc_mode_setting, settings.agc_mode) {
        (Some(off), Some(v)) => raw[off] = v,
        (None, Some(_)) => return Err(not_supported("AGC mode", layout)),
        _ => {}
    }
    match (
        layout.hp_unrestricted_setting,
        settings.hp_unrestricted_current_limits,
    ) {
        (Some(off), Some(v)) => raw[off] = u8::from(v),
        (None, Some(_)) => return Err(not_supported("unrestricted current limits", layout)),
        _ => {}
    }
    Ok(raw)
}

/// One changed setting byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingWrite {
    pub offset: u8,
    pub value: u8,
}

/// Byte-level diff between the last applied settings and the pending ones.
pub fn settings_diff(
    layout: &VariantLayout,
    applied: &ControllerSettings,
    pending: &ControllerSettings,
) -> Result<Vec<SettingWrite>, ProtocolError> {
    let before = encode_settings(layout, applied)?;
    let after = encode_settings(layout, pending)?;
    Ok(before
        .iter()
        .zip(after.iter())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(offset, (_, b))| SettingWrite {
            offset: offset as u8,
            value: *b,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::layout::ProductVariant;

    fn sample_raw() -> Vec<u8> {
        let mut raw = vec![0u8; 0x70];
        raw[SETTING_COMMAND_TIMEOUT..SETTING_COMMAND_TIMEOUT + 2]
            .copy_from_slice(&1000u16.to_le_bytes());
        raw[SETTING_CURRENT_LIMIT] = 10;
        raw[SETTING_MAX_SPEED..SETTING_MAX_SPEED + 4].copy_from_slice(&2_000_000u32.to_le_bytes());
        raw[SETTING_MAX_ACCEL..SETTING_MAX_ACCEL + 4].copy_from_slice(&40_000u32.to_le_bytes());
        raw[SETTING_MAX_DECEL..SETTING_MAX_DECEL + 4].copy_from_slice(&40_000u32.to_le_bytes());
        raw[0x5F] = 0xAB; // unmodelled byte
        raw
    }

    #[test]
    fn decode_then_encode_is_identity_on_the_block() {
        let layout = ProductVariant::T825.layout();
        let raw = sample_raw();
        let s = decode_settings(&layout, &raw).unwrap();
        assert_eq!(s.max_speed, 2_000_000);
        assert_eq!(s.decay_mode, Some(0));
        assert_eq!(s.agc_mode, None);
        assert_eq!(encode_settings(&layout, &s).unwrap(), raw);
    }

    #[test]
    fn overloaded_offset_decodes_per_variant() {
        let mut raw = sample_raw();
        raw[0x6C] = 1;
        let t249 = decode_settings(&ProductVariant::T249.layout(), &raw).unwrap();
        assert_eq!(t249.agc_mode, Some(1));
        assert_eq!(t249.hp_unrestricted_current_limits, None);
        let hp = decode_settings(&ProductVariant::Tic36v4.layout(), &raw).unwrap();
        assert_eq!(hp.agc_mode, None);
        assert_eq!(hp.hp_unrestricted_current_limits, Some(true));
    }

    #[test]
    fn foreign_field_is_not_supported() {
        let layout = ProductVariant::T249.layout();
        let mut s = decode_settings(&layout, &sample_raw()).unwrap();
        s.decay_mode = Some(1);
        assert!(matches!(
            encode_settings(&layout, &s),
            Err(ProtocolError::FieldNotSupported {
                field: "decay mode",
                ..
            })
        ));
    }

    #[test]
    fn limits_are_enforced() {
        let layout = ProductVariant::T825.layout();
        let mut s = decode_settings(&layout, &sample_raw()).unwrap();
        s.max_accel = 50;
        assert!(matches!(
            encode_settings(&layout, &s),
            Err(ProtocolError::SettingOutOfRange {
                field: "max accel",
                ..
            })
        ));
        s.max_accel = 40_000;
        s.max_speed = MAX_ALLOWED_SPEED + 1;
        assert!(encode_settings(&layout, &s).is_err());
        s.max_speed = 2_000_000;
        s.step_mode = StepMode::Micro256;
        assert!(encode_settings(&layout, &s).is_err());
    }

    #[test]
    fn diff_emits_only_changed_bytes() {
        let layout = ProductVariant::T825.layout();
        let applied = decode_settings(&layout, &sample_raw()).unwrap();
        let mut pending = applied.clone();
        assert!(settings_diff(&layout, &applied, &pending).unwrap().is_empty());
        pending.step_mode = StepMode::Micro4;
        pending.max_accel = 40_001; // 0x9C41: only the low byte changes
        let diff = settings_diff(&layout, &applied, &pending).unwrap();
        assert_eq!(
            diff,
            vec![
                SettingWrite {
                    offset: 0x41,
                    value: 2
                },
                SettingWrite {
                    offset: 0x4F,
                    value: 0x41
                },
            ]
        );
    }
}
