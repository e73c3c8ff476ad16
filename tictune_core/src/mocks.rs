//! Test and helper mocks for tictune_core

use tictune_traits::{BoxError, DeviceDescriptor, DeviceEnumerator, DeviceSession};

use crate::protocol::opcodes::decode_32;
use crate::protocol::settings::{
    SETTING_COMMAND_TIMEOUT, SETTING_CURRENT_LIMIT, SETTING_MAX_ACCEL, SETTING_MAX_DECEL,
    SETTING_MAX_SPEED,
};
use crate::protocol::variables::{
    VAR_CURRENT_POSITION, VAR_ERROR_STATUS, VAR_OPERATION_STATE, VAR_STEP_MODE, VAR_VIN_VOLTAGE,
};
use crate::protocol::{Opcode, ProductVariant};

/// One exchange observed by `RecordingSession`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Send(Vec<u8>),
    Query { opcode: u8, size: usize },
}

/// Session that records every exchange and serves canned blocks.
///
/// Variable reads return whatever was last configured; set-setting frames are
/// applied to the served settings block so a re-read observes them.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    log: Vec<Exchange>,
    variables: Vec<u8>,
    settings: Vec<u8>,
    fail_sends: u32,
    fail_queries: u32,
}

impl RecordingSession {
    pub fn new(variant: ProductVariant) -> Self {
        let layout = variant.layout();
        let mut variables = vec![0u8; layout.variables_len];
        variables[VAR_OPERATION_STATE] = 10;
        variables[VAR_VIN_VOLTAGE..VAR_VIN_VOLTAGE + 2].copy_from_slice(&12_000u16.to_le_bytes());
        let mut settings = vec![0u8; layout.settings_len];
        settings[SETTING_COMMAND_TIMEOUT..SETTING_COMMAND_TIMEOUT + 2]
            .copy_from_slice(&1000u16.to_le_bytes());
        settings[SETTING_CURRENT_LIMIT] = 10;
        settings[SETTING_MAX_SPEED..SETTING_MAX_SPEED + 4]
            .copy_from_slice(&2_000_000u32.to_le_bytes());
        settings[SETTING_MAX_ACCEL..SETTING_MAX_ACCEL + 4]
            .copy_from_slice(&40_000u32.to_le_bytes());
        settings[SETTING_MAX_DECEL..SETTING_MAX_DECEL + 4]
            .copy_from_slice(&40_000u32.to_le_bytes());
        Self {
            log: Vec::new(),
            variables,
            settings,
            fail_sends: 0,
            fail_queries: 0,
        }
    }

    pub fn set_operation_state(&mut self, code: u8) {
        self.variables[VAR_OPERATION_STATE] = code;
    }

    pub fn set_error_status(&mut self, bits: u16) {
        self.variables[VAR_ERROR_STATUS..VAR_ERROR_STATUS + 2].copy_from_slice(&bits.to_le_bytes());
    }

    pub fn set_step_mode(&mut self, code: u8) {
        self.variables[VAR_STEP_MODE] = code;
    }

    pub fn set_vin_mv(&mut self, mv: u16) {
        self.variables[VAR_VIN_VOLTAGE..VAR_VIN_VOLTAGE + 2].copy_from_slice(&mv.to_le_bytes());
    }

    pub fn set_current_position(&mut self, pos: i32) {
        self.variables[VAR_CURRENT_POSITION..VAR_CURRENT_POSITION + 4]
            .copy_from_slice(&pos.to_le_bytes());
    }

    pub fn settings_block(&self) -> &[u8] {
        &self.settings
    }

    /// Make the next `n` sends fail with a timeout.
    pub fn fail_next_sends(&mut self, n: u32) {
        self.fail_sends = n;
    }

    /// Make the next `n` queries fail with a timeout.
    pub fn fail_next_queries(&mut self, n: u32) {
        self.fail_queries = n;
    }

    pub fn log(&self) -> &[Exchange] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<Exchange> {
        std::mem::take(&mut self.log)
    }

    /// Opcodes of sent frames, in order.
    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Exchange::Send(f) => f.first().copied(),
                Exchange::Query { .. } => None,
            })
            .collect()
    }

    /// Decoded set-target-position values, in order.
    pub fn sent_targets(&self) -> Vec<i32> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Exchange::Send(f) if f.first() == Some(&Opcode::SetTargetPosition.code()) => {
                    decode_32(f).ok().map(|v| v as i32)
                }
                _ => None,
            })
            .collect()
    }
}

fn mock_timeout() -> BoxError {
    Box::new(std::io::Error::other("mock timeout"))
}

impl DeviceSession for RecordingSession {
    fn send(&mut self, command: &[u8]) -> Result<(), BoxError> {
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(mock_timeout());
        }
        self.log.push(Exchange::Send(command.to_vec()));
        if command.first() == Some(&Opcode::SetSetting.code()) && command.len() == 4 {
            let msbs = command[1];
            let offset = usize::from(command[2] | ((msbs & 1) << 7));
            let value = command[3] | (((msbs >> 1) & 1) << 7);
            if let Some(slot) = self.settings.get_mut(offset) {
                *slot = value;
            }
        }
        Ok(())
    }

    fn query(&mut self, opcode: u8, size: usize) -> Result<Vec<u8>, BoxError> {
        if self.fail_queries > 0 {
            self.fail_queries -= 1;
            return Err(mock_timeout());
        }
        self.log.push(Exchange::Query { opcode, size });
        let mut block = if opcode == Opcode::GetSetting.code() {
            self.settings.clone()
        } else {
            self.variables.clone()
        };
        block.resize(size, 0);
        Ok(block)
    }
}

/// Enumerator with a fixed descriptor list whose sessions are `RecordingSession`s.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    pub devices: Vec<DeviceDescriptor>,
}

impl DeviceEnumerator for StaticEnumerator {
    type Session = RecordingSession;

    fn list(&self) -> Result<Vec<DeviceDescriptor>, BoxError> {
        Ok(self.devices.clone())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<RecordingSession, BoxError> {
        let variant = ProductVariant::from_product_id(device.product_id)
            .map_err(|e| -> BoxError { Box::new(e) })?;
        Ok(RecordingSession::new(variant))
    }
}
