//! Simulated controller that speaks the compact command framing and serves
//! variable/setting blocks laid out like the real firmware.
//!
//! The simulation is deliberately simple: one variable read advances the motor
//! by one `step_secs` worth of travel at the configured max speed, and VIN sags
//! with load so training phases produce distinguishable statistics.

use std::cell::RefCell;
use std::rc::Rc;

use tictune_traits::{BoxError, DeviceDescriptor, DeviceEnumerator, DeviceSession};

use crate::error::LinkError;

pub const PRODUCT_ID_T825: u16 = 0x00B3;
pub const PRODUCT_ID_T249: u16 = 0x00C9;

const OP_DEENERGIZED: u8 = 2;
const OP_SOFT_ERROR: u8 = 4;
const OP_WAITING_FOR_ERR_LINE: u8 = 6;
const OP_NORMAL: u8 = 10;

const ERR_INTENTIONALLY_DEENERGIZED: u16 = 1 << 0;
const ERR_SAFE_START_VIOLATION: u16 = 1 << 7;
const ERR_LINE_HIGH: u16 = 1 << 8;

const SETTINGS_LEN: usize = 0x70;
const SET_DISABLE_SAFE_START: usize = 0x03;
const SET_COMMAND_TIMEOUT: usize = 0x09;
const SET_CURRENT_LIMIT: usize = 0x40;
const SET_STEP_MODE: usize = 0x41;
const SET_DECAY_MODE: usize = 0x42;
const SET_STARTING_SPEED: usize = 0x43;
const SET_MAX_SPEED: usize = 0x47;
const SET_MAX_DECEL: usize = 0x4B;
const SET_MAX_ACCEL: usize = 0x4F;

#[derive(Debug, Clone)]
struct Motion {
    max_speed: u32,
    starting_speed: u32,
    max_accel: u32,
    max_decel: u32,
    step_mode: u8,
    current_limit_code: u8,
    decay_mode: u8,
}

#[derive(Debug)]
struct SimDevice {
    product_id: u16,
    operation_state: u8,
    error_status: u16,
    errors_occurred: u32,
    energized: bool,
    target_position: i32,
    current_position: i32,
    current_velocity: i32,
    vin_nominal_mv: u16,
    vin_mv: u16,
    reads: u32,
    step_secs: f64,
    injected: u16,
    pending_timeouts: u32,
    disconnected: bool,
    settings: [u8; SETTINGS_LEN],
    motion: Motion,
    commands: Vec<u8>,
}

impl SimDevice {
    fn new(product_id: u16) -> Self {
        let mut settings = [0u8; SETTINGS_LEN];
        settings[SET_COMMAND_TIMEOUT..SET_COMMAND_TIMEOUT + 2]
            .copy_from_slice(&1000u16.to_le_bytes());
        settings[SET_CURRENT_LIMIT] = 10;
        settings[SET_STEP_MODE] = 0;
        settings[SET_DECAY_MODE] = 0;
        settings[SET_STARTING_SPEED..SET_STARTING_SPEED + 4].copy_from_slice(&0u32.to_le_bytes());
        settings[SET_MAX_SPEED..SET_MAX_SPEED + 4].copy_from_slice(&28_400_000u32.to_le_bytes());
        settings[SET_MAX_DECEL..SET_MAX_DECEL + 4].copy_from_slice(&280_000u32.to_le_bytes());
        settings[SET_MAX_ACCEL..SET_MAX_ACCEL + 4].copy_from_slice(&280_000u32.to_le_bytes());
        let mut dev = Self {
            product_id,
            operation_state: OP_DEENERGIZED,
            error_status: ERR_INTENTIONALLY_DEENERGIZED,
            errors_occurred: 0,
            energized: false,
            target_position: 0,
            current_position: 0,
            current_velocity: 0,
            vin_nominal_mv: 12_000,
            vin_mv: 12_000,
            reads: 0,
            step_secs: 1.0 / 60.0,
            injected: 0,
            pending_timeouts: 0,
            disconnected: false,
            settings,
            motion: Motion {
                max_speed: 0,
                starting_speed: 0,
                max_accel: 0,
                max_decel: 0,
                step_mode: 0,
                current_limit_code: 0,
                decay_mode: 0,
            },
            commands: Vec::new(),
        };
        dev.reinitialize();
        dev
    }

    fn setting_u32(&self, offset: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.settings[offset..offset + 4]);
        u32::from_le_bytes(b)
    }

    fn reinitialize(&mut self) {
        self.motion = Motion {
            max_speed: self.setting_u32(SET_MAX_SPEED),
            starting_speed: self.setting_u32(SET_STARTING_SPEED),
            max_accel: self.setting_u32(SET_MAX_ACCEL),
            max_decel: self.setting_u32(SET_MAX_DECEL),
            step_mode: self.settings[SET_STEP_MODE],
            current_limit_code: self.settings[SET_CURRENT_LIMIT],
            decay_mode: self.settings[SET_DECAY_MODE],
        };
        self.current_velocity = 0;
        if self.energized {
            self.arm_safe_start();
        }
    }

    fn arm_safe_start(&mut self) {
        if self.settings[SET_DISABLE_SAFE_START] != 0 {
            return;
        }
        self.error_status |= ERR_SAFE_START_VIOLATION;
        self.errors_occurred |= u32::from(ERR_SAFE_START_VIOLATION);
        self.refresh_operation_state();
    }

    fn refresh_operation_state(&mut self) {
        let status = self.error_status | self.injected;
        self.operation_state = if status & ERR_LINE_HIGH != 0 {
            OP_WAITING_FOR_ERR_LINE
        } else if !self.energized {
            OP_DEENERGIZED
        } else if status != 0 {
            OP_SOFT_ERROR
        } else {
            OP_NORMAL
        };
    }

    fn apply(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let Some(&opcode) = frame.first() else {
            return Err(LinkError::Malformed("empty frame".into()));
        };
        let expected = match opcode {
            0x89 | 0x8C | 0x86 | 0x85 | 0x83 | 0x8F | 0xB0 | 0x8A | 0x10 => 1,
            0x97 | 0x94 | 0x91 | 0x92 | 0x98 => 2,
            0xE0 | 0xE3 | 0xEC | 0xE6 | 0xE5 | 0xEA | 0xE9 => 6,
            0x13 => 4,
            other => return Err(LinkError::Rejected(other)),
        };
        if frame.len() != expected {
            return Err(LinkError::Malformed(format!(
                "opcode 0x{opcode:02X} expects {expected} bytes, got {}",
                frame.len()
            )));
        }
        self.commands.push(opcode);
        match opcode {
            0x85 => {
                self.energized = true;
                self.error_status &= !ERR_INTENTIONALLY_DEENERGIZED;
                self.arm_safe_start();
            }
            0x86 => {
                self.energized = false;
                self.current_velocity = 0;
                self.error_status |= ERR_INTENTIONALLY_DEENERGIZED;
                self.errors_occurred |= u32::from(ERR_INTENTIONALLY_DEENERGIZED);
            }
            0x83 => {
                if self.energized {
                    self.error_status &= !ERR_SAFE_START_VIOLATION;
                }
            }
            0x8F => self.arm_safe_start(),
            0xB0 => {
                self.energized = false;
                self.current_velocity = 0;
                self.error_status = ERR_INTENTIONALLY_DEENERGIZED;
                self.reinitialize();
            }
            0x89 => self.target_position = self.current_position,
            0x8C | 0x8A | 0x97 | 0x98 => {}
            0x10 => self.reinitialize(),
            0x94 => self.motion.step_mode = frame[1],
            0x91 => self.motion.current_limit_code = frame[1],
            0x92 => self.motion.decay_mode = frame[1],
            0x13 => {
                let msbs = frame[1];
                let offset = usize::from(frame[2] | ((msbs & 1) << 7));
                let value = frame[3] | (((msbs >> 1) & 1) << 7);
                let slot = self
                    .settings
                    .get_mut(offset)
                    .ok_or_else(|| LinkError::Malformed(format!("setting offset {offset}")))?;
                *slot = value;
            }
            _ => {
                let value = decode_u32(&frame[1..]);
                match opcode {
                    0xE0 => {
                        if self.operation_state == OP_NORMAL {
                            self.target_position = value as i32;
                        }
                    }
                    0xEC => {
                        self.current_position = value as i32;
                        self.target_position = value as i32;
                    }
                    0xE6 => self.motion.max_speed = value,
                    0xE5 => self.motion.starting_speed = value,
                    0xEA => self.motion.max_accel = value,
                    0xE9 => self.motion.max_decel = value,
                    _ => {}
                }
            }
        }
        self.refresh_operation_state();
        Ok(())
    }

    fn advance(&mut self) {
        self.reads = self.reads.wrapping_add(1);
        let moving = self.energized && self.operation_state == OP_NORMAL;
        if moving {
            let steps_per_sec = f64::from(self.motion.max_speed) / 10_000.0;
            let max_step = ((steps_per_sec * self.step_secs).round() as i64).max(1);
            let delta = i64::from(self.target_position) - i64::from(self.current_position);
            let step = delta.clamp(-max_step, max_step);
            self.current_position = (i64::from(self.current_position) + step) as i32;
            let velocity = (step as f64 / self.step_secs) * 10_000.0;
            self.current_velocity = velocity.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        } else {
            self.current_velocity = 0;
        }

        let mut sag: u32 = 0;
        if self.energized {
            sag += 300;
        }
        if self.motion.max_speed > 0 {
            let load = f64::from(self.current_velocity.unsigned_abs())
                / f64::from(self.motion.max_speed);
            sag += (load.min(1.0) * 900.0) as u32;
        }
        let ripple = (self.reads % 7) * 10;
        let vin = u32::from(self.vin_nominal_mv)
            .saturating_sub(sag)
            .saturating_add(ripple);
        self.vin_mv = vin.min(u32::from(u16::MAX)) as u16;
    }

    fn variables(&self, size: usize) -> Vec<u8> {
        let mut v = vec![0u8; size.max(0x5A)];
        v[0x00] = self.operation_state;
        v[0x01] = u8::from(self.energized);
        let status = self.error_status | self.injected;
        v[0x02..0x04].copy_from_slice(&status.to_le_bytes());
        let occurred = self.errors_occurred | u32::from(self.injected);
        v[0x04..0x08].copy_from_slice(&occurred.to_le_bytes());
        v[0x09] = 1;
        v[0x0A..0x0E].copy_from_slice(&self.target_position.to_le_bytes());
        v[0x12..0x16].copy_from_slice(&self.motion.starting_speed.to_le_bytes());
        v[0x16..0x1A].copy_from_slice(&self.motion.max_speed.to_le_bytes());
        v[0x1A..0x1E].copy_from_slice(&self.motion.max_decel.to_le_bytes());
        v[0x1E..0x22].copy_from_slice(&self.motion.max_accel.to_le_bytes());
        v[0x22..0x26].copy_from_slice(&self.current_position.to_le_bytes());
        v[0x26..0x2A].copy_from_slice(&self.current_velocity.to_le_bytes());
        v[0x2A..0x2E].copy_from_slice(&self.target_position.to_le_bytes());
        v[0x33..0x35].copy_from_slice(&self.vin_mv.to_le_bytes());
        v[0x35..0x39].copy_from_slice(&self.reads.wrapping_mul(16).to_le_bytes());
        v[0x49] = self.motion.step_mode;
        v[0x4A] = self.motion.current_limit_code;
        v[0x4B] = self.motion.decay_mode;
        if self.product_id == PRODUCT_ID_T249 {
            v[0x56] = 1;
        }
        v.truncate(size);
        v
    }
}

fn decode_u32(payload: &[u8]) -> u32 {
    let msbs = payload[0];
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = payload[1 + i] | (((msbs >> i) & 1) << 7);
    }
    u32::from_le_bytes(bytes)
}

/// Shared handle for poking at a simulated device from tests and the CLI.
#[derive(Debug, Clone)]
pub struct SimHandle(Rc<RefCell<SimDevice>>);

impl SimHandle {
    /// OR extra bits into the reported error status (e.g. kill switch = bit 3).
    pub fn inject_errors(&self, bits: u16) {
        let mut dev = self.0.borrow_mut();
        dev.injected |= bits;
        dev.refresh_operation_state();
    }

    pub fn clear_injected_errors(&self) {
        let mut dev = self.0.borrow_mut();
        dev.injected = 0;
        dev.refresh_operation_state();
    }

    /// Make the next `n` queries fail with a link timeout.
    pub fn fail_next_queries(&self, n: u32) {
        self.0.borrow_mut().pending_timeouts = n;
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.0.borrow_mut().disconnected = disconnected;
    }

    pub fn set_vin_mv(&self, mv: u16) {
        self.0.borrow_mut().vin_nominal_mv = mv;
    }

    /// Simulated seconds of travel per variable read.
    pub fn set_step_secs(&self, secs: f64) {
        self.0.borrow_mut().step_secs = secs.max(1e-6);
    }

    pub fn energized(&self) -> bool {
        self.0.borrow().energized
    }

    pub fn target_position(&self) -> i32 {
        self.0.borrow().target_position
    }

    pub fn current_position(&self) -> i32 {
        self.0.borrow().current_position
    }

    pub fn setting_byte(&self, offset: usize) -> Option<u8> {
        self.0.borrow().settings.get(offset).copied()
    }

    /// Opcodes accepted so far, in arrival order.
    pub fn command_log(&self) -> Vec<u8> {
        self.0.borrow().commands.clone()
    }
}

/// Session half of the simulation.
#[derive(Debug, Clone)]
pub struct SimulatedTic {
    dev: Rc<RefCell<SimDevice>>,
}

impl SimulatedTic {
    pub fn new(product_id: u16) -> Self {
        Self {
            dev: Rc::new(RefCell::new(SimDevice::new(product_id))),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle(Rc::clone(&self.dev))
    }
}

impl DeviceSession for SimulatedTic {
    fn send(&mut self, command: &[u8]) -> Result<(), BoxError> {
        let mut dev = self.dev.borrow_mut();
        if dev.disconnected {
            return Err(Box::new(LinkError::Disconnected));
        }
        dev.apply(command).map_err(|e| -> BoxError { Box::new(e) })
    }

    fn query(&mut self, opcode: u8, size: usize) -> Result<Vec<u8>, BoxError> {
        let mut dev = self.dev.borrow_mut();
        if dev.disconnected {
            return Err(Box::new(LinkError::Disconnected));
        }
        if dev.pending_timeouts > 0 {
            dev.pending_timeouts -= 1;
            return Err(Box::new(LinkError::Timeout));
        }
        match opcode {
            0xA1 | 0xA2 => {
                dev.advance();
                let block = dev.variables(size);
                if opcode == 0xA2 {
                    dev.errors_occurred = 0;
                }
                Ok(block)
            }
            0xA8 => {
                let mut block = dev.settings.to_vec();
                block.resize(size, 0);
                Ok(block)
            }
            other => Err(Box::new(LinkError::Rejected(other))),
        }
    }
}

/// Enumerator exposing a fixed set of simulated controllers.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEnumerator {
    devices: Vec<(DeviceDescriptor, SimulatedTic)>,
}

impl SimulatedEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one simulated controller; returns its handle for fault injection.
    pub fn with_device(mut self, serial_number: &str, product_id: u16) -> Self {
        let tic = SimulatedTic::new(product_id);
        let short_name = match product_id {
            PRODUCT_ID_T249 => "T249",
            PRODUCT_ID_T825 => "T825",
            _ => "Tic",
        };
        self.devices.push((
            DeviceDescriptor {
                serial_number: serial_number.to_string(),
                short_name: short_name.to_string(),
                product_id,
            },
            tic,
        ));
        self
    }

    pub fn handle(&self, serial_number: &str) -> Option<SimHandle> {
        self.devices
            .iter()
            .find(|(d, _)| d.serial_number == serial_number)
            .map(|(_, tic)| tic.handle())
    }
}

impl DeviceEnumerator for SimulatedEnumerator {
    type Session = SimulatedTic;

    fn list(&self) -> Result<Vec<DeviceDescriptor>, BoxError> {
        Ok(self.devices.iter().map(|(d, _)| d.clone()).collect())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<SimulatedTic, BoxError> {
        self.devices
            .iter()
            .find(|(d, _)| d == device)
            .map(|(_, tic)| tic.clone())
            .ok_or_else(|| -> BoxError { Box::new(LinkError::Disconnected) })
    }
}
