use thiserror::Error;

use crate::protocol::variables::{ErrorBits, OperationState};

/// Encode/decode failures. Against a correctly identified product these never
/// happen at runtime, so they are propagated rather than retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("operand {value} does not fit the {bits}-bit operand of opcode 0x{opcode:02X}")]
    OperandOutOfRange { opcode: u8, value: i64, bits: u8 },
    #[error("opcode 0x{opcode:02X} takes {expected} operand(s), got {got}")]
    ArityMismatch {
        opcode: u8,
        expected: usize,
        got: usize,
    },
    #[error("block truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
    #[error("unknown product id 0x{0:04X}")]
    UnknownProduct(u16),
    #[error("{field} is not supported on the {variant}")]
    FieldNotSupported {
        field: &'static str,
        variant: &'static str,
    },
    #[error("{field} = {value} is outside {min}..={max}")]
    SettingOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Link failures reported by a `DeviceSession`. Retried on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timeout waiting for device")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("communication failure: {0}")]
    CommunicationFailure(#[from] TransportError),
    #[error("no matching device found")]
    NoDeviceFound,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid state: {0}")]
    State(String),
}

/// Why a refreshed controller state counts as faulted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    #[error("device is in operation state {0}")]
    OperationState(OperationState),
    #[error("device reports errors {0}")]
    DeviceErrors(ErrorBits),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing device session")]
    MissingSession,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
