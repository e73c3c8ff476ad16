//! Command opcodes and compact-protocol frame encoding.

use crate::error::ProtocolError;

/// Operand layout of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// No operands.
    Quick,
    /// One 7-bit operand.
    Seven,
    /// One signed 32-bit operand.
    Signed32,
    /// One unsigned 32-bit operand.
    Unsigned32,
    /// Block read: offset and length, 7 bits each.
    BlockRead,
    /// Setting write: offset and value, 8 bits each.
    SetSetting,
}

impl Shape {
    pub const fn arity(self) -> usize {
        match self {
            Self::Quick => 0,
            Self::Seven | Self::Signed32 | Self::Unsigned32 => 1,
            Self::BlockRead | Self::SetSetting => 2,
        }
    }

    /// Declared operand width in bits, 0 for quick commands.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Quick => 0,
            Self::Seven | Self::BlockRead => 7,
            Self::SetSetting => 8,
            Self::Signed32 | Self::Unsigned32 => 32,
        }
    }

    fn bounds(self) -> (i64, i64) {
        match self {
            Self::Quick => (0, 0),
            Self::Seven | Self::BlockRead => (0, 0x7F),
            Self::SetSetting => (0, 0xFF),
            Self::Signed32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            Self::Unsigned32 => (0, i64::from(u32::MAX)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetTargetPosition = 0xE0,
    SetTargetVelocity = 0xE3,
    HaltAndSetPosition = 0xEC,
    HaltAndHold = 0x89,
    GoHome = 0x97,
    ResetCommandTimeout = 0x8C,
    Deenergize = 0x86,
    Energize = 0x85,
    ExitSafeStart = 0x83,
    EnterSafeStart = 0x8F,
    Reset = 0xB0,
    ClearDriverError = 0x8A,
    SetMaxSpeed = 0xE6,
    SetStartingSpeed = 0xE5,
    SetMaxAccel = 0xEA,
    SetMaxDecel = 0xE9,
    SetStepMode = 0x94,
    SetCurrentLimit = 0x91,
    SetDecayMode = 0x92,
    SetAgcOption = 0x98,
    GetVariable = 0xA1,
    GetVariableAndClearErrorsOccurred = 0xA2,
    GetSetting = 0xA8,
    SetSetting = 0x13,
    Reinitialize = 0x10,
}

impl Opcode {
    pub const ALL: [Self; 25] = [
        Self::SetTargetPosition,
        Self::SetTargetVelocity,
        Self::HaltAndSetPosition,
        Self::HaltAndHold,
        Self::GoHome,
        Self::ResetCommandTimeout,
        Self::Deenergize,
        Self::Energize,
        Self::ExitSafeStart,
        Self::EnterSafeStart,
        Self::Reset,
        Self::ClearDriverError,
        Self::SetMaxSpeed,
        Self::SetStartingSpeed,
        Self::SetMaxAccel,
        Self::SetMaxDecel,
        Self::SetStepMode,
        Self::SetCurrentLimit,
        Self::SetDecayMode,
        Self::SetAgcOption,
        Self::GetVariable,
        Self::GetVariableAndClearErrorsOccurred,
        Self::GetSetting,
        Self::SetSetting,
        Self::Reinitialize,
    ];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    pub const fn shape(self) -> Shape {
        match self {
            Self::HaltAndHold
            | Self::ResetCommandTimeout
            | Self::Deenergize
            | Self::Energize
            | Self::ExitSafeStart
            | Self::EnterSafeStart
            | Self::Reset
            | Self::ClearDriverError
            | Self::Reinitialize => Shape::Quick,
            Self::GoHome
            | Self::SetStepMode
            | Self::SetCurrentLimit
            | Self::SetDecayMode
            | Self::SetAgcOption => Shape::Seven,
            Self::SetTargetPosition | Self::SetTargetVelocity | Self::HaltAndSetPosition => {
                Shape::Signed32
            }
            Self::SetMaxSpeed | Self::SetStartingSpeed | Self::SetMaxAccel | Self::SetMaxDecel => {
                Shape::Unsigned32
            }
            Self::GetVariable | Self::GetVariableAndClearErrorsOccurred | Self::GetSetting => {
                Shape::BlockRead
            }
            Self::SetSetting => Shape::SetSetting,
        }
    }
}

/// Encode one command frame.
///
/// Operands are checked against the opcode's arity and bit width; nothing is
/// silently truncated.
pub fn encode_command(opcode: Opcode, operands: &[i64]) -> Result<Vec<u8>, ProtocolError> {
    let shape = opcode.shape();
    if operands.len() != shape.arity() {
        return Err(ProtocolError::ArityMismatch {
            opcode: opcode.code(),
            expected: shape.arity(),
            got: operands.len(),
        });
    }
    let (min, max) = shape.bounds();
    if let Some(&value) = operands.iter().find(|v| **v < min || **v > max) {
        return Err(ProtocolError::OperandOutOfRange {
            opcode: opcode.code(),
            value,
            bits: shape.bits(),
        });
    }

    let op = opcode.code();
    let frame = match shape {
        Shape::Quick => vec![op],
        Shape::Seven => vec![op, operands[0] as u8],
        Shape::BlockRead => vec![op, operands[0] as u8, operands[1] as u8],
        Shape::Signed32 => encode_32(op, (operands[0] as i32).to_le_bytes()),
        Shape::Unsigned32 => encode_32(op, (operands[0] as u32).to_le_bytes()),
        Shape::SetSetting => {
            let offset = operands[0] as u8;
            let value = operands[1] as u8;
            let msbs = (offset >> 7) | ((value >> 7) << 1);
            vec![op, msbs, offset & 0x7F, value & 0x7F]
        }
    };
    Ok(frame)
}

fn encode_32(op: u8, bytes: [u8; 4]) -> Vec<u8> {
    let mut msbs = 0u8;
    for (i, b) in bytes.iter().enumerate() {
        msbs |= (b >> 7) << i;
    }
    vec![
        op,
        msbs,
        bytes[0] & 0x7F,
        bytes[1] & 0x7F,
        bytes[2] & 0x7F,
        bytes[3] & 0x7F,
    ]
}

/// Recover the 32-bit payload of a frame built by `encode_command`.
pub fn decode_32(frame: &[u8]) -> Result<u32, ProtocolError> {
    if frame.len() < 6 {
        return Err(ProtocolError::Truncated {
            needed: 6,
            got: frame.len(),
        });
    }
    let msbs = frame[1];
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = frame[2 + i] | (((msbs >> i) & 1) << 7);
    }
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_codes_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_code(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_code(0xFF), None);
    }

    #[test]
    fn quick_and_seven_bit_frames() {
        assert_eq!(encode_command(Opcode::ExitSafeStart, &[]).unwrap(), vec![0x83]);
        assert_eq!(encode_command(Opcode::SetStepMode, &[5]).unwrap(), vec![0x94, 5]);
        let err = encode_command(Opcode::SetStepMode, &[128]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::OperandOutOfRange {
                opcode: 0x94,
                value: 128,
                bits: 7
            }
        );
    }

    #[test]
    fn thirty_two_bit_frame_carries_top_bits_in_msbs() {
        // -1 = FF FF FF FF
        let f = encode_command(Opcode::SetTargetPosition, &[-1]).unwrap();
        assert_eq!(f, vec![0xE0, 0x0F, 0x7F, 0x7F, 0x7F, 0x7F]);
        assert_eq!(decode_32(&f).unwrap() as i32, -1);
        let f = encode_command(Opcode::SetMaxSpeed, &[i64::from(u32::MAX)]).unwrap();
        assert_eq!(decode_32(&f).unwrap(), u32::MAX);
        assert!(encode_command(Opcode::SetMaxSpeed, &[-1]).is_err());
        assert!(encode_command(Opcode::SetTargetPosition, &[i64::from(i32::MAX) + 1]).is_err());
    }

    #[test]
    fn set_setting_splits_offset_and_value_msbs() {
        let f = encode_command(Opcode::SetSetting, &[0x4F, 0xE0]).unwrap();
        assert_eq!(f, vec![0x13, 0x02, 0x4F, 0x60]);
    }

    #[test]
    fn arity_is_enforced() {
        let err = encode_command(Opcode::Energize, &[1]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ArityMismatch {
                expected: 0,
                got: 1,
                ..
            }
        ));
    }
}
