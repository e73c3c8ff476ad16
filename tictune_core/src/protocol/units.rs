//! Device units and the step-mode enumeration.
//!
//! Speeds are steps/s x 10000, accelerations steps/s^2 x 100, voltages mV.
//! Current limits travel as a product-specific code; see `CurrentScale`.

use std::fmt;

use crate::error::ProtocolError;

pub const SPEED_UNITS_PER_HZ: u32 = 10_000;
pub const ACCEL_UNITS_PER_HZ2: u32 = 100;
pub const MAX_ALLOWED_SPEED: u32 = 500_000_000;
pub const MIN_ALLOWED_ACCEL: u32 = 100;
pub const MAX_ALLOWED_ACCEL: u32 = 0x7FFF_FFFF;
pub const MAX_ALLOWED_COMMAND_TIMEOUT: u16 = 60_000;

/// Speed in device units to steps per second.
#[inline]
pub fn speed_to_steps_per_sec(units: i64) -> f64 {
    units as f64 / f64::from(SPEED_UNITS_PER_HZ)
}

/// Acceleration in device units to steps per second squared.
#[inline]
pub fn accel_to_steps_per_sec2(units: u32) -> f64 {
    f64::from(units) / f64::from(ACCEL_UNITS_PER_HZ2)
}

#[inline]
pub fn millivolts_to_volts(mv: u16) -> f64 {
    f64::from(mv) / 1000.0
}

/// Microstepping resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepMode {
    Full = 0,
    Half = 1,
    Micro4 = 2,
    Micro8 = 3,
    Micro16 = 4,
    Micro32 = 5,
    /// Half stepping with 100% coil current on the T249.
    Half100 = 6,
    Micro64 = 7,
    Micro128 = 8,
    Micro256 = 9,
}

impl StepMode {
    pub const ALL: [Self; 10] = [
        Self::Full,
        Self::Half,
        Self::Micro4,
        Self::Micro8,
        Self::Micro16,
        Self::Micro32,
        Self::Half100,
        Self::Micro64,
        Self::Micro128,
        Self::Micro256,
    ];

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(ProtocolError::InvalidValue {
                field: "step mode",
                value: i64::from(code),
            })
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Travel range multiplier: full through 1/32 double per level, anything
    /// else keeps the base range.
    pub const fn range_multiplier(self) -> i32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Micro4 => 4,
            Self::Micro8 => 8,
            Self::Micro16 => 16,
            Self::Micro32 => 32,
            Self::Half100 | Self::Micro64 | Self::Micro128 | Self::Micro256 => 1,
        }
    }
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "full step",
            Self::Half => "1/2 step",
            Self::Micro4 => "1/4 step",
            Self::Micro8 => "1/8 step",
            Self::Micro16 => "1/16 step",
            Self::Micro32 => "1/32 step",
            Self::Half100 => "1/2 step 100%",
            Self::Micro64 => "1/64 step",
            Self::Micro128 => "1/128 step",
            Self::Micro256 => "1/256 step",
        };
        f.write_str(s)
    }
}

/// Milliamps per current-limit code on the T500, indexed by code.
pub const T500_CURRENT_TABLE: [u16; 33] = [
    0, 1, 174, 343, 495, 634, 762, 880, 990, 1092, 1189, 1281, 1368, 1452, 1532, 1611, 1687, 1762,
    1835, 1909, 1982, 2056, 2131, 2207, 2285, 2366, 2451, 2540, 2634, 2734, 2843, 2962, 3093,
];

/// Current-limit code scaling of one product family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurrentScale {
    /// `ma = code * micro_amps_per_code / 1000`, rounded down.
    Linear { micro_amps_per_code: u32 },
    /// `ma = table[code]`.
    Table(&'static [u16]),
}

impl CurrentScale {
    /// Milliamps for a code. Codes past the table end are invalid.
    pub fn code_to_ma(self, code: u8) -> Result<u32, ProtocolError> {
        match self {
            Self::Linear { micro_amps_per_code } => {
                Ok(u32::from(code) * micro_amps_per_code / 1000)
            }
            Self::Table(table) => table
                .get(usize::from(code))
                .map(|ma| u32::from(*ma))
                .ok_or(ProtocolError::InvalidValue {
                    field: "current limit code",
                    value: i64::from(code),
                }),
        }
    }

    /// Largest code whose current does not exceed `ma`, capped at `max_ma`.
    pub fn ma_to_code(self, ma: u32, max_ma: u32) -> u8 {
        let ma = ma.min(max_ma);
        match self {
            Self::Linear { micro_amps_per_code } => {
                let code = u64::from(ma) * 1000 / u64::from(micro_amps_per_code.max(1));
                // Rounding down in code_to_ma can make code+1 still fit.
                let mut code = code.min(0x7F) as u8;
                while code < 0x7F
                    && self
                        .code_to_ma(code + 1)
                        .is_ok_and(|next| next <= ma)
                {
                    code += 1;
                }
                code
            }
            Self::Table(table) => table
                .iter()
                .rposition(|entry| u32::from(*entry) <= ma)
                .map_or(0, |i| i as u8),
        }
    }

    /// Widest gap between neighbouring codes, in mA.
    pub fn quantization_ma(self) -> u32 {
        match self {
            Self::Linear { micro_amps_per_code } => micro_amps_per_code.div_ceil(1000),
            Self::Table(table) => table
                .windows(2)
                .map(|w| u32::from(w[1].saturating_sub(w[0])))
                .max()
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StepMode::Full, 1)]
    #[case(StepMode::Half, 2)]
    #[case(StepMode::Micro8, 8)]
    #[case(StepMode::Micro32, 32)]
    #[case(StepMode::Half100, 1)]
    #[case(StepMode::Micro256, 1)]
    fn multipliers(#[case] mode: StepMode, #[case] mult: i32) {
        assert_eq!(mode.range_multiplier(), mult);
    }

    #[test]
    fn unknown_step_mode_is_rejected() {
        assert!(StepMode::from_code(10).is_err());
        assert_eq!(StepMode::from_code(9).unwrap(), StepMode::Micro256);
    }

    #[test]
    fn linear_scale_rounds_down() {
        let s = CurrentScale::Linear {
            micro_amps_per_code: 71_615,
        };
        assert_eq!(s.code_to_ma(127).unwrap(), 9095);
        assert_eq!(s.ma_to_code(9095, 9095), 127);
        assert_eq!(s.ma_to_code(100, 9095), 1);
        let s = CurrentScale::Linear {
            micro_amps_per_code: 32_000,
        };
        assert_eq!(s.ma_to_code(1000, 3968), 31);
        assert_eq!(s.ma_to_code(10_000, 3968), 124);
    }

    #[test]
    fn table_scale_picks_floor_entry() {
        let s = CurrentScale::Table(&T500_CURRENT_TABLE);
        assert_eq!(s.ma_to_code(1000, 3093), 8);
        assert_eq!(s.code_to_ma(8).unwrap(), 990);
        assert_eq!(s.ma_to_code(5000, 3093), 32);
        assert!(s.code_to_ma(33).is_err());
        assert_eq!(s.quantization_ma(), 173);
    }
}
