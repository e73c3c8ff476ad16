//! Pure encode/decode of command frames and the variable/setting blocks.
//! No I/O happens here.

pub mod layout;
pub mod opcodes;
pub mod settings;
pub mod units;
pub mod variables;

pub use layout::{ProductVariant, VariantLayout};
pub use opcodes::{Opcode, Shape, encode_command};
pub use settings::{
    ControllerSettings, SettingWrite, decode_settings, encode_settings, settings_diff,
};
pub use units::{CurrentScale, StepMode};
pub use variables::{ControllerState, ErrorBits, OperationState, decode_variables};
