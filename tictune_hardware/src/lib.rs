//! Transports for the tuner: a byte-accurate simulated controller and, with the
//! `hardware` feature, a serial link to a real one.

pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;

pub use error::LinkError;
pub use sim::{PRODUCT_ID_T249, PRODUCT_ID_T825, SimHandle, SimulatedEnumerator, SimulatedTic};

/// Set setting (0x13) and reinitialize (0x10). Real controllers accept these
/// only as USB control transfers, never on the serial command port.
pub const USB_ONLY_OPCODES: [u8; 2] = [0x13, 0x10];

/// Reject frames a serial link cannot carry.
pub fn check_serial_frame(command: &[u8]) -> Result<(), LinkError> {
    match command.first() {
        Some(op) if USB_ONLY_OPCODES.contains(op) => Err(LinkError::Rejected(*op)),
        _ => Ok(()),
    }
}
