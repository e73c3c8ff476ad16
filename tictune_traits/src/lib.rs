//! Device-facing seams shared by the tuner core, the transports and the CLI.
//!
//! Errors cross these traits as `Box<dyn Error + Send + Sync>` so a transport
//! can report whatever it has; `tictune_core` maps them to its typed
//! `TransportError` in one place.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every trait boundary in this crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An opened, exclusive request/response channel to one controller.
///
/// Every call is a bounded-latency exchange: implementations own the timeout
/// and must return an error instead of blocking indefinitely.
pub trait DeviceSession {
    /// Send one encoded command frame.
    fn send(&mut self, command: &[u8]) -> Result<(), BoxError>;

    /// Read `size` bytes of the block served by `opcode`, starting at offset 0.
    fn query(&mut self, opcode: u8, size: usize) -> Result<Vec<u8>, BoxError>;
}

impl<T: DeviceSession + ?Sized> DeviceSession for Box<T> {
    fn send(&mut self, command: &[u8]) -> Result<(), BoxError> {
        (**self).send(command)
    }

    fn query(&mut self, opcode: u8, size: usize) -> Result<Vec<u8>, BoxError> {
        (**self).query(opcode, size)
    }
}

/// One controller visible to an enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub serial_number: String,
    pub short_name: String,
    /// USB product id; identifies the product family and therefore the byte layouts.
    pub product_id: u16,
}

/// Lists attached controllers and opens sessions to them.
pub trait DeviceEnumerator {
    type Session: DeviceSession;

    fn list(&self) -> Result<Vec<DeviceDescriptor>, BoxError>;
    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Session, BoxError>;
}
