//! Status returned from each control tick.

use crate::error::{FaultReason, TransportError};

/// Public status of a single sequencer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    /// De-energized; state was refreshed for telemetry only.
    Idle,
    /// Energized, interlock cleared, target unchanged (or none requested).
    Holding,
    /// Energized, interlock cleared, a new target was sent.
    Moved { target: i32 },
    /// Device reported a fault; no motion commands until re-energized.
    Faulted(FaultReason),
    /// The link failed this tick; retried on the next one.
    CommunicationFailure(TransportError),
}

impl TickStatus {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}
