//! Maps `Box<dyn Error>` from the session boundary to typed `TransportError`.
//!
//! The traits in `tictune_traits` use `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed enum, with an
//! optional feature-gated path for `tictune_hardware::LinkError` downcasting.

use tictune_traits::DeviceSession;

use crate::error::TransportError;

/// Map a trait-boundary error to a typed `TransportError`.
///
/// Attempts to downcast known link error types first, then falls back
/// to string-based heuristics.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> TransportError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(link) = e.downcast_ref::<tictune_hardware::LinkError>() {
            return match link {
                tictune_hardware::LinkError::Timeout => TransportError::Timeout,
                tictune_hardware::LinkError::Disconnected => TransportError::Disconnected,
                other => TransportError::Io(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        TransportError::Timeout
    } else if lower.contains("disconnect") {
        TransportError::Disconnected
    } else {
        TransportError::Io(s)
    }
}

/// Send one frame, mapping the boxed error.
pub(crate) fn send<S: DeviceSession + ?Sized>(
    session: &mut S,
    frame: &[u8],
) -> Result<(), TransportError> {
    session.send(frame).map_err(|e| map_transport_error(e.as_ref()))
}

/// Read a whole block, mapping the boxed error.
pub(crate) fn query<S: DeviceSession + ?Sized>(
    session: &mut S,
    opcode: u8,
    size: usize,
) -> Result<Vec<u8>, TransportError> {
    session
        .query(opcode, size)
        .map_err(|e| map_transport_error(e.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristics_without_known_type() {
        let e = std::io::Error::other("read timed out");
        assert_eq!(map_transport_error(&e), TransportError::Timeout);
        let e = std::io::Error::other("device disconnected");
        assert_eq!(map_transport_error(&e), TransportError::Disconnected);
        let e = std::io::Error::other("broken");
        assert_eq!(map_transport_error(&e), TransportError::Io("broken".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_link_error() {
        let e = tictune_hardware::LinkError::Rejected(0x42);
        assert!(matches!(map_transport_error(&e), TransportError::Io(_)));
        let e = tictune_hardware::LinkError::Timeout;
        assert_eq!(map_transport_error(&e), TransportError::Timeout);
    }
}
