use tictune_core::mocks::RecordingSession;
use tictune_core::protocol::ProductVariant;
use tictune_core::transport_error::map_transport_error;
use tictune_core::{BuildError, ControllerError, TransportError, Tuner};
use tictune_hardware::LinkError;

#[test]
fn link_errors_map_to_typed_transport_errors() {
    assert_eq!(map_transport_error(&LinkError::Timeout), TransportError::Timeout);
    assert_eq!(
        map_transport_error(&LinkError::Disconnected),
        TransportError::Disconnected
    );
    let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
    assert_eq!(
        map_transport_error(&LinkError::Io(io)),
        TransportError::Io("io: operation timed out".into())
    );
}

#[test]
fn unknown_errors_fall_back_to_message_heuristics() {
    let e = std::io::Error::other("port vanished: disconnected");
    assert_eq!(map_transport_error(&e), TransportError::Disconnected);
}

#[test]
fn startup_comm_failure_bubbles_through_eyre() {
    let mut dev = RecordingSession::new(ProductVariant::T249);
    dev.fail_next_queries(2);
    let report = Tuner::builder()
        .with_session(dev, ProductVariant::T249)
        .try_build()
        .unwrap_err();
    assert!(format!("{report:#}").contains("tuner startup failed"));
    assert_eq!(
        report.downcast_ref::<ControllerError>(),
        Some(&ControllerError::CommunicationFailure(TransportError::Timeout))
    );
}

#[test]
fn zero_window_is_a_build_error() {
    let report = Tuner::builder()
        .with_session(RecordingSession::new(ProductVariant::T825), ProductVariant::T825)
        .with_window(0)
        .try_build()
        .unwrap_err();
    assert_eq!(
        report.downcast_ref::<BuildError>(),
        Some(&BuildError::InvalidConfig("telemetry window must be >= 1"))
    );
}
