use tictune_core::TelemetryWindow;
use tictune_core::mocks::RecordingSession;
use tictune_core::protocol::ProductVariant;
use tictune_core::{Tuner, WaveformMode};

#[test]
fn capacity_three_keeps_the_newest_samples() {
    let mut w = TelemetryWindow::new(3);
    for (t, v) in [(0.0, 5.0), (1.0, 7.0), (2.0, 1.0), (3.0, 9.0)] {
        w.push(t, v);
    }
    assert_eq!(
        w.samples().collect::<Vec<_>>(),
        vec![(1.0, 7.0), (2.0, 1.0), (3.0, 9.0)]
    );
    assert_eq!(w.min(), Some(1.0));
    assert_eq!(w.max(), Some(9.0));
    let avg = w.average().unwrap();
    assert!((avg - 17.0 / 3.0).abs() < 1e-12);
}

#[test]
fn extremes_forget_evicted_samples() {
    let mut w = TelemetryWindow::new(2);
    w.push(0.0, 100.0);
    w.push(1.0, 1.0);
    w.push(2.0, 2.0);
    assert_eq!(w.max(), Some(2.0));
    assert_eq!(w.min(), Some(1.0));
}

#[test]
fn empty_window_has_no_statistics() {
    let mut w = TelemetryWindow::new(0);
    assert_eq!(w.capacity(), 1);
    assert_eq!(w.average(), None);
    w.push(0.0, 3.0);
    w.clear();
    assert!(w.is_empty());
    assert_eq!(w.min(), None);
}

#[test]
fn zero_vin_skips_percentage_series() {
    let mut dev = RecordingSession::new(ProductVariant::T825);
    dev.set_vin_mv(0);
    let mut tuner = Tuner::builder()
        .with_session(dev, ProductVariant::T825)
        .with_mode(WaveformMode::None)
        .try_build()
        .unwrap();
    tuner.tick(0.0).unwrap();
    tuner.tick(0.1).unwrap();
    let tel = tuner.telemetry();
    assert_eq!(tel.vin.len(), 2);
    assert_eq!(tel.vin_min.len(), 2);
    assert!(tel.vin_avg_pct.is_empty());
    assert!(tel.vin_min_pct.is_empty());

    tuner.session_mut().set_vin_mv(12_000);
    tuner.tick(0.2).unwrap();
    let tel = tuner.telemetry();
    assert_eq!(tel.vin_avg_pct.len(), 1);
    // avg of (0, 0, 12) against 12 V
    let pct = tel.vin_avg_pct.last().unwrap().1;
    assert!((pct - 100.0 / 3.0).abs() < 1e-9);
}
