//! End-to-end behaviour against the simulated controller.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tictune_core::protocol::settings::SETTING_MAX_SPEED;
use tictune_core::{
    RunOptions, SequencerState, StopReason, TickStatus, TrainingCfg, TrainingPhase, Tuner,
    WaveformMode, open_session, run,
};
use tictune_hardware::{PRODUCT_ID_T825, SimHandle, SimulatedEnumerator, SimulatedTic};
use tictune_traits::clock::test_clock::TestClock;

const KILL_SWITCH: u16 = 1 << 3;

fn sim_tuner(mode: WaveformMode) -> (Tuner<SimulatedTic>, SimHandle) {
    let en = SimulatedEnumerator::new().with_device("00000001", PRODUCT_ID_T825);
    let handle = en.handle("00000001").unwrap();
    let opened = open_session(&en, None).unwrap();
    let tuner = Tuner::builder()
        .with_opened(opened)
        .with_mode(mode)
        .try_build()
        .unwrap();
    (tuner, handle)
}

#[test]
fn sine_motion_reaches_the_device() {
    let (mut tuner, sim) = sim_tuner(WaveformMode::Sine);
    assert!(!sim.energized());
    tuner.energize().unwrap();
    let mut moved = 0;
    for i in 0..120u32 {
        let status = tuner.tick(f64::from(i) / 60.0).unwrap().status;
        if matches!(status, TickStatus::Moved { .. }) {
            moved += 1;
        }
    }
    assert!(moved > 100);
    assert!(sim.energized());
    assert_eq!(sim.target_position(), tuner.target().unwrap());
    assert_ne!(sim.current_position(), 0);
    assert_eq!(tuner.telemetry().position.len(), 120);
}

#[test]
fn kill_switch_stops_motion_until_re_energized() {
    let (mut tuner, sim) = sim_tuner(WaveformMode::Sine);
    tuner.energize().unwrap();
    tuner.tick(0.0).unwrap();
    tuner.tick(0.5).unwrap();

    sim.inject_errors(KILL_SWITCH);
    assert!(tuner.tick(1.0).unwrap().status.is_fault());
    let held = sim.target_position();

    sim.clear_injected_errors();
    for i in 0..30u32 {
        assert!(tuner.tick(1.0 + f64::from(i) * 0.1).unwrap().status.is_fault());
    }
    assert_eq!(sim.target_position(), held);

    tuner.energize().unwrap();
    assert!(matches!(
        tuner.tick(5.0).unwrap().status,
        TickStatus::Moved { .. }
    ));
    assert_ne!(sim.target_position(), held);
}

#[test]
fn disconnect_is_reported_and_recovered() {
    let (mut tuner, sim) = sim_tuner(WaveformMode::DoubleSine);
    tuner.energize().unwrap();
    tuner.tick(0.0).unwrap();
    sim.set_disconnected(true);
    let status = tuner.tick(0.1).unwrap().status;
    assert!(matches!(status, TickStatus::CommunicationFailure(_)));
    assert_eq!(tuner.sequencer_state(), SequencerState::Energized);
    sim.set_disconnected(false);
    assert!(matches!(tuner.tick(0.3).unwrap().status, TickStatus::Moved { .. }));
}

#[test]
fn applied_settings_land_in_the_device() {
    let (mut tuner, sim) = sim_tuner(WaveformMode::None);
    tuner.set_max_speed(10_000_000);
    assert!(tuner.has_pending_changes());
    let written = tuner.apply_settings().unwrap();
    assert!(written >= 1);
    assert_eq!(
        sim.setting_byte(SETTING_MAX_SPEED),
        Some(10_000_000u32.to_le_bytes()[0])
    );
    assert_eq!(tuner.settings().max_speed, 10_000_000);
    assert!(sim.command_log().contains(&0x10));
}

#[test]
fn auto_apply_pushes_edits_on_the_next_tick() {
    let (mut tuner, sim) = sim_tuner(WaveformMode::None);
    tuner.set_auto_apply(true);
    tuner.set_link_decel(true);
    tuner.set_max_accel(123_400);
    tuner.tick(0.0).unwrap();
    assert!(!tuner.has_pending_changes());
    assert_eq!(tuner.settings().max_decel, 123_400);
    assert!(sim.command_log().contains(&0x13));
}

#[test]
fn training_runs_to_completion_under_the_runner() {
    let en = SimulatedEnumerator::new().with_device("T", PRODUCT_ID_T825);
    let opened = open_session(&en, Some("T")).unwrap();
    let mut tuner = Tuner::builder()
        .with_opened(opened)
        .with_training(TrainingCfg { phase_secs: 1.0 })
        .with_window(30)
        .try_build()
        .unwrap();
    tuner.start_training();

    let clock = TestClock::new();
    let opts = RunOptions {
        tick_hz: 60,
        max_duration: Some(Duration::from_secs(30)),
        stop_when_training_done: true,
    };
    let mut phases = Vec::new();
    let summary = run(&mut tuner, &clock, &opts, &AtomicBool::new(false), |_, r| {
        if let Some(p) = r.phase
            && phases.last() != Some(&p)
        {
            phases.push(p);
        }
    })
    .unwrap();

    assert_eq!(summary.stop, StopReason::TrainingDone);
    assert_eq!(
        phases,
        vec![
            TrainingPhase::Idle,
            TrainingPhase::Energized,
            TrainingPhase::Slow,
            TrainingPhase::Faster,
            TrainingPhase::Load,
            TrainingPhase::Done,
        ]
    );
    let results = summary.training.unwrap();
    assert_eq!(results.valid_flags(), [true; 5]);
    // energizing alone sags the supply
    assert!(results.energized.max < results.idle.min);
    assert_eq!(tuner.sequencer_state(), SequencerState::Idle);
    assert_eq!(summary.faults, 0);
}
