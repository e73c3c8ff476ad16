//! Timed training script: Idle -> Energized -> Slow -> Faster -> Load -> Done.
//!
//! Each named phase has a setup step (one side effect) followed by a collect
//! window. When the window expires the VIN statistics are snapshotted into
//! that phase's result and the next phase's setup runs in the same tick.
//! Deadlines are elapsed-time based, so variable tick rates are fine.
//!
//! A phase whose setup never reached the device is snapshotted as invalid:
//! its statistics were collected under the wrong load condition.

use std::fmt;

use crate::telemetry::TelemetryWindow;
use crate::waveform::WaveformMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainingPhase {
    Idle,
    Energized,
    Slow,
    Faster,
    Load,
    Done,
}

impl TrainingPhase {
    /// Phases that collect results, in order.
    pub const COLLECTING: [Self; 5] = [
        Self::Idle,
        Self::Energized,
        Self::Slow,
        Self::Faster,
        Self::Load,
    ];

    const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Energized,
            Self::Energized => Self::Slow,
            Self::Slow => Self::Faster,
            Self::Faster => Self::Load,
            Self::Load | Self::Done => Self::Done,
        }
    }

    const fn index(self) -> Option<usize> {
        match self {
            Self::Idle => Some(0),
            Self::Energized => Some(1),
            Self::Slow => Some(2),
            Self::Faster => Some(3),
            Self::Load => Some(4),
            Self::Done => None,
        }
    }
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Energized => "energized",
            Self::Slow => "slow",
            Self::Faster => "faster",
            Self::Load => "load",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Setup,
    Collect { deadline: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingState {
    pub phase: TrainingPhase,
    pub stage: Stage,
}

impl TrainingState {
    pub const START: Self = Self {
        phase: TrainingPhase::Idle,
        stage: Stage::Setup,
    };

    pub fn is_done(&self) -> bool {
        self.phase == TrainingPhase::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingEffect {
    Deenergize,
    Energize,
    SelectMode(WaveformMode),
    /// Store the current VIN statistics against this phase.
    Snapshot(TrainingPhase),
}

fn setup_effects(phase: TrainingPhase) -> &'static [TrainingEffect] {
    use TrainingEffect as E;
    match phase {
        TrainingPhase::Idle => &[E::Deenergize],
        TrainingPhase::Energized => &[E::Energize, E::SelectMode(WaveformMode::None)],
        TrainingPhase::Slow => &[E::Energize, E::SelectMode(WaveformMode::Sine)],
        TrainingPhase::Faster => &[E::Energize, E::SelectMode(WaveformMode::TripleBlend)],
        TrainingPhase::Load => &[E::Energize, E::SelectMode(WaveformMode::PingPong)],
        TrainingPhase::Done => &[],
    }
}

/// Advance the script to `elapsed`. Pure: effects are returned, not performed.
pub fn transition(
    mut state: TrainingState,
    elapsed: f64,
    phase_secs: f64,
) -> (TrainingState, Vec<TrainingEffect>) {
    let mut effects = Vec::new();
    loop {
        match (state.phase, state.stage) {
            (TrainingPhase::Done, _) => break,
            (phase, Stage::Setup) => {
                effects.extend_from_slice(setup_effects(phase));
                state.stage = Stage::Collect {
                    deadline: elapsed + phase_secs,
                };
            }
            (phase, Stage::Collect { deadline }) => {
                if elapsed <= deadline {
                    break;
                }
                effects.push(TrainingEffect::Snapshot(phase));
                if phase == TrainingPhase::Load {
                    effects.push(TrainingEffect::SelectMode(WaveformMode::None));
                    effects.push(TrainingEffect::Deenergize);
                }
                state = TrainingState {
                    phase: phase.next(),
                    stage: Stage::Setup,
                };
            }
        }
    }
    (state, effects)
}

/// VIN extremes captured at the end of one phase, in volts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseResult {
    pub min: f64,
    pub max: f64,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainingResults {
    pub idle: PhaseResult,
    pub energized: PhaseResult,
    pub slow: PhaseResult,
    pub faster: PhaseResult,
    pub load: PhaseResult,
}

impl TrainingResults {
    pub fn get(&self, phase: TrainingPhase) -> Option<&PhaseResult> {
        Some(match phase.index()? {
            0 => &self.idle,
            1 => &self.energized,
            2 => &self.slow,
            3 => &self.faster,
            _ => &self.load,
        })
    }

    fn get_mut(&mut self, phase: TrainingPhase) -> Option<&mut PhaseResult> {
        Some(match phase.index()? {
            0 => &mut self.idle,
            1 => &mut self.energized,
            2 => &mut self.slow,
            3 => &mut self.faster,
            _ => &mut self.load,
        })
    }

    /// `valid` flags in phase order.
    pub fn valid_flags(&self) -> [bool; 5] {
        [
            self.idle.valid,
            self.energized.valid,
            self.slow.valid,
            self.faster.valid,
            self.load.valid,
        ]
    }
}

/// Drives `transition` and owns the per-phase results.
#[derive(Debug, Clone)]
pub struct TrainingSupervisor {
    state: TrainingState,
    phase_secs: f64,
    results: TrainingResults,
    setup_outstanding: bool,
}

impl TrainingSupervisor {
    pub fn new(phase_secs: f64) -> Self {
        Self {
            state: TrainingState::START,
            phase_secs,
            results: TrainingResults::default(),
            setup_outstanding: false,
        }
    }

    /// Back to Idle setup with every result invalidated.
    pub fn restart(&mut self) {
        self.state = TrainingState::START;
        self.results = TrainingResults::default();
        self.setup_outstanding = false;
    }

    /// Whether a setup effect of the current phase is still undelivered.
    /// Set by whoever performs the effects; read when the phase expires.
    pub fn set_setup_outstanding(&mut self, outstanding: bool) {
        self.setup_outstanding = outstanding;
    }

    pub fn setup_outstanding(&self) -> bool {
        self.setup_outstanding
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn phase(&self) -> TrainingPhase {
        self.state.phase
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn results(&self) -> &TrainingResults {
        &self.results
    }

    /// Seconds left in the current collect window.
    pub fn remaining(&self, elapsed: f64) -> Option<f64> {
        match self.state.stage {
            Stage::Collect { deadline } if !self.is_done() => Some((deadline - elapsed).max(0.0)),
            _ => None,
        }
    }

    /// Advance to `elapsed`, store snapshots from `vin`, and return the
    /// effects the caller must perform on the device.
    pub fn step(&mut self, elapsed: f64, vin: &TelemetryWindow) -> Vec<TrainingEffect> {
        let before = self.state.phase;
        let (next, effects) = transition(self.state, elapsed, self.phase_secs);
        self.state = next;
        let mut out = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                TrainingEffect::Snapshot(phase) => {
                    let valid = !self.setup_outstanding;
                    if let Some(slot) = self.results.get_mut(phase) {
                        *slot = PhaseResult {
                            min: vin.min().unwrap_or(0.0),
                            max: vin.max().unwrap_or(0.0),
                            valid,
                        };
                        if valid {
                            tracing::info!(
                                %phase,
                                min = slot.min,
                                max = slot.max,
                                "training phase collected"
                            );
                        } else {
                            tracing::warn!(
                                %phase,
                                "training phase setup never delivered; result invalid"
                            );
                        }
                    }
                }
                other => out.push(other),
            }
        }
        if before != self.state.phase {
            tracing::info!(phase = %self.state.phase, elapsed, "training phase");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_runs_idle_setup_immediately() {
        let (s, fx) = transition(TrainingState::START, 0.0, 30.0);
        assert_eq!(fx, vec![TrainingEffect::Deenergize]);
        assert_eq!(
            s,
            TrainingState {
                phase: TrainingPhase::Idle,
                stage: Stage::Collect { deadline: 30.0 }
            }
        );
    }

    #[test]
    fn expiry_is_strict_and_chains_into_next_setup() {
        let (s, _) = transition(TrainingState::START, 0.0, 30.0);
        let (s, fx) = transition(s, 30.0, 30.0);
        assert!(fx.is_empty());
        let (s, fx) = transition(s, 30.5, 30.0);
        assert_eq!(
            fx,
            vec![
                TrainingEffect::Snapshot(TrainingPhase::Idle),
                TrainingEffect::Energize,
                TrainingEffect::SelectMode(WaveformMode::None),
            ]
        );
        assert_eq!(s.stage, Stage::Collect { deadline: 60.5 });
    }

    #[test]
    fn load_expiry_stops_motion() {
        let s = TrainingState {
            phase: TrainingPhase::Load,
            stage: Stage::Collect { deadline: 1.0 },
        };
        let (s, fx) = transition(s, 2.0, 30.0);
        assert!(s.is_done());
        assert_eq!(
            fx,
            vec![
                TrainingEffect::Snapshot(TrainingPhase::Load),
                TrainingEffect::SelectMode(WaveformMode::None),
                TrainingEffect::Deenergize,
            ]
        );
        let (s2, fx) = transition(s, 1e9, 30.0);
        assert_eq!(s2, s);
        assert!(fx.is_empty());
    }

    #[test]
    fn late_tick_fires_one_advance_per_expired_window() {
        let (s, _) = transition(TrainingState::START, 0.0, 30.0);
        // Far past the Idle deadline: Idle expires, Energized setup anchors at 100.
        let (s, fx) = transition(s, 100.0, 30.0);
        assert_eq!(s.phase, TrainingPhase::Energized);
        assert_eq!(s.stage, Stage::Collect { deadline: 130.0 });
        assert_eq!(
            fx.iter()
                .filter(|e| matches!(e, TrainingEffect::Snapshot(_)))
                .count(),
            1
        );
    }

    #[test]
    fn supervisor_snapshots_vin_extremes() {
        let mut sup = TrainingSupervisor::new(1.0);
        let mut vin = TelemetryWindow::new(8);
        sup.step(0.0, &vin);
        vin.push(0.5, 11.5);
        vin.push(0.6, 12.1);
        let fx = sup.step(1.5, &vin);
        assert_eq!(
            fx,
            vec![
                TrainingEffect::Energize,
                TrainingEffect::SelectMode(WaveformMode::None)
            ]
        );
        let r = sup.results().get(TrainingPhase::Idle).unwrap();
        assert!(r.valid);
        assert_eq!((r.min, r.max), (11.5, 12.1));
        sup.restart();
        assert_eq!(sup.results().valid_flags(), [false; 5]);
        assert_eq!(sup.phase(), TrainingPhase::Idle);
    }

    #[test]
    fn outstanding_setup_invalidates_the_snapshot() {
        let mut sup = TrainingSupervisor::new(1.0);
        let vin = TelemetryWindow::new(4);
        sup.step(0.0, &vin);
        sup.set_setup_outstanding(true);
        sup.step(1.5, &vin);
        assert!(!sup.results().get(TrainingPhase::Idle).unwrap().valid);
        sup.restart();
        assert!(!sup.setup_outstanding());
    }
}
