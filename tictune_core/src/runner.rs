use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use tictune_traits::{Clock, DeviceSession};

use crate::error::{Report, Result};
use crate::status::TickStatus;
use crate::training::TrainingResults;
use crate::tuner::{TickReport, Tuner};

/// When and how fast to tick.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub tick_hz: u32,
    /// Stop after this much loop time (pauses included).
    pub max_duration: Option<Duration>,
    /// Stop as soon as the training script reaches Done.
    pub stop_when_training_done: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            max_duration: None,
            stop_when_training_done: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    Shutdown,
    Duration,
    TrainingDone,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks that sent a new target.
    pub moves: u64,
    /// Transitions into the faulted state.
    pub faults: u64,
    pub comm_failures: u64,
    /// Pause-aware elapsed seconds at the last tick.
    pub elapsed_secs: f64,
    pub training: Option<TrainingResults>,
    pub stop: StopReason,
}

/// Tick `tuner` at `opts.tick_hz` until shutdown, the duration limit, or
/// training completion. The motor is de-energized on the way out.
///
/// Ticks are scheduled on a fixed grid; a slow tick is not followed by a burst
/// of catch-up ticks.
pub fn run<S, C, F>(
    tuner: &mut Tuner<S>,
    clock: &C,
    opts: &RunOptions,
    shutdown: &AtomicBool,
    mut on_tick: F,
) -> Result<RunSummary>
where
    S: DeviceSession,
    C: Clock,
    F: FnMut(&Tuner<S>, &TickReport),
{
    let period = crate::util::tick_period(opts.tick_hz);
    let epoch = clock.now();
    let mut next = epoch;
    let mut summary = RunSummary::default();
    let mut was_faulted = false;
    tracing::info!(tick_hz = opts.tick_hz, max_duration = ?opts.max_duration, "run start");

    let stop = loop {
        if shutdown.load(Ordering::Relaxed) {
            break StopReason::Shutdown;
        }
        let now = clock.secs_since(epoch);
        if let Some(max) = opts.max_duration
            && now >= max.as_secs_f64()
        {
            break StopReason::Duration;
        }

        let report = match tuner.tick(now) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "control loop aborted");
                if let Err(de) = tuner.deenergize() {
                    tracing::warn!(error = %de, "de-energize after abort failed");
                }
                return Err(Report::new(e)).wrap_err("control tick failed");
            }
        };
        summary.ticks += 1;
        summary.elapsed_secs = report.elapsed;
        match &report.status {
            TickStatus::Moved { .. } => summary.moves += 1,
            TickStatus::CommunicationFailure(_) => summary.comm_failures += 1,
            TickStatus::Faulted(_) if !was_faulted => summary.faults += 1,
            _ => {}
        }
        was_faulted = report.status.is_fault();
        on_tick(tuner, &report);

        if opts.stop_when_training_done && tuner.training().is_some_and(|t| t.is_done()) {
            break StopReason::TrainingDone;
        }

        next += period;
        let now = clock.now();
        if next > now {
            clock.sleep(next - now);
        } else {
            next = now;
        }
    };

    if let Err(e) = tuner.deenergize() {
        tracing::warn!(error = %e, "final de-energize failed");
    }
    summary.training = tuner.training().map(|t| *t.results());
    summary.stop = stop;
    tracing::info!(
        ticks = summary.ticks,
        moves = summary.moves,
        faults = summary.faults,
        comm_failures = summary.comm_failures,
        ?stop,
        "run complete"
    );
    Ok(summary)
}
