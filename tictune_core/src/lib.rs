#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core tuning logic for Pololu Tic stepper controllers (transport-agnostic).
//!
//! All device I/O goes through `tictune_traits::DeviceSession`; this crate
//! never opens a port itself.
//!
//! ## Architecture
//!
//! - **Protocol**: command framing and variable/setting block codecs (`protocol`)
//! - **Waveforms**: normalized position requests over time (`waveform`)
//! - **Targets**: request to step-position mapping per step mode (`target`)
//! - **Safety**: energize/fault/target ordering (`sequencer`)
//! - **Training**: the scripted five-phase load measurement (`training`)
//! - **Telemetry**: bounded time-series windows (`telemetry`)
//! - **Tuner**: the per-tick composition of all of the above (`Tuner`)
//!
//! Positions are in microsteps of the active step mode; speeds in
//! microsteps per 10 000 s; accelerations in microsteps per 100 s².

pub mod builder;
pub mod config;
pub mod conversions;
pub mod error;
pub mod mocks;
pub mod protocol;
pub mod runner;
pub mod sequencer;
pub mod session;
pub mod status;
pub mod target;
pub mod telemetry;
pub mod training;
pub mod transport_error;
pub mod tuner;
pub mod util;
pub mod waveform;

pub use builder::TunerBuilder;
pub use config::{ControlCfg, MotorOverrides, TrainingCfg, TunerConfig};
pub use error::{
    BuildError, ControllerError, FaultReason, ProtocolError, Report, Result, TransportError,
};
pub use runner::{RunOptions, RunSummary, StopReason, run};
pub use sequencer::{SafetySequencer, SequencerState};
pub use session::{OpenedSession, list_devices, open_session};
pub use status::TickStatus;
pub use target::{StepModeRange, TargetMapper};
pub use telemetry::{Telemetry, TelemetryWindow};
pub use training::{PhaseResult, TrainingPhase, TrainingResults, TrainingSupervisor};
pub use tuner::{TickReport, Tuner};
pub use waveform::{WaveformGenerator, WaveformMode};
