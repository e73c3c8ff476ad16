//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use tictune_core::WaveformMode;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "tictune", version, about = "Stepper controller tuner")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/tictune.toml")]
    pub config: PathBuf,

    /// Print results and logs as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Use the simulated controller instead of a serial port
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Open only the controller with this serial number; overrides [device].serial_number
    #[arg(long, value_name = "SERIAL")]
    pub serial: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List attached controllers
    List,
    /// Drive the motor with a waveform
    Run {
        /// none | sine | double-sine | triple-blend | ping-pong
        #[arg(long, default_value = "sine")]
        mode: WaveformMode,
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long, value_name = "SECS")]
        seconds: Option<f64>,
        /// Fixed target position (steps) used when the mode is `none`
        #[arg(long, value_name = "STEPS", allow_hyphen_values = true)]
        target: Option<i32>,
        /// Write the telemetry window to this CSV file when the run ends
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Run the scripted training sequence and report VIN per phase
    Train {
        /// Write per-phase results to this CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Print the controller's settings (after [motor] overrides are applied)
    Settings,
    /// Quick health check (device presence and state read)
    SelfCheck,
}
