//! Command implementations: device selection, tuner assembly, the paced loop and output.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use serde_json::json;
use tictune_core::protocol::ControllerSettings;
use tictune_core::protocol::units::{accel_to_steps_per_sec2, speed_to_steps_per_sec};
use tictune_core::{
    FaultReason, Report, Result, RunOptions, RunSummary, StopReason, TickStatus, TrainingPhase,
    TrainingResults, Tuner, TunerConfig, WaveformMode, list_devices, open_session, run,
};
use tictune_traits::{DeviceDescriptor, DeviceEnumerator, DeviceSession, MonotonicClock};

/// The controller latched a fault during a run.
#[derive(Debug, thiserror::Error)]
#[error("device fault: {0}")]
pub struct DeviceFaulted(pub FaultReason);

/// Inputs shared by every command.
pub struct Ctx<'a> {
    pub cfg: &'a tictune_config::Config,
    pub serial: Option<&'a str>,
    pub json: bool,
    pub shutdown: &'a AtomicBool,
}

fn stop_name(stop: StopReason) -> &'static str {
    match stop {
        StopReason::Shutdown => "shutdown",
        StopReason::Duration => "duration",
        StopReason::TrainingDone => "training_done",
    }
}

fn open_tuner<E: DeviceEnumerator>(
    en: &E,
    ctx: &Ctx<'_>,
    mode: WaveformMode,
) -> Result<(Tuner<E::Session>, DeviceDescriptor)> {
    let mut opened = open_session(en, ctx.serial)
        .map_err(Report::new)
        .wrap_err("opening controller")?;
    if let Some(product) = ctx.cfg.device.product {
        opened = opened.with_variant(product.into());
    }
    let descriptor = opened.descriptor.clone();
    let tuner = Tuner::builder()
        .with_opened(opened)
        .with_config(TunerConfig::from(ctx.cfg))
        .with_mode(mode)
        .try_build()?;
    Ok((tuner, descriptor))
}

/// Run the paced loop; the first fault stops it and is returned alongside the summary.
fn run_until_fault<S: DeviceSession>(
    tuner: &mut Tuner<S>,
    ctx: &Ctx<'_>,
    opts: &RunOptions,
) -> Result<(RunSummary, Option<FaultReason>)> {
    let mut fault = None;
    let summary = run(tuner, &MonotonicClock::new(), opts, ctx.shutdown, |_, report| {
        if let TickStatus::Faulted(reason) = &report.status
            && fault.is_none()
        {
            tracing::error!(%reason, "device fault; stopping");
            fault = Some(*reason);
            ctx.shutdown.store(true, Ordering::Relaxed);
        }
    })?;
    Ok((summary, fault))
}

pub fn list<E: DeviceEnumerator>(en: &E, ctx: &Ctx<'_>) -> Result<()> {
    let devices = list_devices(en)
        .map_err(Report::new)
        .wrap_err("listing controllers")?;
    if ctx.json {
        let rows: Vec<_> = devices
            .iter()
            .map(|d| {
                json!({
                    "serial_number": d.serial_number,
                    "name": d.short_name,
                    "product_id": d.product_id,
                    "product": tictune_core::protocol::ProductVariant::from_product_id(d.product_id)
                        .map(|v| v.name())
                        .ok(),
                })
            })
            .collect();
        println!("{}", json!({ "devices": rows }));
        return Ok(());
    }
    if devices.is_empty() {
        println!("No controllers found.");
    }
    for d in &devices {
        println!("{}  {}  (product 0x{:04X})", d.serial_number, d.short_name, d.product_id);
    }
    Ok(())
}

pub fn run_waveform<E: DeviceEnumerator>(
    en: &E,
    ctx: &Ctx<'_>,
    mode: WaveformMode,
    seconds: Option<f64>,
    target: Option<i32>,
    csv: Option<&Path>,
) -> Result<()> {
    let max_duration = seconds
        .map(|s| {
            Duration::try_from_secs_f64(s)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| eyre::eyre!("--seconds must be a positive number, got {s}"))
        })
        .transpose()?;

    let (mut tuner, descriptor) = open_tuner(en, ctx, mode)?;
    tuner.set_target_override(target);
    tuner
        .energize()
        .map_err(Report::new)
        .wrap_err("energize failed")?;
    tracing::info!(serial = %descriptor.serial_number, %mode, "run start");

    let opts = RunOptions {
        tick_hz: ctx.cfg.control.tick_hz,
        max_duration,
        stop_when_training_done: false,
    };
    let (summary, fault) = run_until_fault(&mut tuner, ctx, &opts)?;

    if let Some(path) = csv {
        write_telemetry_csv(path, &tuner)?;
    }

    if ctx.json {
        println!(
            "{}",
            json!({
                "command": "run",
                "mode": mode.name(),
                "ticks": summary.ticks,
                "moves": summary.moves,
                "faults": summary.faults,
                "comm_failures": summary.comm_failures,
                "elapsed_secs": summary.elapsed_secs,
                "stop": stop_name(summary.stop),
                "final_position": tuner.state().map(|s| s.current_position),
            })
        );
    } else {
        println!(
            "Run complete: {} ticks, {} moves, {} comm failures in {:.2} s ({}).",
            summary.ticks,
            summary.moves,
            summary.comm_failures,
            summary.elapsed_secs,
            stop_name(summary.stop)
        );
    }

    match fault {
        Some(reason) => Err(DeviceFaulted(reason).into()),
        None => Ok(()),
    }
}

fn write_telemetry_csv<S: DeviceSession>(path: &Path, tuner: &Tuner<S>) -> Result<()> {
    let tel = tuner.telemetry();
    let mut w = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("creating {}", path.display()))?;
    w.write_record(["t", "position", "velocity_offset", "vin"])?;
    // position, velocity and vin are pushed together every tick
    for (((t, pos), (_, vel)), (_, vin)) in tel
        .position
        .samples()
        .zip(tel.velocity_offset.samples())
        .zip(tel.vin.samples())
    {
        w.write_record([
            format!("{t:.4}"),
            format!("{pos:.0}"),
            format!("{vel:.2}"),
            format!("{vin:.3}"),
        ])?;
    }
    w.flush().wrap_err_with(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = tel.position.len(), "telemetry exported");
    Ok(())
}

pub fn train<E: DeviceEnumerator>(en: &E, ctx: &Ctx<'_>, csv: Option<&Path>) -> Result<()> {
    let (mut tuner, descriptor) = open_tuner(en, ctx, WaveformMode::None)?;
    tuner.start_training();
    tracing::info!(
        serial = %descriptor.serial_number,
        phase_secs = ctx.cfg.training.phase_secs,
        "training start"
    );

    let opts = RunOptions {
        tick_hz: ctx.cfg.control.tick_hz,
        max_duration: None,
        stop_when_training_done: true,
    };
    let (summary, fault) = run_until_fault(&mut tuner, ctx, &opts)?;
    if let Some(reason) = fault {
        return Err(DeviceFaulted(reason).into());
    }
    let results = summary.training.unwrap_or_default();
    let complete = summary.stop == StopReason::TrainingDone;

    if let Some(path) = csv {
        write_training_csv(path, &results)?;
    }

    if ctx.json {
        let phases: Vec<_> = TrainingPhase::COLLECTING
            .iter()
            .filter_map(|p| results.get(*p).map(|r| (p, r)))
            .map(|(p, r)| {
                json!({
                    "phase": p.to_string(),
                    "min_v": r.min,
                    "max_v": r.max,
                    "valid": r.valid,
                })
            })
            .collect();
        println!(
            "{}",
            json!({ "command": "train", "complete": complete, "phases": phases })
        );
    } else {
        println!("{:<10} {:>8} {:>8}  valid", "phase", "min V", "max V");
        for phase in TrainingPhase::COLLECTING {
            if let Some(r) = results.get(phase) {
                println!(
                    "{:<10} {:>8.3} {:>8.3}  {}",
                    phase.to_string(),
                    r.min,
                    r.max,
                    if r.valid { "yes" } else { "no" }
                );
            }
        }
        if complete {
            println!("Training complete.");
        } else {
            println!("Training interrupted.");
        }
    }
    Ok(())
}

fn write_training_csv(path: &Path, results: &TrainingResults) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("creating {}", path.display()))?;
    w.write_record(["phase", "min_v", "max_v", "valid"])?;
    for phase in TrainingPhase::COLLECTING {
        if let Some(r) = results.get(phase) {
            w.write_record([
                phase.to_string(),
                format!("{:.3}", r.min),
                format!("{:.3}", r.max),
                r.valid.to_string(),
            ])?;
        }
    }
    w.flush().wrap_err_with(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn settings_json<S: DeviceSession>(tuner: &Tuner<S>, s: &ControllerSettings) -> serde_json::Value {
    let layout = tuner.variant().layout();
    json!({
        "product": tuner.variant().name(),
        "step_mode": s.step_mode.to_string(),
        "current_limit_ma": layout.current.code_to_ma(s.current_limit_code).ok(),
        "current_limit_code": s.current_limit_code,
        "max_speed": s.max_speed,
        "starting_speed": s.starting_speed,
        "max_accel": s.max_accel,
        "max_decel": s.max_decel,
        "decay_mode": s.decay_mode,
        "agc_mode": s.agc_mode,
        "input_invert": s.input_invert,
        "command_timeout_ms": s.command_timeout_ms,
        "disable_safe_start": s.disable_safe_start,
    })
}

pub fn settings<E: DeviceEnumerator>(en: &E, ctx: &Ctx<'_>) -> Result<()> {
    let (tuner, descriptor) = open_tuner(en, ctx, WaveformMode::None)?;
    let s = tuner.settings();
    if ctx.json {
        let mut v = settings_json(&tuner, s);
        v["serial_number"] = json!(descriptor.serial_number);
        println!("{v}");
        return Ok(());
    }

    let layout = tuner.variant().layout();
    println!("Controller {} ({})", descriptor.serial_number, tuner.variant());
    println!("  step mode        {}", s.step_mode);
    match layout.current.code_to_ma(s.current_limit_code) {
        Ok(ma) => println!("  current limit    {ma} mA"),
        Err(_) => println!("  current limit    code {}", s.current_limit_code),
    }
    println!(
        "  max speed        {} ({:.1} steps/s)",
        s.max_speed,
        speed_to_steps_per_sec(i64::from(s.max_speed))
    );
    println!(
        "  starting speed   {} ({:.1} steps/s)",
        s.starting_speed,
        speed_to_steps_per_sec(i64::from(s.starting_speed))
    );
    println!(
        "  max accel        {} ({:.1} steps/s^2)",
        s.max_accel,
        accel_to_steps_per_sec2(s.max_accel)
    );
    println!(
        "  max decel        {} ({:.1} steps/s^2)",
        s.effective_decel(),
        accel_to_steps_per_sec2(s.effective_decel())
    );
    if let Some(decay) = s.decay_mode {
        println!("  decay mode       {decay}");
    }
    if let Some(agc) = s.agc_mode {
        println!("  agc mode         {agc}");
    }
    println!("  input invert     {}", s.input_invert);
    Ok(())
}

pub fn self_check<E: DeviceEnumerator>(en: &E, ctx: &Ctx<'_>) -> Result<()> {
    let (tuner, descriptor) = open_tuner(en, ctx, WaveformMode::None)?;
    let state = tuner
        .state()
        .ok_or_else(|| eyre::eyre!("controller state was not read at startup"))?;
    if ctx.json {
        println!(
            "{}",
            json!({
                "ok": true,
                "serial_number": descriptor.serial_number,
                "product": tuner.variant().name(),
                "operation_state": state.operation_state.to_string(),
                "vin_v": state.vin_volts(),
                "errors": state.error_status.to_string(),
            })
        );
    } else {
        println!(
            "OK: {} {} ({}, VIN {:.2} V, errors {})",
            tuner.variant(),
            descriptor.serial_number,
            state.operation_state,
            state.vin_volts(),
            state.error_status
        );
    }
    Ok(())
}
