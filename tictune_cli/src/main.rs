mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tictune_hardware::{PRODUCT_ID_T825, SimulatedEnumerator};
use tictune_traits::DeviceEnumerator;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::Ctx;

/// Serial number of the built-in simulated controller.
const SIM_SERIAL: &str = "00000001";

fn init_tracing(json: bool, level: &str, logging: &tictune_config::Logging) -> eyre::Result<()> {
    // RUST_LOG wins over --log-level / [logging].level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("bad log level '{level}'"))?,
    };

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("installing tracing subscriber")?;
    Ok(())
}

/// Simulated bus, shaped by `TICTUNE_TEST_SIM_*` variables for scripted failures.
fn sim_enumerator() -> SimulatedEnumerator {
    if std::env::var_os("TICTUNE_TEST_SIM_NO_DEVICE").is_some() {
        return SimulatedEnumerator::new();
    }
    let en = SimulatedEnumerator::new().with_device(SIM_SERIAL, PRODUCT_ID_T825);
    if let Some(sim) = en.handle(SIM_SERIAL) {
        if let Some(bits) = std::env::var("TICTUNE_TEST_SIM_FAULT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            sim.inject_errors(bits);
        }
        if let Some(n) = std::env::var("TICTUNE_TEST_SIM_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            sim.fail_next_queries(n);
        }
    }
    en
}

fn dispatch<E: DeviceEnumerator>(en: &E, ctx: &Ctx<'_>, cmd: &Commands) -> eyre::Result<()> {
    match cmd {
        Commands::List => run::list(en, ctx),
        Commands::Run {
            mode,
            seconds,
            target,
            csv,
        } => run::run_waveform(en, ctx, *mode, *seconds, *target, csv.as_deref()),
        Commands::Train { csv } => run::train(en, ctx, csv.as_deref()),
        Commands::Settings => run::settings(en, ctx),
        Commands::SelfCheck => run::self_check(en, ctx),
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = tictune_config::load_path(&cli.config)?;

    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    init_tracing(cli.json, level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("installing Ctrl-C handler")?;
    }

    let ctx = Ctx {
        cfg: &cfg,
        serial: cli.serial.as_deref().or(cfg.device.serial_number.as_deref()),
        json: cli.json,
        shutdown: &shutdown,
    };

    #[cfg(feature = "hardware")]
    {
        if !cli.sim {
            let timeout = std::time::Duration::from_millis(cfg.control.io_timeout_ms);
            let en = tictune_hardware::serial::SerialEnumerator::new(timeout);
            return dispatch(&en, &ctx, &cli.cmd);
        }
    }

    if !cli.sim {
        tracing::debug!("built without the hardware feature; using the simulated controller");
    }
    dispatch(&sim_enumerator(), &ctx, &cli.cmd)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install error report hooks: {e}");
    }

    match real_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            let code = exit_code_for_error(&e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
