//! Human-readable error descriptions, exit codes and structured JSON error formatting.

use tictune_core::{BuildError, ControllerError, TransportError};

use crate::run::DeviceFaulted;

/// Exit codes scripts can rely on.
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_NO_DEVICE: i32 = 2;
pub const EXIT_PROTOCOL: i32 = 3;
pub const EXIT_DEVICE_FAULT: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(DeviceFaulted(reason)) = err.downcast_ref::<DeviceFaulted>() {
        return format!(
            "What happened: The controller reported a fault ({reason}) and motion was stopped.\nLikely causes: Kill switch or ERR line active, low supply voltage, or a motor driver error.\nHow to fix: Clear the cause on the controller, then start a new run. Re-energizing clears the latch."
        );
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSession => {
                "What happened: No device session was provided to the tuner.\nLikely causes: The device failed to open before the tuner was built.\nHow to fix: Check `tictune list` and pass the session via with_session(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/tictune.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControllerError>() {
        return match ce {
            ControllerError::NoDeviceFound => {
                "What happened: No matching controller was found.\nLikely causes: The controller is unplugged or the serial number filter does not match.\nHow to fix: Run `tictune list`, then fix --serial or [device].serial_number.".to_string()
            }
            ControllerError::CommunicationFailure(TransportError::Timeout) => {
                "What happened: The controller did not answer in time.\nLikely causes: Loose USB cable, wrong port, or io_timeout_ms set too low.\nHow to fix: Reconnect the controller and consider raising control.io_timeout_ms in the config.".to_string()
            }
            ControllerError::CommunicationFailure(TransportError::Disconnected) => {
                "What happened: The controller disconnected.\nLikely causes: The USB cable was unplugged or the controller reset.\nHow to fix: Reconnect the controller and run the command again.".to_string()
            }
            ControllerError::CommunicationFailure(TransportError::Io(msg)) => format!(
                "What happened: Talking to the controller failed ({msg}).\nLikely causes: The port is held by another program or permissions are missing.\nHow to fix: Close other tools using the port and check access to the serial device."
            ),
            ControllerError::Protocol(pe) => format!(
                "What happened: A command or reply could not be encoded ({pe}).\nLikely causes: A [motor] value the product does not support, or the wrong [device].product override.\nHow to fix: Remove the offending [motor] entry or the product override and rerun."
            ),
            ControllerError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("reading config") {
        return format!(
            "What happened: Could not read the config file ({msg}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with a readable TOML file."
        );
    }

    if lower.starts_with("parsing config") {
        let detail = err.root_cause().to_string();
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nLikely causes: A typo, a wrong value type, or an unknown product name.\nHow to fix: Fix the file and rerun. Parser said: {detail}"
        );
    }

    if lower.contains("invalid configuration") {
        let detail = err
            .chain()
            .skip(1)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        return format!(
            "What happened: Invalid configuration ({detail}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/tictune.toml for a sample."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 no device, 3 protocol error, 4 device fault, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<DeviceFaulted>().is_some() {
        return EXIT_DEVICE_FAULT;
    }
    match err.downcast_ref::<ControllerError>() {
        Some(ControllerError::NoDeviceFound) => EXIT_NO_DEVICE,
        Some(ControllerError::Protocol(_)) => EXIT_PROTOCOL,
        _ => EXIT_GENERIC,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<DeviceFaulted>().is_some() {
        return "DeviceFault";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    match err.downcast_ref::<ControllerError>() {
        Some(ControllerError::NoDeviceFound) => "NoDeviceFound",
        Some(ControllerError::CommunicationFailure(_)) => "CommunicationFailure",
        Some(ControllerError::Protocol(_)) => "Protocol",
        Some(ControllerError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(DeviceFaulted(reason)) = err.downcast_ref::<DeviceFaulted>() {
        obj["details"] = json!({ "fault": reason.to_string() });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use tictune_core::ProtocolError;

    fn report(e: ControllerError) -> eyre::Report {
        Err::<(), _>(e).wrap_err("command failed").unwrap_err()
    }

    #[test]
    fn exit_codes_follow_the_error_kind() {
        assert_eq!(exit_code_for_error(&report(ControllerError::NoDeviceFound)), 2);
        assert_eq!(
            exit_code_for_error(&report(ControllerError::Protocol(
                ProtocolError::UnknownProduct(0x1234)
            ))),
            3
        );
        assert_eq!(
            exit_code_for_error(&report(ControllerError::CommunicationFailure(
                TransportError::Timeout
            ))),
            1
        );
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn config_validation_names_the_field() {
        let err = Err::<(), _>(eyre::eyre!("control.tick_hz must be in 1..=1000"))
            .wrap_err("invalid configuration")
            .unwrap_err();
        let text = humanize(&err);
        assert!(text.starts_with("What happened: Invalid configuration (control.tick_hz"));
    }

    #[test]
    fn json_error_carries_reason_and_code() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&report(ControllerError::NoDeviceFound)))
                .unwrap();
        assert_eq!(v["reason"], "NoDeviceFound");
        assert_eq!(v["exit_code"], 2);
        assert!(v["message"].as_str().unwrap().contains("tictune list"));
    }
}
