use std::io::Write;

use tictune_config::{Product, load_path, load_toml};
use rstest::rstest;
use tempfile::NamedTempFile;

#[test]
fn empty_file_yields_stock_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.control.tick_hz, 60);
    assert_eq!(cfg.control.upper_range, 200);
    assert_eq!(cfg.control.lower_range, -5500);
    assert!((cfg.training.phase_secs - 30.0).abs() < f64::EPSILON);
    assert_eq!(cfg.telemetry.window, 1500);
    assert!(cfg.device.serial_number.is_none());
    assert!(!cfg.motor.auto_apply);
}

#[test]
fn parses_full_file() {
    let toml = r#"
[device]
serial_number = "00112233"
product = "36v4"

[control]
tick_hz = 50
upper_range = 400
lower_range = -400
io_timeout_ms = 250

[training]
phase_secs = 2.5

[telemetry]
window = 300

[motor]
max_speed = 2000000
max_accel = 40000
step_mode = 3
current_limit_ma = 1000
link_decel = true
auto_apply = true

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.device.serial_number.as_deref(), Some("00112233"));
    assert_eq!(cfg.device.product, Some(Product::Tic36v4));
    assert_eq!(cfg.control.io_timeout_ms, 250);
    assert_eq!(cfg.motor.step_mode, Some(3));
    assert!(cfg.motor.link_decel);
    assert_eq!(cfg.motor.max_decel, None);
}

#[test]
fn rejects_unknown_product() {
    let err = load_toml("[device]\nproduct = \"t999\"\n").expect_err("unknown variant");
    assert!(err.to_string().contains("t999") || err.to_string().contains("unknown variant"));
}

#[rstest]
#[case("[control]\ntick_hz = 0\n", "control.tick_hz must be in 1..=1000")]
#[case("[control]\ntick_hz = 5000\n", "control.tick_hz must be in 1..=1000")]
#[case("[control]\nupper_range = -6000\n", "control.lower_range must be < control.upper_range")]
#[case("[control]\nupper_range = 100000000\n", "1/32 step multiplier")]
#[case("[control]\nio_timeout_ms = 0\n", "control.io_timeout_ms must be >= 1")]
#[case("[training]\nphase_secs = 0.0\n", "training.phase_secs must be > 0")]
#[case("[training]\nphase_secs = -1.0\n", "training.phase_secs must be > 0")]
#[case("[telemetry]\nwindow = 0\n", "telemetry.window must be in 1..=100000")]
#[case("[motor]\nstep_mode = 12\n", "motor.step_mode must be in 0..=9")]
#[case("[motor]\nmax_speed = 600000000\n", "motor.max_speed must be <= 500000000")]
#[case("[motor]\nmax_accel = 10\n", "motor.max_accel must be >= 100")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of never|daily|hourly")]
fn rejects_invalid_values(#[case] toml: &str, #[case] expected: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(expected),
        "got: {err}, expected to contain: {expected}"
    );
}

#[test]
fn load_path_reads_and_validates() {
    let mut f = NamedTempFile::new().unwrap();
    writeln!(f, "[control]\ntick_hz = 30").unwrap();
    let cfg = load_path(f.path()).expect("load");
    assert_eq!(cfg.control.tick_hz, 30);

    let mut bad = NamedTempFile::new().unwrap();
    writeln!(bad, "[telemetry]\nwindow = 0").unwrap();
    let err = load_path(bad.path()).expect_err("invalid window");
    assert_eq!(err.to_string(), "invalid configuration");
    assert!(format!("{err:#}").contains("telemetry.window"));
}

#[test]
fn load_path_reports_missing_file() {
    let err = load_path(std::path::Path::new("/definitely/not/here.toml")).expect_err("missing");
    assert!(format!("{err}").contains("reading config"));
}
