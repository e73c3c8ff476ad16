#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<tictune_config::Config>(data) {
        if cfg.validate().is_ok() {
            // A validated config must map onto the runtime types without panicking.
            let tuner = tictune_core::TunerConfig::from(&cfg);
            let _ = tuner.control.mapper();
        }
    }
});
