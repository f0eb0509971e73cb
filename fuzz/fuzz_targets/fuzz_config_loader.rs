#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Config and the persisted settings record must reject garbage without panicking.
    if let Ok(cfg) = pump_config::load_toml(data) {
        let _ = cfg.validate();
    }
    if let Ok(s) = toml::from_str::<pump_config::PersistedSettings>(data) {
        let _ = s.validate();
    }
});
