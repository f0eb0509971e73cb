#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Rig scripts come from operator files; parse errors are fine, panics are not.
    let _ = pump_hardware::Script::parse(data);
});
