//! Human-readable error descriptions, exit codes and structured JSON errors.

use pump_core::PumpError;
use pump_hardware::error::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(pe) = err.downcast_ref::<PumpError>() {
        return match pe {
            PumpError::InvalidConfigurationValue { field, value, reason } => format!(
                "What happened: {field} = {value} was rejected ({reason}).\nLikely causes: Value outside the accepted range.\nHow to fix: Use a cycle timeout between 1000 and 300000 ms; the previous value is still in effect."
            ),
            PumpError::Timeout => {
                "What happened: An I/O operation timed out.\nLikely causes: GPIO chip busy or unresponsive.\nHow to fix: Check wiring and that no other process holds the pins, then rerun.".to_string()
            }
            PumpError::Hardware(msg) | PumpError::HardwareFault(msg) => format!(
                "What happened: Hardware I/O failed ({msg}); all coils were switched off.\nLikely causes: Wrong [pins] numbers, missing GPIO permissions, or a disconnected board.\nHow to fix: Verify [pins] in the config and that the process may access /dev/gpiomem."
            ),
            PumpError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            PumpError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    if let Some(HwError::Script { line, msg }) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Simulation script line {line} is invalid ({msg}).\nHow to fix: Use lines like `200 tap start 120`, `2000 estop open` or `3000 jam on`."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let chain = format!("{err:#}").to_ascii_lowercase();

    if chain.contains("read config") && chain.contains("no such file") {
        return format!(
            "What happened: Config file not found.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config <FILE> (see etc/pump_config.toml). Original: {msg}"
        );
    }

    if chain.contains("parse config")
        || chain.contains("must be")
        || chain.contains("share gpio")
        || chain.contains("not a header gpio")
        || chain.contains("unreasonably large")
    {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range timing/safety values or duplicate pins.\nHow to fix: Edit the TOML config and try again. Detail: {err:#}"
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

/// Stable exit codes: 1 generic, 3 rejected value, 4 hardware, 5 I/O timeout.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<PumpError>() {
        Some(PumpError::InvalidConfigurationValue { .. }) => 3,
        Some(PumpError::Hardware(_) | PumpError::HardwareFault(_)) => 4,
        Some(PumpError::Timeout) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<PumpError>() {
        Some(PumpError::InvalidConfigurationValue { .. }) => "InvalidConfigurationValue",
        Some(PumpError::Hardware(_) | PumpError::HardwareFault(_)) => "Hardware",
        Some(PumpError::Timeout) => "Timeout",
        Some(PumpError::Config(_)) => "Config",
        Some(PumpError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(PumpError::InvalidConfigurationValue { field, value, reason }) =
        err.downcast_ref::<PumpError>()
    {
        return json!({
            "reason": "InvalidConfigurationValue",
            "details": { "field": field, "value": value, "why": reason },
            "message": humanize(err),
        })
        .to_string();
    }
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_timeout_maps_to_code_3_with_details() {
        let err = eyre::Report::new(PumpError::InvalidConfigurationValue {
            field: "cycleTimeoutMs",
            value: 500,
            reason: "below 1000".into(),
        });
        assert_eq!(exit_code_for_error(&err), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "InvalidConfigurationValue");
        assert_eq!(v["details"]["value"], 500);
    }

    #[test]
    fn wrapped_hardware_error_keeps_its_code() {
        use eyre::WrapErr;
        let err = Err::<(), _>(PumpError::Hardware("pin 25 busy".into()))
            .wrap_err("writing outputs")
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), 4);
        assert!(humanize(&err).contains("pin 25 busy"));
    }

    #[test]
    fn untyped_errors_fall_back_to_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Something went wrong"));
    }
}
