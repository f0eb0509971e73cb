use serde::Serialize;
use thiserror::Error;

/// Conditions that force MANUAL mode with both coils off.
///
/// Listed in interlock priority order.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SafetyFault {
    #[error("emergency stop active")]
    EmergencyStopActive,
    #[error("both end stops triggered (sensor or wiring fault)")]
    DualEndstopFault,
    #[error("cycle timeout exceeded before reaching an end stop")]
    CycleTimeoutExceeded,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PumpError {
    #[error("invalid configuration value for {field}: {value} ({reason})")]
    InvalidConfigurationValue {
        field: &'static str,
        value: u64,
        reason: String,
    },
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
