//! Runtime configuration types for the control core.
//!
//! These are separate from the TOML-deserialized config in `pump_config`;
//! see `conversions` for the mapping.

use std::sync::{Arc, Mutex, PoisonError};

use pump_config::CYCLE_TIMEOUT_MS_RANGE;

use crate::error::PumpError;

/// Direction chosen when AUTO is (re)entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// Continue in the last recorded direction; OUT if none was recorded.
    #[default]
    LastDirection,
    /// Always start with an OUT stroke.
    AlwaysOut,
}

/// Control timing and behavior knobs.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Debounce window for command buttons (ms).
    pub debounce_ms: u64,
    /// All-off pause after a reversal or AUTO entry (ms).
    pub cycle_delay_ms: u64,
    /// Display hold for short presses in the status snapshot (ms).
    pub press_hold_ms: u64,
    /// In MANUAL, let a triggered end stop select the next AUTO direction.
    pub presteer_from_endstops: bool,
    pub resume: ResumePolicy,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            cycle_delay_ms: 500,
            press_hold_ms: 1_000,
            presteer_from_endstops: true,
            resume: ResumePolicy::LastDirection,
        }
    }
}

/// Scheduler knobs for `runner::Runner`.
#[derive(Debug, Clone)]
pub struct RunnerCfg {
    /// Tick period (ms).
    pub tick_ms: u64,
    /// Publish status at least this often even when nothing changed (ms).
    pub status_interval_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            tick_ms: 5,
            status_interval_ms: 1_000,
        }
    }
}

/// The operator-editable timeout record.
///
/// Fields are private so a value outside the accepted range can never be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    cycle_timeout_ms: u64,
    enabled: bool,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            cycle_timeout_ms: pump_config::DEFAULT_CYCLE_TIMEOUT_MS,
            enabled: true,
        }
    }
}

impl TimeoutSettings {
    pub fn new(cycle_timeout_ms: u64, enabled: bool) -> Result<Self, PumpError> {
        check_timeout(cycle_timeout_ms)?;
        Ok(Self {
            cycle_timeout_ms,
            enabled,
        })
    }

    #[inline]
    pub fn cycle_timeout_ms(&self) -> u64 {
        self.cycle_timeout_ms
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

fn check_timeout(ms: u64) -> Result<(), PumpError> {
    if CYCLE_TIMEOUT_MS_RANGE.contains(&ms) {
        Ok(())
    } else {
        Err(PumpError::InvalidConfigurationValue {
            field: "cycle_timeout_ms",
            value: ms,
            reason: format!(
                "must be in [{}, {}]",
                CYCLE_TIMEOUT_MS_RANGE.start(),
                CYCLE_TIMEOUT_MS_RANGE.end()
            ),
        })
    }
}

/// Handle through which collaborators update the timeout record.
///
/// The control tick copies the record once at the start of every tick, so a
/// write lands on the next tick and never mid-tick.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<Mutex<TimeoutSettings>>,
}

impl SharedSettings {
    pub fn new(initial: TimeoutSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> TimeoutSettings {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the cycle timeout; out-of-range values are rejected and the
    /// previous value is kept.
    pub fn set_cycle_timeout_ms(&self, ms: u64) -> Result<(), PumpError> {
        if let Err(e) = check_timeout(ms) {
            tracing::warn!(value = ms, error = %e, "rejected cycle timeout update");
            return Err(e);
        }
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.cycle_timeout_ms = ms;
        tracing::info!(cycle_timeout_ms = ms, "cycle timeout updated");
        Ok(())
    }

    pub fn set_timeout_enabled(&self, enabled: bool) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.enabled = enabled;
        tracing::info!(timeout_enabled = enabled, "timeout protection updated");
    }

    /// Replace the whole record at once; nothing changes on rejection.
    pub fn apply(&self, cycle_timeout_ms: u64, enabled: bool) -> Result<(), PumpError> {
        let next = TimeoutSettings::new(cycle_timeout_ms, enabled).inspect_err(|e| {
            tracing::warn!(value = cycle_timeout_ms, error = %e, "rejected settings update");
        })?;
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::info!(cycle_timeout_ms, timeout_enabled = enabled, "settings applied");
        Ok(())
    }
}
