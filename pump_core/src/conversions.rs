//! `From` implementations bridging `pump_config` types to `pump_core` types.

use crate::config::{ControlCfg, ResumePolicy, RunnerCfg, SharedSettings, TimeoutSettings};
use crate::controller::Controller;
use crate::error::PumpError;

// ── ResumePolicy ─────────────────────────────────────────────────────────────

impl From<pump_config::ResumeMode> for ResumePolicy {
    fn from(m: pump_config::ResumeMode) -> Self {
        match m {
            pump_config::ResumeMode::LastDirection => ResumePolicy::LastDirection,
            pump_config::ResumeMode::AlwaysOut => ResumePolicy::AlwaysOut,
        }
    }
}

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&pump_config::Config> for ControlCfg {
    fn from(c: &pump_config::Config) -> Self {
        Self {
            debounce_ms: c.timing.debounce_ms,
            cycle_delay_ms: c.timing.cycle_delay_ms,
            press_hold_ms: c.timing.press_hold_ms,
            presteer_from_endstops: c.behavior.presteer_from_endstops,
            resume: c.behavior.resume.into(),
        }
    }
}

// ── RunnerCfg ────────────────────────────────────────────────────────────────

impl From<&pump_config::RunnerCfg> for RunnerCfg {
    fn from(c: &pump_config::RunnerCfg) -> Self {
        Self {
            tick_ms: c.tick_ms,
            status_interval_ms: c.status_interval_ms,
        }
    }
}

// ── TimeoutSettings ──────────────────────────────────────────────────────────

impl TryFrom<&pump_config::Safety> for TimeoutSettings {
    type Error = PumpError;

    fn try_from(c: &pump_config::Safety) -> Result<Self, Self::Error> {
        TimeoutSettings::new(c.cycle_timeout_ms, c.timeout_enabled)
    }
}

impl TryFrom<&pump_config::PersistedSettings> for TimeoutSettings {
    type Error = PumpError;

    fn try_from(s: &pump_config::PersistedSettings) -> Result<Self, Self::Error> {
        TimeoutSettings::new(s.cycle_timeout_ms, s.timeout_enabled)
    }
}

impl From<TimeoutSettings> for pump_config::PersistedSettings {
    fn from(t: TimeoutSettings) -> Self {
        Self {
            cycle_timeout_ms: t.cycle_timeout_ms(),
            timeout_enabled: t.enabled(),
        }
    }
}

/// Build a boot-state controller from a validated config.
pub fn controller_from_config(c: &pump_config::Config) -> Result<Controller, PumpError> {
    let settings = TimeoutSettings::try_from(&c.safety)?;
    Ok(Controller::new(
        ControlCfg::from(c),
        SharedSettings::new(settings),
    ))
}
