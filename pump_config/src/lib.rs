#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and operator settings for the pump controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `settings` persists the operator-editable timeout record between runs.
use std::ops::RangeInclusive;
use std::path::Path;

use eyre::WrapErr;
use serde::Deserialize;

pub mod atomic;
pub mod settings;

pub use settings::{PersistedSettings, SettingsStore};

/// Accepted range for the cycle timeout, in milliseconds.
pub const CYCLE_TIMEOUT_MS_RANGE: RangeInclusive<u64> = 1_000..=300_000;
pub const DEFAULT_CYCLE_TIMEOUT_MS: u64 = 30_000;
/// GPIO lines broken out on the Raspberry Pi 40-pin header.
pub const BCM_HEADER_PINS: RangeInclusive<u8> = 0..=27;

/// GPIO (BCM) numbers for every line the controller touches.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub extend_out: u8,
    pub retract_out: u8,
    pub manual_extend_in: u8,
    pub manual_retract_in: u8,
    pub start_auto_in: u8,
    pub stop_auto_in: u8,
    pub endstop_in: u8,
    pub endstop_out: u8,
    pub estop_in: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            extend_out: 25,
            retract_out: 26,
            manual_extend_in: 12,
            manual_retract_in: 13,
            start_auto_in: 14,
            stop_auto_in: 15,
            endstop_in: 5,
            endstop_out: 6,
            estop_in: 27,
        }
    }
}

impl Pins {
    fn all(&self) -> [(&'static str, u8); 9] {
        [
            ("extend_out", self.extend_out),
            ("retract_out", self.retract_out),
            ("manual_extend_in", self.manual_extend_in),
            ("manual_retract_in", self.manual_retract_in),
            ("start_auto_in", self.start_auto_in),
            ("stop_auto_in", self.stop_auto_in),
            ("endstop_in", self.endstop_in),
            ("endstop_out", self.endstop_out),
            ("estop_in", self.estop_in),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    /// Debounce window for the four command buttons (ms)
    pub debounce_ms: u64,
    /// All-off pause after every reversal and after AUTO entry (ms)
    pub cycle_delay_ms: u64,
    /// How long a short press stays visible in the status snapshot (ms)
    pub press_hold_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            cycle_delay_ms: 500,
            press_hold_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    pub cycle_timeout_ms: u64,
    pub timeout_enabled: bool,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            cycle_timeout_ms: DEFAULT_CYCLE_TIMEOUT_MS,
            timeout_enabled: true,
        }
    }
}

/// Direction chosen when AUTO is (re)entered.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeMode {
    #[default]
    LastDirection,
    AlwaysOut,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Behavior {
    /// Let end stops set the next AUTO direction while in MANUAL
    pub presteer_from_endstops: bool,
    pub resume: ResumeMode,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            presteer_from_endstops: true,
            resume: ResumeMode::LastDirection,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Control tick period (ms)
    pub tick_ms: u64,
    /// Maximum gap between two status publications (ms)
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

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SettingsCfg {
    /// Where operator-edited settings are persisted; absent disables persistence
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub timing: Timing,
    pub safety: Safety,
    pub behavior: Behavior,
    pub logging: Logging,
    pub runner: RunnerCfg,
    pub settings: SettingsCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Validate a cycle timeout against the accepted range.
pub fn check_cycle_timeout_ms(ms: u64) -> eyre::Result<()> {
    if !CYCLE_TIMEOUT_MS_RANGE.contains(&ms) {
        eyre::bail!(
            "safety.cycle_timeout_ms must be in [{}, {}], got {ms}",
            CYCLE_TIMEOUT_MS_RANGE.start(),
            CYCLE_TIMEOUT_MS_RANGE.end()
        );
    }
    Ok(())
}

impl Config {
    /// Overlay persisted operator settings on top of the file defaults.
    pub fn apply_settings(&mut self, s: &PersistedSettings) {
        self.safety.cycle_timeout_ms = s.cycle_timeout_ms;
        self.safety.timeout_enabled = s.timeout_enabled;
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let pins = self.pins.all();
        for (name, pin) in &pins {
            if !BCM_HEADER_PINS.contains(pin) {
                eyre::bail!("pins.{name} = {pin} is not a header GPIO (BCM 0..=27)");
            }
        }
        for (i, (name_a, pin_a)) in pins.iter().enumerate() {
            for (name_b, pin_b) in &pins[i + 1..] {
                if pin_a == pin_b {
                    eyre::bail!("pins.{name_a} and pins.{name_b} share GPIO {pin_a}");
                }
            }
        }

        // Timing
        if self.timing.debounce_ms == 0 {
            eyre::bail!("timing.debounce_ms must be >= 1");
        }
        if self.timing.debounce_ms > 1_000 {
            eyre::bail!("timing.debounce_ms is unreasonably large (>1s)");
        }
        if self.timing.cycle_delay_ms > 10_000 {
            eyre::bail!("timing.cycle_delay_ms is unreasonably large (>10s)");
        }
        if self.timing.press_hold_ms > 10_000 {
            eyre::bail!("timing.press_hold_ms is unreasonably large (>10s)");
        }

        // Safety
        check_cycle_timeout_ms(self.safety.cycle_timeout_ms)?;
        if self.safety.cycle_timeout_ms <= self.timing.cycle_delay_ms {
            eyre::bail!("safety.cycle_timeout_ms must exceed timing.cycle_delay_ms");
        }

        // Runner
        if self.runner.tick_ms == 0 {
            eyre::bail!("runner.tick_ms must be >= 1");
        }
        if self.runner.tick_ms > self.timing.debounce_ms {
            eyre::bail!("runner.tick_ms must not exceed timing.debounce_ms");
        }
        if self.runner.status_interval_ms == 0 || self.runner.status_interval_ms > 1_000 {
            eyre::bail!("runner.status_interval_ms must be in [1, 1000]");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
