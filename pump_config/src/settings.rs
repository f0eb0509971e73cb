//! Persisted operator settings (the non-volatile preferences record).
//!
//! Only the two values an operator may edit at runtime are stored here:
//! the cycle timeout and whether it is enforced. Everything else comes from
//! the main config file.

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::{DEFAULT_CYCLE_TIMEOUT_MS, check_cycle_timeout_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub cycle_timeout_ms: u64,
    pub timeout_enabled: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            cycle_timeout_ms: DEFAULT_CYCLE_TIMEOUT_MS,
            timeout_enabled: true,
        }
    }
}

impl PersistedSettings {
    pub fn validate(&self) -> eyre::Result<()> {
        check_cycle_timeout_ms(self.cycle_timeout_ms)
    }
}

/// TOML-file backed store for [`PersistedSettings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record; `Ok(None)` when nothing has been saved yet.
    ///
    /// A stored record that fails validation is reported as an error rather
    /// than silently clamped.
    pub fn load(&self) -> eyre::Result<Option<PersistedSettings>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("read settings {}", self.path.display()));
            }
        };
        let s: PersistedSettings = toml::from_str(&text)
            .wrap_err_with(|| format!("parse settings {}", self.path.display()))?;
        s.validate()
            .wrap_err_with(|| format!("stored settings in {}", self.path.display()))?;
        Ok(Some(s))
    }

    /// Validate and persist; the previous file is left untouched on rejection.
    pub fn save(&self, s: &PersistedSettings) -> eyre::Result<()> {
        s.validate()?;
        let text = toml::to_string(s).wrap_err("serialize settings")?;
        write_atomic(&self.path, text.as_bytes())
            .wrap_err_with(|| format!("write settings {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            cycle_timeout_ms = s.cycle_timeout_ms,
            timeout_enabled = s.timeout_enabled,
            "settings saved"
        );
        Ok(())
    }
}
