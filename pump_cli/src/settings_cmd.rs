//! `pump settings show|set`: the operator-editable timeout record.

use eyre::WrapErr;
use pump_config::{Config, PersistedSettings, SettingsStore};
use pump_core::{PumpError, TimeoutSettings};

use crate::cli::SettingsCmd;

pub fn execute(cfg: &Config, cmd: &SettingsCmd, json: bool) -> eyre::Result<()> {
    match cmd {
        SettingsCmd::Show => show(cfg, json),
        SettingsCmd::Set {
            timeout_ms,
            timeout_enabled,
        } => set(cfg, *timeout_ms, *timeout_enabled, json),
    }
}

fn store(cfg: &Config) -> Option<SettingsStore> {
    cfg.settings.file.as_deref().map(SettingsStore::new)
}

/// The record a run would boot with, and where it came from.
fn effective(cfg: &Config) -> eyre::Result<(PersistedSettings, &'static str)> {
    if let Some(store) = store(cfg)
        && let Some(s) = store.load()?
    {
        return Ok((s, "store"));
    }
    let from_config = TimeoutSettings::try_from(&cfg.safety)?;
    Ok((from_config.into(), "config"))
}

fn print(s: &PersistedSettings, source: &str, json: bool) -> eyre::Result<()> {
    if json {
        let line = serde_json::json!({
            "cycleTimeoutMs": s.cycle_timeout_ms,
            "timeoutEnabled": s.timeout_enabled,
            "source": source,
        });
        println!("{line}");
    } else {
        let text = toml::to_string(s).wrap_err("render settings")?;
        println!("# source: {source}");
        print!("{text}");
    }
    Ok(())
}

fn show(cfg: &Config, json: bool) -> eyre::Result<()> {
    let (s, source) = effective(cfg)?;
    print(&s, source, json)
}

fn set(
    cfg: &Config,
    timeout_ms: Option<u64>,
    timeout_enabled: Option<bool>,
    json: bool,
) -> eyre::Result<()> {
    let Some(store) = store(cfg) else {
        return Err(PumpError::Config(
            "settings.file not configured; nowhere to persist".into(),
        )
        .into());
    };
    if timeout_ms.is_none() && timeout_enabled.is_none() {
        eyre::bail!("nothing to set: pass --timeout-ms and/or --timeout-enabled");
    }

    let (current, _) = effective(cfg)?;
    // Same validation as the runtime setter; a rejection leaves the file untouched.
    let next = TimeoutSettings::new(
        timeout_ms.unwrap_or(current.cycle_timeout_ms),
        timeout_enabled.unwrap_or(current.timeout_enabled),
    )?;
    let record = PersistedSettings::from(next);
    store.save(&record)?;
    tracing::info!(
        from = ?current,
        to = ?record,
        path = %store.path().display(),
        "settings updated"
    );
    print(&record, "store", json)
}
