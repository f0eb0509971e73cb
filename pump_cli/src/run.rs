//! `pump run` and `pump self-check`: backend assembly, status output and the stroke log.

use std::path::Path;
use std::time::Duration;

use eyre::WrapErr;
use pump_config::{Config, PersistedSettings, SettingsStore};
use pump_core::{PumpError, RunSummary, Runner, RunnerCfg, StatusSnapshot, controller_from_config};
use pump_hardware::sim::{Button, RigParams, Script, SimRig};
use pump_traits::{Clock, InputBank, ManualClock, MonotonicClock, Valve};

use crate::cli::{RtLock, RunArgs};
use crate::rt::{RtRequest, setup_rt_once};

/// Operator script used when `--sim` runs without `--script`: press START once.
fn demo_script() -> Script {
    Script::new().tap(200, Button::StartAuto, 120)
}

fn load_script(path: Option<&Path>) -> eyre::Result<Script> {
    let Some(path) = path else {
        return Ok(demo_script());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read script {}", path.display()))?;
    Ok(Script::parse(&text)?)
}

/// Overlay the persisted operator settings, if a store is configured and holds a record.
pub fn apply_persisted(cfg: &mut Config) -> eyre::Result<Option<PersistedSettings>> {
    let Some(file) = cfg.settings.file.as_deref() else {
        return Ok(None);
    };
    let stored = SettingsStore::new(file).load()?;
    if let Some(s) = &stored {
        tracing::info!(
            cycle_timeout_ms = s.cycle_timeout_ms,
            timeout_enabled = s.timeout_enabled,
            "persisted settings applied"
        );
        cfg.apply_settings(s);
        cfg.validate().wrap_err("config with persisted settings applied")?;
    }
    Ok(stored)
}

pub fn run(mut cfg: Config, args: &RunArgs) -> eyre::Result<RunSummary> {
    apply_persisted(&mut cfg)?;
    if args.rt {
        setup_rt_once(RtRequest {
            prio: args.rt_prio,
            lock: args.rt_lock.unwrap_or(RtLock::os_default()),
            cpu: args.rt_cpu,
        });
    }

    let controller = controller_from_config(&cfg)?;
    let runner_cfg = RunnerCfg::from(&cfg.runner);

    if args.sim {
        let script = load_script(args.script.as_deref())?;
        tracing::info!(events = script.len(), virtual_time = args.virtual_time, "simulated rig");
        if args.virtual_time {
            let clock = ManualClock::new();
            let rig = SimRig::new(RigParams::default(), script, clock.clone());
            let runner = Runner::new(rig.inputs(), rig.valve(), clock, controller, runner_cfg);
            return drive(runner, &cfg, args);
        }
        let clock = MonotonicClock::new();
        let rig = SimRig::new(RigParams::default(), script, clock);
        let runner = Runner::new(rig.inputs(), rig.valve(), clock, controller, runner_cfg);
        return drive(runner, &cfg, args);
    }

    run_gpio(controller, runner_cfg, &cfg, args)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn run_gpio(
    controller: pump_core::Controller,
    runner_cfg: RunnerCfg,
    cfg: &Config,
    args: &RunArgs,
) -> eyre::Result<RunSummary> {
    let (inputs, valve) = open_gpio(cfg)?;
    let runner = Runner::new(inputs, valve, MonotonicClock::new(), controller, runner_cfg);
    drive(runner, cfg, args)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn run_gpio(
    _controller: pump_core::Controller,
    _runner_cfg: RunnerCfg,
    _cfg: &Config,
    _args: &RunArgs,
) -> eyre::Result<RunSummary> {
    eyre::bail!("this build has no GPIO support (enable the `hardware` feature) - use --sim")
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_gpio(
    cfg: &Config,
) -> eyre::Result<(pump_hardware::GpioInputs, pump_hardware::GpioValve)> {
    let p = &cfg.pins;
    let hw = |e: pump_hardware::error::HwError| PumpError::Hardware(e.to_string());
    let inputs = pump_hardware::GpioInputs::new(pump_hardware::InputPins {
        manual_extend: p.manual_extend_in,
        manual_retract: p.manual_retract_in,
        start_auto: p.start_auto_in,
        stop_auto: p.stop_auto_in,
        endstop_in: p.endstop_in,
        endstop_out: p.endstop_out,
        estop: p.estop_in,
    })
    .map_err(hw)
    .wrap_err("open input pins")?;
    let valve = pump_hardware::GpioValve::new(p.extend_out, p.retract_out)
        .map_err(hw)
        .wrap_err("open valve pins")?;
    Ok((inputs, valve))
}

fn status_line(s: &StatusSnapshot) -> String {
    let fault = s.fault.map_or_else(|| "-".to_string(), |f| format!("{f:?}"));
    format!(
        "mode={} dir={} extend={} retract={} estop={} in={} out={} fault={} last={}ms avg={}ms strokes={}",
        s.mode,
        s.cycle_direction,
        u8::from(s.extend_output),
        u8::from(s.retract_output),
        u8::from(s.estop_active),
        u8::from(s.endstop_in),
        u8::from(s.endstop_out),
        fault,
        s.last_stroke_duration_ms,
        s.avg_stroke_duration_ms,
        s.stroke_history.len(),
    )
}

fn drive<I, V, C>(
    mut runner: Runner<I, V, C>,
    cfg: &Config,
    args: &RunArgs,
) -> eyre::Result<RunSummary>
where
    I: InputBank,
    V: Valve,
    C: Clock,
{
    let handle = runner.handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if !handle.shutdown() {
            tracing::warn!("shutdown requested but the control loop is gone");
        }
    }) {
        tracing::warn!(error = %e, "Ctrl-C handler not installed");
    }

    let json = crate::cli::JSON_MODE.get().copied().unwrap_or(false);
    runner.add_sink(move |s: &StatusSnapshot| {
        if json {
            match serde_json::to_string(s) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "status not serializable"),
            }
        } else {
            println!("{}", status_line(s));
        }
    });

    let summary = match args.duration_ms {
        Some(ms) => runner.run_for(Duration::from_millis(ms))?,
        None => runner.run()?,
    };

    persist_if_changed(cfg, runner.controller().settings().get().into())?;
    if let Some(path) = &args.stroke_log {
        write_stroke_log(path, &summary.strokes)?;
        tracing::info!(path = %path.display(), strokes = summary.strokes.len(), "stroke log written");
    }
    Ok(summary)
}

/// Settings edited through the runner handle outlive the process.
fn persist_if_changed(cfg: &Config, effective: PersistedSettings) -> eyre::Result<()> {
    let Some(file) = cfg.settings.file.as_deref() else {
        return Ok(());
    };
    let booted = PersistedSettings {
        cycle_timeout_ms: cfg.safety.cycle_timeout_ms,
        timeout_enabled: cfg.safety.timeout_enabled,
    };
    if effective != booted {
        SettingsStore::new(file).save(&effective)?;
    }
    Ok(())
}

/// Write strokes oldest first as `stroke,duration_ms`.
pub fn write_stroke_log(path: &Path, strokes: &[u64]) -> eyre::Result<()> {
    let mut w = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("create stroke log {}", path.display()))?;
    w.write_record(["stroke", "duration_ms"])?;
    for (i, ms) in strokes.iter().enumerate() {
        w.write_record([(i + 1).to_string(), ms.to_string()])?;
    }
    w.flush()
        .wrap_err_with(|| format!("flush stroke log {}", path.display()))?;
    Ok(())
}

pub fn print_summary(s: &RunSummary, json: bool) -> eyre::Result<()> {
    if json {
        let line = serde_json::json!({
            "summary": {
                "ticks": s.ticks,
                "lateTicks": s.late_ticks,
                "elapsedMs": s.elapsed_ms,
                "mode": s.mode,
                "lastFault": s.last_fault,
                "strokeHistory": s.strokes,
                "avgStrokeDurationMs": s.avg_stroke_ms,
            }
        });
        println!("{line}");
    } else {
        let fault = s.last_fault.map_or_else(|| "none".to_string(), |f| f.to_string());
        println!(
            "stopped after {} ms: {} ticks ({} late), mode {}, {} strokes, avg {} ms, last fault: {}",
            s.elapsed_ms,
            s.ticks,
            s.late_ticks,
            s.mode,
            s.strokes.len(),
            s.avg_stroke_ms,
            fault
        );
    }
    Ok(())
}

/// Open the backend and run one tick with nothing pressed; coils must stay off.
pub fn self_check(cfg: &Config, sim: bool, json: bool) -> eyre::Result<()> {
    let mut cfg = cfg.clone();
    let stored = apply_persisted(&mut cfg)?;
    let controller = controller_from_config(&cfg)?;
    let runner_cfg = RunnerCfg::from(&cfg.runner);

    let backend = if sim {
        let clock = ManualClock::new();
        let rig = SimRig::new(RigParams::default(), Script::new(), clock.clone());
        let mut runner = Runner::new(rig.inputs(), rig.valve(), clock, controller, runner_cfg);
        check_idle(&mut runner)?;
        "sim"
    } else {
        self_check_gpio(controller, runner_cfg, &cfg)?
    };

    if json {
        let line = serde_json::json!({
            "selfCheck": "ok",
            "backend": backend,
            "cycleTimeoutMs": cfg.safety.cycle_timeout_ms,
            "timeoutEnabled": cfg.safety.timeout_enabled,
            "settingsSource": if stored.is_some() { "store" } else { "config" },
        });
        println!("{line}");
    } else {
        println!("self-check ok ({backend} backend)");
    }
    Ok(())
}

fn check_idle<I: InputBank, V: Valve, C: Clock>(runner: &mut Runner<I, V, C>) -> eyre::Result<()> {
    runner.run_once()?;
    let applied = runner.driver().applied();
    if !applied.is_off() {
        return Err(PumpError::State(format!("coils energized while idle: {applied:?}")).into());
    }
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn self_check_gpio(
    controller: pump_core::Controller,
    runner_cfg: RunnerCfg,
    cfg: &Config,
) -> eyre::Result<&'static str> {
    let (inputs, valve) = open_gpio(cfg)?;
    let mut runner = Runner::new(inputs, valve, MonotonicClock::new(), controller, runner_cfg);
    check_idle(&mut runner)?;
    Ok("gpio")
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn self_check_gpio(
    _controller: pump_core::Controller,
    _runner_cfg: RunnerCfg,
    _cfg: &Config,
) -> eyre::Result<&'static str> {
    eyre::bail!("this build has no GPIO support (enable the `hardware` feature) - use --sim")
}
