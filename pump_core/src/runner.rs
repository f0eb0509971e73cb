//! Cooperative scheduler around [`Controller`].
//!
//! Each iteration drains inbound commands, reads inputs, runs one tick,
//! writes the coils, publishes status if due, then sleeps out the rest of
//! the tick period on the injected [`Clock`].

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use eyre::WrapErr;
use pump_traits::{Clock, InputBank, Valve};

use crate::config::{RunnerCfg, SharedSettings};
use crate::controller::{Controller, TickReport};
use crate::error::{Result, SafetyFault};
use crate::hw_error::map_hw_error;
use crate::mode::SystemMode;
use crate::output::OutputDriver;
use crate::status::{PublishGate, StatusSink};

/// Inbound messages from collaborators (update service, signal handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerCommand {
    /// Both coils off until resumed; mode and direction are kept.
    SuspendOutputs,
    ResumeOutputs,
    /// Outputs off, then leave the loop.
    Shutdown,
}

/// Cloneable, `Send` handle for talking to a running loop.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    tx: Sender<RunnerCommand>,
    settings: SharedSettings,
}

impl RunnerHandle {
    /// Returns `false` when the loop is gone.
    pub fn send(&self, cmd: RunnerCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn suspend_outputs(&self) -> bool {
        self.send(RunnerCommand::SuspendOutputs)
    }

    pub fn resume_outputs(&self) -> bool {
        self.send(RunnerCommand::ResumeOutputs)
    }

    pub fn shutdown(&self) -> bool {
        self.send(RunnerCommand::Shutdown)
    }

    /// The configuration record the loop picks up each tick.
    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue(TickReport),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Iterations whose work took longer than the tick period.
    pub late_ticks: u64,
    pub elapsed_ms: u64,
    pub mode: SystemMode,
    pub last_fault: Option<SafetyFault>,
    pub strokes: Vec<u64>,
    pub avg_stroke_ms: u64,
}

pub struct Runner<I: InputBank, V: Valve, C: Clock> {
    inputs: I,
    driver: OutputDriver<V>,
    clock: C,
    controller: Controller,
    cfg: RunnerCfg,
    tx: Sender<RunnerCommand>,
    rx: Receiver<RunnerCommand>,
    sinks: Vec<Box<dyn StatusSink>>,
    gate: PublishGate,
    epoch: Instant,
    ticks: u64,
    late_ticks: u64,
    last_fault: Option<SafetyFault>,
}

impl<I: InputBank, V: Valve, C: Clock> Runner<I, V, C> {
    pub fn new(inputs: I, valve: V, clock: C, controller: Controller, cfg: RunnerCfg) -> Self {
        let (tx, rx) = unbounded();
        let epoch = clock.now();
        Self {
            inputs,
            driver: OutputDriver::new(valve),
            gate: PublishGate::new(cfg.status_interval_ms),
            clock,
            controller,
            cfg,
            tx,
            rx,
            sinks: Vec::new(),
            epoch,
            ticks: 0,
            late_ticks: 0,
            last_fault: None,
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            tx: self.tx.clone(),
            settings: self.controller.settings(),
        }
    }

    pub fn add_sink(&mut self, sink: impl StatusSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn driver(&self) -> &OutputDriver<V> {
        &self.driver
    }

    /// Milliseconds since the loop was created, on the injected clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Force all coils off right now, outside the tick cadence.
    pub fn suspend_outputs(&mut self) -> Result<()> {
        let off = self.controller.suspend_outputs();
        self.driver.apply(off).wrap_err("suspending outputs")?;
        Ok(())
    }

    /// One scheduler iteration, without the trailing sleep.
    pub fn run_once(&mut self) -> Result<Flow> {
        while let Ok(cmd) = self.rx.try_recv() {
            tracing::debug!(?cmd, "runner command");
            match cmd {
                RunnerCommand::SuspendOutputs => self.suspend_outputs()?,
                RunnerCommand::ResumeOutputs => self.controller.resume_outputs(),
                RunnerCommand::Shutdown => {
                    self.driver.all_off().wrap_err("outputs off at shutdown")?;
                    return Ok(Flow::Stop);
                }
            }
        }

        let levels = match self.inputs.read_levels() {
            Ok(l) => l,
            Err(e) => {
                let mapped = map_hw_error(e.as_ref());
                if let Err(off) = self.driver.all_off() {
                    tracing::error!(error = %off, "outputs off after input failure");
                }
                return Err(eyre::Report::new(mapped)).wrap_err("reading inputs");
            }
        };
        let now = self.now_ms();
        let report = self.controller.tick(&levels, now);
        self.driver
            .apply(report.outputs)
            .wrap_err("writing outputs")?;
        self.ticks += 1;
        if report.fault.is_some() {
            self.last_fault = report.fault;
        }

        let snap = self.controller.snapshot();
        if self.gate.offer(&snap, now) {
            self.sinks.retain_mut(|sink| match sink.publish(&snap) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "status sink failed; detaching it");
                    false
                }
            });
        }
        Ok(Flow::Continue(report))
    }

    /// Run until a `Shutdown` command arrives.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_until(None)
    }

    /// Run for `limit` of clock time, or until shutdown.
    pub fn run_for(&mut self, limit: Duration) -> Result<RunSummary> {
        self.run_until(Some(limit))
    }

    fn run_until(&mut self, limit: Option<Duration>) -> Result<RunSummary> {
        let period = Duration::from_millis(self.cfg.tick_ms);
        let begin = self.clock.now();
        tracing::info!(tick_ms = self.cfg.tick_ms, "control loop start");
        loop {
            let started = self.clock.now();
            if limit.is_some_and(|l| started.saturating_duration_since(begin) >= l) {
                break;
            }
            if self.run_once()? == Flow::Stop {
                break;
            }
            let spent = self.clock.now().saturating_duration_since(started);
            if spent < period {
                self.clock.sleep(period - spent);
            } else {
                self.late_ticks += 1;
                tracing::trace!(spent_us = spent.as_micros() as u64, "tick overran period");
            }
        }
        self.driver.all_off().wrap_err("outputs off at loop exit")?;
        let summary = self.summary();
        tracing::info!(
            ticks = summary.ticks,
            late_ticks = summary.late_ticks,
            strokes = summary.strokes.len(),
            "control loop stopped"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let stats = self.controller.stats();
        RunSummary {
            ticks: self.ticks,
            late_ticks: self.late_ticks,
            elapsed_ms: self.now_ms(),
            mode: self.controller.mode(),
            last_fault: self.last_fault,
            strokes: stats.history(),
            avg_stroke_ms: stats.avg_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlCfg;
    use pump_traits::{Coil, InputLevels, ManualClock};
    use std::sync::{Arc, Mutex};

    struct Fixed(InputLevels);
    impl InputBank for Fixed {
        fn read_levels(
            &mut self,
        ) -> std::result::Result<InputLevels, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0)
        }
    }

    struct Broken;
    impl InputBank for Broken {
        fn read_levels(
            &mut self,
        ) -> std::result::Result<InputLevels, Box<dyn std::error::Error + Send + Sync>> {
            Err("gpio read timeout".into())
        }
    }

    #[derive(Clone, Default)]
    struct Coils(Arc<Mutex<(bool, bool)>>);
    impl Valve for Coils {
        fn set_coil(
            &mut self,
            coil: Coil,
            energized: bool,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mut g = self.0.lock().unwrap();
            match coil {
                Coil::Extend => g.0 = energized,
                Coil::Retract => g.1 = energized,
            }
            Ok(())
        }
    }

    fn runner<I: InputBank>(inputs: I, coils: Coils) -> Runner<I, Coils, ManualClock> {
        let ctl = Controller::new(ControlCfg::default(), SharedSettings::default());
        Runner::new(inputs, coils, ManualClock::new(), ctl, RunnerCfg::default())
    }

    #[test]
    fn ticks_at_the_configured_period() {
        let mut r = runner(Fixed(InputLevels::default()), Coils::default());
        let s = r.run_for(Duration::from_millis(100)).unwrap();
        assert_eq!(s.ticks, 20);
        assert_eq!(s.late_ticks, 0);
        assert_eq!(s.elapsed_ms, 100);
    }

    #[test]
    fn shutdown_command_stops_with_outputs_off() {
        let mut levels = InputLevels::default();
        levels.manual_extend = pump_traits::Level::Low;
        let coils = Coils::default();
        let mut r = runner(Fixed(levels), coils.clone());
        r.run_for(Duration::from_millis(100)).unwrap();
        assert!(r.controller().outputs().extend);
        r.run_once().unwrap();
        assert_eq!(*coils.0.lock().unwrap(), (true, false));

        assert!(r.handle().shutdown());
        assert_eq!(r.run_once().unwrap(), Flow::Stop);
        assert_eq!(*coils.0.lock().unwrap(), (false, false));
    }

    #[test]
    fn input_failure_propagates_after_forcing_off() {
        let coils = Coils::default();
        *coils.0.lock().unwrap() = (true, false);
        let mut r = runner(Broken, coils.clone());
        let err = r.run_once().expect_err("read fails");
        assert!(format!("{err:#}").contains("reading inputs"));
        assert_eq!(*coils.0.lock().unwrap(), (false, false));
    }

    #[test]
    fn sinks_receive_published_snapshots() {
        let seen = Arc::new(Mutex::new(0usize));
        let s2 = seen.clone();
        let mut r = runner(Fixed(InputLevels::default()), Coils::default());
        r.add_sink(move |_: &crate::status::StatusSnapshot| *s2.lock().unwrap() += 1);
        r.run_for(Duration::from_millis(2_500)).unwrap();
        // first tick plus one heartbeat per second of unchanged state
        assert_eq!(*seen.lock().unwrap(), 3);
    }
}
