//! The control tick.
//!
//! One call to [`Controller::tick`] runs, in order:
//! 1. settings copy (operator edits land here, never mid-tick)
//! 2. interlock evaluation (e-stop, dual end stop, cycle timeout)
//! 3. command channel sampling and edge consumption
//! 4. mode transition
//! 5. AUTO reversal at end stops, or MANUAL pre-steer
//! 6. coil command and sequencing
//!
//! The controller is pure state: reading inputs and writing the valve is the
//! caller's job (see `runner`).

use pump_traits::InputLevels;

use crate::config::{ControlCfg, SharedSettings, TimeoutSettings};
use crate::cycle::{CycleDirection, CycleDirector, EndStops, Reversal};
use crate::debounce::{DebouncedChannel, Polarity};
use crate::error::SafetyFault;
use crate::mode::{CommandEdges, ModeController, ModeTransition, SystemMode, TransitionReason};
use crate::output::{self, ManualHold, OutputPair};
use crate::safety::{InterlockInputs, SafetyInterlock, SafetyState};
use crate::status::StatusSnapshot;
use crate::telemetry::StrokeStats;

/// The four debounced command buttons.
#[derive(Debug, Clone)]
pub struct Channels {
    pub manual_extend: DebouncedChannel,
    pub manual_retract: DebouncedChannel,
    pub start_auto: DebouncedChannel,
    pub stop_auto: DebouncedChannel,
}

impl Channels {
    fn new(window_ms: u64) -> Self {
        let ch = |name| DebouncedChannel::new(name, Polarity::ActiveLow, window_ms);
        Self {
            manual_extend: ch("manual_extend"),
            manual_retract: ch("manual_retract"),
            start_auto: ch("start_auto"),
            stop_auto: ch("stop_auto"),
        }
    }

    fn sample(&mut self, l: &InputLevels, now_ms: u64) {
        self.manual_extend.sample(l.manual_extend, now_ms);
        self.manual_retract.sample(l.manual_retract, now_ms);
        self.start_auto.sample(l.start_auto, now_ms);
        self.stop_auto.sample(l.stop_auto, now_ms);
    }

    fn take_edges(&mut self) -> CommandEdges {
        CommandEdges {
            manual_extend: self.manual_extend.take_edge(),
            manual_retract: self.manual_retract.take_edge(),
            start_auto: self.start_auto.take_edge(),
            stop_auto: self.stop_auto.take_edge(),
        }
    }

    fn rearm(&mut self, l: &InputLevels, now_ms: u64) {
        self.manual_extend.rearm(l.manual_extend, now_ms);
        self.manual_retract.rearm(l.manual_retract, now_ms);
        self.start_auto.rearm(l.start_auto, now_ms);
        self.stop_auto.rearm(l.stop_auto, now_ms);
    }

    fn held(&self) -> ManualHold {
        ManualHold {
            extend: self.manual_extend.is_active(),
            retract: self.manual_retract.is_active(),
        }
    }
}

/// All mutable control state, owned by one controller.
#[derive(Debug, Clone)]
pub struct ControlContext {
    pub mode: SystemMode,
    pub direction: CycleDirection,
    pub outputs: OutputPair,
    pub channels: Channels,
    pub stops: EndStops,
    pub safety: SafetyState,
    pub stats: StrokeStats,
    pub settings: TimeoutSettings,
    pub suspended: bool,
    pub now_ms: u64,
}

/// What one tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub outputs: OutputPair,
    pub mode: SystemMode,
    pub direction: CycleDirection,
    pub fault: Option<SafetyFault>,
    pub transition: Option<ModeTransition>,
    pub reversal: Option<Reversal>,
    /// Stroke accepted into telemetry on this tick.
    pub stroke_ms: Option<u64>,
}

pub struct Controller {
    cfg: ControlCfg,
    ctx: ControlContext,
    shared: SharedSettings,
    modes: ModeController,
    director: CycleDirector,
}

impl Controller {
    /// Boot state: MANUAL, STOPPED, outputs off, channels released, no strokes.
    pub fn new(cfg: ControlCfg, shared: SharedSettings) -> Self {
        let ctx = ControlContext {
            mode: SystemMode::Manual,
            direction: CycleDirection::Stopped,
            outputs: OutputPair::OFF,
            channels: Channels::new(cfg.debounce_ms),
            stops: EndStops::default(),
            safety: SafetyState::default(),
            stats: StrokeStats::default(),
            settings: shared.get(),
            suspended: false,
            now_ms: 0,
        };
        Self {
            modes: ModeController::new(cfg.resume),
            director: CycleDirector::new(cfg.cycle_delay_ms),
            cfg,
            ctx,
            shared,
        }
    }

    pub fn settings(&self) -> SharedSettings {
        self.shared.clone()
    }

    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    #[inline]
    pub fn mode(&self) -> SystemMode {
        self.ctx.mode
    }

    #[inline]
    pub fn direction(&self) -> CycleDirection {
        self.ctx.direction
    }

    #[inline]
    pub fn outputs(&self) -> OutputPair {
        self.ctx.outputs
    }

    #[inline]
    pub fn fault(&self) -> Option<SafetyFault> {
        self.ctx.safety.fault
    }

    #[inline]
    pub fn estop_active(&self) -> bool {
        self.ctx.safety.estop_active
    }

    pub fn stats(&self) -> &StrokeStats {
        &self.ctx.stats
    }

    #[inline]
    pub fn outputs_suspended(&self) -> bool {
        self.ctx.suspended
    }

    /// Force both coils off until [`Controller::resume_outputs`], leaving
    /// mode and direction untouched. Returns the pair to write immediately.
    ///
    /// The stroke timer is frozen for the duration, so a long suspension
    /// neither trips the cycle timeout nor inflates the next stroke.
    pub fn suspend_outputs(&mut self) -> OutputPair {
        if !self.ctx.suspended {
            tracing::warn!(mode = %self.ctx.mode, "outputs suspended");
        }
        self.ctx.suspended = true;
        self.ctx.outputs = OutputPair::OFF;
        OutputPair::OFF
    }

    pub fn resume_outputs(&mut self) {
        if self.ctx.suspended {
            tracing::info!("outputs resumed");
        }
        self.ctx.suspended = false;
    }

    /// Run one control tick against a fresh input reading.
    pub fn tick(&mut self, levels: &InputLevels, now_ms: u64) -> TickReport {
        let before_mode = self.ctx.mode;
        let before_dir = self.ctx.direction;
        if self.ctx.suspended {
            // Stroke timing stands still while the coils are held off.
            let paused = now_ms.saturating_sub(self.ctx.now_ms);
            let safety = &mut self.ctx.safety;
            safety.cycle_start_ms = safety.cycle_start_ms.saturating_add(paused);
            safety.last_reversal_ms = safety.last_reversal_ms.saturating_add(paused);
        }
        self.ctx.now_ms = now_ms;
        self.ctx.settings = self.shared.get();

        let stops = EndStops::from_levels(levels);
        if stops != self.ctx.stops {
            tracing::debug!(at_in = stops.at_in, at_out = stops.at_out, "end stops changed");
        }
        self.ctx.stops = stops;

        let estop = levels.estop.is_high();
        if !estop && self.ctx.safety.estop_active {
            self.release_estop(levels, now_ms);
        }

        let inputs = InterlockInputs {
            estop,
            stops,
            mode: self.ctx.mode,
            stroke_elapsed_ms: now_ms.saturating_sub(self.ctx.safety.cycle_start_ms),
            timeout: self.ctx.settings,
        };
        if let Some(fault) = SafetyInterlock::evaluate(&inputs) {
            let transition = self.trip(fault);
            if fault != SafetyFault::EmergencyStopActive {
                // Keep debounce timing continuous; commands are void this tick.
                self.ctx.channels.sample(levels, now_ms);
                let _ = self.ctx.channels.take_edges();
            }
            return self.report(transition, None, None);
        }

        self.ctx.channels.sample(levels, now_ms);
        let edges = self.ctx.channels.take_edges();
        let transition = self.modes.transition(self.ctx.mode, edges);
        if let Some(t) = transition {
            self.enter(t, now_ms);
        }

        let mut reversal = None;
        let mut stroke_ms = None;
        match self.ctx.mode {
            SystemMode::Auto => {
                let since = now_ms.saturating_sub(self.ctx.safety.cycle_start_ms);
                if let Some(r) = self.director.step(self.ctx.direction, stops, since) {
                    self.ctx.direction = r.to;
                    self.ctx.safety.cycle_start_ms = now_ms;
                    self.ctx.safety.last_reversal_ms = now_ms;
                    if let Some(s) = r.stroke_ms
                        && self.ctx.stats.record_stroke(s)
                    {
                        stroke_ms = Some(s);
                    }
                    tracing::info!(from = %r.from, to = %r.to, raw_ms = r.raw_ms, "end stop reached, reversing");
                    reversal = Some(r);
                }
            }
            SystemMode::Manual if self.cfg.presteer_from_endstops => {
                let d = CycleDirector::presteer(self.ctx.direction, stops);
                if d != self.ctx.direction {
                    tracing::debug!(from = %self.ctx.direction, to = %d, "direction pre-steered by end stop");
                    self.ctx.direction = d;
                }
            }
            SystemMode::Manual => {}
        }

        let quiescent = self
            .director
            .in_quiescence(now_ms, self.ctx.safety.last_reversal_ms);
        let desired = if self.ctx.suspended {
            OutputPair::OFF
        } else {
            output::command(
                self.ctx.mode,
                self.ctx.direction,
                self.ctx.channels.held(),
                stops,
                quiescent,
            )
        };
        // Any mode or direction change passes through an all-off tick.
        self.ctx.outputs = if self.ctx.mode != before_mode || self.ctx.direction != before_dir {
            OutputPair::OFF
        } else {
            OutputPair::sequenced(self.ctx.outputs, desired)
        };

        self.report(transition, reversal, stroke_ms)
    }

    fn enter(&mut self, t: ModeTransition, now_ms: u64) {
        self.ctx.mode = t.to;
        match t.to {
            SystemMode::Auto => {
                self.ctx.direction = self.modes.resume_direction(self.ctx.direction);
                self.ctx.safety.cycle_start_ms = now_ms;
                self.ctx.safety.last_reversal_ms = now_ms;
                if let Some(f) = self.ctx.safety.fault.take() {
                    tracing::info!(fault = %f, "fault acknowledged by AUTO entry");
                }
                tracing::info!(direction = %self.ctx.direction, "entering AUTO");
            }
            SystemMode::Manual => {
                tracing::info!(reason = ?t.reason, direction = %self.ctx.direction, "leaving AUTO");
            }
        }
        self.ctx.outputs = OutputPair::OFF;
    }

    fn trip(&mut self, fault: SafetyFault) -> Option<ModeTransition> {
        let from = self.ctx.mode;
        if self.ctx.safety.fault != Some(fault) {
            tracing::error!(fault = %fault, mode = %from, direction = %self.ctx.direction, "safety interlock tripped");
        }
        self.ctx.safety.fault = Some(fault);
        if fault == SafetyFault::EmergencyStopActive {
            self.ctx.safety.estop_active = true;
        }
        self.ctx.mode = SystemMode::Manual;
        self.ctx.direction = CycleDirection::Stopped;
        self.ctx.outputs = OutputPair::OFF;
        (from == SystemMode::Auto).then_some(ModeTransition {
            from,
            to: SystemMode::Manual,
            reason: TransitionReason::Interlock(fault),
        })
    }

    fn release_estop(&mut self, levels: &InputLevels, now_ms: u64) {
        self.ctx.safety.estop_active = false;
        if self.ctx.safety.fault == Some(SafetyFault::EmergencyStopActive) {
            self.ctx.safety.fault = None;
        }
        // Buttons held through the release must not fire.
        self.ctx.channels.rearm(levels, now_ms);
        tracing::warn!("emergency stop released; remaining in MANUAL");
    }

    fn report(
        &self,
        transition: Option<ModeTransition>,
        reversal: Option<Reversal>,
        stroke_ms: Option<u64>,
    ) -> TickReport {
        TickReport {
            outputs: self.ctx.outputs,
            mode: self.ctx.mode,
            direction: self.ctx.direction,
            fault: self.ctx.safety.fault,
            transition,
            reversal,
            stroke_ms,
        }
    }

    /// Snapshot of the current state for observers.
    pub fn snapshot(&self) -> StatusSnapshot {
        let now = self.ctx.now_ms;
        let hold = self.cfg.press_hold_ms;
        let ch = &self.ctx.channels;
        StatusSnapshot {
            estop_active: self.ctx.safety.estop_active,
            mode: self.ctx.mode,
            cycle_direction: self.ctx.direction,
            extend_output: self.ctx.outputs.extend,
            retract_output: self.ctx.outputs.retract,
            manual_extend_active: ch.manual_extend.recently_active(now, hold),
            manual_retract_active: ch.manual_retract.recently_active(now, hold),
            start_auto_active: ch.start_auto.recently_active(now, hold),
            stop_auto_active: ch.stop_auto.recently_active(now, hold),
            endstop_in: self.ctx.stops.at_in,
            endstop_out: self.ctx.stops.at_out,
            cycle_timeout_ms: self.ctx.settings.cycle_timeout_ms(),
            timeout_enabled: self.ctx.settings.enabled(),
            last_stroke_duration_ms: self.ctx.stats.last_ms(),
            avg_stroke_duration_ms: self.ctx.stats.avg_ms(),
            stroke_history: self.ctx.stats.history(),
            fault: self.ctx.safety.fault,
            outputs_suspended: self.ctx.suspended,
        }
    }
}
