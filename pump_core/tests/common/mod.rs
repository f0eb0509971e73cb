#![allow(dead_code)]

use pump_core::{ControlCfg, Controller, CycleDirection, SharedSettings, TickReport};
use pump_traits::{InputLevels, Level};

pub const TICK_MS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub enum Button {
    ManualExtend,
    ManualRetract,
    StartAuto,
    StopAuto,
}

/// Drives a controller tick by tick with hand-set input levels.
pub struct Harness {
    pub ctl: Controller,
    pub levels: InputLevels,
    pub now: u64,
    pub last: Option<TickReport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cfg(ControlCfg::default())
    }

    pub fn with_cfg(cfg: ControlCfg) -> Self {
        Self {
            ctl: Controller::new(cfg, SharedSettings::default()),
            levels: InputLevels::default(),
            now: 0,
            last: None,
        }
    }

    fn button(&mut self, b: Button) -> &mut Level {
        match b {
            Button::ManualExtend => &mut self.levels.manual_extend,
            Button::ManualRetract => &mut self.levels.manual_retract,
            Button::StartAuto => &mut self.levels.start_auto,
            Button::StopAuto => &mut self.levels.stop_auto,
        }
    }

    pub fn press(&mut self, b: Button) {
        *self.button(b) = Level::Low;
    }

    pub fn release(&mut self, b: Button) {
        *self.button(b) = Level::High;
    }

    /// Hold, wait out the debounce window, release, wait it out again.
    pub fn tap(&mut self, b: Button) -> TickReport {
        self.press(b);
        self.run(60);
        self.release(b);
        self.run(60)
    }

    pub fn set_stops(&mut self, at_in: bool, at_out: bool) {
        self.levels.endstop_in = Level::from(at_in);
        self.levels.endstop_out = Level::from(at_out);
    }

    pub fn set_estop(&mut self, open: bool) {
        self.levels.estop = Level::from(open);
    }

    /// One tick at `now`, then advance time.
    pub fn step(&mut self) -> TickReport {
        let r = self.ctl.tick(&self.levels, self.now);
        self.now += TICK_MS;
        self.last = Some(r);
        r
    }

    /// Tick for `ms` of time; returns the last report.
    pub fn run(&mut self, ms: u64) -> TickReport {
        let mut r = self.step();
        for _ in 1..ms.div_ceil(TICK_MS) {
            r = self.step();
        }
        r
    }

    /// Tick until `now` reaches `t` (exclusive).
    pub fn run_until(&mut self, t: u64) -> Option<TickReport> {
        while self.now < t {
            self.step();
        }
        self.last
    }

    /// Enter AUTO from MANUAL with a start tap.
    pub fn enter_auto(&mut self) -> TickReport {
        self.tap(Button::StartAuto)
    }

    /// Trigger the end stop the actuator is heading to for one tick.
    pub fn reach_stop(&mut self) -> TickReport {
        match self.ctl.direction() {
            CycleDirection::Out => self.set_stops(false, true),
            CycleDirection::In => self.set_stops(true, false),
            CycleDirection::Stopped => {}
        }
        let r = self.step();
        self.set_stops(false, false);
        r
    }
}
