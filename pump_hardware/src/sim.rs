//! Simulated actuator rig.
//!
//! A single-axis position model driven by the two coils, with end stops at
//! both travel limits and a scripted operator (buttons, e-stop, jams, forced
//! sensor readings). Time comes from the injected clock, so a `ManualClock`
//! shared with the control loop gives fully deterministic runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use pump_traits::{Clock, Coil, InputBank, InputLevels, Level, Valve};

use crate::error::{HwError, Result};

/// Distance from a limit at which its end stop reads triggered (mm).
const STOP_BAND_MM: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    ManualExtend,
    ManualRetract,
    StartAuto,
    StopAuto,
}

impl Button {
    fn index(self) -> usize {
        match self {
            Button::ManualExtend => 0,
            Button::ManualRetract => 1,
            Button::StartAuto => 2,
            Button::StopAuto => 3,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "manual-extend" | "extend" => Some(Button::ManualExtend),
            "manual-retract" | "retract" => Some(Button::ManualRetract),
            "start" | "start-auto" => Some(Button::StartAuto),
            "stop" | "stop-auto" => Some(Button::StopAuto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigEvent {
    Press(Button),
    Release(Button),
    /// `true` opens the e-stop circuit.
    Estop(bool),
    /// A jammed actuator does not move regardless of the coils.
    Jam(bool),
    /// Pin an end-stop reading; `None` hands it back to the position model.
    ForceStop(Stop, Option<bool>),
}

/// Timed operator actions, applied when rig time reaches them.
#[derive(Debug, Clone, Default)]
pub struct Script {
    events: Vec<(u64, RigEvent)>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn at(mut self, at_ms: u64, ev: RigEvent) -> Self {
        self.events.push((at_ms, ev));
        self
    }

    /// Press at `at_ms`, release `hold_ms` later.
    #[must_use]
    pub fn tap(self, at_ms: u64, b: Button, hold_ms: u64) -> Self {
        self.at(at_ms, RigEvent::Press(b))
            .at(at_ms.saturating_add(hold_ms), RigEvent::Release(b))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Parse one event per line:
    ///
    /// ```text
    /// # comments and blank lines are skipped
    /// 500   tap start 120
    /// 9000  press manual-retract
    /// 9800  release manual-retract
    /// 12000 estop open
    /// 12500 jam on
    /// 13000 endstop out triggered   # or: clear | auto
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut script = Script::new();
        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let body = raw.split('#').next().unwrap_or("").trim();
            if body.is_empty() {
                continue;
            }
            let err = |msg: &str| HwError::Script {
                line,
                msg: msg.to_string(),
            };
            let words: Vec<&str> = body.split_whitespace().collect();
            let at: u64 = words[0]
                .parse()
                .map_err(|_| err("expected a time in ms first"))?;
            let button = |w: Option<&&str>| {
                w.and_then(|s| Button::parse(s))
                    .ok_or_else(|| err("unknown button"))
            };
            script = match (words.get(1).copied(), words.len()) {
                (Some("press"), 3) => script.at(at, RigEvent::Press(button(words.get(2))?)),
                (Some("release"), 3) => script.at(at, RigEvent::Release(button(words.get(2))?)),
                (Some("tap"), 3 | 4) => {
                    let hold: u64 = match words.get(3) {
                        Some(h) => h.parse().map_err(|_| err("bad hold time"))?,
                        None => 100,
                    };
                    if at.checked_add(hold).is_none() {
                        return Err(err("time overflow"));
                    }
                    script.tap(at, button(words.get(2))?, hold)
                }
                (Some("estop"), 3) => match words[2] {
                    "open" => script.at(at, RigEvent::Estop(true)),
                    "close" => script.at(at, RigEvent::Estop(false)),
                    _ => return Err(err("estop takes open|close")),
                },
                (Some("jam"), 3) => match words[2] {
                    "on" => script.at(at, RigEvent::Jam(true)),
                    "off" => script.at(at, RigEvent::Jam(false)),
                    _ => return Err(err("jam takes on|off")),
                },
                (Some("endstop"), 4) => {
                    let stop = match words[2] {
                        "in" => Stop::In,
                        "out" => Stop::Out,
                        _ => return Err(err("endstop takes in|out")),
                    };
                    let forced = match words[3] {
                        "triggered" => Some(true),
                        "clear" => Some(false),
                        "auto" => None,
                        _ => return Err(err("endstop state is triggered|clear|auto")),
                    };
                    script.at(at, RigEvent::ForceStop(stop, forced))
                }
                _ => return Err(err("unrecognised event")),
            };
        }
        Ok(script)
    }

    fn into_queue(mut self) -> VecDeque<(u64, RigEvent)> {
        self.events.sort_by_key(|(t, _)| *t);
        self.events.into()
    }
}

/// Physical parameters of the simulated actuator.
#[derive(Debug, Clone, Copy)]
pub struct RigParams {
    pub travel_mm: f64,
    pub extend_mm_per_s: f64,
    pub retract_mm_per_s: f64,
    /// Initial rod position; 0 is fully in.
    pub start_mm: f64,
}

impl Default for RigParams {
    fn default() -> Self {
        Self {
            travel_mm: 200.0,
            extend_mm_per_s: 50.0,
            retract_mm_per_s: 80.0,
            start_mm: 0.0,
        }
    }
}

#[derive(Debug)]
struct RigState {
    params: RigParams,
    position_mm: f64,
    extend: bool,
    retract: bool,
    jammed: bool,
    forced: [Option<bool>; 2],
    estop_open: bool,
    pressed: [bool; 4],
    queue: VecDeque<(u64, RigEvent)>,
    last_ms: u64,
    overlaps: u64,
    arrivals: [u64; 2],
}

impl RigState {
    fn advance(&mut self, now_ms: u64) {
        let dt_s = now_ms.saturating_sub(self.last_ms) as f64 / 1_000.0;
        self.last_ms = self.last_ms.max(now_ms);
        if !self.jammed && dt_s > 0.0 {
            let travel = self.params.travel_mm;
            let (was_in, was_out) = self.natural_stops();
            match (self.extend, self.retract) {
                (true, false) => self.position_mm += self.params.extend_mm_per_s * dt_s,
                (false, true) => self.position_mm -= self.params.retract_mm_per_s * dt_s,
                _ => {}
            }
            self.position_mm = self.position_mm.clamp(0.0, travel);
            let (now_in, now_out) = self.natural_stops();
            if now_in && !was_in {
                self.arrivals[0] += 1;
                tracing::trace!(now_ms, "rig reached IN limit");
            }
            if now_out && !was_out {
                self.arrivals[1] += 1;
                tracing::trace!(now_ms, "rig reached OUT limit");
            }
        }
        while let Some(&(at, ev)) = self.queue.front() {
            if at > now_ms {
                break;
            }
            self.queue.pop_front();
            tracing::debug!(at_ms = at, ?ev, "rig event");
            match ev {
                RigEvent::Press(b) => self.pressed[b.index()] = true,
                RigEvent::Release(b) => self.pressed[b.index()] = false,
                RigEvent::Estop(open) => self.estop_open = open,
                RigEvent::Jam(j) => self.jammed = j,
                RigEvent::ForceStop(Stop::In, f) => self.forced[0] = f,
                RigEvent::ForceStop(Stop::Out, f) => self.forced[1] = f,
            }
        }
    }

    fn natural_stops(&self) -> (bool, bool) {
        (
            self.position_mm <= STOP_BAND_MM,
            self.position_mm >= self.params.travel_mm - STOP_BAND_MM,
        )
    }

    fn levels(&self) -> InputLevels {
        let (nat_in, nat_out) = self.natural_stops();
        let button = |b: Button| {
            if self.pressed[b.index()] {
                Level::Low
            } else {
                Level::High
            }
        };
        InputLevels {
            manual_extend: button(Button::ManualExtend),
            manual_retract: button(Button::ManualRetract),
            start_auto: button(Button::StartAuto),
            stop_auto: button(Button::StopAuto),
            endstop_in: Level::from(self.forced[0].unwrap_or(nat_in)),
            endstop_out: Level::from(self.forced[1].unwrap_or(nat_out)),
            estop: Level::from(self.estop_open),
        }
    }
}

#[derive(Debug)]
struct Shared<C> {
    state: Arc<Mutex<RigState>>,
    clock: C,
    epoch: Instant,
}

impl<C: Clock + Clone> Clone for Shared<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: self.clock.clone(),
            epoch: self.epoch,
        }
    }
}

impl<C: Clock> Shared<C> {
    fn lock_at_now(&self) -> MutexGuard<'_, RigState> {
        let now = self.clock.ms_since(self.epoch);
        let mut g = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        g.advance(now);
        g
    }
}

/// Owns the shared rig; hand out `inputs()` and `valve()` to the control loop.
pub struct SimRig<C: Clock + Clone> {
    shared: Shared<C>,
}

impl<C: Clock + Clone> SimRig<C> {
    /// Rig time 0 is the clock's current instant.
    pub fn new(params: RigParams, script: Script, clock: C) -> Self {
        let epoch = clock.now();
        let state = RigState {
            position_mm: params.start_mm.clamp(0.0, params.travel_mm),
            params,
            extend: false,
            retract: false,
            jammed: false,
            forced: [None, None],
            estop_open: false,
            pressed: [false; 4],
            queue: script.into_queue(),
            last_ms: 0,
            overlaps: 0,
            arrivals: [0, 0],
        };
        Self {
            shared: Shared {
                state: Arc::new(Mutex::new(state)),
                clock,
                epoch,
            },
        }
    }

    pub fn inputs(&self) -> SimInputs<C> {
        SimInputs {
            shared: self.shared.clone(),
        }
    }

    pub fn valve(&self) -> SimValve<C> {
        SimValve {
            shared: self.shared.clone(),
        }
    }

    pub fn probe(&self) -> RigProbe {
        RigProbe {
            state: Arc::clone(&self.shared.state),
        }
    }
}

pub struct SimInputs<C: Clock + Clone> {
    shared: Shared<C>,
}

impl<C: Clock + Clone> InputBank for SimInputs<C> {
    fn read_levels(&mut self) -> std::result::Result<InputLevels, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.shared.lock_at_now().levels())
    }
}

pub struct SimValve<C: Clock + Clone> {
    shared: Shared<C>,
}

impl<C: Clock + Clone> Valve for SimValve<C> {
    fn set_coil(
        &mut self,
        coil: Coil,
        energized: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut g = self.shared.lock_at_now();
        match coil {
            Coil::Extend => g.extend = energized,
            Coil::Retract => g.retract = energized,
        }
        if g.extend && g.retract {
            g.overlaps += 1;
            tracing::warn!("both coils energized on the simulated valve");
        }
        Ok(())
    }
}

/// Read-only view of the rig for assertions and the CLI summary.
#[derive(Debug, Clone)]
pub struct RigProbe {
    state: Arc<Mutex<RigState>>,
}

impl RigProbe {
    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn position_mm(&self) -> f64 {
        self.lock().position_mm
    }

    /// `(extend, retract)` as last written.
    pub fn coils(&self) -> (bool, bool) {
        let g = self.lock();
        (g.extend, g.retract)
    }

    /// Times both coils were seen energized together.
    pub fn overlaps(&self) -> u64 {
        self.lock().overlaps
    }

    /// `(in, out)` limit arrivals.
    pub fn arrivals(&self) -> (u64, u64) {
        let g = self.lock();
        (g.arrivals[0], g.arrivals[1])
    }

    pub fn pending_events(&self) -> usize {
        self.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pump_traits::ManualClock;
    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn extend_moves_rod_to_the_out_stop() {
        let clock = ManualClock::new();
        let rig = SimRig::new(RigParams::default(), Script::new(), clock.clone());
        let mut inputs = rig.inputs();
        let mut valve = rig.valve();

        let l = inputs.read_levels().unwrap();
        assert!(l.endstop_in.is_high());
        assert!(l.endstop_out.is_low());

        valve.set_coil(Coil::Extend, true).unwrap();
        clock.advance(Duration::from_secs(2));
        let l = inputs.read_levels().unwrap();
        assert!(l.endstop_in.is_low());
        assert!((rig.probe().position_mm() - 100.0).abs() < 1e-6);

        clock.advance(Duration::from_secs(3));
        let l = inputs.read_levels().unwrap();
        assert!(l.endstop_out.is_high());
        assert_eq!(rig.probe().arrivals(), (0, 1));
    }

    #[test]
    fn scripted_events_apply_at_their_time() {
        let clock = ManualClock::new();
        let script = Script::new()
            .tap(100, Button::StartAuto, 50)
            .at(300, RigEvent::Estop(true));
        let rig = SimRig::new(RigParams::default(), script, clock.clone());
        let mut inputs = rig.inputs();

        assert!(inputs.read_levels().unwrap().start_auto.is_high());
        clock.set_offset(Duration::from_millis(120));
        assert!(inputs.read_levels().unwrap().start_auto.is_low());
        clock.set_offset(Duration::from_millis(150));
        assert!(inputs.read_levels().unwrap().start_auto.is_high());
        clock.set_offset(Duration::from_millis(300));
        assert!(inputs.read_levels().unwrap().estop.is_high());
        assert_eq!(rig.probe().pending_events(), 0);
    }

    #[test]
    fn jam_freezes_position() {
        let clock = ManualClock::new();
        let script = Script::new().at(0, RigEvent::Jam(true));
        let rig = SimRig::new(RigParams::default(), script, clock.clone());
        let mut valve = rig.valve();
        valve.set_coil(Coil::Extend, true).unwrap();
        clock.advance(Duration::from_secs(1));
        let _ = rig.inputs().read_levels().unwrap();
        assert_eq!(rig.probe().position_mm(), 0.0);
    }

    #[test]
    fn overlap_is_counted() {
        let rig = SimRig::new(RigParams::default(), Script::new(), ManualClock::new());
        let mut v = rig.valve();
        v.set_coil(Coil::Extend, true).unwrap();
        v.set_coil(Coil::Retract, true).unwrap();
        assert_eq!(rig.probe().overlaps(), 1);
    }

    #[test]
    fn parses_script_text() {
        let s = Script::parse(
            "# demo\n500 tap start 120\n\n9000 press manual-retract\n12000 estop open\n13000 endstop out triggered # stuck\n",
        )
        .unwrap();
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn tap_at_end_of_time_saturates() {
        let s = Script::new().tap(u64::MAX - 1, Button::StartAuto, 5);
        let times: Vec<u64> = s.into_queue().into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![u64::MAX - 1, u64::MAX]);
    }

    #[rstest]
    #[case("abc press start", 1)]
    #[case("10 press elbow", 1)]
    #[case("10 estop maybe", 1)]
    #[case("\n\n10 endstop left auto", 3)]
    #[case("10 wiggle", 1)]
    #[case("1 tap start\n18446744073709551615 tap start 5", 2)]
    fn rejects_bad_script_lines(#[case] text: &str, #[case] line: usize) {
        match Script::parse(text) {
            Err(HwError::Script { line: l, .. }) => assert_eq!(l, line),
            other => panic!("expected script error, got {other:?}"),
        }
    }
}
