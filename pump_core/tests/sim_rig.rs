use std::time::Duration;

use pump_core::{
    ControlCfg, Controller, RunnerCfg, Runner, SafetyFault, SharedSettings, SystemMode,
    TimeoutSettings, feed,
};
use pump_hardware::sim::{Button, RigEvent, RigParams, Script, SimInputs, SimRig, SimValve, Stop};
use pump_traits::ManualClock;

type SimRunner = Runner<SimInputs<ManualClock>, SimValve<ManualClock>, ManualClock>;

fn rig_runner(script: Script, timeout: TimeoutSettings) -> (SimRig<ManualClock>, SimRunner) {
    let clock = ManualClock::new();
    let rig = SimRig::new(RigParams::default(), script, clock.clone());
    let ctl = Controller::new(ControlCfg::default(), SharedSettings::new(timeout));
    let runner = Runner::new(rig.inputs(), rig.valve(), clock, ctl, RunnerCfg::default());
    (rig, runner)
}

fn start_at_200() -> Script {
    Script::new().tap(200, Button::StartAuto, 120)
}

#[test]
fn reciprocates_and_records_both_stroke_lengths() {
    let (rig, mut runner) = rig_runner(start_at_200(), TimeoutSettings::default());
    let summary = runner.run_for(Duration::from_secs(30)).unwrap();

    assert_eq!(summary.mode, SystemMode::Auto);
    assert_eq!(summary.last_fault, None);
    assert_eq!(rig.probe().overlaps(), 0);
    assert!(summary.strokes.len() >= 6, "strokes: {:?}", summary.strokes);

    // 199.5 mm at 50 mm/s out and 80 mm/s in, quantised to 5 ms ticks
    for (i, s) in summary.strokes.iter().enumerate() {
        let expect = if i % 2 == 0 { 3_990 } else { 2_494 };
        assert!(
            s.abs_diff(expect) <= 10,
            "stroke {i} = {s} ms, expected about {expect}"
        );
    }
    let (ins, outs) = rig.probe().arrivals();
    assert!(outs >= 3 && ins >= 3);
}

#[test]
fn jammed_actuator_trips_the_cycle_timeout() {
    let script = start_at_200().at(2_000, RigEvent::Jam(true));
    let (rig, mut runner) = rig_runner(script, TimeoutSettings::new(5_000, true).unwrap());
    let summary = runner.run_for(Duration::from_secs(8)).unwrap();

    assert_eq!(summary.mode, SystemMode::Manual);
    assert_eq!(summary.last_fault, Some(SafetyFault::CycleTimeoutExceeded));
    assert!(summary.strokes.is_empty());
    assert_eq!(rig.probe().coils(), (false, false));
}

#[test]
fn estop_mid_stroke_stops_and_never_resumes_on_its_own() {
    let script = start_at_200()
        .at(2_000, RigEvent::Estop(true))
        .at(3_000, RigEvent::Estop(false));
    let (rig, mut runner) = rig_runner(script, TimeoutSettings::default());

    runner.run_for(Duration::from_millis(2_100)).unwrap();
    assert_eq!(runner.controller().mode(), SystemMode::Manual);
    assert!(runner.controller().estop_active());
    let frozen = rig.probe().position_mm();

    runner.run_for(Duration::from_secs(3)).unwrap();
    assert_eq!(runner.controller().mode(), SystemMode::Manual);
    assert!(!runner.controller().estop_active());
    assert_eq!(rig.probe().position_mm(), frozen);
}

#[test]
fn stuck_sensor_raises_dual_endstop_fault() {
    let script = start_at_200().at(1_500, RigEvent::ForceStop(Stop::Out, Some(true)));
    let (_rig, mut runner) = rig_runner(script, TimeoutSettings::default());
    let summary = runner.run_for(Duration::from_secs(6)).unwrap();
    // rod parked at IN with OUT stuck triggered
    assert_eq!(summary.mode, SystemMode::Manual);
    assert_eq!(summary.last_fault, Some(SafetyFault::DualEndstopFault));
}

#[test]
fn suspend_command_cuts_coils_without_leaving_auto() {
    let (rig, mut runner) = rig_runner(start_at_200(), TimeoutSettings::default());
    let handle = runner.handle();
    runner.run_for(Duration::from_secs(2)).unwrap();

    // time is frozen between run_once calls
    runner.run_once().unwrap();
    assert_eq!(rig.probe().coils(), (true, false));

    assert!(handle.suspend_outputs());
    runner.run_once().unwrap();
    assert_eq!(rig.probe().coils(), (false, false));
    assert_eq!(runner.controller().mode(), SystemMode::Auto);
    assert!(runner.controller().snapshot().outputs_suspended);

    assert!(handle.resume_outputs());
    runner.run_once().unwrap();
    assert_eq!(rig.probe().coils(), (true, false));
}

#[test]
fn status_feed_sees_the_latest_snapshot() {
    let (_rig, mut runner) = rig_runner(start_at_200(), TimeoutSettings::default());
    let (sink, status) = feed();
    runner.add_sink(sink);
    runner.run_for(Duration::from_secs(1)).unwrap();

    let snap = status.latest().expect("published");
    assert_eq!(snap.mode, SystemMode::Auto);
    assert!(snap.extend_output);
    assert!(status.latest().is_none());
}

#[test]
fn operator_manual_jog_after_stop() {
    let script = start_at_200()
        .tap(2_000, Button::StopAuto, 100)
        .at(2_500, RigEvent::Press(Button::ManualRetract))
        .at(3_500, RigEvent::Release(Button::ManualRetract));
    let (rig, mut runner) = rig_runner(script, TimeoutSettings::default());
    runner.run_for(Duration::from_millis(2_400)).unwrap();
    let after_stop = rig.probe().position_mm();
    assert_eq!(runner.controller().mode(), SystemMode::Manual);

    runner.run_for(Duration::from_millis(1_600)).unwrap();
    assert!(rig.probe().position_mm() < after_stop);
    assert_eq!(rig.probe().overlaps(), 0);
}
