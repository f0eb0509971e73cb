mod common;

use common::{Button, Harness};
use pump_core::{ControlCfg, CycleDirection, OutputPair, ResumePolicy, SystemMode, TransitionReason};
use rstest::rstest;

fn cfg(presteer: bool, resume: ResumePolicy) -> ControlCfg {
    ControlCfg {
        presteer_from_endstops: presteer,
        resume,
        ..ControlCfg::default()
    }
}

#[rstest]
#[case(true, false, CycleDirection::Out)]
#[case(false, true, CycleDirection::In)]
fn presteer_picks_the_stroke_away_from_the_stop(
    #[case] at_in: bool,
    #[case] at_out: bool,
    #[case] expect: CycleDirection,
) {
    let mut h = Harness::new();
    h.set_stops(at_in, at_out);
    let r = h.run(20);
    assert_eq!(r.mode, SystemMode::Manual);
    assert_eq!(r.direction, expect);

    let r = h.enter_auto();
    assert_eq!(r.mode, SystemMode::Auto);
    assert_eq!(r.direction, expect);
    assert_eq!(h.ctl.stats().count(), 0);

    h.set_stops(false, false);
    let want = match expect {
        CycleDirection::Out => OutputPair::EXTEND,
        _ => OutputPair::RETRACT,
    };
    assert_eq!(h.run(600).outputs, want);
}

#[test]
fn without_presteer_auto_starts_out_and_bounces_off_the_out_stop() {
    let mut h = Harness::with_cfg(cfg(false, ResumePolicy::LastDirection));
    h.set_stops(false, true);
    assert_eq!(h.run(20).direction, CycleDirection::Stopped);

    h.press(Button::StartAuto);
    let mut entry = None;
    for _ in 0..12 {
        let r = h.step();
        if r.transition.is_some() {
            entry = Some(r);
        }
    }
    let entry = entry.expect("start edge seen");
    assert_eq!(entry.mode, SystemMode::Auto);
    // entered OUT, reversed on the same tick; zero-length stroke is not recorded
    assert_eq!(entry.direction, CycleDirection::In);
    assert!(entry.reversal.is_some());
    assert_eq!(entry.stroke_ms, None);
    assert!(entry.outputs.is_off());
}

#[test]
fn presteer_does_not_touch_direction_without_a_stop() {
    let mut h = Harness::new();
    h.enter_auto();
    h.run(600);
    h.reach_stop();
    assert_eq!(h.ctl.direction(), CycleDirection::In);
    h.tap(Button::StopAuto);
    assert_eq!(h.ctl.mode(), SystemMode::Manual);
    assert_eq!(h.run(500).direction, CycleDirection::In);
}

#[rstest]
#[case(ResumePolicy::LastDirection, CycleDirection::In)]
#[case(ResumePolicy::AlwaysOut, CycleDirection::Out)]
fn resume_policy_on_reentry(#[case] policy: ResumePolicy, #[case] expect: CycleDirection) {
    let mut h = Harness::with_cfg(cfg(true, policy));
    h.enter_auto();
    h.run(600);
    h.reach_stop();
    h.run(600);
    assert_eq!(h.ctl.outputs(), OutputPair::RETRACT);

    let r = h.tap(Button::StopAuto);
    assert_eq!(r.mode, SystemMode::Manual);
    assert!(r.outputs.is_off());
    assert_eq!(r.direction, CycleDirection::In, "direction is kept in MANUAL");

    let r = h.enter_auto();
    assert_eq!(r.direction, expect);
}

#[test]
fn manual_press_overrides_auto() {
    let mut h = Harness::new();
    h.enter_auto();
    h.run(600);
    assert_eq!(h.ctl.outputs(), OutputPair::EXTEND);

    h.press(Button::ManualRetract);
    let mut exit = None;
    while exit.is_none() {
        let r = h.step();
        if let Some(t) = r.transition {
            assert_eq!(t.reason, TransitionReason::ManualOverride);
            exit = Some(r);
        }
    }
    let exit = exit.unwrap();
    assert_eq!(exit.mode, SystemMode::Manual);
    assert_eq!(exit.direction, CycleDirection::Out);
    assert!(exit.outputs.is_off());
    // held button now drives the coil directly
    assert_eq!(h.step().outputs, OutputPair::RETRACT);
}

#[test]
fn manual_jog_does_not_change_the_recorded_direction() {
    let mut h = Harness::new();
    h.enter_auto();
    h.run(600);
    h.reach_stop();
    h.run(600);
    assert_eq!(h.ctl.outputs(), OutputPair::RETRACT);
    h.tap(Button::StopAuto);

    h.press(Button::ManualExtend);
    let r = h.run(500);
    assert_eq!(r.outputs, OutputPair::EXTEND);
    assert_eq!(r.direction, CycleDirection::In);
    h.release(Button::ManualExtend);
    assert_eq!(h.run(100).direction, CycleDirection::In);

    // last-direction resumes the interrupted retract, not the jog
    let r = h.enter_auto();
    assert_eq!(r.direction, CycleDirection::In);
}

#[test]
fn stop_edge_beats_start_edge_on_the_same_tick() {
    let mut h = Harness::new();
    h.press(Button::StartAuto);
    h.press(Button::StopAuto);
    assert_eq!(h.run(200).mode, SystemMode::Manual);
}

#[test]
fn both_manual_buttons_hold_everything_off() {
    let mut h = Harness::new();
    h.press(Button::ManualExtend);
    h.press(Button::ManualRetract);
    assert!(h.run(200).outputs.is_off());
    h.release(Button::ManualRetract);
    assert_eq!(h.run(60).outputs, OutputPair::EXTEND);
}

#[rstest]
#[case(Button::ManualExtend, false, true, OutputPair::OFF)]
#[case(Button::ManualRetract, true, false, OutputPair::OFF)]
#[case(Button::ManualRetract, false, true, OutputPair::RETRACT)]
#[case(Button::ManualExtend, true, false, OutputPair::EXTEND)]
fn manual_motion_stops_at_the_limit(
    #[case] b: Button,
    #[case] at_in: bool,
    #[case] at_out: bool,
    #[case] expect: OutputPair,
) {
    let mut h = Harness::new();
    h.set_stops(at_in, at_out);
    h.press(b);
    assert_eq!(h.run(100).outputs, expect);
}

#[test]
fn switching_coils_in_manual_passes_through_off() {
    let mut h = Harness::new();
    h.press(Button::ManualExtend);
    h.run(100);
    assert_eq!(h.ctl.outputs(), OutputPair::EXTEND);
    h.release(Button::ManualExtend);
    h.press(Button::ManualRetract);
    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(h.step().outputs);
    }
    let first_retract = seen
        .iter()
        .position(|o| *o == OutputPair::RETRACT)
        .expect("retract engages");
    assert!(first_retract > 0);
    assert!(seen[first_retract - 1].is_off());
}

#[test]
fn suspend_hook_keeps_mode_and_direction() {
    let mut h = Harness::new();
    h.enter_auto();
    h.run(600);
    assert_eq!(h.ctl.outputs(), OutputPair::EXTEND);

    h.ctl.suspend_outputs();
    let r = h.run(300);
    assert!(r.outputs.is_off());
    assert_eq!(r.mode, SystemMode::Auto);
    assert_eq!(r.direction, CycleDirection::Out);
    assert!(h.ctl.snapshot().outputs_suspended);

    h.ctl.resume_outputs();
    assert_eq!(h.step().outputs, OutputPair::EXTEND);
}

#[test]
fn suspension_longer_than_timeout_resumes_where_it_left_off() {
    let mut h = Harness::new();
    h.enter_auto();
    h.run(600);
    assert_eq!(h.ctl.outputs(), OutputPair::EXTEND);

    h.ctl.suspend_outputs();
    // default timeout is 30 s
    let r = h.run(31_000);
    assert!(r.outputs.is_off());
    assert_eq!(r.mode, SystemMode::Auto);
    assert_eq!(r.direction, CycleDirection::Out);
    assert_eq!(r.fault, None);

    h.ctl.resume_outputs();
    let r = h.step();
    assert_eq!(r.mode, SystemMode::Auto);
    assert_eq!(r.outputs, OutputPair::EXTEND);

    // the time spent suspended is not part of the stroke
    h.run(400);
    let r = h.reach_stop();
    assert!(r.reversal.is_some());
    let stroke = r.stroke_ms.expect("stroke recorded");
    assert!(stroke < 1_500, "stroke {stroke} ms includes the suspension");
}

#[test]
fn short_tap_stays_visible_in_snapshot() {
    let mut h = Harness::new();
    h.tap(Button::ManualExtend);
    assert!(h.ctl.snapshot().manual_extend_active);
    h.run(1_100);
    assert!(!h.ctl.snapshot().manual_extend_active);
}
