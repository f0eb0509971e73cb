use pump_core::{ControlCfg, Controller, DebouncedChannel, OutputPair, Polarity, SharedSettings};
use pump_traits::{InputLevels, Level};
use proptest::prelude::*;

const TICK_MS: u64 = 5;

/// One input frame held for `hold_ticks` ticks.
#[derive(Debug, Clone)]
struct Frame {
    bits: u8,
    hold_ticks: u8,
}

fn levels_from(bits: u8) -> InputLevels {
    let low_if = |b: u8| if bits & b != 0 { Level::Low } else { Level::High };
    let high_if = |b: u8| Level::from(bits & b != 0);
    InputLevels {
        manual_extend: low_if(1),
        manual_retract: low_if(2),
        start_auto: low_if(4),
        stop_auto: low_if(8),
        endstop_in: high_if(16),
        endstop_out: high_if(32),
        // two bits so the e-stop stays rare
        estop: Level::from(bits & 0xC0 == 0xC0),
    }
}

prop_compose! {
    fn frame()(bits in any::<u8>(), hold_ticks in 1u8..40) -> Frame {
        Frame { bits, hold_ticks }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn outputs_never_overlap_and_switch_through_off(frames in prop::collection::vec(frame(), 1..120)) {
        let mut ctl = Controller::new(ControlCfg::default(), SharedSettings::default());
        let mut now = 0u64;
        let mut prev = ctl.tick(&InputLevels::default(), now);
        for f in frames {
            let l = levels_from(f.bits);
            for _ in 0..f.hold_ticks {
                now += TICK_MS;
                let r = ctl.tick(&l, now);
                prop_assert!(r.outputs.is_valid());
                if r.mode != prev.mode || r.direction != prev.direction {
                    prop_assert!(r.outputs.is_off(), "energized on a transition tick");
                }
                let crossed = (prev.outputs.extend && r.outputs.retract)
                    || (prev.outputs.retract && r.outputs.extend);
                prop_assert!(!crossed, "coil swap without an off tick");
                if l.estop.is_high() {
                    prop_assert_eq!(r.outputs, OutputPair::OFF);
                    prop_assert_eq!(r.mode, pump_core::SystemMode::Manual);
                }
                prev = r;
            }
        }
    }

    #[test]
    fn chatter_faster_than_window_never_changes_state(
        periods in prop::collection::vec(1u64..50, 1..200),
    ) {
        let mut ch = DebouncedChannel::new("chatter", Polarity::ActiveLow, 50);
        let mut now = 0u64;
        let mut level = Level::High;
        for p in periods {
            level = if level.is_high() { Level::Low } else { Level::High };
            // sample several times inside each short dwell
            let dwell_end = now + p;
            while now < dwell_end {
                prop_assert!(!ch.sample(level, now));
                now += 1;
            }
            prop_assert!(!ch.has_edge());
        }
    }
}
