//! Interlock evaluation: emergency stop, dual end-stop fault, cycle timeout.
//!
//! Evaluated every tick before mode and direction logic. The first matching
//! condition wins; any match forces MANUAL with both coils off.

use crate::config::TimeoutSettings;
use crate::cycle::EndStops;
use crate::error::SafetyFault;
use crate::mode::SystemMode;

#[derive(Debug, Clone, Copy)]
pub struct InterlockInputs {
    /// E-stop circuit open.
    pub estop: bool,
    pub stops: EndStops,
    pub mode: SystemMode,
    /// Time since the current stroke began (AUTO entry or last reversal).
    pub stroke_elapsed_ms: u64,
    pub timeout: TimeoutSettings,
}

/// Timestamps and latches owned by the interlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafetyState {
    pub estop_active: bool,
    pub cycle_start_ms: u64,
    pub last_reversal_ms: u64,
    /// Most recent fault; kept until an AUTO entry acknowledges it.
    pub fault: Option<SafetyFault>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyInterlock;

impl SafetyInterlock {
    pub fn evaluate(inp: &InterlockInputs) -> Option<SafetyFault> {
        if inp.estop {
            return Some(SafetyFault::EmergencyStopActive);
        }
        if inp.stops.both() {
            return Some(SafetyFault::DualEndstopFault);
        }
        if inp.mode == SystemMode::Auto
            && inp.timeout.enabled()
            && inp.stroke_elapsed_ms > inp.timeout.cycle_timeout_ms()
        {
            return Some(SafetyFault::CycleTimeoutExceeded);
        }
        None
    }
}
