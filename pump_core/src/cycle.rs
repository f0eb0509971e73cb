//! Stroke direction state machine for AUTO mode.

use pump_traits::InputLevels;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleDirection {
    In,
    Out,
    #[default]
    Stopped,
}

impl std::fmt::Display for CycleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CycleDirection::In => "IN",
            CycleDirection::Out => "OUT",
            CycleDirection::Stopped => "STOPPED",
        })
    }
}

/// Raw end-stop state; `true` means the switch is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndStops {
    pub at_in: bool,
    pub at_out: bool,
}

impl EndStops {
    pub fn from_levels(levels: &InputLevels) -> Self {
        Self {
            at_in: levels.endstop_in.is_high(),
            at_out: levels.endstop_out.is_high(),
        }
    }

    #[inline]
    pub fn both(&self) -> bool {
        self.at_in && self.at_out
    }
}

/// A reversal at an end stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reversal {
    pub from: CycleDirection,
    pub to: CycleDirection,
    /// Time since the previous reversal or AUTO entry.
    pub raw_ms: u64,
    /// `raw_ms` minus the quiescent delay, when positive.
    pub stroke_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleDirector {
    cycle_delay_ms: u64,
}

impl CycleDirector {
    pub fn new(cycle_delay_ms: u64) -> Self {
        Self { cycle_delay_ms }
    }

    #[inline]
    pub fn cycle_delay_ms(&self) -> u64 {
        self.cycle_delay_ms
    }

    /// Reverse when the end stop for the current direction is triggered.
    ///
    /// `since_start_ms` is the time since the previous reversal or AUTO entry.
    pub fn step(
        &self,
        dir: CycleDirection,
        stops: EndStops,
        since_start_ms: u64,
    ) -> Option<Reversal> {
        let to = match dir {
            CycleDirection::In if stops.at_in => CycleDirection::Out,
            CycleDirection::Out if stops.at_out => CycleDirection::In,
            _ => return None,
        };
        Some(Reversal {
            from: dir,
            to,
            raw_ms: since_start_ms,
            stroke_ms: since_start_ms
                .checked_sub(self.cycle_delay_ms)
                .filter(|&s| s > 0),
        })
    }

    /// Still inside the all-off pause following `last_reversal_ms`.
    #[inline]
    pub fn in_quiescence(&self, now_ms: u64, last_reversal_ms: u64) -> bool {
        now_ms.saturating_sub(last_reversal_ms) < self.cycle_delay_ms
    }

    /// In MANUAL, a triggered end stop selects the stroke that leaves it.
    pub fn presteer(dir: CycleDirection, stops: EndStops) -> CycleDirection {
        if stops.at_in {
            CycleDirection::Out
        } else if stops.at_out {
            CycleDirection::In
        } else {
            dir
        }
    }
}
