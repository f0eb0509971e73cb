//! Coil command policy and the driver that writes it to a [`Valve`].

use pump_traits::{Coil, Valve};
use serde::Serialize;

use crate::cycle::{CycleDirection, EndStops};
use crate::error::PumpError;
use crate::hw_error::map_hw_error;
use crate::mode::SystemMode;

/// Commanded coil state. Never both on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OutputPair {
    pub extend: bool,
    pub retract: bool,
}

impl OutputPair {
    pub const OFF: Self = Self {
        extend: false,
        retract: false,
    };
    pub const EXTEND: Self = Self {
        extend: true,
        retract: false,
    };
    pub const RETRACT: Self = Self {
        extend: false,
        retract: true,
    };

    #[inline]
    pub fn is_off(&self) -> bool {
        !self.extend && !self.retract
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !(self.extend && self.retract)
    }

    /// Gate `desired` against what is currently energized so that switching
    /// from one coil to the other always passes through one all-off tick.
    pub fn sequenced(prev: Self, desired: Self) -> Self {
        if !desired.is_valid() {
            return Self::OFF;
        }
        let crosses = (prev.extend && desired.retract) || (prev.retract && desired.extend);
        if crosses { Self::OFF } else { desired }
    }
}

/// Manual buttons currently held (debounced).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualHold {
    pub extend: bool,
    pub retract: bool,
}

/// Coil command for the current state, before sequencing.
pub fn command(
    mode: SystemMode,
    dir: CycleDirection,
    held: ManualHold,
    stops: EndStops,
    quiescent: bool,
) -> OutputPair {
    match mode {
        SystemMode::Manual => match (held.extend, held.retract) {
            (true, false) if !stops.at_out => OutputPair::EXTEND,
            (false, true) if !stops.at_in => OutputPair::RETRACT,
            _ => OutputPair::OFF,
        },
        SystemMode::Auto if quiescent => OutputPair::OFF,
        SystemMode::Auto => match dir {
            CycleDirection::Out => OutputPair::EXTEND,
            CycleDirection::In => OutputPair::RETRACT,
            CycleDirection::Stopped => OutputPair::OFF,
        },
    }
}

/// Writes commanded pairs to the valve, de-energizing before energizing.
pub struct OutputDriver<V: Valve> {
    valve: V,
    applied: OutputPair,
}

impl<V: Valve> OutputDriver<V> {
    pub fn new(valve: V) -> Self {
        Self {
            valve,
            applied: OutputPair::OFF,
        }
    }

    /// Last pair written successfully.
    #[inline]
    pub fn applied(&self) -> OutputPair {
        self.applied
    }

    pub fn valve(&self) -> &V {
        &self.valve
    }

    /// Write `next`. Both coils are written every call, offs first.
    ///
    /// On a write failure both coils are driven off (best effort) and the
    /// mapped error is returned.
    pub fn apply(&mut self, next: OutputPair) -> Result<(), PumpError> {
        let next = if next.is_valid() { next } else { OutputPair::OFF };
        let writes = [(Coil::Extend, next.extend), (Coil::Retract, next.retract)];
        let offs = writes.iter().filter(|(_, on)| !on);
        let ons = writes.iter().filter(|(_, on)| *on);
        for &(coil, on) in offs.chain(ons) {
            if let Err(e) = self.valve.set_coil(coil, on) {
                let mapped = map_hw_error(e.as_ref());
                tracing::error!(?coil, error = %mapped, "coil write failed; forcing all off");
                self.force_off();
                return Err(mapped);
            }
        }
        if next != self.applied {
            tracing::debug!(extend = next.extend, retract = next.retract, "outputs changed");
        }
        self.applied = next;
        Ok(())
    }

    /// Drive both coils off.
    pub fn all_off(&mut self) -> Result<(), PumpError> {
        self.apply(OutputPair::OFF)
    }

    fn force_off(&mut self) {
        let mut ok = true;
        for coil in [Coil::Extend, Coil::Retract] {
            if let Err(e) = self.valve.set_coil(coil, false) {
                ok = false;
                tracing::error!(?coil, error = %e, "failed to de-energize coil");
            }
        }
        if ok {
            self.applied = OutputPair::OFF;
        }
    }
}

impl<V: Valve> Drop for OutputDriver<V> {
    fn drop(&mut self) {
        self.force_off();
    }
}
