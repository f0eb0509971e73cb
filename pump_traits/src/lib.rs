//! Hardware seams shared by the control core and the hardware backends.
//!
//! The core never touches GPIO directly: it reads an [`InputLevels`] snapshot
//! through [`InputBank`] and drives the two valve coils through [`Valve`].

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Electrical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    Low,
    #[default]
    High,
}

impl Level {
    #[inline]
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// One of the two valve outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coil {
    /// Drives the actuator outward.
    Extend,
    /// Drives the actuator inward.
    Retract,
}

/// Raw levels of every input line, sampled once per tick.
///
/// Command buttons use pull-ups (pressed = Low). End stops and the e-stop loop
/// are normally-closed circuits (High = open = triggered). `Default` is the
/// idle state: buttons released, end stops clear, e-stop loop closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLevels {
    pub manual_extend: Level,
    pub manual_retract: Level,
    pub start_auto: Level,
    pub stop_auto: Level,
    pub endstop_in: Level,
    pub endstop_out: Level,
    pub estop: Level,
}

impl Default for InputLevels {
    fn default() -> Self {
        Self {
            manual_extend: Level::High,
            manual_retract: Level::High,
            start_auto: Level::High,
            stop_auto: Level::High,
            endstop_in: Level::Low,
            endstop_out: Level::Low,
            estop: Level::Low,
        }
    }
}

pub trait InputBank {
    fn read_levels(&mut self) -> Result<InputLevels, Box<dyn std::error::Error + Send + Sync>>;
}

pub trait Valve {
    fn set_coil(
        &mut self,
        coil: Coil,
        energized: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: InputBank + ?Sized> InputBank for Box<T> {
    fn read_levels(&mut self) -> Result<InputLevels, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_levels()
    }
}

impl<T: Valve + ?Sized> Valve for Box<T> {
    fn set_coil(
        &mut self,
        coil: Coil,
        energized: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_coil(coil, energized)
    }
}
