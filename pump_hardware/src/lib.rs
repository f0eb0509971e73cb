//! Backends for the pump controller's hardware seams.
//!
//! - `sim`: a simulated actuator rig with end stops and a scripted operator.
//! - `gpio` (feature `hardware`): Raspberry Pi GPIO via `rppal`.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{Button, RigEvent, RigParams, RigProbe, Script, SimInputs, SimRig, SimValve};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{GpioInputs, GpioValve, InputPins};
