//! Raspberry Pi GPIO backend.
//!
//! All inputs use the internal pull-up: buttons read Low when pressed, and
//! the normally-closed end-stop and e-stop circuits read High when open
//! (triggered). Coil outputs start Low and are reset Low when dropped.

use rppal::gpio::{Gpio, InputPin, OutputPin};

use pump_traits::{Coil, InputBank, InputLevels, Level, Valve};

use crate::error::{HwError, Result};

/// BCM numbers of the seven input lines.
#[derive(Debug, Clone, Copy)]
pub struct InputPins {
    pub manual_extend: u8,
    pub manual_retract: u8,
    pub start_auto: u8,
    pub stop_auto: u8,
    pub endstop_in: u8,
    pub endstop_out: u8,
    pub estop: u8,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn level(pin: &InputPin) -> Level {
    Level::from(pin.is_high())
}

pub struct GpioInputs {
    manual_extend: InputPin,
    manual_retract: InputPin,
    start_auto: InputPin,
    stop_auto: InputPin,
    endstop_in: InputPin,
    endstop_out: InputPin,
    estop: InputPin,
}

impl GpioInputs {
    pub fn new(pins: InputPins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let input = |n: u8| -> Result<InputPin> {
            Ok(gpio.get(n).map_err(gpio_err)?.into_input_pullup())
        };
        let inputs = Self {
            manual_extend: input(pins.manual_extend)?,
            manual_retract: input(pins.manual_retract)?,
            start_auto: input(pins.start_auto)?,
            stop_auto: input(pins.stop_auto)?,
            endstop_in: input(pins.endstop_in)?,
            endstop_out: input(pins.endstop_out)?,
            estop: input(pins.estop)?,
        };
        tracing::info!(?pins, "gpio inputs ready");
        Ok(inputs)
    }
}

impl InputBank for GpioInputs {
    fn read_levels(
        &mut self,
    ) -> std::result::Result<InputLevels, Box<dyn std::error::Error + Send + Sync>> {
        Ok(InputLevels {
            manual_extend: level(&self.manual_extend),
            manual_retract: level(&self.manual_retract),
            start_auto: level(&self.start_auto),
            stop_auto: level(&self.stop_auto),
            endstop_in: level(&self.endstop_in),
            endstop_out: level(&self.endstop_out),
            estop: level(&self.estop),
        })
    }
}

pub struct GpioValve {
    extend: OutputPin,
    retract: OutputPin,
}

impl GpioValve {
    pub fn new(extend_pin: u8, retract_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut extend = gpio.get(extend_pin).map_err(gpio_err)?.into_output_low();
        let mut retract = gpio.get(retract_pin).map_err(gpio_err)?.into_output_low();
        extend.set_reset_on_drop(true);
        retract.set_reset_on_drop(true);
        tracing::info!(extend_pin, retract_pin, "gpio valve ready, both coils low");
        Ok(Self { extend, retract })
    }
}

impl Valve for GpioValve {
    fn set_coil(
        &mut self,
        coil: Coil,
        energized: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let pin = match coil {
            Coil::Extend => &mut self.extend,
            Coil::Retract => &mut self.retract,
        };
        if energized {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }
}

impl Drop for GpioValve {
    fn drop(&mut self) {
        self.extend.set_low();
        self.retract.set_low();
    }
}
