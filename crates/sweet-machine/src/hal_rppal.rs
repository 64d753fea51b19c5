//! Raspberry Pi GPIO backend on top of `rppal`.

use crate::hal::{GpioHost, HalError, InputLine, Level, OutputLine, Pull};
use rppal::gpio::{self, Gpio, InputPin, OutputPin, Trigger};
use std::time::Duration;

#[derive(Default)]
pub struct RppalHost {
    gpio: Option<Gpio>,
}

impl RppalHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn gpio(&self) -> Result<&Gpio, HalError> {
        self.gpio
            .as_ref()
            .ok_or_else(|| HalError::Unavailable("GPIO host not initialised".to_string()))
    }
}

fn busy(pin: u8, e: gpio::Error) -> HalError {
    HalError::PinBusy {
        pin,
        reason: e.to_string(),
    }
}

impl GpioHost for RppalHost {
    type Input = RppalInput;
    type Output = RppalOutput;

    fn init(&mut self) -> Result<(), HalError> {
        if self.gpio.is_none() {
            let gpio = Gpio::new().map_err(|e| HalError::Unavailable(e.to_string()))?;
            self.gpio = Some(gpio);
        }
        Ok(())
    }

    fn claim_input(&mut self, pin: u8, pull: Pull) -> Result<RppalInput, HalError> {
        let raw = self.gpio()?.get(pin).map_err(|e| busy(pin, e))?;
        let mut input = match pull {
            Pull::None => raw.into_input(),
            Pull::Down => raw.into_input_pulldown(),
            Pull::Up => raw.into_input_pullup(),
        };
        input
            .set_interrupt(Trigger::Both, None)
            .map_err(|e| HalError::Configure {
                pin,
                reason: e.to_string(),
            })?;
        Ok(RppalInput { pin: input })
    }

    fn claim_output(&mut self, pin: u8) -> Result<RppalOutput, HalError> {
        let raw = self.gpio()?.get(pin).map_err(|e| busy(pin, e))?;
        Ok(RppalOutput {
            pin: raw.into_output_low(),
        })
    }
}

pub struct RppalInput {
    pin: InputPin,
}

impl InputLine for RppalInput {
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<bool, HalError> {
        self.pin
            .poll_interrupt(false, Some(timeout))
            .map(|event| event.is_some())
            .map_err(|e| HalError::Io {
                pin: self.pin.pin(),
                reason: e.to_string(),
            })
    }

    fn read(&self) -> Result<Level, HalError> {
        Ok(match self.pin.read() {
            gpio::Level::High => Level::High,
            gpio::Level::Low => Level::Low,
        })
    }

    fn pin(&self) -> u8 {
        self.pin.pin()
    }
}

pub struct RppalOutput {
    pin: OutputPin,
}

impl OutputLine for RppalOutput {
    fn set_level(&mut self, level: Level) -> Result<(), HalError> {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
        Ok(())
    }

    fn pin(&self) -> u8 {
        self.pin.pin()
    }
}
