use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Electrical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Internal bias resistor applied to an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    None,
    #[default]
    Down,
    Up,
}

#[derive(Debug, Error)]
pub enum HalError {
    #[error("GPIO subsystem unavailable: {0}")]
    Unavailable(String),
    #[error("GPIO {pin} is busy or does not exist: {reason}")]
    PinBusy { pin: u8, reason: String },
    #[error("GPIO {pin} configuration failed: {reason}")]
    Configure { pin: u8, reason: String },
    #[error("GPIO {pin} I/O failed: {reason}")]
    Io { pin: u8, reason: String },
}

/// Platform GPIO access. Initialised once per process, then used to claim
/// the lines each worker owns.
pub trait GpioHost {
    type Input: InputLine + 'static;
    type Output: OutputLine + 'static;

    fn init(&mut self) -> Result<(), HalError>;

    /// Claim `pin` as an input with the given bias and interrupts on both edges.
    fn claim_input(&mut self, pin: u8, pull: Pull) -> Result<Self::Input, HalError>;

    /// Claim `pin` as an output, driven low before it is returned.
    fn claim_output(&mut self, pin: u8) -> Result<Self::Output, HalError>;
}

pub trait InputLine: Send {
    /// Block until the next edge or until `timeout` elapses.
    /// Returns `true` when woken by an edge.
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<bool, HalError>;

    fn read(&self) -> Result<Level, HalError>;

    fn pin(&self) -> u8;
}

pub trait OutputLine: Send {
    fn set_level(&mut self, level: Level) -> Result<(), HalError>;

    fn pin(&self) -> u8;
}
