pub mod actuator;
pub mod config;
pub mod debounce;
pub mod error;
pub mod hal;
#[cfg(feature = "rpi")]
pub mod hal_rppal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod machine;
pub mod shutdown;
pub mod tags;
pub mod touch;

pub use actuator::ActuatorDriver;
pub use config::{MachineConfig, PinMap};
pub use debounce::{ConfirmPolicy, Touch, TouchDebouncer};
pub use error::MachineError;
pub use hal::{GpioHost, HalError, InputLine, Level, OutputLine, Pull};
#[cfg(feature = "rpi")]
pub use hal_rppal::RppalHost;
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::{SimHost, SimProbe, SimTouchPad};
pub use machine::{Commander, Machine, MachineState};
pub use tags::LineRole;
pub use touch::{EdgeReader, TouchDispatcher};
