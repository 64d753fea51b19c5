use crate::hal::HalError;
use crate::tags::LineRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Invalid machine configuration: {0}")]
    InvalidConfig(String),

    #[error("Hardware subsystem unavailable: {0}")]
    HardwareUnavailable(#[source] HalError),

    #[error("Failed to claim {line} line on GPIO {pin}: {source}")]
    PinClaim {
        line: LineRole,
        pin: u8,
        #[source]
        source: HalError,
    },

    #[error("Failed to spawn {line} worker: {source}")]
    Spawn {
        line: LineRole,
        #[source]
        source: std::io::Error,
    },

    #[error("Machine has not been started")]
    NotStarted,

    #[error("Machine was already started")]
    AlreadyStarted,

    #[error("Machine was already stopped")]
    AlreadyStopped,

    #[error("Machine is stopped")]
    Stopped,

    #[error("{0} worker has exited")]
    WorkerExited(LineRole),

    #[error("{line} worker failed: {source}")]
    WorkerFailed {
        line: LineRole,
        #[source]
        source: HalError,
    },

    #[error("{0} worker panicked")]
    WorkerPanicked(LineRole),
}
