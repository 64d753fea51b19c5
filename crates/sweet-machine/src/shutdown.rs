//! One-shot shutdown broadcast.
//!
//! The trigger owns the only sender of a zero-capacity channel. Firing it
//! drops that sender, which wakes every receiver at once with a
//! disconnect. `fire` consumes the trigger, so it can happen only once.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = bounded(0);
    (ShutdownTrigger { _tx: tx }, ShutdownSignal { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    _tx: Sender<()>,
}

impl ShutdownTrigger {
    pub fn fire(self) {}
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_signalled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once the trigger fires,
    /// for use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
