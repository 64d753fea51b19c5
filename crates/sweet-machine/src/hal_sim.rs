//! In-memory GPIO board for tests and `--simulate` runs.
//!
//! Lines are created on first use. Test code keeps a [`SimTouchPad`] or
//! [`SimProbe`] for a pin and moves the [`SimHost`] into the machine; both
//! sides share the same pin state.

use crate::hal::{GpioHost, HalError, InputLine, Level, OutputLine, Pull};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct PinState {
    pin: u8,
    level: AtomicBool,
    claimed: AtomicBool,
    refuse_claim: AtomicBool,
    faulted: AtomicBool,
    pull: Mutex<Option<Pull>>,
    history: Mutex<Vec<Level>>,
    edge_tx: Sender<()>,
    edge_rx: Receiver<()>,
}

impl PinState {
    fn new(pin: u8) -> Self {
        let (edge_tx, edge_rx) = unbounded();
        Self {
            pin,
            level: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
            refuse_claim: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            pull: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            edge_tx,
            edge_rx,
        }
    }

    fn level(&self) -> Level {
        Level::from(self.level.load(Ordering::Acquire))
    }

    fn check_fault(&self) -> Result<(), HalError> {
        if self.faulted.load(Ordering::Acquire) {
            return Err(HalError::Io {
                pin: self.pin,
                reason: "simulated line fault".to_string(),
            });
        }
        Ok(())
    }

    fn claim(&self) -> Result<(), HalError> {
        if self.refuse_claim.load(Ordering::Acquire) {
            return Err(HalError::PinBusy {
                pin: self.pin,
                reason: "claim refused by simulation".to_string(),
            });
        }
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(HalError::PinBusy {
                pin: self.pin,
                reason: "already claimed".to_string(),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Board {
    available: bool,
    initialised: AtomicBool,
    pins: Mutex<HashMap<u8, Arc<PinState>>>,
}

impl Board {
    fn pin(&self, pin: u8) -> Arc<PinState> {
        let mut pins = lock(&self.pins);
        Arc::clone(
            pins.entry(pin)
                .or_insert_with(|| Arc::new(PinState::new(pin))),
        )
    }
}

/// Simulated GPIO platform.
#[derive(Clone)]
pub struct SimHost {
    board: Arc<Board>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::with_availability(true)
    }

    /// A platform whose initialisation always fails.
    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    fn with_availability(available: bool) -> Self {
        Self {
            board: Arc::new(Board {
                available,
                initialised: AtomicBool::new(false),
                pins: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn touch_pad(&self, pin: u8) -> SimTouchPad {
        SimTouchPad {
            state: self.board.pin(pin),
        }
    }

    pub fn probe(&self, pin: u8) -> SimProbe {
        SimProbe {
            state: self.board.pin(pin),
        }
    }

    /// Make the next claim of `pin` fail as if another process held it.
    pub fn refuse_claim(&self, pin: u8) {
        self.board.pin(pin).refuse_claim.store(true, Ordering::Release);
    }

    pub fn is_initialised(&self) -> bool {
        self.board.initialised.load(Ordering::Acquire)
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioHost for SimHost {
    type Input = SimInput;
    type Output = SimOutput;

    fn init(&mut self) -> Result<(), HalError> {
        if !self.board.available {
            return Err(HalError::Unavailable(
                "simulated platform marked unavailable".to_string(),
            ));
        }
        self.board.initialised.store(true, Ordering::Release);
        Ok(())
    }

    fn claim_input(&mut self, pin: u8, pull: Pull) -> Result<SimInput, HalError> {
        let state = self.board.pin(pin);
        state.claim()?;
        *lock(&state.pull) = Some(pull);
        Ok(SimInput { state })
    }

    fn claim_output(&mut self, pin: u8) -> Result<SimOutput, HalError> {
        let state = self.board.pin(pin);
        state.claim()?;
        let mut output = SimOutput { state };
        output.set_level(Level::Low)?;
        Ok(output)
    }
}

pub struct SimInput {
    state: Arc<PinState>,
}

impl InputLine for SimInput {
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<bool, HalError> {
        self.state.check_fault()?;
        let received = match self.state.edge_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(HalError::Io {
                    pin: self.state.pin,
                    reason: "edge source closed".to_string(),
                })
            }
        };
        self.state.check_fault()?;
        Ok(received)
    }

    fn read(&self) -> Result<Level, HalError> {
        self.state.check_fault()?;
        Ok(self.state.level())
    }

    fn pin(&self) -> u8 {
        self.state.pin
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        self.state.claimed.store(false, Ordering::Release);
    }
}

pub struct SimOutput {
    state: Arc<PinState>,
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        self.state.claimed.store(false, Ordering::Release);
    }
}

impl OutputLine for SimOutput {
    fn set_level(&mut self, level: Level) -> Result<(), HalError> {
        self.state.check_fault()?;
        self.state.level.store(level.is_high(), Ordering::Release);
        lock(&self.state.history).push(level);
        Ok(())
    }

    fn pin(&self) -> u8 {
        self.state.pin
    }
}

/// Test-side driver for a simulated input line.
#[derive(Clone)]
pub struct SimTouchPad {
    state: Arc<PinState>,
}

impl SimTouchPad {
    /// Drive the line to `level`, raising an edge notification on change.
    pub fn set_level(&self, level: Level) {
        let previous = self.state.level.swap(level.is_high(), Ordering::AcqRel);
        if previous != level.is_high() {
            lock(&self.state.history).push(level);
            let _ = self.state.edge_tx.send(());
        }
    }

    pub fn press(&self) {
        self.set_level(Level::High);
    }

    pub fn release(&self) {
        self.set_level(Level::Low);
    }

    /// Raise an edge notification without changing the level, as a
    /// contact bounce that settles back before the read does.
    pub fn bounce(&self) {
        let _ = self.state.edge_tx.send(());
    }

    /// Bias the input was configured with, once claimed.
    pub fn pull(&self) -> Option<Pull> {
        *lock(&self.state.pull)
    }

    /// Make every subsequent wait/read on this line fail.
    pub fn break_line(&self) {
        self.state.faulted.store(true, Ordering::Release);
        let _ = self.state.edge_tx.send(());
    }
}

/// Test-side view of a simulated output line.
#[derive(Clone)]
pub struct SimProbe {
    state: Arc<PinState>,
}

impl SimProbe {
    pub fn level(&self) -> Level {
        self.state.level()
    }

    pub fn is_claimed(&self) -> bool {
        self.state.claimed.load(Ordering::Acquire)
    }

    /// Every level written to the line, in order.
    pub fn history(&self) -> Vec<Level> {
        lock(&self.state.history).clone()
    }

    /// Number of low-to-high transitions written to the line.
    pub fn pulses(&self) -> usize {
        self.history()
            .windows(2)
            .filter(|pair| pair[0] == Level::Low && pair[1] == Level::High)
            .count()
    }

    /// Make every subsequent write to this line fail.
    pub fn break_line(&self) {
        self.state.faulted.store(true, Ordering::Release);
    }
}
