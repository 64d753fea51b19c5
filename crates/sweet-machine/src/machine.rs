use crate::actuator::ActuatorDriver;
use crate::config::MachineConfig;
use crate::debounce::Touch;
use crate::error::MachineError;
use crate::hal::{GpioHost, HalError};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use crate::tags::LineRole;
use crate::touch::{EdgeReader, TouchDispatcher};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, error, info};
use std::thread::{self, JoinHandle};

type WorkerJob = Box<dyn FnOnce() -> Result<(), HalError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Uninitialized,
    Running,
    Stopped,
}

/// Cloneable handle for issuing actuator commands from any thread.
///
/// Each call blocks until the driver accepts the command, so at most one
/// command per actuator is in flight.
#[derive(Debug, Clone)]
pub struct Commander {
    motor: Sender<bool>,
    buzzer: Sender<bool>,
    shutdown: ShutdownSignal,
}

impl Commander {
    pub fn set_motor(&self, on: bool) -> Result<(), MachineError> {
        self.send(LineRole::Motor, &self.motor, on)
    }

    pub fn set_buzzer(&self, on: bool) -> Result<(), MachineError> {
        self.send(LineRole::Buzzer, &self.buzzer, on)
    }

    fn send(&self, line: LineRole, commands: &Sender<bool>, on: bool) -> Result<(), MachineError> {
        if self.shutdown.is_signalled() {
            return Err(MachineError::Stopped);
        }
        debug!("Toggling {} {}", line, on);

        select! {
            send(commands, on) -> res => match res {
                Ok(()) => Ok(()),
                Err(_) if self.shutdown.is_signalled() => Err(MachineError::Stopped),
                Err(_) => Err(MachineError::WorkerExited(line)),
            },
            recv(self.shutdown.receiver()) -> _ => Err(MachineError::Stopped),
        }
    }
}

struct Running {
    trigger: ShutdownTrigger,
    commander: Commander,
    workers: Vec<(LineRole, JoinHandle<Result<(), HalError>>)>,
}

impl Running {
    fn shut_down(self) -> Result<(), MachineError> {
        info!("Stopping machine...");
        let Running {
            trigger, workers, ..
        } = self;
        trigger.fire();
        let result = join_workers(workers);
        info!("Machine stopped");
        result
    }
}

enum Lifecycle {
    Uninitialized,
    Running(Running),
    Stopped,
}

/// Touch sensor and actuator machine.
///
/// Owns the touch stream, the command inputs, and the workers behind
/// them. Started once and stopped once; dropping a running machine stops
/// it.
pub struct Machine {
    config: MachineConfig,
    touch_tx: Option<Sender<Touch>>,
    touch_rx: Receiver<Touch>,
    lifecycle: Lifecycle,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        let (touch_tx, touch_rx) = bounded(0);
        Self {
            config,
            touch_tx: Some(touch_tx),
            touch_rx,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> MachineState {
        match self.lifecycle {
            Lifecycle::Uninitialized => MachineState::Uninitialized,
            Lifecycle::Running(_) => MachineState::Running,
            Lifecycle::Stopped => MachineState::Stopped,
        }
    }

    /// Bind the hardware and launch the workers.
    ///
    /// All three lines are claimed before any worker starts, so a claim
    /// failure leaves nothing running and the machine can be started
    /// again with another host.
    pub fn start<H: GpioHost>(&mut self, mut host: H) -> Result<(), MachineError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Running(_) => return Err(MachineError::AlreadyStarted),
            Lifecycle::Stopped => return Err(MachineError::AlreadyStopped),
        }
        self.config.validate()?;

        host.init().map_err(MachineError::HardwareUnavailable)?;

        let pins = self.config.pins;
        let claim_err = |line: LineRole| {
            let pin = pins.pin(line);
            move |source: HalError| MachineError::PinClaim { line, pin, source }
        };
        let touch = host
            .claim_input(pins.touch, self.config.touch_pull)
            .map_err(claim_err(LineRole::Touch))?;
        let motor = host
            .claim_output(pins.motor)
            .map_err(claim_err(LineRole::Motor))?;
        let buzzer = host
            .claim_output(pins.buzzer)
            .map_err(claim_err(LineRole::Buzzer))?;

        let touch_tx = self.touch_tx.take().ok_or(MachineError::AlreadyStopped)?;
        let (trigger, signal) = shutdown::channel();
        let (motor_tx, motor_rx) = bounded(0);
        let (buzzer_tx, buzzer_rx) = bounded(0);

        let dispatcher = TouchDispatcher::new(
            EdgeReader::new(touch, &self.config),
            touch_tx,
            signal.clone(),
        );
        let motor_driver = ActuatorDriver::new(LineRole::Motor, motor, motor_rx, signal.clone());
        let buzzer_driver =
            ActuatorDriver::new(LineRole::Buzzer, buzzer, buzzer_rx, signal.clone());

        let jobs: [(LineRole, WorkerJob); 3] = [
            (LineRole::Touch, Box::new(move || dispatcher.run())),
            (LineRole::Motor, Box::new(move || motor_driver.run())),
            (LineRole::Buzzer, Box::new(move || buzzer_driver.run())),
        ];

        let mut workers = Vec::with_capacity(jobs.len());
        for (line, job) in jobs {
            let spawned = thread::Builder::new()
                .name(line.tag().thread.to_string())
                .spawn(job);
            match spawned {
                Ok(handle) => workers.push((line, handle)),
                Err(source) => {
                    error!("Failed to spawn {} worker: {}", line, source);
                    trigger.fire();
                    let _ = join_workers(workers);
                    self.lifecycle = Lifecycle::Stopped;
                    return Err(MachineError::Spawn { line, source });
                }
            }
        }

        info!(
            "Machine started (touch={}, motor={}, buzzer={})",
            pins.touch, pins.motor, pins.buzzer
        );

        self.lifecycle = Lifecycle::Running(Running {
            trigger,
            commander: Commander {
                motor: motor_tx,
                buzzer: buzzer_tx,
                shutdown: signal,
            },
            workers,
        });
        Ok(())
    }

    /// Signal shutdown and block until every worker has exited.
    ///
    /// Both actuator lines are inactive once this returns. A worker that
    /// died earlier from a hardware fault is reported here.
    pub fn stop(&mut self) -> Result<(), MachineError> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(running) => running.shut_down(),
            Lifecycle::Uninitialized => {
                self.lifecycle = Lifecycle::Uninitialized;
                Err(MachineError::NotStarted)
            }
            Lifecycle::Stopped => Err(MachineError::AlreadyStopped),
        }
    }

    pub fn set_motor(&self, on: bool) -> Result<(), MachineError> {
        self.running_commander()?.set_motor(on)
    }

    pub fn set_buzzer(&self, on: bool) -> Result<(), MachineError> {
        self.running_commander()?.set_buzzer(on)
    }

    pub fn commander(&self) -> Result<Commander, MachineError> {
        self.running_commander().cloned()
    }

    /// Stream of clean touch transitions. Available before `start`; ends
    /// once the touch worker has exited.
    pub fn touch_events(&self) -> Receiver<Touch> {
        self.touch_rx.clone()
    }

    /// Audible buzzer check: pulses the buzzer with fixed holds, ending off.
    pub fn diagnostic_self_test(&self) -> Result<(), MachineError> {
        let commander = self.running_commander()?;
        let hold = self.config.self_test_hold;
        info!(
            "Running buzzer self-test ({} pulses, {:?} hold)",
            self.config.self_test_pulses, hold
        );

        for pulse in 0..self.config.self_test_pulses {
            if pulse > 0 {
                thread::sleep(hold);
            }
            commander.set_buzzer(true)?;
            thread::sleep(hold);
            commander.set_buzzer(false)?;
        }
        Ok(())
    }

    /// Running with every worker still alive.
    pub fn is_healthy(&self) -> bool {
        match &self.lifecycle {
            Lifecycle::Running(running) => running
                .workers
                .iter()
                .all(|(_, handle)| !handle.is_finished()),
            _ => false,
        }
    }

    fn running_commander(&self) -> Result<&Commander, MachineError> {
        match &self.lifecycle {
            Lifecycle::Running(running) => Ok(&running.commander),
            Lifecycle::Uninitialized => Err(MachineError::NotStarted),
            Lifecycle::Stopped => Err(MachineError::Stopped),
        }
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        if let Lifecycle::Running(_) = self.lifecycle {
            if let Err(e) = self.stop() {
                error!("Machine shutdown on drop failed: {}", e);
            }
        }
    }
}

fn join_workers(
    workers: Vec<(LineRole, JoinHandle<Result<(), HalError>>)>,
) -> Result<(), MachineError> {
    let mut first_error = None;
    for (line, handle) in workers {
        let outcome = match handle.join() {
            Ok(Ok(())) => {
                debug!("{} worker exited", line);
                continue;
            }
            Ok(Err(source)) => MachineError::WorkerFailed { line, source },
            Err(_) => MachineError::WorkerPanicked(line),
        };
        error!("{}", outcome);
        first_error.get_or_insert(outcome);
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Level;
    use crate::hal_sim::SimHost;
    use std::time::Duration;

    fn fast_config() -> MachineConfig {
        MachineConfig {
            shutdown_poll: Duration::from_millis(10),
            self_test_hold: Duration::from_millis(20),
            ..MachineConfig::default()
        }
    }

    #[test]
    fn lifecycle_transitions() {
        let mut machine = Machine::new(fast_config());
        assert_eq!(machine.state(), MachineState::Uninitialized);
        assert!(!machine.is_healthy());

        machine.start(SimHost::new()).unwrap();
        assert_eq!(machine.state(), MachineState::Running);
        assert!(machine.is_healthy());

        machine.stop().unwrap();
        assert_eq!(machine.state(), MachineState::Stopped);
        assert!(!machine.is_healthy());
    }

    #[test]
    fn misuse_is_reported() {
        let mut machine = Machine::new(fast_config());
        assert!(matches!(machine.stop(), Err(MachineError::NotStarted)));
        assert!(matches!(machine.set_motor(true), Err(MachineError::NotStarted)));
        assert!(matches!(machine.commander(), Err(MachineError::NotStarted)));

        machine.start(SimHost::new()).unwrap();
        assert!(matches!(
            machine.start(SimHost::new()),
            Err(MachineError::AlreadyStarted)
        ));

        machine.stop().unwrap();
        assert!(matches!(machine.stop(), Err(MachineError::AlreadyStopped)));
        assert!(matches!(machine.set_buzzer(true), Err(MachineError::Stopped)));
        assert!(matches!(
            machine.start(SimHost::new()),
            Err(MachineError::AlreadyStopped)
        ));
    }

    #[test]
    fn stale_commander_reports_stopped() {
        let mut machine = Machine::new(fast_config());
        machine.start(SimHost::new()).unwrap();
        let commander = machine.commander().unwrap();
        machine.stop().unwrap();
        assert!(matches!(commander.set_motor(true), Err(MachineError::Stopped)));
    }

    #[test]
    fn drop_releases_actuators() {
        let host = SimHost::new();
        let motor = host.probe(27);
        {
            let mut machine = Machine::new(fast_config());
            machine.start(host).unwrap();
            machine.set_motor(true).unwrap();
            machine.set_motor(true).unwrap();
            assert_eq!(motor.level(), Level::High);
        }
        assert_eq!(motor.level(), Level::Low);
    }
}
