use crate::hal::{HalError, Level, OutputLine};
use crate::shutdown::ShutdownSignal;
use crate::tags::LineRole;
use crossbeam_channel::{select, Receiver};
use log::{debug, error, info, warn};

/// Drives one on/off actuator line from a command channel.
///
/// The line is left inactive whenever the driver returns, on shutdown as
/// well as on a failed write.
pub struct ActuatorDriver<O: OutputLine> {
    line: LineRole,
    output: O,
    commands: Receiver<bool>,
    shutdown: ShutdownSignal,
}

impl<O: OutputLine> ActuatorDriver<O> {
    pub fn new(
        line: LineRole,
        output: O,
        commands: Receiver<bool>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            line,
            output,
            commands,
            shutdown,
        }
    }

    pub fn run(mut self) -> Result<(), HalError> {
        info!("Handling {} commands on GPIO {}", self.line, self.output.pin());

        loop {
            select! {
                recv(self.commands) -> command => match command {
                    Ok(on) => self.apply(on)?,
                    Err(_) => {
                        warn!("{} command channel closed", self.line);
                        return self.release();
                    }
                },
                recv(self.shutdown.receiver()) -> _ => {
                    info!("{} driver received shutdown", self.line);
                    return self.release();
                }
            }
        }
    }

    fn apply(&mut self, on: bool) -> Result<(), HalError> {
        debug!("{} on={}", self.line, on);
        if let Err(e) = self.output.set_level(Level::from(on)) {
            error!("{} line write failed: {}", self.line, e);
            if let Err(release) = self.output.set_level(Level::Low) {
                error!("{} line could not be released: {}", self.line, release);
            }
            return Err(e);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), HalError> {
        self.output.set_level(Level::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::GpioHost;
    use crate::hal_sim::SimHost;
    use crate::shutdown;
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn follows_commands_and_releases_on_shutdown() {
        let mut host = SimHost::new();
        let probe = host.probe(27);
        let output = host.claim_output(27).unwrap();
        let (tx, rx) = bounded(0);
        let (trigger, signal) = shutdown::channel();

        let driver = ActuatorDriver::new(LineRole::Motor, output, rx, signal);
        let handle = thread::spawn(move || driver.run());

        tx.send(true).unwrap();
        tx.send(true).unwrap();
        assert_eq!(probe.level(), Level::High);
        trigger.fire();

        assert!(handle.join().unwrap().is_ok());
        assert_eq!(probe.level(), Level::Low);
    }

    #[test]
    fn write_failure_ends_the_driver() {
        let mut host = SimHost::new();
        let probe = host.probe(17);
        let output = host.claim_output(17).unwrap();
        let (tx, rx) = bounded(0);
        let (_trigger, signal) = shutdown::channel();

        let driver = ActuatorDriver::new(LineRole::Buzzer, output, rx, signal);
        let handle = thread::spawn(move || driver.run());

        probe.break_line();
        tx.send(true).unwrap();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(HalError::Io { pin: 17, .. })));
        assert!(tx.send(false).is_err());
    }

    /// Output whose writes fail for the listed levels.
    struct FlakyLine {
        failing: Vec<Level>,
        written: Arc<Mutex<Vec<Level>>>,
    }

    impl OutputLine for FlakyLine {
        fn set_level(&mut self, level: Level) -> Result<(), HalError> {
            if self.failing.contains(&level) {
                return Err(HalError::Io {
                    pin: 22,
                    reason: format!("{level:?} write rejected"),
                });
            }
            self.written.lock().unwrap().push(level);
            Ok(())
        }

        fn pin(&self) -> u8 {
            22
        }
    }

    fn run_flaky(failing: Vec<Level>) -> (Result<(), HalError>, Vec<Level>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let line = FlakyLine {
            failing,
            written: Arc::clone(&written),
        };
        let (tx, rx) = bounded(0);
        let (_trigger, signal) = shutdown::channel();
        let handle = thread::spawn(move || {
            ActuatorDriver::new(LineRole::Motor, line, rx, signal).run()
        });

        tx.send(true).unwrap();
        let result = handle.join().unwrap();
        let written = written.lock().unwrap().clone();
        (result, written)
    }

    #[test]
    fn failed_write_still_releases_the_line() {
        let (result, written) = run_flaky(vec![Level::High]);
        assert!(matches!(result, Err(HalError::Io { reason, .. }) if reason.contains("High")));
        assert_eq!(written, vec![Level::Low]);
    }

    #[test]
    fn failed_release_reports_the_original_write_error() {
        let (result, written) = run_flaky(vec![Level::High, Level::Low]);
        assert!(matches!(result, Err(HalError::Io { reason, .. }) if reason.contains("High")));
        assert!(written.is_empty());
    }
}
