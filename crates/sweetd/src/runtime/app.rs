use crate::infra::audit::{AuditEventType, AuditLogger, SelfTestDetails, TouchDetails};
use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::simulate::spawn_touch_script;
use crate::runtime::telemetry;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sweet_machine::{Machine, MachineError, SimHost, Touch};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SUPERVISE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Optional audit journal shared by the supervisor and the touch consumer.
#[derive(Clone, Default)]
struct Journal(Option<Arc<AuditLogger>>);

impl Journal {
    fn open(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let logger = AuditLogger::new(path).map_err(|source| AppError::Audit {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Audit logging enabled");
        Ok(Self(Some(Arc::new(logger))))
    }

    fn record(&self, event_type: AuditEventType, details: impl Serialize) {
        let Some(logger) = &self.0 else {
            return;
        };
        let written = serde_json::to_value(details)
            .map_err(std::io::Error::from)
            .and_then(|details| logger.log_event(event_type, details));
        if let Err(e) = written {
            warn!(error = %e, ?event_type, "Failed to write audit entry");
        }
    }
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env()?;
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    init_tracing(config.json_logs);

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(config.metrics_addr.as_deref());

    let machine_config = config.machine_config()?;
    let journal = Journal::open(config.audit_path.as_deref())?;
    let pins = machine_config.pins;

    info!(
        touch_pin = pins.touch,
        motor_pin = pins.motor,
        buzzer_pin = pins.buzzer,
        debounce_us = machine_config.debounce.as_micros() as u64,
        confirm = ?machine_config.confirm,
        simulate = config.simulate,
        "Starting sweetd"
    );

    let mut machine = Machine::new(machine_config);
    let stop = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&stop));

    let started = if config.simulate {
        let host = SimHost::new();
        let pad = host.touch_pad(pins.touch);
        machine
            .start(host)
            .map(|()| Some(spawn_touch_script(pad, Arc::clone(&stop))))
    } else {
        start_hardware(&mut machine).map(|()| None)
    };
    let script = match started {
        Ok(script) => script,
        Err(e) => {
            error!(error = %e, "Machine failed to start");
            journal.record(
                AuditEventType::WorkerFault,
                serde_json::json!({ "stage": "start", "error": e.to_string() }),
            );
            return Err(e.into());
        }
    };

    telemetry::observe_machine(&machine);
    journal.record(
        AuditEventType::MachineStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "pins": pins,
            "simulated": config.simulate,
        }),
    );

    let consumer = spawn_touch_consumer(machine.touch_events(), pins.touch, journal.clone());

    let mut outcome = Ok(());
    if config.self_test {
        outcome = run_self_test(&machine, &journal);
    }
    if outcome.is_ok() {
        supervise(&machine, &journal, &stop, config.run_seconds);
    }

    stop.store(true, Ordering::Relaxed);
    let stopped = machine.stop();
    telemetry::observe_machine(&machine);

    if let Some(script) = script {
        let cycles = join_or_default("touch script", script);
        debug!(cycles, "Touch script finished");
    }
    let touch_events = join_or_default("touch consumer", consumer);

    if let Err(e) = &stopped {
        error!(error = %e, "Machine shutdown reported a fault");
        journal.record(
            AuditEventType::WorkerFault,
            serde_json::json!({ "stage": "stop", "error": e.to_string() }),
        );
    }
    journal.record(
        AuditEventType::MachineStop,
        serde_json::json!({ "touch_events": touch_events, "clean": stopped.is_ok() }),
    );
    info!(touch_events, "Run complete");

    outcome?;
    stopped.map_err(AppError::from)
}

#[cfg(feature = "rpi")]
fn start_hardware(machine: &mut Machine) -> Result<(), MachineError> {
    machine.start(sweet_machine::RppalHost::new())
}

#[cfg(not(feature = "rpi"))]
fn start_hardware(_machine: &mut Machine) -> Result<(), MachineError> {
    Err(MachineError::HardwareUnavailable(
        sweet_machine::HalError::Unavailable(
            "built without the rpi feature; use --simulate".to_string(),
        ),
    ))
}

/// Drain the touch stream until the touch worker exits. Returns the number
/// of transitions seen.
fn spawn_touch_consumer(
    touches: Receiver<Touch>,
    pin: u8,
    journal: Journal,
) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let mut sequence = 0u64;
        for touch in touches.iter() {
            sequence += 1;
            telemetry::record_touch(touch);
            info!(pin, sequence, kind = touch.as_str(), "Touch");

            let event_type = match touch {
                Touch::Started => AuditEventType::TouchStarted,
                Touch::Ended => AuditEventType::TouchEnded,
            };
            journal.record(event_type, TouchDetails { pin, sequence });
        }
        debug!("Touch stream closed");
        sequence
    })
}

fn run_self_test(machine: &Machine, journal: &Journal) -> Result<(), AppError> {
    let config = machine.config();
    let result = machine.diagnostic_self_test();
    telemetry::record_self_test();

    journal.record(
        AuditEventType::SelfTest,
        SelfTestDetails {
            pulses: config.self_test_pulses,
            hold_ms: config.self_test_hold.as_millis() as u64,
            passed: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        },
    );

    match result {
        Ok(()) => {
            info!("Buzzer self-test passed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Buzzer self-test failed");
            Err(e.into())
        }
    }
}

/// SIGINT/SIGTERM set `stop`, which ends the supervise loop and leads into
/// the ordered machine shutdown.
fn install_signal_handler(stop: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        info!("Termination signal received");
        stop.store(true, Ordering::Relaxed);
    });
    if let Err(e) = result {
        warn!(error = %e, "Failed to install signal handler");
    }
}

fn join_or_default<T: Default>(name: &str, handle: thread::JoinHandle<T>) -> T {
    handle.join().unwrap_or_else(|_| {
        error!(thread = name, "Thread panicked");
        T::default()
    })
}

/// Publish machine health until the run window closes, a worker dies, or
/// `stop` is set.
fn supervise(
    machine: &Machine,
    journal: &Journal,
    stop: &AtomicBool,
    run_seconds: Option<u64>,
) {
    let deadline = run_seconds.map(|secs| {
        info!(seconds = secs, "Running for limited duration");
        Instant::now() + Duration::from_secs(secs)
    });

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("Stop requested");
            return;
        }
        if !telemetry::observe_machine(machine) {
            warn!("A machine worker exited; shutting down");
            journal.record(
                AuditEventType::WorkerFault,
                serde_json::json!({ "stage": "run" }),
            );
            return;
        }

        let nap = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return;
                }
                left.min(SUPERVISE_INTERVAL)
            }
            None => SUPERVISE_INTERVAL,
        };
        thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweet_machine::MachineConfig;

    #[test]
    fn supervise_returns_once_stop_is_set() {
        let mut machine = Machine::new(MachineConfig::default());
        machine.start(SimHost::new()).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stop);
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        supervise(&machine, &Journal::default(), &stop, None);
        assert!(started.elapsed() < Duration::from_secs(2));
        setter.join().unwrap();

        machine.stop().unwrap();
    }

    #[test]
    fn panicked_thread_joins_as_default() {
        let handle = thread::spawn(|| -> u64 { panic!("consumer died") });
        assert_eq!(join_or_default("test", handle), 0);
    }
}
