use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use sweet_machine::{ConfirmPolicy, MachineConfig, MachineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("invalid value {value:?} for {flag}")]
    BadValue { flag: &'static str, value: String },
    #[error("unknown option {0} (see --help)")]
    UnknownFlag(String),
    #[error(transparent)]
    Invalid(#[from] MachineError),
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub touch_pin: Option<u8>,
    pub motor_pin: Option<u8>,
    pub buzzer_pin: Option<u8>,
    pub debounce_us: Option<u64>,
    pub edge_only: bool,
    pub simulate: bool,
    pub self_test: bool,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

fn value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or(ConfigError::MissingValue(flag))
}

fn parsed<T: FromStr>(raw: &str, flag: &'static str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadValue {
        flag,
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    cfg.config_path = Some(PathBuf::from(value(args, i, "--config")?));
                    i += 1;
                }
                "--touch-pin" => {
                    cfg.touch_pin = Some(parsed(value(args, i, "--touch-pin")?, "--touch-pin")?);
                    i += 1;
                }
                "--motor-pin" => {
                    cfg.motor_pin = Some(parsed(value(args, i, "--motor-pin")?, "--motor-pin")?);
                    i += 1;
                }
                "--buzzer-pin" => {
                    cfg.buzzer_pin =
                        Some(parsed(value(args, i, "--buzzer-pin")?, "--buzzer-pin")?);
                    i += 1;
                }
                "--debounce-us" => {
                    cfg.debounce_us =
                        Some(parsed(value(args, i, "--debounce-us")?, "--debounce-us")?);
                    i += 1;
                }
                "--edge-only" => {
                    cfg.edge_only = true;
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--self-test" => {
                    cfg.self_test = true;
                }
                "--run-seconds" => {
                    cfg.run_seconds =
                        Some(parsed(value(args, i, "--run-seconds")?, "--run-seconds")?);
                    i += 1;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, i, "--metrics-addr")?.to_string());
                    i += 1;
                }
                "--audit-log" => {
                    cfg.audit_path = Some(PathBuf::from(value(args, i, "--audit-log")?));
                    i += 1;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    /// Machine settings: the JSON file if one was given, then flag overrides.
    pub fn machine_config(&self) -> Result<MachineConfig, ConfigError> {
        let mut machine = match &self.config_path {
            Some(path) => load_machine_config(path)?,
            None => MachineConfig::default(),
        };

        if let Some(pin) = self.touch_pin {
            machine.pins.touch = pin;
        }
        if let Some(pin) = self.motor_pin {
            machine.pins.motor = pin;
        }
        if let Some(pin) = self.buzzer_pin {
            machine.pins.buzzer = pin;
        }
        if let Some(us) = self.debounce_us {
            machine.debounce = Duration::from_micros(us);
        }
        if self.edge_only {
            machine.confirm = ConfirmPolicy::EdgeOnly;
        }

        machine.validate()?;
        Ok(machine)
    }

    pub fn print_help() {
        println!(
            r#"sweetd - touch sensor and actuator daemon

USAGE:
    sweetd [OPTIONS]

OPTIONS:
    --config <PATH>         Load machine settings from a JSON file
    --touch-pin <N>         BCM pin of the touch sensor [default: 4]
    --motor-pin <N>         BCM pin of the motor [default: 27]
    --buzzer-pin <N>        BCM pin of the buzzer [default: 17]
    --debounce-us <N>       Touch debounce threshold in microseconds [default: 2000]
    --edge-only             Only confirm touches on a later edge (no timer re-check)
    --simulate              Use the simulated board with a scripted touch pad
    --self-test             Pulse the buzzer after startup
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,sweet_machine=trace)

EXAMPLES:
    # Short simulated run with a buzzer check
    sweetd --simulate --self-test --run-seconds 5

    # Production run on the dispenser board
    sweetd --json-logs --metrics-addr 0.0.0.0:9090 --audit-log /var/log/sweetd/audit.jsonl
"#
        );
    }
}

fn load_machine_config(path: &Path) -> Result<MachineConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sweetd")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[])).unwrap();
        assert!(!cfg.simulate);
        assert!(cfg.run_seconds.is_none());
        assert_eq!(cfg.machine_config().unwrap(), MachineConfig::default());
    }

    #[test]
    fn parses_flags_and_applies_overrides() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--simulate",
            "--self-test",
            "--run-seconds",
            "3",
            "--touch-pin",
            "5",
            "--debounce-us",
            "1500",
            "--edge-only",
            "--audit-log",
            "/tmp/audit.jsonl",
        ]))
        .unwrap();

        assert!(cfg.simulate && cfg.self_test);
        assert_eq!(cfg.run_seconds, Some(3));
        assert_eq!(cfg.audit_path, Some(PathBuf::from("/tmp/audit.jsonl")));

        let machine = cfg.machine_config().unwrap();
        assert_eq!(machine.pins.touch, 5);
        assert_eq!(machine.pins.motor, 27);
        assert_eq!(machine.debounce, Duration::from_micros(1500));
        assert_eq!(machine.confirm, ConfirmPolicy::EdgeOnly);
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--bogus"])).unwrap();
        assert!(cfg.show_help);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--motor-pin", "twenty"])),
            Err(ConfigError::BadValue {
                flag: "--motor-pin",
                ..
            })
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--run-seconds"])),
            Err(ConfigError::MissingValue("--run-seconds"))
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--bind", "0.0.0.0:7000"])),
            Err(ConfigError::UnknownFlag(_))
        ));
    }

    #[test]
    fn overrides_that_collide_fail_validation() {
        let cfg = RuntimeConfig::from_args(&args(&["--buzzer-pin", "27"])).unwrap();
        assert!(matches!(
            cfg.machine_config(),
            Err(ConfigError::Invalid(MachineError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn loads_json_file_then_flags_win() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"pins": {{"touch": 22, "motor": 23, "buzzer": 24}}, "self_test_pulses": 3}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cfg = RuntimeConfig::from_args(&args(&["--config", path, "--buzzer-pin", "25"]))
            .unwrap();
        let machine = cfg.machine_config().unwrap();
        assert_eq!(machine.pins.touch, 22);
        assert_eq!(machine.pins.buzzer, 25);
        assert_eq!(machine.self_test_pulses, 3);
        assert_eq!(machine.debounce, Duration::from_millis(2));
    }

    #[test]
    fn unreadable_or_malformed_file_is_reported() {
        let missing = RuntimeConfig {
            config_path: Some(PathBuf::from("/nonexistent/sweetd.json")),
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            missing.machine_config(),
            Err(ConfigError::Read { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let malformed = RuntimeConfig {
            config_path: Some(file.path().to_path_buf()),
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            malformed.machine_config(),
            Err(ConfigError::Parse { .. })
        ));
    }
}
