use crate::debounce::{ConfirmPolicy, DEFAULT_DEBOUNCE};
use crate::error::MachineError;
use crate::hal::Pull;
use crate::tags::LineRole;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// BCM numbers of the lines the machine drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMap {
    pub touch: u8,
    pub motor: u8,
    pub buzzer: u8,
}

impl PinMap {
    pub fn pin(&self, line: LineRole) -> u8 {
        match line {
            LineRole::Touch => self.touch,
            LineRole::Motor => self.motor,
            LineRole::Buzzer => self.buzzer,
        }
    }
}

impl Default for PinMap {
    fn default() -> Self {
        // Header pins 7, 13 and 11 on the dispenser board.
        Self {
            touch: 4,
            motor: 27,
            buzzer: 17,
        }
    }
}

/// Upper bound on `debounce`.
pub const MAX_DEBOUNCE: Duration = Duration::from_secs(1);
/// Upper bound on `shutdown_poll`; also bounds how long `stop()` can wait
/// on a quiet touch line.
pub const MAX_SHUTDOWN_POLL: Duration = Duration::from_secs(1);
/// Upper bound on `self_test_hold`.
pub const MAX_SELF_TEST_HOLD: Duration = Duration::from_secs(5);

/// Intervals appear in JSON as integer `*_us` / `*_ms` fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub pins: PinMap,
    pub touch_pull: Pull,
    #[serde(rename = "debounce_us", with = "micros")]
    pub debounce: Duration,
    pub confirm: ConfirmPolicy,
    /// Longest time the touch worker stays in the hardware wait before it
    /// looks at the shutdown signal.
    #[serde(rename = "shutdown_poll_ms", with = "millis")]
    pub shutdown_poll: Duration,
    #[serde(rename = "self_test_hold_ms", with = "millis")]
    pub self_test_hold: Duration,
    pub self_test_pulses: u32,
}

mod micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_micros)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            touch_pull: Pull::Down,
            debounce: DEFAULT_DEBOUNCE,
            confirm: ConfirmPolicy::Recheck,
            shutdown_poll: Duration::from_millis(50),
            self_test_hold: Duration::from_millis(200),
            self_test_pulses: 2,
        }
    }
}

impl MachineConfig {
    pub fn validate(&self) -> Result<(), MachineError> {
        let PinMap {
            touch,
            motor,
            buzzer,
        } = self.pins;
        if touch == motor || touch == buzzer || motor == buzzer {
            return Err(MachineError::InvalidConfig(format!(
                "pins must be distinct (touch={touch}, motor={motor}, buzzer={buzzer})"
            )));
        }
        if self.debounce.is_zero() {
            return Err(MachineError::InvalidConfig(
                "debounce must be greater than zero".to_string(),
            ));
        }
        if self.debounce > MAX_DEBOUNCE {
            return Err(MachineError::InvalidConfig(format!(
                "debounce {:?} exceeds {:?}",
                self.debounce, MAX_DEBOUNCE
            )));
        }
        if self.shutdown_poll.is_zero() {
            return Err(MachineError::InvalidConfig(
                "shutdown_poll must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_poll > MAX_SHUTDOWN_POLL {
            return Err(MachineError::InvalidConfig(format!(
                "shutdown_poll {:?} exceeds {:?}",
                self.shutdown_poll, MAX_SHUTDOWN_POLL
            )));
        }
        if self.self_test_hold > MAX_SELF_TEST_HOLD {
            return Err(MachineError::InvalidConfig(format!(
                "self_test_hold {:?} exceeds {:?}",
                self.self_test_hold, MAX_SELF_TEST_HOLD
            )));
        }
        Ok(())
    }
}
