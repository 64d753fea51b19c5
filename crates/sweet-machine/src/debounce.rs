//! Touch debounce state machine.
//!
//! A high level has to persist past the confirmation deadline before a
//! touch start is reported. A low level ends the touch immediately; only
//! the start is debounced. Evaluation is driven by the caller, once per
//! observed level.

use crate::hal::Level;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default dwell time a high level must exceed to count as a touch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2);

/// Clean touch transition published on the machine's touch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Touch {
    Started,
    Ended,
}

impl Touch {
    pub fn is_touching(self) -> bool {
        matches!(self, Touch::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Touch::Started => "started",
            Touch::Ended => "ended",
        }
    }
}

impl From<Touch> for bool {
    fn from(touch: Touch) -> bool {
        touch.is_touching()
    }
}

/// When a pending touch gets re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmPolicy {
    /// Only on the next hardware edge. A press held without further edges
    /// is never confirmed.
    EdgeOnly,
    /// On the next edge, and also once the confirmation deadline passes.
    #[default]
    Recheck,
}

#[derive(Debug, Clone)]
pub struct TouchDebouncer {
    threshold: Duration,
    armed_until: Option<Instant>,
    latched: bool,
}

impl TouchDebouncer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            armed_until: None,
            latched: false,
        }
    }

    /// Feed one level observation taken at `now`.
    pub fn observe(&mut self, level: Level, now: Instant) -> Option<Touch> {
        match level {
            Level::High => match self.armed_until {
                None => {
                    // An unrepresentable deadline leaves the line unarmed.
                    self.armed_until = now.checked_add(self.threshold);
                    None
                }
                Some(deadline) if !self.latched && now > deadline => {
                    self.latched = true;
                    Some(Touch::Started)
                }
                Some(_) => None,
            },
            Level::Low => {
                self.armed_until = None;
                if self.latched {
                    self.latched = false;
                    Some(Touch::Ended)
                } else {
                    None
                }
            }
        }
    }

    /// Deadline of an armed, not yet confirmed touch.
    pub fn pending_deadline(&self) -> Option<Instant> {
        if self.latched {
            None
        } else {
            self.armed_until
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn is_armed(&self) -> bool {
        self.armed_until.is_some()
    }
}

impl Default for TouchDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
