//! Audit journal of machine lifecycle and touch activity.
//!
//! One JSON object per line, appended to the configured file.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Types of events recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Workers launched and lines claimed
    MachineStart,
    /// Workers joined
    MachineStop,
    TouchStarted,
    TouchEnded,
    /// Buzzer self-test finished, successfully or not
    SelfTest,
    /// A worker died or shutdown reported an error
    WorkerFault,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Microseconds since the journal was opened
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    opened: Instant,
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            opened: Instant::now(),
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Stamp and append an entry.
    pub fn log_event(
        &self,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        let unix_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        self.log(&AuditEntry {
            timestamp_us: self.opened.elapsed().as_micros() as u64,
            unix_us,
            event_type,
            details,
        })
    }
}

/// Details for a touch transition
#[derive(Debug, Clone, Serialize)]
pub struct TouchDetails {
    pub pin: u8,
    pub sequence: u64,
}

/// Details for a buzzer self-test
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestDetails {
    pub pulses: u32,
    pub hold_ms: u64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
