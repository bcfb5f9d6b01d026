//! Best-effort telemetry history.
//!
//! Appends each telemetry tick as one JSON line with a UTC timestamp.
//! Purely an observer: a failed write is logged and the control path moves
//! on — historical logging carries no delivery guarantee.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, warn};

use crate::app::events::StateUpdate;

pub struct TelemetryHistory {
    path: PathBuf,
    /// Only the first failure warns; repeats drop to debug.
    warned: bool,
}

impl TelemetryHistory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            warned: false,
        }
    }

    /// Append one snapshot. Never fails the caller.
    pub fn append(&mut self, update: &StateUpdate) {
        if let Err(e) = self.try_append(update) {
            if self.warned {
                debug!("history append failed: {e}");
            } else {
                warn!("history append failed: {e} (further failures logged at debug)");
                self.warned = true;
            }
        }
    }

    fn try_append(&self, update: &StateUpdate) -> std::io::Result<()> {
        let mut record = serde_json::to_value(update).map_err(std::io::Error::other)?;
        if let Some(map) = record.as_object_mut() {
            map.insert(
                "ts".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{record}")
    }
}
