//! DS18B20 temperature probes on the kernel 1-Wire bus.
//!
//! The w1 subsystem exposes each probe as a directory named `28-<id>` under
//! `/sys/bus/w1/devices`, with a `w1_slave` file holding two lines:
//!
//! ```text
//! 6e 01 4b 46 7d ff 0c 10 63 : crc=63 YES
//! 6e 01 4b 46 7d ff 0c 10 63 t=22875
//! ```
//!
//! The first line carries the CRC verdict, the second the temperature in
//! millidegrees Celsius. A probe that fails to read yields a typed error —
//! the caller marks it unavailable, never substitutes a stale value.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::SensorError;

/// DS18B20 family code prefix on the bus.
const FAMILY_PREFIX: &str = "28-";

/// Reader for all DS18B20 probes under one w1 device directory.
pub struct Ds18b20Bus {
    base: PathBuf,
}

impl Ds18b20Bus {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// List the ids (without the family prefix) of every probe on the bus.
    pub fn scan(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.base) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| name.strip_prefix(FAMILY_PREFIX).map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// Set every discovered probe to the given resolution (9–12 bits).
    /// Best-effort: writing the `resolution` attribute needs root, and a
    /// failure must not break normal operation.
    pub fn set_resolution_all(&self, bits: u8) {
        for id in self.scan() {
            let path = self.device_dir(&id).join("resolution");
            if let Err(e) = fs::write(&path, format!("{bits}\n")) {
                debug!("probe {id}: resolution not set ({e})");
            }
        }
    }

    /// Read one probe in °C.
    pub fn read_celsius(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let path = self.device_dir(sensor_id).join("w1_slave");
        if !path.exists() {
            return Err(SensorError::ProbeMissing);
        }
        let payload = fs::read_to_string(&path).map_err(|_| SensorError::ReadFailed)?;
        parse_w1_slave(&payload)
    }

    fn device_dir(&self, sensor_id: &str) -> PathBuf {
        self.base.join(format!("{FAMILY_PREFIX}{sensor_id}"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

/// Parse the two-line `w1_slave` payload into °C.
pub(crate) fn parse_w1_slave(payload: &str) -> Result<f64, SensorError> {
    let mut lines = payload.lines();
    let status = lines.next().ok_or(SensorError::MalformedReading)?;
    if !status.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch);
    }
    let data = lines.next().ok_or(SensorError::MalformedReading)?;
    let raw = data
        .rsplit_once("t=")
        .map(|(_, t)| t.trim())
        .ok_or(SensorError::MalformedReading)?;
    let milli: i32 = raw.parse().map_err(|_| SensorError::MalformedReading)?;
    Ok(f64::from(milli) / 1000.0)
}
