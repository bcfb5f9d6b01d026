//! System configuration parameters.
//!
//! All tunable parameters for the heatloop controller. Values can be
//! overridden via a TOML file (`--config`); defaults match the installed
//! shop-heater hardware.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::pins;

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Server ---
    /// Address the WebSocket/HTTP server binds to.
    pub listen_addr: String,
    /// Telemetry broadcast period (seconds).
    pub telemetry_interval_secs: u32,
    /// Client-side optimistic window (milliseconds). Must stay well under
    /// the telemetry period so confirmations win before the next tick.
    pub ack_window_ms: u64,
    /// Bounded depth of each client's outbound queue. A client that falls
    /// this far behind is dropped rather than stalling the broadcast.
    pub client_queue_depth: usize,

    // --- Fan ---
    /// BCM GPIO carrying the BTS7960 RPWM line.
    pub fan_rpwm_gpio: u32,
    /// PWM carrier frequency (Hz).
    pub fan_pwm_freq_hz: u32,

    // --- Valves ---
    /// BCM GPIO for the main-loop relay (active-LOW).
    pub main_valve_gpio: u32,
    /// BCM GPIO for the diversion relay (active-LOW).
    pub diversion_valve_gpio: u32,

    // --- Flow meter ---
    /// BCM GPIO carrying FL-408 pulses.
    pub flow_pulse_gpio: u32,
    /// Pulses per litre calibration.
    pub flow_pulses_per_litre: f64,

    // --- Temperature probes ---
    /// Kernel 1-Wire device directory.
    pub w1_devices_path: PathBuf,
    /// Logical probe name → 1-Wire sensor id (without the `28-` prefix).
    pub probes: BTreeMap<String, String>,
    /// Sensor id → calibration offset in °C, added to the raw reading.
    /// Determined by ice-water test of each probe.
    pub calibration_offsets_c: BTreeMap<String, f64>,
    /// Named pairwise differences computed each telemetry tick.
    pub deltas: Vec<DeltaSpec>,

    // --- History ---
    /// Optional JSON-lines file receiving every telemetry snapshot.
    /// Best-effort: write failures never touch the control path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
}

/// A named difference between two probes (`minuend − subtrahend`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaSpec {
    pub name: String,
    pub minuend: String,
    pub subtrahend: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let probes = [
            ("water_hot", "3ca4f649bbd0"),
            ("water_mix", "3cf7f6496d4f"),
            ("water_cold", "158200872bfa"),
            ("water_reservoir", "3c52f648a463"),
            ("air_heated", "4460008751fe"),
            ("air_cool", "031294970b3f"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        // Offsets from the ice-water calibration run of the installed probes.
        let calibration_offsets_c = [
            ("4460008751fe", -0.75),
            ("3c52f648a463", 0.00),
            ("3cf7f6496d4f", 0.00),
            ("031294970b3f", 1.00),
            ("3ca4f649bbd0", -0.81),
            ("158200872bfa", -0.38),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let deltas = vec![
            DeltaSpec {
                name: "delta_water_heater".into(),
                minuend: "water_hot".into(),
                subtrahend: "water_cold".into(),
            },
            DeltaSpec {
                name: "delta_water_radiator".into(),
                minuend: "water_mix".into(),
                subtrahend: "water_cold".into(),
            },
            DeltaSpec {
                name: "delta_air".into(),
                minuend: "air_heated".into(),
                subtrahend: "air_cool".into(),
            },
        ];

        Self {
            listen_addr: "0.0.0.0:8000".into(),
            telemetry_interval_secs: 5,
            ack_window_ms: 500,
            client_queue_depth: 16,
            fan_rpwm_gpio: pins::FAN_RPWM_GPIO,
            fan_pwm_freq_hz: pins::FAN_PWM_FREQ_HZ,
            main_valve_gpio: pins::MAIN_VALVE_GPIO,
            diversion_valve_gpio: pins::DIVERSION_VALVE_GPIO,
            flow_pulse_gpio: pins::FLOW_PULSE_GPIO,
            flow_pulses_per_litre: pins::FLOW_PULSES_PER_LITRE,
            w1_devices_path: PathBuf::from(pins::W1_DEVICES_PATH),
            probes,
            calibration_offsets_c,
            deltas,
            history_path: None,
        }
    }
}

impl SystemConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = toml::from_str(&raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check the configuration. Invalid values are rejected, never
    /// silently clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_interval_secs == 0 {
            return Err(ConfigError::Invalid("telemetry_interval_secs must be > 0"));
        }
        if self.ack_window_ms == 0 {
            return Err(ConfigError::Invalid("ack_window_ms must be > 0"));
        }
        if self.ack_window_ms >= u64::from(self.telemetry_interval_secs) * 1000 {
            return Err(ConfigError::Invalid(
                "ack_window_ms must be below the telemetry period",
            ));
        }
        if self.client_queue_depth == 0 {
            return Err(ConfigError::Invalid("client_queue_depth must be > 0"));
        }
        if self.flow_pulses_per_litre <= 0.0 {
            return Err(ConfigError::Invalid("flow_pulses_per_litre must be > 0"));
        }
        if self.probes.is_empty() {
            return Err(ConfigError::Invalid("at least one probe must be mapped"));
        }
        for delta in &self.deltas {
            if !self.probes.contains_key(&delta.minuend)
                || !self.probes.contains_key(&delta.subtrahend)
            {
                return Err(ConfigError::Invalid(
                    "delta references a probe name that is not mapped",
                ));
            }
        }
        Ok(())
    }
}

/// Errors from configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid TOML for `SystemConfig`.
    Parse(toml::de::Error),
    /// A field failed range validation.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config read failed: {e}"),
            Self::Parse(e) => write!(f, "config parse failed: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.probes.len(), 6);
        assert_eq!(c.deltas.len(), 3);
        assert_eq!(c.fan_rpwm_gpio, 18);
        assert_eq!(c.main_valve_gpio, 23);
        assert_eq!(c.diversion_valve_gpio, 24);
    }

    #[test]
    fn ack_window_stays_under_telemetry_period() {
        let c = SystemConfig::default();
        assert!(
            c.ack_window_ms < u64::from(c.telemetry_interval_secs) * 1000,
            "confirmations must be able to win before the next periodic tick"
        );
    }

    #[test]
    fn toml_roundtrip() {
        let c = SystemConfig::default();
        let text = toml::to_string(&c).unwrap();
        let c2: SystemConfig = toml::from_str(&text).unwrap();
        assert_eq!(c.listen_addr, c2.listen_addr);
        assert_eq!(c.probes, c2.probes);
        assert_eq!(c.telemetry_interval_secs, c2.telemetry_interval_secs);
    }

    #[test]
    fn partial_file_fills_from_defaults() {
        let c: SystemConfig = toml::from_str("telemetry_interval_secs = 10").unwrap();
        assert_eq!(c.telemetry_interval_secs, 10);
        assert_eq!(c.probes.len(), 6);
    }

    #[test]
    fn unresolved_delta_reference_is_rejected() {
        let mut c = SystemConfig::default();
        c.deltas.push(DeltaSpec {
            name: "delta_bogus".into(),
            minuend: "water_hot".into(),
            subtrahend: "no_such_probe".into(),
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn oversized_ack_window_is_rejected() {
        let c = SystemConfig {
            ack_window_ms: 5_000,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }
}
