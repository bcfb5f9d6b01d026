//! Sensor acquisition.
//!
//! [`SensorHub`] owns every input device and composes the per-tick
//! [`SensorFrame`]: named probe temperatures with calibration applied,
//! derived deltas, and the flow rate. A probe that fails to read is marked
//! unavailable for that tick — the frame as a whole never fails.

pub mod ds18b20;
pub mod flow;

use std::collections::BTreeMap;
use std::time::Instant;

use log::warn;

use crate::app::events::SensorFrame;
use crate::config::{DeltaSpec, SystemConfig};

use ds18b20::Ds18b20Bus;
use flow::FlowMeter;

/// Aggregates the 1-Wire probes and the flow meter behind one read call.
pub struct SensorHub {
    bus: Ds18b20Bus,
    flow: FlowMeter,
    /// Logical name → sensor id.
    probes: BTreeMap<String, String>,
    /// Sensor id → calibration offset (°C).
    offsets: BTreeMap<String, f64>,
    deltas: Vec<DeltaSpec>,
}

impl SensorHub {
    pub fn new(bus: Ds18b20Bus, flow: FlowMeter, config: &SystemConfig) -> Self {
        Self {
            bus,
            flow,
            probes: config.probes.clone(),
            offsets: config.calibration_offsets_c.clone(),
            deltas: config.deltas.clone(),
        }
    }

    /// Configure probe resolution and log which mapped probes are present.
    pub fn discover(&self) {
        self.bus.set_resolution_all(10);
        let found = self.bus.scan();
        for (name, id) in &self.probes {
            if found.iter().any(|f| f == id) {
                log::info!("probe {name}: {id} present");
            } else {
                warn!("probe {name}: {id} NOT FOUND on bus");
            }
        }
    }

    /// Read every probe and the flow meter into one frame.
    pub fn read_frame(&mut self, now: Instant) -> SensorFrame {
        let mut temperatures = BTreeMap::new();
        for (name, id) in &self.probes {
            let reading = match self.bus.read_celsius(id) {
                Ok(celsius) => {
                    let offset = self.offsets.get(id).copied().unwrap_or(0.0);
                    Some(round1(celsius_to_fahrenheit(celsius + offset)))
                }
                Err(e) => {
                    warn!("probe {name} ({id}): {e}");
                    None
                }
            };
            temperatures.insert(name.clone(), reading);
        }

        let deltas = compute_deltas(&temperatures, &self.deltas);
        let flow_rate = round2(self.flow.read_lpm(now));

        SensorFrame {
            temperatures,
            deltas,
            flow_rate,
        }
    }
}

/// Pairwise differences between named probes. A delta is present only when
/// both of its inputs were readable this tick.
pub fn compute_deltas(
    temperatures: &BTreeMap<String, Option<f64>>,
    specs: &[DeltaSpec],
) -> BTreeMap<String, f64> {
    let mut deltas = BTreeMap::new();
    for spec in specs {
        let minuend = temperatures.get(&spec.minuend).copied().flatten();
        let subtrahend = temperatures.get(&spec.subtrahend).copied().flatten();
        if let (Some(a), Some(b)) = (minuend, subtrahend) {
            deltas.insert(spec.name.clone(), round1(a - b));
        }
    }
    deltas
}

fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;

    const GOOD: &str = "aa : crc=aa YES\naa t=20000\n";

    fn write_probe(dir: &std::path::Path, id: &str, payload: &str) {
        let dev = dir.join(format!("28-{id}"));
        std::fs::create_dir(&dev).unwrap();
        std::fs::write(dev.join("w1_slave"), payload).unwrap();
    }

    fn hub_with(dir: &std::path::Path, config: &SystemConfig) -> SensorHub {
        SensorHub::new(
            Ds18b20Bus::new(dir),
            FlowMeter::new(config.flow_pulses_per_litre),
            config,
        )
    }

    #[test]
    fn calibration_then_fahrenheit_conversion() {
        // 20.000 °C with a +1.00 offset → 21 °C → 69.8 °F.
        let dir = tempfile::tempdir().unwrap();
        let config = SystemConfig::default();
        write_probe(dir.path(), "031294970b3f", GOOD);

        let frame = hub_with(dir.path(), &config).read_frame(Instant::now());
        assert_eq!(frame.temperatures["air_cool"], Some(69.8));
    }

    #[test]
    fn failed_probe_is_none_healthy_probes_still_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = SystemConfig::default();
        write_probe(dir.path(), "3c52f648a463", GOOD); // water_reservoir, zero offset
        write_probe(dir.path(), "158200872bfa", "aa : crc=aa NO\naa t=20000\n");

        let frame = hub_with(dir.path(), &config).read_frame(Instant::now());
        assert_eq!(frame.temperatures["water_reservoir"], Some(68.0));
        assert_eq!(frame.temperatures["water_cold"], None, "CRC failure → unavailable");
        assert_eq!(frame.temperatures["water_hot"], None, "absent probe → unavailable");
        assert_eq!(frame.temperatures.len(), 6, "every mapped probe appears in the frame");
    }

    #[test]
    fn delta_requires_both_inputs() {
        let config = SystemConfig::default();
        let temps: BTreeMap<String, Option<f64>> = [
            ("water_hot".to_string(), Some(140.0)),
            ("water_cold".to_string(), Some(102.5)),
            ("water_mix".to_string(), None),
            ("air_heated".to_string(), Some(90.0)),
            ("air_cool".to_string(), Some(70.0)),
        ]
        .into_iter()
        .collect();

        let deltas = compute_deltas(&temps, &config.deltas);
        assert_eq!(deltas["delta_water_heater"], 37.5);
        assert_eq!(deltas["delta_air"], 20.0);
        assert!(
            !deltas.contains_key("delta_water_radiator"),
            "delta with an unavailable input must be absent"
        );
    }

    #[test]
    fn readings_round_to_tenths() {
        // 22.875 °C → 73.175 °F → 73.2 after rounding.
        let dir = tempfile::tempdir().unwrap();
        let config = SystemConfig::default();
        write_probe(dir.path(), "3c52f648a463", "aa : crc=aa YES\naa t=22875\n");

        let frame = hub_with(dir.path(), &config).read_frame(Instant::now());
        assert_eq!(frame.temperatures["water_reservoir"], Some(73.2));
    }
}
