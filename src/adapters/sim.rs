//! Simulated hardware — deterministic stand-in for the real rig.
//!
//! Used by `heatloopd --simulate` on development machines and by the
//! integration tests. Temperatures follow a slow, repeatable drift around
//! plausible shop-heater values; actuator writes are recorded in-memory and
//! feed back into the generated readings (fan speed nudges the air delta,
//! valve state steers the flow rate).

use std::collections::BTreeMap;
use std::time::Instant;

use crate::app::events::SensorFrame;
use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::SystemConfig;
use crate::error::ActuatorError;
use crate::sensors::compute_deltas;
use crate::state::Valve;

/// In-memory hardware simulation.
pub struct SimulatedHardware {
    probe_names: Vec<String>,
    deltas: Vec<crate::config::DeltaSpec>,
    tick: u64,
    fan_percent: u8,
    main_open: bool,
    diversion_open: bool,
    /// Probes forced unavailable, for exercising the failure path.
    dead_probes: Vec<String>,
    /// When set, every actuator write fails.
    fail_actuators: bool,
}

impl SimulatedHardware {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            probe_names: config.probes.keys().cloned().collect(),
            deltas: config.deltas.clone(),
            tick: 0,
            fan_percent: 0,
            main_open: true,
            diversion_open: true,
            dead_probes: Vec::new(),
            fail_actuators: false,
        }
    }

    /// Mark a probe as unreadable from now on.
    pub fn kill_probe(&mut self, name: &str) {
        self.dead_probes.push(name.to_string());
    }

    /// Make every subsequent actuator write fail.
    pub fn fail_actuators(&mut self, fail: bool) {
        self.fail_actuators = fail;
    }

    /// Base temperature (°F) for a probe, varying slowly and repeatably.
    fn temperature_for(&self, name: &str) -> f64 {
        let base = match name {
            "water_hot" => 142.0,
            "water_mix" => 128.0,
            "water_cold" => 104.0,
            "water_reservoir" => 118.0,
            "air_heated" => 96.0 + f64::from(self.fan_percent) * 0.05,
            "air_cool" => 68.0,
            _ => 75.0,
        };
        let wobble = ((self.tick as f64) * 0.7).sin() * 0.4;
        ((base + wobble) * 10.0).round() / 10.0
    }
}

impl SensorPort for SimulatedHardware {
    fn read_frame(&mut self, _now: Instant) -> SensorFrame {
        self.tick += 1;

        let mut temperatures = BTreeMap::new();
        for name in &self.probe_names {
            let reading = if self.dead_probes.iter().any(|d| d == name) {
                None
            } else {
                Some(self.temperature_for(name))
            };
            temperatures.insert(name.clone(), reading);
        }

        // Flow follows the open paths: both open splits the loop and the
        // meter on the main branch reads lower.
        let flow_rate = match (self.main_open, self.diversion_open) {
            (true, false) => 6.5,
            (false, true) => 0.0,
            (true, true) => 4.2,
            (false, false) => 0.0,
        };

        let deltas = compute_deltas(&temperatures, &self.deltas);
        SensorFrame {
            temperatures,
            deltas,
            flow_rate,
        }
    }
}

impl ActuatorPort for SimulatedHardware {
    fn set_fan(&mut self, percent: u8, _now: Instant) -> Result<(), ActuatorError> {
        if self.fail_actuators {
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.fan_percent = percent;
        Ok(())
    }

    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), ActuatorError> {
        if self.fail_actuators {
            return Err(ActuatorError::GpioWriteFailed);
        }
        match which {
            Valve::MainLoop => self.main_open = open,
            Valve::Diversion => self.diversion_open = open,
        }
        Ok(())
    }

    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        if self.fail_actuators {
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.fan_percent = 0;
        self.main_open = true;
        self.diversion_open = true;
        Ok(())
    }
}
