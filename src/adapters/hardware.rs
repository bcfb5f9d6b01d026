//! Hardware adapter — bridges the real rig to the domain port traits.
//!
//! Owns the [`SensorHub`] and both actuator drivers, exposing them through
//! [`SensorPort`] and [`ActuatorPort`]. Together with the driver modules it
//! is the only code in the daemon that touches sysfs.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use log::info;

use crate::app::events::SensorFrame;
use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::SystemConfig;
use crate::drivers::fan::FanDriver;
use crate::drivers::gpio::{GpioLine, PwmChannel, GPIO_CLASS, PWM_CLASS};
use crate::drivers::valves::ValveDriver;
use crate::error::ActuatorError;
use crate::sensors::ds18b20::Ds18b20Bus;
use crate::sensors::flow::{spawn_pulse_watcher, FlowMeter};
use crate::sensors::SensorHub;
use crate::state::Valve;

/// Concrete adapter combining all hardware behind the port traits.
pub struct HardwareAdapter {
    hub: SensorHub,
    fan: FanDriver,
    valves: ValveDriver,
}

impl HardwareAdapter {
    /// Bring up the whole rig: export GPIO/PWM lines, start the flow-pulse
    /// watcher, discover probes. Fails only on unrecoverable line setup —
    /// a missing temperature probe is a per-tick condition, not a startup
    /// error.
    pub fn new(config: &SystemConfig) -> anyhow::Result<Self> {
        let gpio_root = Path::new(GPIO_CLASS);
        let pwm_root = Path::new(PWM_CLASS);

        // Fan PWM: pwmchip0 channel 0 drives GPIO 18 on the Pi header.
        let pwm = PwmChannel::new(pwm_root, 0, 0, config.fan_pwm_freq_hz)
            .context("fan PWM channel setup failed")?;
        let fan = FanDriver::new(pwm);

        // Relay lines start HIGH (valves closed) at export; the control
        // loop drives the safe startup state immediately afterwards.
        let main = GpioLine::output(gpio_root, config.main_valve_gpio, true)
            .context("main valve GPIO setup failed")?;
        let diversion = GpioLine::output(gpio_root, config.diversion_valve_gpio, true)
            .context("diversion valve GPIO setup failed")?;
        let valves = ValveDriver::new(main, diversion);

        // Flow meter: falling-edge counter thread on the pulse line.
        let flow = FlowMeter::new(config.flow_pulses_per_litre);
        let pulse_line = GpioLine::input(gpio_root, config.flow_pulse_gpio, "falling")
            .context("flow pulse GPIO setup failed")?;
        spawn_pulse_watcher(pulse_line.value_path(), flow.counter())
            .context("flow pulse watcher failed to start")?;

        let hub = SensorHub::new(Ds18b20Bus::new(&config.w1_devices_path), flow, config);
        hub.discover();

        info!(
            "hardware up: fan PWM {} Hz, valves on GPIO {}/{}, flow on GPIO {}",
            config.fan_pwm_freq_hz,
            config.main_valve_gpio,
            config.diversion_valve_gpio,
            config.flow_pulse_gpio
        );

        Ok(Self { hub, fan, valves })
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn read_frame(&mut self, now: Instant) -> SensorFrame {
        self.hub.read_frame(now)
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn set_fan(&mut self, percent: u8, now: Instant) -> Result<(), ActuatorError> {
        self.fan.set_speed(percent, now)
    }

    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), ActuatorError> {
        self.valves.set(which, open)
    }

    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        self.fan.stop()?;
        self.valves.safe_state()
    }

    fn service(&mut self, now: Instant) {
        self.fan.service(now);
    }
}
