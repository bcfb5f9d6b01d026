//! Application service — command processing and snapshot composition.
//!
//! [`AppService`] owns the [`StateStore`] and applies every mutation in
//! order: validate, write the actuator, commit to the store, acknowledge
//! with the *authoritative* new state. Hardware I/O flows through the port
//! traits injected at call sites, making the whole service testable with
//! mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌────────────────────────┐ ──▶ StateUpdate (broadcast)
//!                 │       AppService       │
//! ActuatorPort ◀──│  StateStore · FlowMode │ ──▶ Error (originator only)
//!                 └────────────────────────┘
//! ```

use std::time::Instant;

use log::{info, warn};

use super::commands::Command;
use super::events::StateUpdate;
use super::ports::{ActuatorPort, SensorPort};
use crate::error::{Error, Result};
use crate::state::{ControllerState, StateStore, Valve};

/// The application service orchestrates all domain logic.
pub struct AppService {
    store: StateStore,
}

impl AppService {
    /// Construct with safe startup defaults (both paths open, fan stopped).
    pub fn new() -> Self {
        Self {
            store: StateStore::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive the actuators to match the store's startup defaults.
    pub fn apply_initial_state(&self, hw: &mut impl ActuatorPort) -> Result<()> {
        hw.safe_state()?;
        info!("actuators initialised: fan 0 %, both paths open");
        Ok(())
    }

    /// Drive the documented safe state before process exit: fan to 0,
    /// both valves open. Runs even when triggered mid-command by a signal;
    /// failures are logged, never propagated — shutdown always completes.
    pub fn safe_shutdown(&mut self, hw: &mut impl ActuatorPort) {
        match hw.safe_state() {
            Ok(()) => info!("shutdown: actuators driven to safe state"),
            Err(e) => warn!("shutdown: safe-state write failed ({e}), continuing"),
        }
        self.store.apply_fan_change(0);
        let _ = self.store.apply_valve_change(Valve::MainLoop, true);
        let _ = self.store.apply_valve_change(Valve::Diversion, true);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process one validated client command.
    ///
    /// `Ok` carries the acknowledgement: the authoritative post-mutation
    /// state (not the client's requested value), for unconditional fan-out
    /// to every client including the originator. `Err` goes back to the
    /// originator alone; nothing was mutated and nothing is broadcast.
    pub fn handle_command(
        &mut self,
        cmd: Command,
        hw: &mut impl ActuatorPort,
        now: Instant,
    ) -> Result<StateUpdate> {
        let state = match cmd {
            Command::SetFan(requested) => {
                // Values ≥ 100 cap at 99 — the BTS7960 rig is not run at
                // full duty. Negative values were already rejected upstream.
                let target = requested.min(99) as u8;
                hw.set_fan(target, now)?;
                let state = self.store.apply_fan_change(target);
                info!("fan speed set to {}%", state.fan_speed_percent);
                state
            }
            Command::SetMainLoop(open) => self.apply_valve(Valve::MainLoop, open, hw)?,
            Command::SetDiversion(open) => self.apply_valve(Valve::Diversion, open, hw)?,
        };
        Ok(state.to_update())
    }

    /// Safety check, then hardware, then commit. Order matters: a rejected
    /// combination never reaches the relays, and a failed relay write never
    /// reaches the store.
    fn apply_valve(
        &mut self,
        which: Valve,
        open: bool,
        hw: &mut impl ActuatorPort,
    ) -> Result<ControllerState> {
        self.store.check_valve_change(which, open)?;
        hw.set_valve(which, open)?;
        let state = self
            .store
            .apply_valve_change(which, open)
            .map_err(Error::State)?;
        info!(
            "valve {:?} {} → mode {}",
            which,
            if open { "open" } else { "closed" },
            state.mode
        );
        Ok(state)
    }

    // ── Telemetry ─────────────────────────────────────────────

    /// Run one telemetry tick: read a fresh sensor frame, cache it in the
    /// store, and compose the broadcast message.
    pub fn tick_telemetry(
        &mut self,
        sensors: &mut impl SensorPort,
        now: Instant,
    ) -> StateUpdate {
        let frame = sensors.read_frame(now);
        self.store.record_telemetry(frame).to_update()
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current state snapshot.
    pub fn state(&self) -> ControllerState {
        self.store.get()
    }

    /// Compose a state message from cached telemetry, without touching
    /// hardware. Used for the initial frame sent to a new client.
    pub fn snapshot_update(&self) -> StateUpdate {
        self.store.get().to_update()
    }
}

impl Default for AppService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::SensorFrame;
    use crate::error::{ActuatorError, CommandError, StateRejection};
    use crate::mode::FlowMode;
    use std::collections::BTreeMap;

    // ── Mock hardware ─────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum Act {
        Fan(u8),
        Valve(Valve, bool),
        SafeState,
    }

    #[derive(Default)]
    struct MockHw {
        calls: Vec<Act>,
        fail_fan: bool,
        fail_valves: bool,
    }

    impl ActuatorPort for MockHw {
        fn set_fan(&mut self, percent: u8, _now: Instant) -> std::result::Result<(), ActuatorError> {
            if self.fail_fan {
                return Err(ActuatorError::PwmWriteFailed);
            }
            self.calls.push(Act::Fan(percent));
            Ok(())
        }

        fn set_valve(&mut self, which: Valve, open: bool) -> std::result::Result<(), ActuatorError> {
            if self.fail_valves {
                return Err(ActuatorError::GpioWriteFailed);
            }
            self.calls.push(Act::Valve(which, open));
            Ok(())
        }

        fn safe_state(&mut self) -> std::result::Result<(), ActuatorError> {
            self.calls.push(Act::SafeState);
            Ok(())
        }
    }

    struct FixedSensors(SensorFrame);

    impl SensorPort for FixedSensors {
        fn read_frame(&mut self, _now: Instant) -> SensorFrame {
            self.0.clone()
        }
    }

    fn frame() -> SensorFrame {
        SensorFrame {
            temperatures: [("water_hot".to_string(), Some(140.0))].into_iter().collect(),
            deltas: BTreeMap::new(),
            flow_rate: 4.5,
        }
    }

    // ── Tests ─────────────────────────────────────────────────

    #[test]
    fn ack_carries_authoritative_state_not_the_request() {
        let mut app = AppService::new();
        let mut hw = MockHw::default();

        let ack = app
            .handle_command(Command::SetFan(150), &mut hw, Instant::now())
            .unwrap();
        assert_eq!(ack.fan_speed, 99, "ack must show the capped value");
        assert_eq!(hw.calls, vec![Act::Fan(99)], "hardware gets the capped value too");
    }

    #[test]
    fn valve_rejection_reaches_neither_hardware_nor_store() {
        let mut app = AppService::new();
        let mut hw = MockHw::default();

        app.handle_command(Command::SetDiversion(false), &mut hw, Instant::now())
            .unwrap();
        hw.calls.clear();

        let err = app
            .handle_command(Command::SetMainLoop(false), &mut hw, Instant::now())
            .unwrap_err();
        assert_eq!(err, Error::State(StateRejection::BothPathsClosed));
        assert!(hw.calls.is_empty(), "rejected command must not touch the relays");
        assert!(app.state().main_loop_open);
    }

    #[test]
    fn actuator_failure_leaves_store_on_real_hardware_state() {
        let mut app = AppService::new();
        let mut hw = MockHw {
            fail_fan: true,
            ..Default::default()
        };

        let err = app
            .handle_command(Command::SetFan(40), &mut hw, Instant::now())
            .unwrap_err();
        assert_eq!(err, Error::Actuator(ActuatorError::PwmWriteFailed));
        assert_eq!(
            app.state().fan_speed_percent,
            0,
            "store must keep reflecting the actual hardware"
        );
    }

    #[test]
    fn failed_valve_write_does_not_change_mode() {
        let mut app = AppService::new();
        let mut hw = MockHw {
            fail_valves: true,
            ..Default::default()
        };

        let err = app
            .handle_command(Command::SetDiversion(false), &mut hw, Instant::now())
            .unwrap_err();
        assert_eq!(err, Error::Actuator(ActuatorError::GpioWriteFailed));
        assert_eq!(app.state().mode, FlowMode::Mix);
    }

    #[test]
    fn telemetry_tick_caches_the_frame_for_later_acks() {
        let mut app = AppService::new();
        let mut hw = MockHw::default();
        let mut sensors = FixedSensors(frame());

        let tick = app.tick_telemetry(&mut sensors, Instant::now());
        assert_eq!(tick.flow_rate, 4.5);

        // A later ack reuses the cached sensor frame without a fresh read.
        let ack = app
            .handle_command(Command::SetFan(20), &mut hw, Instant::now())
            .unwrap();
        assert_eq!(ack.flow_rate, 4.5);
        assert_eq!(ack.temperatures["water_hot"], Some(140.0));
        assert_eq!(ack.fan_speed, 20);
    }

    #[test]
    fn command_validation_errors_map_to_invalid_command() {
        use crate::app::events::{ErrorCode, ErrorReply};
        let reply = ErrorReply::from_error(&Error::Command(CommandError::UnknownControl));
        assert_eq!(reply.error.code, ErrorCode::InvalidCommand);
        let reply = ErrorReply::from_error(&Error::State(StateRejection::BothPathsClosed));
        assert_eq!(reply.error.code, ErrorCode::UnsafeOperation);
    }

    #[test]
    fn safe_shutdown_always_resets_fan_and_paths() {
        let mut app = AppService::new();
        let mut hw = MockHw::default();
        app.handle_command(Command::SetFan(60), &mut hw, Instant::now())
            .unwrap();
        app.handle_command(Command::SetMainLoop(false), &mut hw, Instant::now())
            .unwrap();

        app.safe_shutdown(&mut hw);
        assert!(hw.calls.contains(&Act::SafeState));
        let s = app.state();
        assert_eq!(s.fan_speed_percent, 0);
        assert!(s.main_loop_open && s.diversion_open);
    }
}
