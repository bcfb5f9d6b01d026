//! Authoritative controller state.
//!
//! [`StateStore`] owns the single mutable record of hardware-facing state.
//! It is held exclusively by the control-loop task, which serialises every
//! mutation — no lock, no observable partial update. The store never touches
//! hardware: the command processor writes the actuator first and commits
//! here only on success, so the store always reflects best-known real
//! hardware state.

use crate::app::events::{SensorFrame, StateUpdate};
use crate::error::StateRejection;
use crate::mode::FlowMode;

/// The two solenoid-valve flow paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valve {
    MainLoop,
    Diversion,
}

/// A point-in-time copy of controller state.
///
/// Invariant: `mode` is always exactly `FlowMode::derive(main_loop_open,
/// diversion_open)` — it is recomputed on every valve mutation and never set
/// independently.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub main_loop_open: bool,
    pub diversion_open: bool,
    /// Commanded fan speed. The BTS7960 driver is never run at 100 %.
    pub fan_speed_percent: u8,
    pub mode: FlowMode,
    /// Sensor half of the most recent telemetry tick. Reused by
    /// acknowledgements so a command never waits on a hardware read.
    pub last_telemetry: SensorFrame,
}

impl ControllerState {
    /// Compose the wire message for this state.
    pub fn to_update(&self) -> StateUpdate {
        StateUpdate {
            temperatures: self.last_telemetry.temperatures.clone(),
            deltas: self.last_telemetry.deltas.clone(),
            flow_rate: self.last_telemetry.flow_rate,
            fan_speed: self.fan_speed_percent,
            main_loop_state: self.main_loop_open,
            diversion_state: self.diversion_open,
            mode: self.mode,
        }
    }
}

/// Owner of the authoritative [`ControllerState`].
#[derive(Debug)]
pub struct StateStore {
    state: ControllerState,
}

impl StateStore {
    /// Safe startup defaults: both paths open (`MIX`), fan stopped.
    pub fn new() -> Self {
        Self {
            state: ControllerState {
                main_loop_open: true,
                diversion_open: true,
                fan_speed_percent: 0,
                mode: FlowMode::derive(true, true),
                last_telemetry: SensorFrame::default(),
            },
        }
    }

    /// Snapshot copy — never a live reference.
    pub fn get(&self) -> ControllerState {
        self.state.clone()
    }

    /// Pre-flight check for a valve mutation, used before the actuator is
    /// touched. Rejects the one combination that would close both paths.
    pub fn check_valve_change(&self, which: Valve, open: bool) -> Result<(), StateRejection> {
        let (main, diversion) = match which {
            Valve::MainLoop => (open, self.state.diversion_open),
            Valve::Diversion => (self.state.main_loop_open, open),
        };
        if !main && !diversion {
            return Err(StateRejection::BothPathsClosed);
        }
        Ok(())
    }

    /// Apply a valve mutation and re-derive `mode`. Returns the new state
    /// snapshot, or the rejection with prior state untouched.
    pub fn apply_valve_change(
        &mut self,
        which: Valve,
        open: bool,
    ) -> Result<ControllerState, StateRejection> {
        self.check_valve_change(which, open)?;
        match which {
            Valve::MainLoop => self.state.main_loop_open = open,
            Valve::Diversion => self.state.diversion_open = open,
        }
        self.state.mode = FlowMode::derive(self.state.main_loop_open, self.state.diversion_open);
        Ok(self.get())
    }

    /// Apply a fan mutation. The caller clamps to the command range; the
    /// store enforces the storage invariant regardless.
    pub fn apply_fan_change(&mut self, percent: u8) -> ControllerState {
        self.state.fan_speed_percent = percent.min(99);
        self.get()
    }

    /// Record the sensor half of a fresh telemetry tick.
    pub fn record_telemetry(&mut self, frame: SensorFrame) -> ControllerState {
        self.state.last_telemetry = frame;
        self.get()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_defaults_are_safe() {
        let store = StateStore::new();
        let s = store.get();
        assert!(s.main_loop_open && s.diversion_open);
        assert_eq!(s.mode, FlowMode::Mix);
        assert_eq!(s.fan_speed_percent, 0);
    }

    #[test]
    fn closing_last_open_path_is_rejected_and_state_unchanged() {
        let mut store = StateStore::new();
        store.apply_valve_change(Valve::Diversion, false).unwrap();
        let before = store.get();

        let result = store.apply_valve_change(Valve::MainLoop, false);
        assert_eq!(result.unwrap_err(), StateRejection::BothPathsClosed);
        assert_eq!(store.get(), before, "rejection must leave prior state intact");
        assert!(store.get().main_loop_open);
    }

    #[test]
    fn mode_tracks_every_valve_mutation() {
        let mut store = StateStore::new();
        assert_eq!(store.get().mode, FlowMode::Mix);

        let s = store.apply_valve_change(Valve::Diversion, false).unwrap();
        assert_eq!(s.mode, FlowMode::Main);

        let s = store.apply_valve_change(Valve::Diversion, true).unwrap();
        assert_eq!(s.mode, FlowMode::Mix);

        let s = store.apply_valve_change(Valve::MainLoop, false).unwrap();
        assert_eq!(s.mode, FlowMode::Diversion);
    }

    #[test]
    fn valve_and_fan_commands_are_idempotent() {
        let mut store = StateStore::new();
        let once = store.apply_valve_change(Valve::Diversion, false).unwrap();
        let twice = store.apply_valve_change(Valve::Diversion, false).unwrap();
        assert_eq!(once, twice);

        let once = store.apply_fan_change(40);
        let twice = store.apply_fan_change(40);
        assert_eq!(once, twice);
    }

    #[test]
    fn fan_storage_never_exceeds_99() {
        let mut store = StateStore::new();
        assert_eq!(store.apply_fan_change(99).fan_speed_percent, 99);
        assert_eq!(store.apply_fan_change(255).fan_speed_percent, 99);
        assert_eq!(store.apply_fan_change(0).fan_speed_percent, 0);
    }

    #[test]
    fn get_returns_a_detached_snapshot() {
        let mut store = StateStore::new();
        let snap = store.get();
        store.apply_fan_change(40);
        assert_eq!(snap.fan_speed_percent, 0, "snapshot must not track later mutations");
    }
}
