//! Solenoid valve relay driver.
//!
//! Two normally-closed relays with 12 V on COM, one per flow path. The
//! wiring is active-LOW: driving the GPIO low closes the relay, energising
//! the solenoid and opening the valve; driving it high cuts power and the
//! valve falls closed.

use log::info;

use crate::drivers::gpio::GpioLine;
use crate::error::ActuatorError;
use crate::state::Valve;

pub struct ValveDriver {
    main: GpioLine,
    diversion: GpioLine,
}

impl ValveDriver {
    /// Wrap the two exported relay lines. The caller is responsible for
    /// driving the startup state through [`set`](Self::set).
    pub fn new(main: GpioLine, diversion: GpioLine) -> Self {
        Self { main, diversion }
    }

    /// Open or close one valve.
    pub fn set(&mut self, which: Valve, open: bool) -> Result<(), ActuatorError> {
        let line = match which {
            Valve::MainLoop => &self.main,
            Valve::Diversion => &self.diversion,
        };
        // Active-LOW: low = relay closed = solenoid energised = valve open.
        line.write(!open)
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        info!(
            "valve {:?}: GPIO {} driven {} (solenoid {})",
            which,
            line.pin(),
            if open { "LOW" } else { "HIGH" },
            if open { "open" } else { "closed" }
        );
        Ok(())
    }

    /// Drive both valves open — the safe flow configuration.
    pub fn safe_state(&mut self) -> Result<(), ActuatorError> {
        self.set(Valve::MainLoop, true)?;
        self.set(Valve::Diversion, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::gpio::GpioLine;
    use std::fs;
    use std::path::Path;

    fn line_in(root: &Path, pin: u32) -> GpioLine {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(root.join("export"), "").unwrap();
        fs::write(dir.join("direction"), "").unwrap();
        fs::write(dir.join("value"), "1").unwrap();
        GpioLine::output(root, pin, true).unwrap()
    }

    fn value(root: &Path, pin: u32) -> String {
        fs::read_to_string(root.join(format!("gpio{pin}/value"))).unwrap()
    }

    #[test]
    fn open_drives_low_close_drives_high() {
        let dir = tempfile::tempdir().unwrap();
        let mut valves = ValveDriver::new(line_in(dir.path(), 23), line_in(dir.path(), 24));

        valves.set(Valve::MainLoop, true).unwrap();
        assert_eq!(value(dir.path(), 23), "0", "open = active-LOW");

        valves.set(Valve::MainLoop, false).unwrap();
        assert_eq!(value(dir.path(), 23), "1");
    }

    #[test]
    fn safe_state_opens_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut valves = ValveDriver::new(line_in(dir.path(), 23), line_in(dir.path(), 24));

        valves.set(Valve::MainLoop, false).unwrap();
        valves.safe_state().unwrap();
        assert_eq!(value(dir.path(), 23), "0");
        assert_eq!(value(dir.path(), 24), "0");
    }

    #[test]
    fn valves_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let mut valves = ValveDriver::new(line_in(dir.path(), 23), line_in(dir.path(), 24));

        valves.set(Valve::Diversion, true).unwrap();
        assert_eq!(value(dir.path(), 24), "0");
        assert_eq!(value(dir.path(), 23), "1", "main relay untouched");
    }
}
