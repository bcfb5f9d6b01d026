//! Sysfs GPIO and PWM line helpers.
//!
//! Thin file-based access to `/sys/class/gpio` and `/sys/class/pwm`. Every
//! constructor takes an explicit class root so tests can point the drivers
//! at a temporary directory; the defaults in [`crate::adapters::hardware`]
//! use the real kernel paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

/// Default kernel class directory for GPIO.
pub const GPIO_CLASS: &str = "/sys/class/gpio";
/// Default kernel class directory for PWM.
pub const PWM_CLASS: &str = "/sys/class/pwm";

// ───────────────────────────────────────────────────────────────
// Digital output / input line
// ───────────────────────────────────────────────────────────────

/// One exported GPIO line.
pub struct GpioLine {
    dir: PathBuf,
    pin: u32,
}

impl GpioLine {
    /// Export `pin` as an output, initially driven to `initial_high`.
    pub fn output(root: &Path, pin: u32, initial_high: bool) -> io::Result<Self> {
        let line = Self::export(root, pin)?;
        // "high"/"low" sets direction and initial level in one write,
        // avoiding a glitch between export and first value write.
        fs::write(
            line.dir.join("direction"),
            if initial_high { "high" } else { "low" },
        )?;
        Ok(line)
    }

    /// Export `pin` as an input with the given edge trigger
    /// (`"rising"`, `"falling"` or `"both"`).
    pub fn input(root: &Path, pin: u32, edge: &str) -> io::Result<Self> {
        let line = Self::export(root, pin)?;
        fs::write(line.dir.join("direction"), "in")?;
        fs::write(line.dir.join("edge"), edge)?;
        Ok(line)
    }

    fn export(root: &Path, pin: u32) -> io::Result<Self> {
        let dir = root.join(format!("gpio{pin}"));
        if !dir.exists() {
            // EBUSY from a previous unclean shutdown leaves the line
            // exported; that is fine as long as the directory appears.
            if let Err(e) = fs::write(root.join("export"), pin.to_string()) {
                debug!("gpio{pin}: export write failed ({e}), checking for existing line");
            }
        }
        if !dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("gpio{pin} did not appear under {}", root.display()),
            ));
        }
        Ok(Self { dir, pin })
    }

    /// Drive the line high or low.
    pub fn write(&self, high: bool) -> io::Result<()> {
        fs::write(self.dir.join("value"), if high { "1" } else { "0" })
    }

    /// Current line level.
    pub fn read(&self) -> io::Result<bool> {
        let raw = fs::read_to_string(self.dir.join("value"))?;
        Ok(raw.trim() == "1")
    }

    /// Path of the `value` attribute (for edge polling).
    pub fn value_path(&self) -> PathBuf {
        self.dir.join("value")
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

// ───────────────────────────────────────────────────────────────
// PWM channel
// ───────────────────────────────────────────────────────────────

/// One exported PWM channel, enabled at a fixed carrier frequency.
pub struct PwmChannel {
    dir: PathBuf,
    period_ns: u64,
}

impl PwmChannel {
    /// Export channel `channel` of `pwmchip{chip}`, program the carrier
    /// period, start at 0 % duty and enable the output.
    pub fn new(root: &Path, chip: u32, channel: u32, freq_hz: u32) -> io::Result<Self> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        if !dir.exists() {
            if let Err(e) = fs::write(chip_dir.join("export"), channel.to_string()) {
                debug!("pwm{channel}: export write failed ({e}), checking for existing channel");
            }
        }
        if !dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pwm{channel} did not appear under {}", chip_dir.display()),
            ));
        }

        let period_ns = 1_000_000_000_u64 / u64::from(freq_hz.max(1));
        let pwm = Self { dir, period_ns };
        fs::write(pwm.dir.join("period"), period_ns.to_string())?;
        pwm.set_duty_percent(0)?;
        fs::write(pwm.dir.join("enable"), "1")?;
        Ok(pwm)
    }

    /// Program the duty cycle as a percentage of the carrier period.
    pub fn set_duty_percent(&self, percent: u8) -> io::Result<()> {
        let duty_ns = self.period_ns * u64::from(percent.min(100)) / 100;
        fs::write(self.dir.join("duty_cycle"), duty_ns.to_string())
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a fake sysfs tree the way the kernel would after an export.
    fn fake_gpio(root: &Path, pin: u32) {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(root.join("export"), "").unwrap();
        fs::write(dir.join("direction"), "").unwrap();
        fs::write(dir.join("value"), "0").unwrap();
        fs::write(dir.join("edge"), "").unwrap();
    }

    fn fake_pwm(root: &Path, chip: u32, channel: u32) {
        let dir = root
            .join(format!("pwmchip{chip}"))
            .join(format!("pwm{channel}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(root.join(format!("pwmchip{chip}")).join("export"), "").unwrap();
        for attr in ["period", "duty_cycle", "enable"] {
            fs::write(dir.join(attr), "").unwrap();
        }
    }

    #[test]
    fn output_line_writes_levels() {
        let root = tempfile::tempdir().unwrap();
        fake_gpio(root.path(), 23);

        let line = GpioLine::output(root.path(), 23, true).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("gpio23/direction")).unwrap(),
            "high"
        );

        line.write(false).unwrap();
        assert!(!line.read().unwrap());
        line.write(true).unwrap();
        assert!(line.read().unwrap());
    }

    #[test]
    fn missing_line_is_an_error_not_a_panic() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("export"), "").unwrap();
        assert!(GpioLine::output(root.path(), 99, false).is_err());
    }

    #[test]
    fn pwm_programs_period_and_duty() {
        let root = tempfile::tempdir().unwrap();
        fake_pwm(root.path(), 0, 0);

        let pwm = PwmChannel::new(root.path(), 0, 0, 10_000).unwrap();
        assert_eq!(pwm.period_ns(), 100_000);
        assert_eq!(
            fs::read_to_string(root.path().join("pwmchip0/pwm0/period")).unwrap(),
            "100000"
        );

        pwm.set_duty_percent(40).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("pwmchip0/pwm0/duty_cycle")).unwrap(),
            "40000"
        );
        assert_eq!(
            fs::read_to_string(root.path().join("pwmchip0/pwm0/enable")).unwrap(),
            "1"
        );
    }
}
