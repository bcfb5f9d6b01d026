//! FL-408 hall-effect flow meter.
//!
//! The sensor emits one falling edge per ~2.22 mL (450 pulses per litre;
//! frequency in Hz = 7.5 × flow in L/min). A watcher thread blocks on the
//! sysfs edge interrupt and increments a shared atomic counter; the control
//! loop samples the counter on each telemetry tick to compute the rate over
//! the elapsed window. `AtomicU64` keeps the counter lock-free between the
//! watcher thread and the sampler.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

/// Flow meter sampler. Owns the rate window; the pulse source (GPIO edge
/// watcher, or a test driving the counter directly) lives elsewhere.
pub struct FlowMeter {
    pulses: Arc<AtomicU64>,
    pulses_per_litre: f64,
    last_sample: Option<(Instant, u64)>,
}

impl FlowMeter {
    pub fn new(pulses_per_litre: f64) -> Self {
        Self {
            pulses: Arc::new(AtomicU64::new(0)),
            pulses_per_litre,
            last_sample: None,
        }
    }

    /// Handle for the pulse producer to increment.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.pulses)
    }

    /// Current flow in L/min over the window since the previous sample.
    /// The first call establishes the baseline and reports 0.0.
    pub fn read_lpm(&mut self, now: Instant) -> f64 {
        let count = self.pulses.load(Ordering::Relaxed);
        let Some((prev_at, prev_count)) = self.last_sample.replace((now, count)) else {
            return 0.0;
        };

        let elapsed = now.duration_since(prev_at).as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        let litres = (count.wrapping_sub(prev_count)) as f64 / self.pulses_per_litre;
        (litres / elapsed) * 60.0
    }
}

/// Block on sysfs edge interrupts for `value_path` and count each one.
///
/// The GPIO must already be configured as an input with `edge = falling`.
/// Runs until the process exits; a poll error ends the thread with a
/// warning and the meter simply reads 0 from then on.
pub fn spawn_pulse_watcher(value_path: PathBuf, counter: Arc<AtomicU64>) -> std::io::Result<()> {
    let mut file = File::open(&value_path)?;

    std::thread::Builder::new()
        .name("flow-pulse".into())
        .spawn(move || {
            let fd = file.as_raw_fd();
            let mut buf = [0u8; 8];
            // Initial read clears the pending interrupt state.
            let _ = file.read(&mut buf);

            loop {
                let mut fds = libc::pollfd {
                    fd,
                    events: libc::POLLPRI | libc::POLLERR,
                    revents: 0,
                };
                // SAFETY: `fds` points at one valid pollfd for the whole call.
                let rc = unsafe { libc::poll(&mut fds, 1, -1) };
                if rc < 0 {
                    warn!("flow watcher: poll failed, pulse counting stopped");
                    return;
                }
                if fds.revents & libc::POLLPRI != 0 {
                    // Consume the edge: seek to the start and re-read the value.
                    if file.seek(SeekFrom::Start(0)).and_then(|_| file.read(&mut buf)).is_err() {
                        warn!("flow watcher: value re-read failed, pulse counting stopped");
                        return;
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                } else if fds.revents & libc::POLLERR != 0 {
                    debug!("flow watcher: POLLERR without POLLPRI, ignoring");
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_sample_is_baseline_zero() {
        let mut fm = FlowMeter::new(450.0);
        assert_eq!(fm.read_lpm(Instant::now()), 0.0);
    }

    #[test]
    fn rate_matches_the_datasheet_calibration() {
        let mut fm = FlowMeter::new(450.0);
        let counter = fm.counter();
        let base = Instant::now();
        fm.read_lpm(base);

        // 450 pulses in 60 s is exactly 1 L/min.
        counter.fetch_add(450, Ordering::Relaxed);
        let lpm = fm.read_lpm(base + Duration::from_secs(60));
        assert!((lpm - 1.0).abs() < 1e-9, "expected 1 L/min, got {lpm}");
    }

    #[test]
    fn idle_sensor_reads_zero() {
        let mut fm = FlowMeter::new(450.0);
        let base = Instant::now();
        fm.read_lpm(base);
        assert_eq!(fm.read_lpm(base + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn window_resets_each_sample() {
        let mut fm = FlowMeter::new(450.0);
        let counter = fm.counter();
        let base = Instant::now();
        fm.read_lpm(base);

        counter.fetch_add(225, Ordering::Relaxed);
        let first = fm.read_lpm(base + Duration::from_secs(30));
        assert!((first - 1.0).abs() < 1e-9);

        // No new pulses in the second window.
        let second = fm.read_lpm(base + Duration::from_secs(60));
        assert_eq!(second, 0.0);
    }
}
