//! BTS7960 fan driver (two 12 V fans in parallel).
//!
//! R_EN/L_EN are tied HIGH and LPWM tied LOW on the driver board, so a
//! single RPWM line gives unidirectional speed control. The driver is never
//! run at 100 % duty — 99 is the ceiling.
//!
//! ## Kick-start
//!
//! From standstill the fans need a shove: any 0 → non-zero transition runs
//! the PWM at 99 % for one second before settling at the target. The settle
//! is deadline-based — [`service`](FanDriver::service) is called from the
//! control loop, so no command ever blocks on the kick.

use std::time::{Duration, Instant};

use log::debug;

use crate::drivers::gpio::PwmChannel;
use crate::error::ActuatorError;

/// Full-duty burst length for the kick-start.
const KICK_DURATION: Duration = Duration::from_secs(1);
/// Duty applied during the kick.
const KICK_DUTY: u8 = 99;

pub struct FanDriver {
    pwm: PwmChannel,
    /// Commanded target duty (0..=99).
    target: u8,
    /// Deadline after which the PWM settles from the kick to `target`.
    kick_until: Option<Instant>,
}

impl FanDriver {
    /// Wrap an exported, enabled PWM channel. Starts stopped.
    pub fn new(pwm: PwmChannel) -> Self {
        Self {
            pwm,
            target: 0,
            kick_until: None,
        }
    }

    /// Command a new speed (callers cap at 99).
    pub fn set_speed(&mut self, percent: u8, now: Instant) -> Result<(), ActuatorError> {
        let percent = percent.min(99);

        if percent == 0 {
            self.stop()?;
            return Ok(());
        }

        if self.target == 0 {
            // Standstill → spinning: full-duty burst first.
            self.write_duty(KICK_DUTY)?;
            self.kick_until = Some(now + KICK_DURATION);
            debug!("fan kick-start armed ({}% for {:?})", KICK_DUTY, KICK_DURATION);
        } else if self.kick_until.is_none() {
            self.write_duty(percent)?;
        }
        // While a kick is in flight, only the target changes; service()
        // applies it when the deadline passes.
        self.target = percent;
        Ok(())
    }

    /// Stop the fans immediately, cancelling any kick in flight.
    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        self.write_duty(0)?;
        self.target = 0;
        self.kick_until = None;
        Ok(())
    }

    /// Settle an elapsed kick-start to the commanded target. Called
    /// periodically from the control loop.
    pub fn service(&mut self, now: Instant) {
        if let Some(deadline) = self.kick_until {
            if now >= deadline {
                self.kick_until = None;
                if let Err(e) = self.write_duty(self.target) {
                    log::warn!("fan settle write failed: {e}");
                }
                debug!("fan kick-start settled at {}%", self.target);
            }
        }
    }

    /// Commanded target duty.
    pub fn target(&self) -> u8 {
        self.target
    }

    fn write_duty(&self, percent: u8) -> Result<(), ActuatorError> {
        self.pwm
            .set_duty_percent(percent)
            .map_err(|_| ActuatorError::PwmWriteFailed)
    }
}
