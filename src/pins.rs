//! GPIO / peripheral assignments for the heatloop control board.
//!
//! Single source of truth — configuration defaults and drivers reference this
//! module rather than hard-coding pin numbers. All numbers are Broadcom (BCM)
//! GPIO numbers, not physical header positions.

// ---------------------------------------------------------------------------
// Fan driver (BTS7960 H-bridge, two 12 V fans in parallel)
// ---------------------------------------------------------------------------

/// RPWM speed-control line. R_EN/L_EN are tied HIGH and LPWM tied LOW on the
/// driver board, so this single line gives unidirectional speed control.
pub const FAN_RPWM_GPIO: u32 = 18;

/// PWM carrier frequency. 10 kHz keeps the fans free of audible whine.
pub const FAN_PWM_FREQ_HZ: u32 = 10_000;

// ---------------------------------------------------------------------------
// Solenoid valve relays (normally-closed contacts, 12 V on COM)
// ---------------------------------------------------------------------------

/// Main flow path relay. Active-LOW: driving the line low closes the relay,
/// energising the solenoid and opening the valve.
pub const MAIN_VALVE_GPIO: u32 = 23;

/// Diversion path relay. Same active-LOW wiring as the main relay.
pub const DIVERSION_VALVE_GPIO: u32 = 24;

// ---------------------------------------------------------------------------
// Flow meter (Digiten FL-408 hall-effect)
// ---------------------------------------------------------------------------

/// Pulse input. Falling edge with internal pull-up works best at 3.3 V.
pub const FLOW_PULSE_GPIO: u32 = 27;

/// Datasheet calibration: 450 pulses per litre
/// (frequency in Hz = 7.5 × flow in L/min).
pub const FLOW_PULSES_PER_LITRE: f64 = 450.0;

// ---------------------------------------------------------------------------
// 1-Wire temperature bus (DS18B20)
// ---------------------------------------------------------------------------

/// Kernel w1 device directory scanned for `28-*` probe entries.
pub const W1_DEVICES_PATH: &str = "/sys/bus/w1/devices";
