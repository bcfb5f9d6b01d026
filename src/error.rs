//! Unified error types for the heatloop controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform. Domain variants are `Copy` so they
//! can be passed through the command path without allocation; only the wire
//! layer turns them into user-facing messages.

use std::fmt;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible domain operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned implausible data.
    Sensor(SensorError),
    /// An actuator write failed; hardware keeps its previous state.
    Actuator(ActuatorError),
    /// An inbound command failed validation before touching any state.
    Command(CommandError),
    /// A state mutation was rejected by the safety invariant.
    State(StateRejection),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::State(e) => write!(f, "state: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The 1-Wire device directory for a probe does not exist.
    ProbeMissing,
    /// The probe reported a failed CRC (`NO` in the w1_slave status line).
    CrcMismatch,
    /// The w1_slave payload did not match the expected two-line format.
    MalformedReading,
    /// Reading the device file failed at the I/O level.
    ReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeMissing => write!(f, "probe not present on bus"),
            Self::CrcMismatch => write!(f, "CRC check failed"),
            Self::MalformedReading => write!(f, "malformed w1_slave payload"),
            Self::ReadFailed => write!(f, "device read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// Relay GPIO write failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Command validation errors
// ---------------------------------------------------------------------------

/// Rejections raised while parsing or validating an inbound command,
/// before any state or hardware is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The payload was not a JSON object.
    NotAnObject,
    /// No recognised control field was present.
    UnknownControl,
    /// More than one control field in a single message.
    MultipleControls,
    /// A control field carried a value of the wrong JSON type.
    WrongType(&'static str),
    /// A numeric value was outside the accepted range (e.g. negative fan).
    OutOfRange(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "payload is not a JSON object"),
            Self::UnknownControl => write!(f, "no recognised control field"),
            Self::MultipleControls => write!(f, "a command must target exactly one control"),
            Self::WrongType(field) => write!(f, "wrong value type for '{field}'"),
            Self::OutOfRange(field) => write!(f, "value out of range for '{field}'"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// State rejections
// ---------------------------------------------------------------------------

/// Safety rejections from the state store. These are expected, recoverable
/// conditions — the requested mutation simply does not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRejection {
    /// The requested valve combination would close both flow paths.
    /// The loop must always have at least one open path.
    BothPathsClosed,
}

impl fmt::Display for StateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothPathsClosed => write!(f, "both flow paths would be closed"),
        }
    }
}

impl From<StateRejection> for Error {
    fn from(e: StateRejection) -> Self {
        Self::State(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
