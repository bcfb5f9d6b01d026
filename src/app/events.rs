//! Outbound wire messages.
//!
//! Telemetry ticks and command acknowledgements share one shape — a client
//! cannot tell them apart structurally and must rely on its own
//! reconciliation, not on a message "type" field. Error replies are the one
//! exception: they carry only an `error` object and go to the requesting
//! client alone, never into the broadcast path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::mode::FlowMode;

// ───────────────────────────────────────────────────────────────
// Sensor frame
// ───────────────────────────────────────────────────────────────

/// The sensor-derived half of a state update: probe temperatures (°F,
/// `None` when a probe could not be read this tick), derived deltas
/// (present only when both inputs were readable), and flow rate (L/min).
///
/// Immutable once produced; a fresh frame is composed on every telemetry
/// tick and cached so acknowledgements can reuse it without touching
/// hardware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub temperatures: BTreeMap<String, Option<f64>>,
    pub deltas: BTreeMap<String, f64>,
    pub flow_rate: f64,
}

// ───────────────────────────────────────────────────────────────
// State update (telemetry tick / acknowledgement)
// ───────────────────────────────────────────────────────────────

/// The full server → client state message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub temperatures: BTreeMap<String, Option<f64>>,
    pub deltas: BTreeMap<String, f64>,
    pub flow_rate: f64,
    pub fan_speed: u8,
    pub main_loop_state: bool,
    pub diversion_state: bool,
    pub mode: FlowMode,
}

impl StateUpdate {
    /// Serialize for the wire. State updates are plain data; serialization
    /// cannot fail for this shape.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Unreachable for this type; keep the broadcast alive regardless.
            log::error!("state update serialization failed: {e}");
            String::from("{}")
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Error reply (originator only)
// ───────────────────────────────────────────────────────────────

/// Wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The command would violate the flow-path safety invariant.
    UnsafeOperation,
    /// The command failed validation (malformed or out of range).
    InvalidCommand,
    /// The hardware write failed; state reflects the real actuators.
    ActuatorFailure,
}

/// `{"error": {...}}` reply delivered to the requesting client only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReply {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    /// Map a domain error onto its wire code.
    pub fn from_error(err: &Error) -> Self {
        let code = match err {
            Error::State(_) => ErrorCode::UnsafeOperation,
            Error::Command(_) => ErrorCode::InvalidCommand,
            Error::Actuator(_) | Error::Sensor(_) => ErrorCode::ActuatorFailure,
        };
        Self::new(code, err.to_string())
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

// ───────────────────────────────────────────────────────────────
// Client-side message classification
// ───────────────────────────────────────────────────────────────

/// What a client received. Distinguished by which fields are present —
/// there is deliberately no type tag on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Update(StateUpdate),
    Error(ErrorReply),
}

impl ServerMessage {
    /// Parse an incoming frame. An `error` object wins; anything else must
    /// deserialize as a full state update.
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(reply) = serde_json::from_str::<ErrorReply>(text) {
            return Some(Self::Error(reply));
        }
        serde_json::from_str::<StateUpdate>(text)
            .ok()
            .map(Self::Update)
    }
}
