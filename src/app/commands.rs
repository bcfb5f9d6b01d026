//! Inbound control commands.
//!
//! Wire form is a JSON object carrying exactly one recognised control field:
//! `{"fan_speed": 0..100}`, `{"main_loop": bool}` or `{"diversion": bool}`.
//! Validation happens here, before any state or hardware is touched —
//! malformed or out-of-range payloads never mutate anything.

use serde_json::Value;

use crate::error::CommandError;

/// A validated client command. Ephemeral: applied once, then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set fan speed. Carries the raw requested value; the command
    /// processor caps values ≥ 100 at 99 (actuator stability limit).
    SetFan(u32),
    /// Open or close the main loop path.
    SetMainLoop(bool),
    /// Open or close the diversion path.
    SetDiversion(bool),
}

/// The three recognised control fields.
const CONTROL_FIELDS: [&str; 3] = ["fan_speed", "main_loop", "diversion"];

impl Command {
    /// Parse and validate a client frame.
    ///
    /// Exactly one control per message: unknown keys alone, several control
    /// keys together, wrong value types, and negative fan values are all
    /// rejected. Negative values are an error, never silently clamped —
    /// only values at or above 100 are capped (later, to 99).
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_str(text).map_err(|_| CommandError::NotAnObject)?;
        let object = value.as_object().ok_or(CommandError::NotAnObject)?;

        let mut present = CONTROL_FIELDS
            .iter()
            .filter(|field| object.contains_key(**field));
        let field = *present.next().ok_or(CommandError::UnknownControl)?;
        if present.next().is_some() {
            return Err(CommandError::MultipleControls);
        }

        match field {
            "fan_speed" => {
                let raw = &object["fan_speed"];
                if raw.is_i64() && raw.as_i64().is_some_and(|v| v < 0) {
                    return Err(CommandError::OutOfRange("fan_speed"));
                }
                let speed = raw.as_u64().ok_or(CommandError::WrongType("fan_speed"))?;
                let speed = u32::try_from(speed).map_err(|_| CommandError::OutOfRange("fan_speed"))?;
                Ok(Self::SetFan(speed))
            }
            "main_loop" => object["main_loop"]
                .as_bool()
                .map(Self::SetMainLoop)
                .ok_or(CommandError::WrongType("main_loop")),
            "diversion" => object["diversion"]
                .as_bool()
                .map(Self::SetDiversion)
                .ok_or(CommandError::WrongType("diversion")),
            _ => unreachable!("field comes from CONTROL_FIELDS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_three_wire_shapes_parse() {
        assert_eq!(Command::parse(r#"{"fan_speed": 40}"#), Ok(Command::SetFan(40)));
        assert_eq!(
            Command::parse(r#"{"main_loop": false}"#),
            Ok(Command::SetMainLoop(false))
        );
        assert_eq!(
            Command::parse(r#"{"diversion": true}"#),
            Ok(Command::SetDiversion(true))
        );
    }

    #[test]
    fn oversized_fan_values_parse_for_later_capping() {
        // 150 is accepted here; the processor caps it at 99.
        assert_eq!(Command::parse(r#"{"fan_speed": 150}"#), Ok(Command::SetFan(150)));
    }

    #[test]
    fn negative_fan_is_rejected_not_clamped() {
        assert_eq!(
            Command::parse(r#"{"fan_speed": -5}"#),
            Err(CommandError::OutOfRange("fan_speed"))
        );
    }

    #[test]
    fn fractional_fan_is_rejected() {
        assert_eq!(
            Command::parse(r#"{"fan_speed": 40.5}"#),
            Err(CommandError::WrongType("fan_speed"))
        );
    }

    #[test]
    fn one_control_per_message() {
        assert_eq!(
            Command::parse(r#"{"fan_speed": 40, "main_loop": true}"#),
            Err(CommandError::MultipleControls)
        );
    }

    #[test]
    fn unknown_or_missing_controls_are_rejected() {
        assert_eq!(
            Command::parse(r#"{"defrost": true}"#),
            Err(CommandError::UnknownControl)
        );
        assert_eq!(Command::parse("{}"), Err(CommandError::UnknownControl));
        assert_eq!(Command::parse("[1,2]"), Err(CommandError::NotAnObject));
        assert_eq!(Command::parse("garbage"), Err(CommandError::NotAnObject));
    }

    #[test]
    fn mistyped_booleans_are_rejected() {
        assert_eq!(
            Command::parse(r#"{"main_loop": "on"}"#),
            Err(CommandError::WrongType("main_loop"))
        );
        assert_eq!(
            Command::parse(r#"{"diversion": 1}"#),
            Err(CommandError::WrongType("diversion"))
        );
    }
}
