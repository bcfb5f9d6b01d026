//! Flow mode derivation.
//!
//! The loop's mode is a label derived from the two valve booleans — it is
//! never stored or set independently, and it carries no control semantics
//! beyond the booleans it is computed from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four flow-path configurations of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowMode {
    /// Main path open, diversion closed.
    Main,
    /// Diversion open, main path closed.
    Diversion,
    /// Both paths open.
    Mix,
    /// Both paths closed. Unreachable while the safety invariant holds;
    /// kept as an inert, fully handled value rather than asserted against.
    None,
}

impl FlowMode {
    /// Derive the mode from the two valve states.
    ///
    /// Pure and total: every boolean pair maps to exactly one mode.
    pub const fn derive(main_open: bool, diversion_open: bool) -> Self {
        match (main_open, diversion_open) {
            (true, false) => Self::Main,
            (false, true) => Self::Diversion,
            (true, true) => Self::Mix,
            (false, false) => Self::None,
        }
    }

    /// Whether any flow path is open.
    pub const fn has_open_path(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for FlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "MAIN"),
            Self::Diversion => write!(f, "DIVERSION"),
            Self::Mix => write!(f, "MIX"),
            Self::None => write!(f, "NONE"),
        }
    }
}
