//! Network server: WebSocket sessions, client fan-out, and the control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Server stack                           │
//! │                                                            │
//! │  ┌──────────┐ commands ┌──────────────┐ events ┌─────────┐ │
//! │  │ ws       │─────────▶│ control loop │───────▶│ Connec- │ │
//! │  │ sessions │          │ (owns hw +   │        │ tionMgr │ │
//! │  └──────────┘          │  StateStore) │        └────┬────┘ │
//! │       ▲                └──────▲───────┘             │      │
//! │       │                       │ telemetry interval  │      │
//! │       └───────────────────────┴─────────────────────┘      │
//! │                  per-client bounded queues                 │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod connections;
pub mod control;
pub mod ws;

pub use connections::{ClientId, ConnectionManager};
pub use control::ControlMsg;
