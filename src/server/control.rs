//! The control loop — sole owner of hardware and authoritative state.
//!
//! Two independent producers feed one consumer: client sessions send
//! commands, the telemetry interval fires ticks. Because a single task owns
//! both the [`AppService`] and the hardware adapter, every mutation is
//! serialised without a state lock and no hardware I/O ever happens under
//! one. Acknowledgements broadcast immediately on mutation; telemetry
//! broadcasts on its own slower cadence; the two streams only share the
//! fan-out path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::app::commands::Command;
use crate::app::events::ErrorReply;
use crate::app::ports::{ActuatorPort, SensorPort};
use crate::app::service::AppService;
use crate::history::TelemetryHistory;
use crate::state::ControllerState;

use super::connections::{ClientId, ConnectionManager};

/// How often the actuator maintenance hook runs (fan kick-start settle).
const SERVICE_INTERVAL: Duration = Duration::from_millis(250);

/// Requests into the control loop.
#[derive(Debug)]
pub enum ControlMsg {
    /// A validated client command. Errors go back to `client` alone;
    /// acknowledgements fan out to everyone.
    Command { client: ClientId, cmd: Command },
    /// A client connected and needs the current snapshot.
    Hello { client: ClientId },
    /// Drive actuators to the safe state and stop. `done` fires once the
    /// safe state has been written.
    Shutdown { done: oneshot::Sender<()> },
}

/// Run the control loop until shutdown.
///
/// `state_tx` publishes every state change for observers (the status
/// endpoint); `history` receives telemetry ticks best-effort.
pub async fn run(
    mut app: AppService,
    mut hw: impl SensorPort + ActuatorPort,
    mut rx: mpsc::Receiver<ControlMsg>,
    conn: Arc<ConnectionManager>,
    state_tx: watch::Sender<ControllerState>,
    telemetry_interval: Duration,
    mut history: Option<TelemetryHistory>,
) {
    if let Err(e) = app.apply_initial_state(&mut hw) {
        // Not fatal: the store still holds safe defaults and the operator
        // sees the failure; individual commands will surface their own
        // actuator errors.
        warn!("initial actuator state write failed: {e}");
    }

    let mut telemetry = tokio::time::interval(telemetry_interval);
    telemetry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut maintenance = tokio::time::interval(SERVICE_INTERVAL);
    maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "control loop running (telemetry every {:?})",
        telemetry_interval
    );

    loop {
        tokio::select! {
            // Commands win over periodic work when both are ready.
            biased;

            msg = rx.recv() => match msg {
                Some(ControlMsg::Command { client, cmd }) => {
                    match app.handle_command(cmd, &mut hw, Instant::now()) {
                        Ok(ack) => {
                            let _ = state_tx.send(app.state());
                            // Unconditional fan-out, originator included:
                            // every client sees server truth.
                            conn.broadcast(&ack.to_wire());
                        }
                        Err(err) => {
                            warn!("command from {client} rejected: {err}");
                            // Originator only, never broadcast. A client
                            // that vanished meanwhile needs no reply.
                            let _ = conn.send_to(client, ErrorReply::from_error(&err).to_wire());
                        }
                    }
                }
                Some(ControlMsg::Hello { client }) => {
                    // New client: last authoritative snapshot, ahead of its
                    // first periodic tick.
                    if !conn.send_to(client, app.snapshot_update().to_wire()) {
                        warn!("initial snapshot to {client} not delivered");
                    }
                }
                Some(ControlMsg::Shutdown { done }) => {
                    app.safe_shutdown(&mut hw);
                    let _ = state_tx.send(app.state());
                    let _ = done.send(());
                    break;
                }
                None => {
                    // Every handle dropped — treat as shutdown.
                    app.safe_shutdown(&mut hw);
                    break;
                }
            },

            _ = telemetry.tick() => {
                let update = app.tick_telemetry(&mut hw, Instant::now());
                let _ = state_tx.send(app.state());
                if let Some(h) = history.as_mut() {
                    h.append(&update);
                }
                conn.broadcast(&update.to_wire());
            }

            _ = maintenance.tick() => {
                hw.service(Instant::now());
            }
        }
    }

    info!("control loop stopped");
}
