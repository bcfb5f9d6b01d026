//! heatloopd — the supervisory controller daemon.
//!
//! Wires the adapters to the domain core and runs until a shutdown signal:
//!
//! 1. load and validate configuration,
//! 2. bring up hardware (or the simulator),
//! 3. spawn the control loop (sole owner of hardware + state),
//! 4. serve `/ws` plus the status routes,
//! 5. on SIGINT/SIGTERM, drive actuators to the safe state, then exit.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use heatloop::adapters::hardware::HardwareAdapter;
use heatloop::adapters::sim::SimulatedHardware;
use heatloop::app::ports::{ActuatorPort, SensorPort};
use heatloop::app::service::AppService;
use heatloop::config::SystemConfig;
use heatloop::history::TelemetryHistory;
use heatloop::server::connections::ConnectionManager;
use heatloop::server::control::{self, ControlMsg};
use heatloop::server::ws::{router, ServerState};
use heatloop::state::StateStore;

/// Depth of the command channel into the control loop.
const CONTROL_QUEUE_DEPTH: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "heatloopd", version, about = "Shop-heater loop controller daemon")]
struct Args {
    /// Path to a TOML configuration file (defaults are built in).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,

    /// Run against simulated hardware instead of the real rig.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SystemConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SystemConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        simulate = args.simulate,
        "heatloopd starting"
    );

    // Hardware init failure is the one fatal startup condition.
    if args.simulate {
        let hw = SimulatedHardware::new(&config);
        info!("running with simulated hardware");
        serve(config, hw).await
    } else {
        let hw = HardwareAdapter::new(&config).context("hardware initialisation failed")?;
        serve(config, hw).await
    }
}

async fn serve(
    config: SystemConfig,
    hw: impl SensorPort + ActuatorPort + Send + 'static,
) -> anyhow::Result<()> {
    let conn = Arc::new(ConnectionManager::new());
    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
    let (state_tx, state_rx) = watch::channel(StateStore::new().get());
    let history = config.history_path.clone().map(TelemetryHistory::new);

    let control_task = tokio::spawn(control::run(
        AppService::new(),
        hw,
        control_rx,
        Arc::clone(&conn),
        state_tx,
        Duration::from_secs(u64::from(config.telemetry_interval_secs)),
        history,
    ));

    let state = ServerState {
        conn,
        control: control_tx.clone(),
        state_rx,
        queue_depth: config.client_queue_depth,
        started_at: Instant::now(),
    };

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);

    // Don't wait for live WebSocket sessions to drain on shutdown — a
    // signal must reach the safe-state sequence immediately, even with
    // clients connected and commands in flight.
    let server = axum::serve(listener, router(state));
    tokio::select! {
        result = server.into_future() => {
            result.context("server error")?;
        }
        () = shutdown_signal() => {}
    }

    // Commands already queued are processed first, then the shutdown
    // message drives the hardware to its safe state.
    info!("shutting down, driving actuators to safe state");
    let (done_tx, done_rx) = oneshot::channel();
    let requested = control_tx
        .send(ControlMsg::Shutdown { done: done_tx })
        .await
        .is_ok();
    if requested && done_rx.await.is_err() {
        error!("control loop ended before confirming safe state");
    }
    control_task.await.ok();

    info!("heatloopd stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
