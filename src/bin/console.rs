//! heatloop-console — terminal UI client.
//!
//! Connects to the daemon's `/ws` endpoint and mirrors the controller
//! panel: every state update prints one status line, and simple commands
//! (`fan 40`, `main off`, `div on`) drive the controls. Each control runs
//! its own optimistic [`Reconciler`]: input renders immediately, stale
//! echoes inside the window are suppressed, server truth wins after it.
//!
//! On transport loss every pending prediction resets and the client
//! reconnects as a brand-new session.

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use heatloop::app::events::{ServerMessage, StateUpdate};
use heatloop::reconcile::{Disposition, Reconciler};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "heatloop-console", version, about = "Terminal client for heatloopd")]
struct Args {
    /// WebSocket endpoint of the daemon.
    #[arg(long, default_value = "ws://127.0.0.1:8000/ws")]
    url: String,

    /// Optimistic window in milliseconds.
    #[arg(long, default_value_t = 500)]
    window_ms: u64,
}

// ───────────────────────────────────────────────────────────────
// Panel
// ───────────────────────────────────────────────────────────────

/// Which control the user touched last, for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKey {
    MainLoop,
    Diversion,
    Fan,
}

/// The rendered view plus one reconciler per control.
struct Panel {
    main: Reconciler<bool>,
    diversion: Reconciler<bool>,
    fan: Reconciler<u8>,
    last_command: Option<ControlKey>,

    // Rendered control values (None until first data arrives).
    view_main: Option<bool>,
    view_diversion: Option<bool>,
    view_fan: Option<u8>,
    // Sensor values render unconditionally; only controls reconcile.
    last_sensors: Option<StateUpdate>,
}

impl Panel {
    fn new(window: Duration) -> Self {
        Self {
            main: Reconciler::new(window),
            diversion: Reconciler::new(window),
            fan: Reconciler::new(window),
            last_command: None,
            view_main: None,
            view_diversion: None,
            view_fan: None,
            last_sensors: None,
        }
    }

    /// Fold a server update into the view.
    fn apply_update(&mut self, update: StateUpdate, now: Instant) {
        if let Disposition::Render(v) = self.main.server_update(update.main_loop_state, now) {
            self.view_main = Some(v);
        }
        if let Disposition::Render(v) = self.diversion.server_update(update.diversion_state, now) {
            self.view_diversion = Some(v);
        }
        if let Disposition::Render(v) = self.fan.server_update(update.fan_speed, now) {
            self.view_fan = Some(v);
        }
        self.last_sensors = Some(update);
        self.render();
    }

    /// Record a user action for error attribution and show it at once.
    fn apply_input(&mut self, key: ControlKey) {
        self.last_command = Some(key);
        self.render();
    }

    /// Revert the last command's control after an error reply.
    fn apply_error(&mut self, message: &str) {
        match self.last_command.take() {
            Some(ControlKey::MainLoop) => {
                if let Some(v) = self.main.command_failed() {
                    self.view_main = Some(v);
                }
            }
            Some(ControlKey::Diversion) => {
                if let Some(v) = self.diversion.command_failed() {
                    self.view_diversion = Some(v);
                }
            }
            Some(ControlKey::Fan) => {
                if let Some(v) = self.fan.command_failed() {
                    self.view_fan = Some(v);
                }
            }
            None => {}
        }
        println!("!! {message}");
        self.render();
    }

    /// Transport loss: abandon predictions, await fresh server truth.
    fn reset(&mut self) {
        self.main.reset();
        self.diversion.reset();
        self.fan.reset();
        self.last_command = None;
    }

    fn render(&self) {
        let onoff = |v: Option<bool>| match v {
            Some(true) => "OPEN",
            Some(false) => "CLOSED",
            None => "--",
        };
        let fan = self
            .view_fan
            .map_or_else(|| "--".to_string(), |v| format!("{v}%"));

        let sensors = self.last_sensors.as_ref().map_or_else(String::new, |u| {
            let temps: Vec<String> = u
                .temperatures
                .iter()
                .map(|(name, t)| match t {
                    Some(t) => format!("{name} {t:.1}"),
                    None => format!("{name} n/a"),
                })
                .collect();
            format!(
                " | mode {} | flow {:.2} L/min | {}",
                u.mode,
                u.flow_rate,
                temps.join("  ")
            )
        });

        println!(
            "fan {fan} | main {} | div {}{sensors}",
            onoff(self.view_main),
            onoff(self.view_diversion),
        );
    }
}

// ───────────────────────────────────────────────────────────────
// Input parsing
// ───────────────────────────────────────────────────────────────

enum Input {
    Command {
        key: ControlKey,
        wire: String,
        predict: Prediction,
    },
    Quit,
    Help,
    Unknown,
}

enum Prediction {
    Bool(bool),
    Fan(u8),
}

fn parse_input(line: &str) -> Input {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("fan"), Some(n)) => match n.parse::<u32>() {
            // Predict what the server will store: ≥100 caps at 99.
            Ok(raw) => Input::Command {
                key: ControlKey::Fan,
                wire: format!("{{\"fan_speed\": {raw}}}"),
                predict: Prediction::Fan(raw.min(99) as u8),
            },
            Err(_) => Input::Unknown,
        },
        (Some("main"), Some(state)) => bool_command(ControlKey::MainLoop, "main_loop", state),
        (Some("div" | "diversion"), Some(state)) => {
            bool_command(ControlKey::Diversion, "diversion", state)
        }
        (Some("quit" | "exit" | "q"), None) => Input::Quit,
        (Some("help"), None) => Input::Help,
        (None, None) => Input::Help,
        _ => Input::Unknown,
    }
}

fn bool_command(key: ControlKey, field: &str, state: &str) -> Input {
    let open = match state {
        "on" | "open" => true,
        "off" | "closed" => false,
        _ => return Input::Unknown,
    };
    Input::Command {
        key,
        wire: format!("{{\"{field}\": {open}}}"),
        predict: Prediction::Bool(open),
    }
}

fn print_help() {
    println!("commands:");
    println!("  fan <0-100>        set fan speed");
    println!("  main on|off        open or close the main loop path");
    println!("  div on|off         open or close the diversion path");
    println!("  quit               exit");
}

// ───────────────────────────────────────────────────────────────
// Session loop
// ───────────────────────────────────────────────────────────────

enum SessionEnd {
    Quit,
    Disconnected,
}

async fn run_session(
    ws: WsStream,
    lines: &mut Lines<BufReader<Stdin>>,
    panel: &mut Panel,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                    Some(ServerMessage::Update(update)) => {
                        panel.apply_update(update, Instant::now());
                    }
                    Some(ServerMessage::Error(reply)) => {
                        panel.apply_error(&format!(
                            "{:?}: {}",
                            reply.error.code, reply.error.message
                        ));
                    }
                    None => warn!("unparseable server frame: {text}"),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                Some(Ok(_)) => {} // ping/pong handled by the stack
                Some(Err(e)) => {
                    warn!("socket error: {e}");
                    return SessionEnd::Disconnected;
                }
            },

            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return SessionEnd::Quit };
                match parse_input(&line) {
                    Input::Command { key, wire, predict } => {
                        let now = Instant::now();
                        match predict {
                            Prediction::Bool(v) => {
                                let rendered = match key {
                                    ControlKey::MainLoop => panel.main.user_input(v, now),
                                    _ => panel.diversion.user_input(v, now),
                                };
                                match key {
                                    ControlKey::MainLoop => panel.view_main = Some(rendered),
                                    _ => panel.view_diversion = Some(rendered),
                                }
                            }
                            Prediction::Fan(v) => {
                                panel.view_fan = Some(panel.fan.user_input(v, now));
                            }
                        }
                        panel.apply_input(key);
                        if sink.send(Message::Text(wire)).await.is_err() {
                            return SessionEnd::Disconnected;
                        }
                    }
                    Input::Quit => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Quit;
                    }
                    Input::Help => print_help(),
                    Input::Unknown => {
                        println!("unrecognised command (try 'help')");
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let mut panel = Panel::new(Duration::from_millis(args.window_ms));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("heatloop-console → {}", args.url);
    print_help();

    loop {
        match connect_async(args.url.as_str()).await.context("connect failed") {
            Ok((ws, _)) => {
                println!("connected");
                match run_session(ws, &mut lines, &mut panel).await {
                    SessionEnd::Quit => break,
                    SessionEnd::Disconnected => {
                        // Fresh registration on reconnect; no session
                        // carry-over, no surviving predictions.
                        panel.reset();
                        println!("connection lost, retrying...");
                    }
                }
            }
            Err(e) => {
                warn!("{e:#}");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }

    Ok(())
}
