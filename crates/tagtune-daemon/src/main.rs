mod camera;
mod controller;
mod core;
mod fade;
mod mpv;
mod scan;
mod sink;
mod socket;

use std::sync::Arc;

use tagtune_proto::config::Config;
use tagtune_proto::state::StateManager;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::camera::{FfmpegCamera, ZbarDecoder};
use crate::core::{DaemonCore, DaemonEvent};
use crate::mpv::{MpvDriver, MpvEvent, MpvSink};
use crate::scan::ScanLoop;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    Log(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // WARN and ERROR only
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine.
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup broadcast channel first so we can use it for logging
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = tagtune_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tagtune_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Event channel — all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(256);

    // Audio output
    let (mpv_event_tx, mpv_event_rx) = mpsc::channel::<MpvEvent>(64);
    let mut mpv_driver = MpvDriver::new();
    let mpv_handle = mpv_driver.spawn_and_connect(mpv_event_tx).await?;
    mpv_handle.ping().await?;
    tokio::spawn(forward_mpv_events(mpv_event_rx, event_tx.clone()));

    let state_manager = Arc::new(StateManager::new());
    let daemon_core = DaemonCore::new(
        MpvSink::new(mpv_handle),
        &config,
        state_manager.clone(),
        broadcast_tx.clone(),
    );

    // Control socket
    let listener = socket::bind(&config.daemon.bind_address, config.daemon.port).await?;
    let _socket_handle = socket::start_server(
        listener,
        state_manager,
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    // Scanner
    let mut scan_loop = ScanLoop::new();
    scan_loop.start(
        Arc::new(FfmpegCamera::new(&config.scan)),
        Arc::new(ZbarDecoder::new()),
        config.scan.interval(),
        event_tx.clone(),
    );

    if config.daemon.stdin_interaction {
        tokio::spawn(forward_stdin_lines(event_tx.clone()));
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("ctrl-c received");
        let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
    });
    drop(event_tx);

    info!("Daemon initialised, running event loop");
    let result = daemon_core.run(event_rx).await;

    scan_loop.stop();
    mpv_driver.kill().await;
    result
}

/// Translate player end-of-file notifications into core events.
async fn forward_mpv_events(
    mut mpv_rx: mpsc::Receiver<MpvEvent>,
    event_tx: mpsc::Sender<DaemonEvent>,
) {
    while let Some(evt) = mpv_rx.recv().await {
        if let Some(ended) = evt.source_ended() {
            let event = DaemonEvent::SourceEnded {
                source: ended.entry_id,
                error: ended.error,
            };
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    }
    warn!("mpv event stream ended");
}

/// Every line on stdin counts as one user interaction.
async fn forward_stdin_lines(event_tx: mpsc::Sender<DaemonEvent>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(_)) => {
                if event_tx.send(DaemonEvent::Interaction).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("stdin closed, interaction via socket only");
                break;
            }
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}
