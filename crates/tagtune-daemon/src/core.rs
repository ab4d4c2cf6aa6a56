/// DaemonCore — single-owner event loop for all mutable state.
///
/// Scan results, client commands, interaction signals and player events all
/// arrive as `DaemonEvent`s on one mpsc channel.  DaemonCore owns the
/// `PlaybackController` (and through it the audio sink) exclusively; the fade
/// interval is polled in the same `select!`, so no two inputs are ever
/// handled concurrently.
///
/// After each handled input the state snapshot is republished and a
/// `BroadcastMessage::StateUpdated` goes out to socket clients.
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tagtune_proto::config::Config;
use tagtune_proto::error::ScanError;
use tagtune_proto::protocol::{Command, DaemonState};
use tagtune_proto::state::StateManager;
use tagtune_proto::status_log::{Logger, StatusLog};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::PlaybackController;
use crate::sink::AudioSink;
use crate::BroadcastMessage;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from a socket client.
    ClientCommand(Command),
    /// One scan cycle finished; `None` when no code was in view.
    Observed(Option<String>),
    /// One scan cycle failed.
    ScanFailed(ScanError),
    /// User-interaction signal (stdin line).
    Interaction,
    /// The player stopped on its own.  `source` is the player's id for the
    /// ended source; `error` is set when it failed.
    SourceEnded {
        source: Option<u64>,
        error: Option<String>,
    },
    /// Shutdown requested.
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<S> {
    controller: PlaybackController<S, StatusLog>,
    status: StatusLog,
    map_file: PathBuf,
    fade_period: Duration,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Last distinct scan failure, cleared on the next successful scan.
    scanner_error: Option<String>,
}

impl<S: AudioSink> DaemonCore<S> {
    pub fn new(
        sink: S,
        config: &Config,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let status = StatusLog::new();
        let controller = PlaybackController::new(sink, status.clone(), config.fade.clamped_step());
        Self {
            controller,
            status,
            map_file: config.mapping.map_file.clone(),
            fade_period: config.fade.period(),
            state_manager,
            broadcast_tx,
            scanner_error: None,
        }
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");
        self.load_map_file().await;
        self.publish().await;

        let mut ticker = tokio::time::interval(self.fade_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut armed: Option<u64> = None;

        loop {
            // A new generation replaces whatever interval was running.
            let timer = self.controller.fade_timer();
            if timer != armed {
                if timer.is_some() {
                    ticker.reset();
                }
                armed = timer;
            }

            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("DaemonCore: event channel closed, shutting down");
                        break;
                    }
                    Some(DaemonEvent::Shutdown) => {
                        info!("DaemonCore: shutdown requested");
                        break;
                    }
                    Some(evt) => self.handle_event(evt).await,
                },
                _ = ticker.tick(), if armed.is_some() => {
                    self.controller.on_fade_tick().await;
                }
            }

            self.publish().await;
        }

        debug!("status history at exit:\n{}", self.status.render());
        Ok(())
    }

    async fn handle_event(&mut self, evt: DaemonEvent) {
        match evt {
            DaemonEvent::ClientCommand(cmd) => {
                info!("DaemonCore: command {:?}", cmd);
                self.handle_command(cmd).await;
            }
            DaemonEvent::Observed(tag) => {
                if self.scanner_error.take().is_some() {
                    self.status.log("Scanner recovered");
                }
                self.controller.on_observed_tag(tag).await;
            }
            DaemonEvent::ScanFailed(e) => self.note_scan_failure(e),
            DaemonEvent::Interaction => self.controller.on_interaction().await,
            DaemonEvent::SourceEnded { source, error } => {
                debug!("DaemonCore: source {:?} ended, error={:?}", source, error);
                self.controller.on_source_ended(source, error).await;
            }
            DaemonEvent::Shutdown => {}
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::UpdateMap { text } => self.controller.update_map(&text),
            Command::ReloadMap => self.load_map_file().await,
            Command::Interact => self.controller.on_interaction().await,
            Command::Observe { tag } => self.controller.on_observed_tag(tag).await,
            // The socket replies with a fresh snapshot after every command.
            Command::GetState => {}
        }
    }

    fn note_scan_failure(&mut self, e: ScanError) {
        let msg = e.to_string();
        if self.scanner_error.as_deref() == Some(msg.as_str()) {
            debug!("scan failed again: {}", msg);
            return;
        }
        warn!("scan failed: {}", msg);
        self.status.log(&format!("Scanner error: {}", msg));
        self.scanner_error = Some(msg);
    }

    /// Missing file leaves the current map alone.
    async fn load_map_file(&mut self) {
        match tokio::fs::read_to_string(&self.map_file).await {
            Ok(text) => self.controller.update_map(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("map file {:?} not found", self.map_file);
                self.status
                    .log(&format!("No music map at {}", self.map_file.display()));
            }
            Err(e) => {
                warn!("failed to read map file {:?}: {}", self.map_file, e);
                self.status.log(&format!("Music map unreadable: {}", e));
            }
        }
    }

    fn snapshot(&self) -> DaemonState {
        DaemonState {
            rev: 0,
            current_tag: self.controller.current_tag().map(str::to_string),
            phase: self.controller.phase(),
            volume: self.controller.volume(),
            awaiting_interaction: self.controller.awaiting_interaction(),
            map_entries: self.controller.map().len(),
            scanner_error: self.scanner_error.clone(),
            log: self.status.entries(),
        }
    }

    async fn publish(&self) {
        self.state_manager.publish(self.snapshot()).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }
}
