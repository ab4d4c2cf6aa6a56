/// mpv IPC driver with separated reader/writer tasks, plus the `AudioSink`
/// built on top of it.
///
/// Architecture:
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event                     → event_tx channel
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tagtune_proto::error::PlaybackError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::sink::AudioSink;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// For `end-file` events that matter to playback: the file played to its
    /// end (`error: None`) or failed.  Replacements and explicit stops
    /// return `None`.
    pub fn source_ended(&self) -> Option<EndedSource> {
        if self.event_name()? != "end-file" {
            return None;
        }
        let error = match self.raw.get("reason")?.as_str()? {
            "eof" => None,
            "error" => {
                let detail = self
                    .raw
                    .get("file_error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error");
                Some(detail.to_string())
            }
            _ => return None,
        };
        Some(EndedSource {
            entry_id: self.raw.get("playlist_entry_id").and_then(|v| v.as_u64()),
            error,
        })
    }
}

/// A playlist entry that stopped on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EndedSource {
    /// mpv's `playlist_entry_id`, absent on players too old to report it.
    pub entry_id: Option<u64>,
    pub error: Option<String>,
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Load `url` paused, replacing the playlist.  Returns the new playlist
    /// entry id when mpv reports one.
    pub async fn load_paused(&self, url: &str) -> anyhow::Result<Option<u64>> {
        self.set_pause(true).await?;
        let reply = self.send(json!(["loadfile", url, "replace"])).await?;
        if let Some(id) = reply["data"]["playlist_entry_id"].as_u64() {
            return Ok(Some(id));
        }
        // Older mpv: the replaced playlist holds only the new entry.
        match self.send(json!(["get_property", "playlist/0/id"])).await {
            Ok(reply) => Ok(reply["data"].as_u64()),
            Err(e) => {
                debug!("mpv: no playlist entry id: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    /// Health-check: returns Ok(()) if mpv is responsive.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.send(json!(["get_property", "volume"])).await?;
        Ok(())
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: tagtune_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        info!("mpv: spawning new process");
        let mpv_binary = tagtune_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--pause")
            .arg("--volume=0")
            .arg(tagtune_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            match ClientOptions::new().open(&pipe_path) {
                Ok(client) => {
                    info!("mpv: connected to named pipe");
                    let (read_half, write_half) = tokio::io::split(client);
                    return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
                }
                Err(_) => continue,
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let _ = tx.send(reply_result(val));
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

fn reply_result(val: Value) -> anyhow::Result<Value> {
    if val["error"].as_str() == Some("success") {
        Ok(val)
    } else {
        let err = val["error"].as_str().unwrap_or("unknown error").to_string();
        Err(anyhow::anyhow!("mpv error: {}", err))
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: PendingMap,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("mpv writer: task exiting");
}

// ── audio sink ────────────────────────────────────────────────────────────────

/// `AudioSink` over an mpv IPC handle.  Volume and pause state are mirrored
/// locally so reads never hit the socket.
pub struct MpvSink {
    handle: MpvHandle,
    source: Option<String>,
    entry_id: Option<u64>,
    volume: f32,
    paused: bool,
}

impl MpvSink {
    pub fn new(handle: MpvHandle) -> Self {
        Self {
            handle,
            source: None,
            entry_id: None,
            volume: 0.0,
            paused: true,
        }
    }
}

fn player_error(e: anyhow::Error) -> PlaybackError {
    let msg = e.to_string();
    if msg.contains("gone") || msg.contains("closed") || msg.contains("dropped") {
        PlaybackError::PlayerGone(msg)
    } else {
        PlaybackError::Rejected(msg)
    }
}

impl AudioSink for MpvSink {
    async fn set_source(&mut self, locator: Option<&str>) -> Result<(), PlaybackError> {
        self.entry_id = match locator {
            Some(url) => self.handle.load_paused(url).await.map_err(player_error)?,
            None => {
                self.handle.stop().await.map_err(player_error)?;
                None
            }
        };
        self.source = locator.map(str::to_string);
        self.paused = true;
        Ok(())
    }

    async fn play(&mut self) -> Result<(), PlaybackError> {
        if self.source.is_none() {
            return Err(PlaybackError::NoSource);
        }
        self.handle.set_pause(false).await.map_err(player_error)?;
        self.paused = false;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        self.handle.set_pause(true).await.map_err(player_error)?;
        self.paused = true;
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), PlaybackError> {
        let volume = volume.clamp(0.0, 1.0);
        self.handle.set_volume(volume).await.map_err(player_error)?;
        self.volume = volume;
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn source_id(&self) -> Option<u64> {
        self.entry_id
    }
}
