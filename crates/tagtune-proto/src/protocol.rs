use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Replace the tag map with the pairs in `text`.
    UpdateMap { text: String },
    /// Re-read the configured map file.
    ReloadMap,
    /// User interaction: retry a playback start that was rejected.
    Interact,
    /// Feed an observation as if the scanner had produced it.
    Observe { tag: Option<String> },
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full state snapshot.
    Hello {
        protocol_version: u32,
        state: DaemonState,
    },
    State {
        data: DaemonState,
    },
    Log {
        message: String,
    },
}

/// Phase of the playback state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle, // nothing audible
    FadingOut,
    FadingIn,
    Playing, // steady state, full volume
}

impl PlaybackPhase {
    /// True while the current source can be heard.
    pub fn is_audible(self) -> bool {
        !matches!(self, PlaybackPhase::Idle)
    }
}

/// Full state of the daemon.  `rev` is a monotonically increasing counter
/// incremented every time the state is published.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonState {
    #[serde(default)]
    pub rev: u64,
    pub current_tag: Option<String>,
    pub phase: PlaybackPhase,
    pub volume: f32,
    /// A playback start was rejected and waits for a user interaction.
    #[serde(default)]
    pub awaiting_interaction: bool,
    pub map_entries: usize,
    /// Last scan failure, cleared once a scan succeeds again.
    #[serde(default)]
    pub scanner_error: Option<String>,
    /// Status history, newest first.
    #[serde(default)]
    pub log: Vec<String>,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
