//! Error types shared by the scanner and the playback path.
//!
//! None of these are fatal to the daemon: scan errors are logged and the
//! loop keeps ticking, playback errors park the controller until the next
//! user interaction.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// The capture program could not be started at all.
    #[error("camera unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("frame capture timed out after {0} ms")]
    CaptureTimeout(u64),

    /// The decoder program could not be started at all.
    #[error("decoder unavailable: {0}")]
    DecoderUnavailable(String),

    #[error("decode failed: {0}")]
    Decoder(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("no source loaded")]
    NoSource,

    /// The output refused to start (bad locator, device busy, ...).
    #[error("playback rejected: {0}")]
    Rejected(String),

    /// The player process or its IPC channel is gone.
    #[error("player unavailable: {0}")]
    PlayerGone(String),
}
