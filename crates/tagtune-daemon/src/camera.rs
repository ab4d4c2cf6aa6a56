//! Camera capture and QR decoding through external programs.
//!
//! Frames are grabbed one at a time with ffmpeg (8-bit gray, raw video on
//! stdout) and decoded by piping a PGM image into `zbarimg`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tagtune_proto::config::ScanConfig;
use tagtune_proto::error::ScanError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::scan::{CodeDecoder, FrameSource, PixelBuffer};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);
const DECODE_TIMEOUT: Duration = Duration::from_secs(5);

/// zbarimg exit status when the image contained no symbol.
const ZBAR_NO_SYMBOL: i32 = 4;

pub struct FfmpegCamera {
    binary: PathBuf,
    input_format: String,
    device: String,
    width: u32,
    height: u32,
}

impl FfmpegCamera {
    pub fn new(config: &ScanConfig) -> Self {
        let binary =
            tagtune_proto::platform::find_ffmpeg_binary().unwrap_or_else(|| PathBuf::from("ffmpeg"));
        Self {
            binary,
            input_format: config.input_format.clone(),
            device: config.device.clone(),
            width: config.width,
            height: config.height,
        }
    }

    fn args(&self) -> Vec<String> {
        let size = format!("{}x{}", self.width, self.height);
        let scale = format!("scale={}:{}", self.width, self.height);
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.input_format.clone());
        args.extend(["-video_size".to_string(), size]);
        args.extend(["-i".to_string(), self.device.clone()]);
        args.extend(
            [
                "-frames:v", "1", "-vf", scale.as_str(), "-pix_fmt", "gray", "-f", "rawvideo", "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

impl FrameSource for FfmpegCamera {
    async fn capture_frame(&self) -> Result<PixelBuffer, ScanError> {
        let child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScanError::CaptureUnavailable(format!("{}: {}", self.binary.display(), e))
            })?;

        let output = tokio::time::timeout(CAPTURE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ScanError::CaptureTimeout(CAPTURE_TIMEOUT.as_millis() as u64))?
            .map_err(|e| ScanError::Capture(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Capture(format!(
                "ffmpeg exited: {} {}",
                output.status,
                stderr.trim()
            )));
        }
        frame_from_raw(self.width, self.height, output.stdout)
    }
}

fn frame_from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<PixelBuffer, ScanError> {
    let expected = PixelBuffer::expected_len(width, height);
    if pixels.len() < expected {
        return Err(ScanError::Capture(format!(
            "short frame: {} of {} bytes",
            pixels.len(),
            expected
        )));
    }
    let mut pixels = pixels;
    pixels.truncate(expected);
    Ok(PixelBuffer {
        width,
        height,
        pixels,
    })
}

pub struct ZbarDecoder {
    binary: PathBuf,
}

impl ZbarDecoder {
    pub fn new() -> Self {
        let binary = tagtune_proto::platform::find_zbarimg_binary()
            .unwrap_or_else(|| PathBuf::from("zbarimg"));
        Self { binary }
    }
}

impl CodeDecoder for ZbarDecoder {
    async fn decode(&self, frame: &PixelBuffer) -> Result<Option<String>, ScanError> {
        let mut child = Command::new(&self.binary)
            .args(["--raw", "--quiet", "-Sdisable", "-Sqrcode.enable", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScanError::DecoderUnavailable(format!("{}: {}", self.binary.display(), e))
            })?;

        let image = encode_pgm(frame);
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&image)
                .await
                .map_err(|e| ScanError::Decoder(e.to_string()))?;
            // Dropping stdin signals EOF.
        }

        let output = tokio::time::timeout(DECODE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ScanError::Decoder("zbarimg timed out".into()))?
            .map_err(|e| ScanError::Decoder(e.to_string()))?;

        match output.status.code() {
            Some(0) => {
                let text = String::from_utf8_lossy(&output.stdout);
                let tag = first_symbol(&text);
                debug!("zbar: decoded {:?}", tag);
                Ok(tag)
            }
            Some(ZBAR_NO_SYMBOL) => Ok(None),
            _ => Err(ScanError::Decoder(format!("zbarimg exited: {}", output.status))),
        }
    }
}

/// Binary PGM (P5) with 8-bit samples.
fn encode_pgm(frame: &PixelBuffer) -> Vec<u8> {
    let header = format!("P5\n{} {}\n255\n", frame.width, frame.height);
    let mut out = Vec::with_capacity(header.len() + frame.pixels.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&frame.pixels);
    out
}

/// With several codes in view, the first one reported wins.
fn first_symbol(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
