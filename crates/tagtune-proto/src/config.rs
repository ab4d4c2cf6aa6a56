use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub fade: FadeConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

/// Control socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Treat each line on stdin as a user interaction (retries deferred playback).
    #[serde(default = "default_stdin_interaction")]
    pub stdin_interaction: bool,
}

/// Camera capture and scan cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Period between scan ticks, independent of capture/decode latency.
    #[serde(default = "default_scan_interval_ms")]
    pub interval_ms: u64,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`, ...).
    #[serde(default = "default_input_format")]
    pub input_format: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Volume ramp used for every fade-in and fade-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FadeConfig {
    /// Volume change per tick, in (0, 1].
    #[serde(default = "default_fade_step")]
    pub step: f32,
    #[serde(default = "default_fade_step_ms")]
    pub step_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Text file with one `tag:locator` pair per line.
    /// Defaults to `~/.config/tagtune/tags.txt`.
    #[serde(default = "default_map_file")]
    pub map_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            stdin_interaction: default_stdin_interaction(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_scan_interval_ms(),
            input_format: default_input_format(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            step: default_fade_step(),
            step_ms: default_fade_step_ms(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            map_file: default_map_file(),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl FadeConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.step_ms.max(1))
    }

    /// Step clamped into (0, 1] so a fade always terminates.
    pub fn clamped_step(&self) -> f32 {
        if self.step.is_finite() && self.step > 0.0 {
            self.step.min(1.0)
        } else {
            default_fade_step()
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_stdin_interaction() -> bool {
    true
}

fn default_scan_interval_ms() -> u64 {
    500
}

#[cfg(target_os = "macos")]
fn default_input_format() -> String {
    "avfoundation".to_string()
}

#[cfg(windows)]
fn default_input_format() -> String {
    "dshow".to_string()
}

#[cfg(not(any(target_os = "macos", windows)))]
fn default_input_format() -> String {
    "v4l2".to_string()
}

#[cfg(target_os = "macos")]
fn default_device() -> String {
    "0".to_string()
}

#[cfg(windows)]
fn default_device() -> String {
    "video=Integrated Camera".to_string()
}

#[cfg(not(any(target_os = "macos", windows)))]
fn default_device() -> String {
    "/dev/video0".to_string()
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_fade_step() -> f32 {
    0.1
}

fn default_fade_step_ms() -> u64 {
    50
}

fn default_map_file() -> PathBuf {
    platform::config_dir().join("tags.txt")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            scan: ScanConfig::default(),
            fade: FadeConfig::default(),
            mapping: MappingConfig::default(),
        }
    }
}
