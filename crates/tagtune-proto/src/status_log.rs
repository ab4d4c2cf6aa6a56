//! Bounded, most-recent-first status history for humans.
//!
//! Core components only see the [`Logger`] trait. Lines are mirrored to
//! `tracing` so they also land in the daemon log file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::info;

/// Number of lines kept in the history.
pub const STATUS_LOG_CAPACITY: usize = 10;

pub trait Logger {
    fn log(&self, message: &str);
}

/// Cheaply cloneable handle; all clones share one history.
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot, newest first.
    pub fn entries(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn render(&self) -> String {
        self.entries().join("\n")
    }
}

impl Logger for StatusLog {
    fn log(&self, message: &str) {
        info!(target: "status", "{}", message);
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push_front(message.to_string());
        lines.truncate(STATUS_LOG_CAPACITY);
    }
}
