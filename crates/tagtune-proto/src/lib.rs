pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod state;
pub mod status_log;
pub mod tag_map;
