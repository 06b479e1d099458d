//! Core engine-level types
//!
//! Currently holds the configuration structures passed into the sync
//! entry points at construction time.

pub mod config;

pub use config::{ApplicationConfig, LoggingConfig, SyncConfig};
