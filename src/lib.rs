//! Usage Watch Library
//!
//! Polls the Claude and Codex usage endpoints, tracks each quota window, and
//! raises a notification when usage crosses a configured threshold or a window
//! resets.
//!
//! ## Architecture Overview
//!
//! - [`models`] - Service and window identities, samples, and the upstream wire types
//! - [`client`] - HTTP clients behind an exclusive-access handle, plus retry with backoff
//! - [`credentials`] - Where session keys and tokens are read from
//! - [`tracker`] - Per-window threshold and reset detection
//! - [`notify`] - Rendering decisions and delivering them to a notifier
//! - [`power`] - Battery detection and the polling interval it implies
//! - [`live`] - The polling orchestrator and last-known-good summary
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//! - [`display`] - Terminal and JSON output
//! - [`commands`] - CLI subcommands
//!
//! ## Main Entry Point
//!
//! ```no_run
//! use usage_watch::config::Config;
//! use usage_watch::commands::{run_watch, WatchOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! run_watch(config, WatchOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Types
//!
//! - [`SessionIdentity`] - One tracked quota window
//! - [`tracker::SessionTracker`] - Decides what a new sample means for its window
//! - [`live::PollingOrchestrator`] - Drives fetch, observe and notify on a timer

pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod display;
pub mod error;
pub mod live;
pub mod logging;
pub mod models;
pub mod notify;
pub mod power;
pub mod timestamp_parser;
pub mod tracker;

pub use error::FetchError;
pub use models::*;
