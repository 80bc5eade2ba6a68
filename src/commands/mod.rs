//! Command module for usage-watch
//!
//! Each CLI subcommand lives in its own module.

pub mod live;
pub mod snapshot;

pub use live::{run_watch, WatchOptions};
pub use snapshot::run_snapshot;
