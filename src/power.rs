//! Power state and polling cadence
//!
//! The only consumer of power state is [`effective_interval`]: on battery with
//! `reduce_on_battery` set, polling slows to at least the configured floor.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::PollingConfig;

/// Bounds applied to the configured refresh interval
pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 120;

pub trait PowerSource: Send + Sync {
    fn is_on_battery(&self) -> bool;
}

/// Fixed answer, for overrides and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPower(pub bool);

impl PowerSource for FixedPower {
    fn is_on_battery(&self) -> bool {
        self.0
    }
}

/// Reads the Linux power-supply class tree
#[derive(Debug, Clone)]
pub struct SysfsPower {
    root: PathBuf,
}

impl Default for SysfsPower {
    fn default() -> Self {
        Self::new("/sys/class/power_supply")
    }
}

impl SysfsPower {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

impl PowerSource for SysfsPower {
    fn is_on_battery(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return false;
        };

        let mut discharging = false;
        let mut mains_online = false;

        for entry in entries.flatten() {
            let dir = entry.path();
            match read_trimmed(&dir.join("type")).as_deref() {
                Some("Mains") => {
                    if read_trimmed(&dir.join("online")).as_deref() == Some("1") {
                        mains_online = true;
                    }
                }
                Some("Battery") => {
                    if let Some(status) = read_trimmed(&dir.join("status")) {
                        if status.eq_ignore_ascii_case("discharging") {
                            discharging = true;
                        }
                    }
                }
                _ => {}
            }
        }

        let on_battery = discharging && !mains_online;
        debug!(discharging, mains_online, on_battery, "Power state probed");
        on_battery
    }
}

/// Interval until the next poll, given the current power state
pub fn effective_interval(polling: &PollingConfig, on_battery: bool) -> Duration {
    let base = polling
        .interval_secs
        .clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);

    let secs = if on_battery && polling.reduce_on_battery {
        base.max(polling.battery_floor_secs)
    } else {
        base
    };

    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn supply(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), format!("{content}\n")).unwrap();
        }
    }

    #[test]
    fn test_discharging_battery_without_mains() {
        let tmp = TempDir::new().unwrap();
        supply(tmp.path(), "BAT0", &[("type", "Battery"), ("status", "Discharging")]);
        supply(tmp.path(), "AC", &[("type", "Mains"), ("online", "0")]);

        assert!(SysfsPower::new(tmp.path()).is_on_battery());
    }

    #[test]
    fn test_mains_online_wins() {
        let tmp = TempDir::new().unwrap();
        supply(tmp.path(), "BAT0", &[("type", "Battery"), ("status", "Discharging")]);
        supply(tmp.path(), "AC", &[("type", "Mains"), ("online", "1")]);

        assert!(!SysfsPower::new(tmp.path()).is_on_battery());
    }

    #[test]
    fn test_missing_tree_is_not_battery() {
        assert!(!SysfsPower::new("/nonexistent/power_supply").is_on_battery());
    }

    #[test]
    fn test_effective_interval() {
        let mut polling = Config::default().polling;
        polling.interval_secs = 5;
        assert_eq!(effective_interval(&polling, false), Duration::from_secs(5));
        assert_eq!(effective_interval(&polling, true), Duration::from_secs(30));

        polling.interval_secs = 60;
        assert_eq!(effective_interval(&polling, true), Duration::from_secs(60));

        polling.reduce_on_battery = false;
        polling.interval_secs = 5;
        assert_eq!(effective_interval(&polling, true), Duration::from_secs(5));

        polling.interval_secs = 1;
        assert_eq!(effective_interval(&polling, false), Duration::from_secs(5));
        polling.interval_secs = 900;
        assert_eq!(effective_interval(&polling, false), Duration::from_secs(120));
    }
}
