use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_SNAPSHOT_KEY: &str = "migratedData";
pub const DEFAULT_HISTORY_KEY: &str = "editedHistory";
pub const DEFAULT_RECORDS_ROOT: &str = "records";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cache key of the record snapshot.
    pub snapshot_key: String,
    /// Cache key of the pending edit history.
    pub history_key: String,
    /// Document-store collection that holds the records.
    pub records_root: String,
    /// Record members that appear in an edit but not in the snapshot as
    /// `added` history entries. Off by default: new members are skipped.
    pub track_added_members: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            records_root: DEFAULT_RECORDS_ROOT.to_string(),
            track_added_members: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `FAMREG_*` environment variables. Missing or
    /// unparsable variables keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshot_key: try_load("FAMREG_SNAPSHOT_KEY", defaults.snapshot_key),
            history_key: try_load("FAMREG_HISTORY_KEY", defaults.history_key),
            records_root: try_load("FAMREG_RECORDS_ROOT", defaults.records_root),
            track_added_members: try_load(
                "FAMREG_TRACK_ADDED_MEMBERS",
                defaults.track_added_members,
            ),
        }
    }

    pub fn with_snapshot_key(mut self, key: impl Into<String>) -> Self {
        self.snapshot_key = key.into();
        self
    }

    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.history_key = key.into();
        self
    }

    pub fn with_records_root(mut self, root: impl Into<String>) -> Self {
        self.records_root = root.into();
        self
    }

    pub fn with_track_added_members(mut self, track: bool) -> Self {
        self.track_added_members = track;
        self
    }
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
