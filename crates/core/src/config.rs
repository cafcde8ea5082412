//! Replication configuration via TOML
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```toml
//! # Thread name prefix for per-kind watch workers
//! thread_prefix = "configstore-watch"
//! # Upper bound on one blocking receive; shutdown is noticed within this
//! poll_interval_ms = 100
//! # Snapshot pauses longer than this are logged as warnings
//! snapshot_pause_warn_ms = 50
//! # Artificial propagation delay in the in-memory remote
//! commit_delay_ms = 0
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration shared by the replica workers, the snapshot coordinator
/// and the in-memory remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Prefix of watch worker thread names (`{prefix}-{kind}`)
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
    /// Upper bound on a single blocking receive, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Snapshot pause above which a warning is logged, in milliseconds
    #[serde(default = "default_snapshot_pause_warn_ms")]
    pub snapshot_pause_warn_ms: u64,
    /// Delay before the in-memory remote commits each queued write
    #[serde(default)]
    pub commit_delay_ms: u64,
}

fn default_thread_prefix() -> String {
    "configstore-watch".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_snapshot_pause_warn_ms() -> u64 {
    50
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            thread_prefix: default_thread_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            snapshot_pause_warn_ms: default_snapshot_pause_warn_ms(),
            commit_delay_ms: 0,
        }
    }
}

impl ReplicationConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the document does not parse or a
    /// value is out of range.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ReplicationConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.thread_prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "thread_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Configstore replication configuration
#
# Thread name prefix for per-kind watch workers
thread_prefix = "configstore-watch"

# Upper bound on one blocking receive; shutdown is noticed within this
poll_interval_ms = 100

# Snapshot pauses longer than this are logged as warnings
snapshot_pause_warn_ms = 50

# Artificial propagation delay in the in-memory remote
commit_delay_ms = 0
"#
    }

    /// `poll_interval_ms` as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `snapshot_pause_warn_ms` as a `Duration`
    pub fn snapshot_pause_warn(&self) -> Duration {
        Duration::from_millis(self.snapshot_pause_warn_ms)
    }

    /// `commit_delay_ms` as a `Duration`
    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }
}
