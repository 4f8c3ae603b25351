//! # config
//!
//! why: tunables for a leader, loadable from json alongside the rest of the server config
//! relations: consumed by LogLeader in replog-participant
//! what: LogConfig

use serde::{Deserialize, Serialize};

/// leader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// participants (leader included) that must persist an entry before it commits
    pub write_concern: usize,
    /// committed entries between two compactions of the persisted log, 0 disables compaction
    pub compaction_step_size: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            write_concern: 1,
            compaction_step_size: 0,
        }
    }
}

impl LogConfig {
    pub fn with_write_concern(write_concern: usize) -> Self {
        Self {
            write_concern,
            ..Self::default()
        }
    }
}
