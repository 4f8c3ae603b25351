//! # unconfigured
//!
//! why: a log that has no role yet still needs an owner for its core
//! relations: initial state of ReplicatedLog, replaced by a leader or follower
//! what: LogUnconfigured

use crate::error::LogError;
use crate::log_core::LogCore;
use crate::wait_for::{self, WaitForFuture};
use replog_core::{LogIndex, LogStatus};
use std::sync::{Mutex, PoisonError};

/// inert role: keeps the core until someone configures the log
pub struct LogUnconfigured {
    log_core: Mutex<Option<LogCore>>,
}

impl LogUnconfigured {
    pub fn new(log_core: LogCore) -> Self {
        Self {
            log_core: Mutex::new(Some(log_core)),
        }
    }

    /// an unconfigured role whose core is already gone
    pub fn empty() -> Self {
        Self {
            log_core: Mutex::new(None),
        }
    }

    pub fn status(&self) -> LogStatus {
        LogStatus::Unconfigured
    }

    pub fn wait_for(&self, _index: LogIndex) -> WaitForFuture {
        wait_for::ready(Err(LogError::Unconfigured))
    }

    pub fn resign(&self) -> Result<LogCore, LogError> {
        self.log_core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(LogError::AlreadyResigned)
    }
}
