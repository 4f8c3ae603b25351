//! # log_core
//!
//! why: only one role object may write to the durable log at a time
//! relations: owned by LogLeader (through LocalFollower), LogFollower or LogUnconfigured
//! what: LogCore, a move-only handle around a PersistedLog

use crate::error::LogError;
use replog_core::{LogEntry, LogIndex};
use replog_storage::{LogIter, PersistedLog};

/// exclusive access to a participant's persisted log
///
/// not `Clone`: a role hands it over by value when it resigns, so two
/// roles can never write the same log.
pub struct LogCore {
    persisted: Box<dyn PersistedLog>,
}

impl LogCore {
    pub fn new(persisted: impl PersistedLog + 'static) -> Self {
        Self {
            persisted: Box::new(persisted),
        }
    }

    pub fn from_boxed(persisted: Box<dyn PersistedLog>) -> Self {
        Self { persisted }
    }

    pub fn insert(&mut self, entries: &[LogEntry]) -> Result<(), LogError> {
        Ok(self.persisted.append(entries)?)
    }

    pub fn read(&self, start: LogIndex) -> Result<LogIter, LogError> {
        Ok(self.persisted.read(start)?)
    }

    pub fn remove_back(&mut self, start: LogIndex) -> Result<(), LogError> {
        Ok(self.persisted.remove_back(start)?)
    }

    pub fn remove_front(&mut self, stop: LogIndex) -> Result<(), LogError> {
        Ok(self.persisted.remove_front(stop)?)
    }

    /// give up exclusivity and return the underlying log
    pub fn into_persisted(self) -> Box<dyn PersistedLog> {
        self.persisted
    }
}

impl std::fmt::Debug for LogCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCore").finish_non_exhaustive()
    }
}
