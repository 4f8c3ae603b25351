//! # participant
//!
//! why: one log per server switches between roles as leadership changes
//! relations: wraps LogLeader, LogFollower and LogUnconfigured; handed out to request handlers
//! what: Participant sum type, ReplicatedLog role holder

use crate::error::LogError;
use crate::follower::LogFollower;
use crate::in_memory_log::InMemoryLog;
use crate::leader::LogLeader;
use crate::log_core::LogCore;
use crate::network::AbstractFollower;
use crate::unconfigured::LogUnconfigured;
use crate::wait_for::WaitForFuture;
use replog_core::{LogConfig, LogIndex, LogStatus, LogTerm, ParticipantId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// the role a log currently plays
#[derive(Clone)]
pub enum Participant {
    Unconfigured(Arc<LogUnconfigured>),
    Leader(Arc<LogLeader>),
    Follower(Arc<LogFollower>),
}

impl Participant {
    pub fn status(&self) -> LogStatus {
        match self {
            Participant::Unconfigured(p) => p.status(),
            Participant::Leader(p) => p.status(),
            Participant::Follower(p) => p.status(),
        }
    }

    pub fn term(&self) -> Option<LogTerm> {
        match self {
            Participant::Unconfigured(_) => None,
            Participant::Leader(p) => Some(p.term()),
            Participant::Follower(p) => Some(p.term()),
        }
    }

    pub fn wait_for(&self, index: LogIndex) -> WaitForFuture {
        match self {
            Participant::Unconfigured(p) => p.wait_for(index),
            Participant::Leader(p) => p.wait_for(index),
            Participant::Follower(p) => p.wait_for(index),
        }
    }

    pub fn resign(&self) -> Result<LogCore, LogError> {
        match self {
            Participant::Unconfigured(p) => p.resign(),
            Participant::Leader(p) => p.resign(),
            Participant::Follower(p) => p.resign(),
        }
    }
}

/// holds the current role of one replicated log
///
/// role changes resign the current role and move its LogCore into the new
/// one. arguments are checked before resigning, so a rejected change keeps
/// the current role intact.
pub struct ReplicatedLog {
    participant: Mutex<Participant>,
}

impl ReplicatedLog {
    pub fn new(log_core: LogCore) -> Self {
        Self {
            participant: Mutex::new(Participant::Unconfigured(Arc::new(LogUnconfigured::new(log_core)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Participant> {
        self.participant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_term(current: &Participant, requested: LogTerm) -> Result<(), LogError> {
        match current.term() {
            Some(current) if requested < current => Err(LogError::StaleTerm { current, requested }),
            _ => Ok(()),
        }
    }

    /// resign the current role and load its core; on a read failure the
    /// core is parked in an unconfigured role instead of being lost
    fn take_core(slot: &mut Participant) -> Result<(LogCore, InMemoryLog), LogError> {
        let core = slot.resign()?;
        match InMemoryLog::from_core(&core) {
            Ok(log) => Ok((core, log)),
            Err(error) => {
                warn!(%error, "failed to load log during role change");
                *slot = Participant::Unconfigured(Arc::new(LogUnconfigured::new(core)));
                Err(error)
            }
        }
    }

    pub fn become_leader(
        &self,
        participant_id: ParticipantId,
        term: LogTerm,
        followers: Vec<Arc<dyn AbstractFollower>>,
        config: LogConfig,
    ) -> Result<Arc<LogLeader>, LogError> {
        let mut slot = self.lock();
        Self::check_term(&slot, term)?;
        LogLeader::validate_write_concern(config.write_concern, followers.len())?;

        let (core, in_memory_log) = Self::take_core(&mut slot)?;
        let leader = LogLeader::with_log(participant_id, core, in_memory_log, term, followers, config);
        *slot = Participant::Leader(leader.clone());
        Ok(leader)
    }

    pub fn become_follower(
        &self,
        participant_id: ParticipantId,
        term: LogTerm,
        leader_id: ParticipantId,
    ) -> Result<Arc<LogFollower>, LogError> {
        let mut slot = self.lock();
        Self::check_term(&slot, term)?;

        let (core, in_memory_log) = Self::take_core(&mut slot)?;
        let follower = Arc::new(LogFollower::with_log(participant_id, term, leader_id, core, in_memory_log));
        *slot = Participant::Follower(follower.clone());
        Ok(follower)
    }

    pub fn participant(&self) -> Participant {
        self.lock().clone()
    }

    pub fn leader(&self) -> Result<Arc<LogLeader>, LogError> {
        match &*self.lock() {
            Participant::Leader(leader) => Ok(leader.clone()),
            _ => Err(LogError::NotTheLeader),
        }
    }

    pub fn follower(&self) -> Result<Arc<LogFollower>, LogError> {
        match &*self.lock() {
            Participant::Follower(follower) => Ok(follower.clone()),
            _ => Err(LogError::NotAFollower),
        }
    }

    pub fn status(&self) -> LogStatus {
        self.lock().status()
    }

    /// resign whatever role is active and return the core, leaving the log unconfigured
    pub fn resign(&self) -> Result<LogCore, LogError> {
        let mut slot = self.lock();
        let core = slot.resign()?;
        *slot = Participant::Unconfigured(Arc::new(LogUnconfigured::empty()));
        Ok(core)
    }
}
