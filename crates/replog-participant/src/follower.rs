//! # follower
//!
//! why: accept entries from the current leader and keep a consistent suffix of its log
//! relations: owns a LogCore, reached by the leader through AbstractFollower
//! what: LogFollower, append-entries validation, divergence truncation, follower commit tracking

use crate::error::LogError;
use crate::in_memory_log::InMemoryLog;
use crate::log_core::LogCore;
use crate::network::AbstractFollower;
use crate::wait_for::{self, ResolvedWaiters, WaitForFuture, WaitForQueue};
use async_trait::async_trait;
use replog_core::{
    AppendEntriesErrorReason, AppendEntriesRequest, AppendEntriesResult, LogEntry, LogIndex,
    LogStatistics, LogStatus, LogTerm, ParticipantId, QuorumData,
};
use replog_storage::LogIter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Follower role: applies entries sent by `leader_id`.
pub struct LogFollower {
    participant_id: ParticipantId,
    leader_id: ParticipantId,
    guarded: Mutex<GuardedFollowerData>,
}

struct GuardedFollowerData {
    current_term: LogTerm,
    /// `None` once resigned
    log_core: Option<LogCore>,
    in_memory_log: InMemoryLog,
    commit_index: LogIndex,
    wait_for_queue: WaitForQueue,
}

impl LogFollower {
    pub fn new(
        participant_id: ParticipantId,
        term: LogTerm,
        leader_id: ParticipantId,
        log_core: LogCore,
    ) -> Result<Self, LogError> {
        let in_memory_log = InMemoryLog::from_core(&log_core)?;
        Ok(Self::with_log(participant_id, term, leader_id, log_core, in_memory_log))
    }

    pub(crate) fn with_log(
        participant_id: ParticipantId,
        term: LogTerm,
        leader_id: ParticipantId,
        log_core: LogCore,
        in_memory_log: InMemoryLog,
    ) -> Self {
        info!(participant = %participant_id, leader = %leader_id, %term, "becoming follower");
        Self {
            participant_id,
            leader_id,
            guarded: Mutex::new(GuardedFollowerData {
                current_term: term,
                log_core: Some(log_core),
                in_memory_log,
                commit_index: LogIndex::ZERO,
                wait_for_queue: WaitForQueue::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardedFollowerData> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn leader_id(&self) -> &ParticipantId {
        &self.leader_id
    }

    pub fn term(&self) -> LogTerm {
        self.lock().current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.lock().commit_index
    }

    pub fn last_index(&self) -> LogIndex {
        self.lock().in_memory_log.last_index()
    }

    /// handle one request from the leader
    ///
    /// rejections come back as unsuccessful results; only storage failures
    /// are errors.
    pub fn handle_append_entries(
        &self,
        request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, LogError> {
        let (result, resolved) = {
            let mut guard = self.lock();
            let data = &mut *guard;
            let result = data.append(&self.participant_id, &self.leader_id, request)?;
            let resolved = if result.success {
                data.advance_commit(request.leader_commit)
            } else {
                None
            };
            (result, resolved)
        };

        if let Some((waiters, quorum)) = resolved {
            waiters.resolve(quorum);
        }
        Ok(result)
    }

    /// resolves when the leader reports `index` as committed
    ///
    /// followers do not know the quorum, so the resolved data has an empty one.
    pub fn wait_for(&self, index: LogIndex) -> WaitForFuture {
        let mut guard = self.lock();
        if guard.log_core.is_none() {
            return wait_for::ready(Err(LogError::Resigned));
        }
        if guard.commit_index >= index {
            let quorum = QuorumData::new(guard.commit_index, guard.current_term, Vec::new());
            return wait_for::ready(Ok(Arc::new(quorum)));
        }
        guard.wait_for_queue.register(index)
    }

    /// committed entries starting at `from`
    pub fn committed_entries(&self, from: LogIndex) -> LogIter {
        let guard = self.lock();
        let entries = guard.in_memory_log.entries_between(from, guard.commit_index);
        Box::new(entries.into_iter())
    }

    pub fn status(&self) -> LogStatus {
        let guard = self.lock();
        LogStatus::Follower {
            leader: self.leader_id.clone(),
            term: guard.current_term,
            local: LogStatistics {
                commit_index: guard.commit_index,
                spear_head: guard.in_memory_log.last_index(),
            },
        }
    }

    /// give the log core back; pending waiters are rejected
    pub fn resign(&self) -> Result<LogCore, LogError> {
        let (core, waiters) = {
            let mut guard = self.lock();
            let core = guard.log_core.take().ok_or(LogError::AlreadyResigned)?;
            (core, guard.wait_for_queue.take_all())
        };
        info!(participant = %self.participant_id, "follower resigned");
        waiters.reject(|| LogError::Resigned);
        Ok(core)
    }
}

impl GuardedFollowerData {
    fn reject(&self, reason: AppendEntriesErrorReason) -> AppendEntriesResult {
        AppendEntriesResult::rejected(self.current_term, self.in_memory_log.last_index(), reason)
    }

    fn append(
        &mut self,
        participant_id: &ParticipantId,
        leader_id: &ParticipantId,
        request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, LogError> {
        if self.log_core.is_none() {
            return Ok(self.reject(AppendEntriesErrorReason::LostLogCore));
        }
        if &request.leader_id != leader_id {
            warn!(participant = %participant_id, expected = %leader_id, got = %request.leader_id, "append from unknown leader");
            return Ok(self.reject(AppendEntriesErrorReason::InvalidLeaderId));
        }
        if request.leader_term < self.current_term {
            warn!(participant = %participant_id, term = %self.current_term, leader_term = %request.leader_term, "append with stale term");
            return Ok(self.reject(AppendEntriesErrorReason::TermTooOld));
        }
        if !request.prev_log_index.is_sentinel() {
            let matches = self
                .in_memory_log
                .entry(request.prev_log_index)
                .is_some_and(|e| e.term == request.prev_log_term);
            if !matches {
                debug!(participant = %participant_id, prev = %request.prev_log_index, "previous entry does not match");
                return Ok(self.reject(AppendEntriesErrorReason::NoPrevLogMatch));
            }
        }

        if request.leader_term > self.current_term {
            debug!(participant = %participant_id, term = %request.leader_term, "adopting leader term");
            self.current_term = request.leader_term;
        }

        let new_entries = self.divergent_suffix(&request.entries);
        if let Some(first) = new_entries.first() {
            let Some(core) = self.log_core.as_mut() else {
                return Ok(self.reject(AppendEntriesErrorReason::LostLogCore));
            };
            if first.index <= self.in_memory_log.last_index() {
                warn!(participant = %participant_id, from = %first.index, "log diverged, truncating");
                if let Err(error) = core.remove_back(first.index) {
                    warn!(participant = %participant_id, %error, "failed to truncate log");
                    return Ok(self.reject(AppendEntriesErrorReason::PersistenceFailure));
                }
                self.in_memory_log.truncate_from(first.index);
            }
            if let Err(error) = core.insert(new_entries) {
                warn!(participant = %participant_id, %error, "failed to persist entries");
                return Ok(self.reject(AppendEntriesErrorReason::PersistenceFailure));
            }
            for entry in new_entries {
                self.in_memory_log.append(entry.clone());
            }
            debug!(participant = %participant_id, count = new_entries.len(), last = %self.in_memory_log.last_index(), "appended entries");
        }

        Ok(AppendEntriesResult::accepted(
            self.current_term,
            self.in_memory_log.last_index(),
        ))
    }

    /// skip entries we already hold with the same term; the rest has to be written
    fn divergent_suffix<'a>(&self, entries: &'a [LogEntry]) -> &'a [LogEntry] {
        let held = entries
            .iter()
            .take_while(|e| {
                self.in_memory_log
                    .entry(e.index)
                    .is_some_and(|existing| existing.term == e.term)
            })
            .count();
        &entries[held..]
    }

    fn advance_commit(&mut self, leader_commit: LogIndex) -> Option<(ResolvedWaiters, Arc<QuorumData>)> {
        let new_commit = leader_commit.min(self.in_memory_log.last_index());
        if new_commit <= self.commit_index {
            return None;
        }
        self.commit_index = new_commit;
        let quorum = Arc::new(QuorumData::new(new_commit, self.current_term, Vec::new()));
        Some((self.wait_for_queue.take_up_to(new_commit), quorum))
    }
}

#[async_trait]
impl AbstractFollower for LogFollower {
    fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, LogError> {
        self.handle_append_entries(&request)
    }
}
