//! # leader
//!
//! why: accept writes, replicate them, and commit once a write-concern quorum has persisted them
//! relations: owns the LogCore through LocalFollower, talks to followers via AbstractFollower, resolves WaitForQueue
//! what: LogLeader, LocalFollower, replication rounds, quorum calculation, compaction trigger

use crate::error::LogError;
use crate::in_memory_log::InMemoryLog;
use crate::log_core::LogCore;
use crate::network::AbstractFollower;
use crate::wait_for::{self, ResolvedWaiters, WaitForFuture, WaitForQueue};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use replog_core::{
    AppendEntriesErrorReason, AppendEntriesRequest, AppendEntriesResult, FollowerStatistics,
    LogConfig, LogEntry, LogIndex, LogPayload, LogStatistics, LogStatus, LogTerm, ParticipantId,
    QuorumData,
};
use replog_storage::LogIter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// -- local follower --

/// the leader's own log, replicated to like any other follower
///
/// holds the LogCore while the leader is active, so the leader's own
/// acknowledgement only counts once its entries are persisted.
pub struct LocalFollower {
    participant_id: ParticipantId,
    log_core: Mutex<Option<LogCore>>,
}

impl LocalFollower {
    fn new(participant_id: ParticipantId, log_core: LogCore) -> Self {
        Self {
            participant_id,
            log_core: Mutex::new(Some(log_core)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<LogCore>> {
        self.log_core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resign(&self) -> Result<LogCore, LogError> {
        self.lock().take().ok_or(LogError::AlreadyResigned)
    }

    fn remove_front(&self, stop: LogIndex) -> Result<(), LogError> {
        match self.lock().as_mut() {
            Some(core) => core.remove_front(stop),
            None => Err(LogError::Resigned),
        }
    }
}

#[async_trait]
impl AbstractFollower for LocalFollower {
    fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, LogError> {
        let last = request
            .entries
            .last()
            .map(|e| e.index)
            .unwrap_or(request.prev_log_index);

        let mut guard = self.lock();
        let Some(core) = guard.as_mut() else {
            return Ok(AppendEntriesResult::rejected(
                request.leader_term,
                LogIndex::ZERO,
                AppendEntriesErrorReason::LostLogCore,
            ));
        };
        core.insert(&request.entries)?;
        Ok(AppendEntriesResult::accepted(request.leader_term, last))
    }
}

// -- replication bookkeeping --

struct FollowerInfo {
    follower: Arc<dyn AbstractFollower>,
    /// where the next request starts; a guess until the follower answers
    next_index: LogIndex,
    /// highest index the follower confirmed; the only value counted for quorum
    match_index: LogIndex,
    last_acked_commit_index: LogIndex,
    last_error_reason: Option<AppendEntriesErrorReason>,
    request_in_flight: bool,
}

impl FollowerInfo {
    fn new(follower: Arc<dyn AbstractFollower>, next_index: LogIndex, match_index: LogIndex) -> Self {
        Self {
            follower,
            next_index,
            match_index,
            last_acked_commit_index: LogIndex::ZERO,
            last_error_reason: None,
            request_in_flight: false,
        }
    }
}

/// what a request claimed when it was sent; applied only if it succeeds
struct RequestMeta {
    position: usize,
    participant_id: ParticipantId,
    last_index: LogIndex,
    commit_index: LogIndex,
}

struct PreparedRequest {
    meta: RequestMeta,
    follower: Arc<dyn AbstractFollower>,
    request: AppendEntriesRequest,
}

type ResponseFuture = BoxFuture<'static, (RequestMeta, Result<AppendEntriesResult, LogError>)>;

fn send(prepared: PreparedRequest) -> ResponseFuture {
    let PreparedRequest {
        meta,
        follower,
        request,
    } = prepared;
    async move {
        let result = follower.append_entries(request).await;
        (meta, result)
    }
    .boxed()
}

/// outcome of one [`LogLeader::run_async_step`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRound {
    /// participants that accepted at least one request
    pub acknowledged: BTreeSet<ParticipantId>,
    /// participants whose request failed or was refused; not retried this round
    pub failed: BTreeSet<ParticipantId>,
    /// leader commit index when the round finished
    pub commit_index: LogIndex,
}

/// clears in-flight markers of requests still pending when a round is dropped
struct InFlightGuard<'a> {
    leader: &'a LogLeader,
    positions: HashSet<usize>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.positions.is_empty() {
            return;
        }
        let mut guard = self.leader.lock();
        for position in self.positions.drain() {
            if let Some(info) = guard.follower.get_mut(position) {
                info.request_in_flight = false;
            }
        }
    }
}

struct CommitAdvance {
    waiters: ResolvedWaiters,
    quorum: Arc<QuorumData>,
    compact_before: Option<LogIndex>,
}

struct GuardedLeaderData {
    in_memory_log: InMemoryLog,
    /// position 0 is the local follower
    follower: Vec<FollowerInfo>,
    commit_index: LogIndex,
    last_quorum: Arc<QuorumData>,
    wait_for_queue: WaitForQueue,
    last_compaction: LogIndex,
    did_resign: bool,
}

impl GuardedLeaderData {
    fn prepare_append_entries(
        &mut self,
        leader_id: &ParticipantId,
        term: LogTerm,
        skip: &HashSet<usize>,
    ) -> Vec<PreparedRequest> {
        let last_index = self.in_memory_log.last_index();
        let commit_index = self.commit_index;
        let mut prepared = Vec::new();

        for (position, info) in self.follower.iter_mut().enumerate() {
            if skip.contains(&position) || info.request_in_flight {
                continue;
            }
            if info.match_index == last_index && info.last_acked_commit_index == commit_index {
                continue;
            }

            let (prev_log_index, prev_log_term) = if info.next_index.is_sentinel() {
                (LogIndex::ZERO, LogTerm::default())
            } else {
                match self.in_memory_log.entry(info.next_index) {
                    Some(prev) => (prev.index, prev.term),
                    None => {
                        info.last_error_reason = Some(AppendEntriesErrorReason::MissingLogEntries);
                        continue;
                    }
                }
            };

            info.request_in_flight = true;
            prepared.push(PreparedRequest {
                meta: RequestMeta {
                    position,
                    participant_id: info.follower.participant_id().clone(),
                    last_index,
                    commit_index,
                },
                follower: info.follower.clone(),
                request: AppendEntriesRequest {
                    leader_term: term,
                    leader_id: leader_id.clone(),
                    prev_log_index,
                    prev_log_term,
                    leader_commit: commit_index,
                    entries: self.in_memory_log.entries_after(info.next_index),
                },
            });
        }
        prepared
    }

    /// record a follower's answer; returns whether it was a success
    fn handle_append_entries_response(
        &mut self,
        meta: &RequestMeta,
        result: Result<AppendEntriesResult, LogError>,
    ) -> bool {
        let Some(info) = self.follower.get_mut(meta.position) else {
            return false;
        };
        info.request_in_flight = false;

        match result {
            Ok(response) if response.success => {
                info.match_index = info.match_index.max(meta.last_index);
                info.next_index = info.next_index.max(meta.last_index);
                info.last_acked_commit_index = info.last_acked_commit_index.max(meta.commit_index);
                info.last_error_reason = None;
                true
            }
            Ok(response) => {
                warn!(participant = %meta.participant_id, reason = ?response.reason, "append entries refused");
                if response.reason == Some(AppendEntriesErrorReason::NoPrevLogMatch) {
                    // walk back, but never past what the follower says it holds
                    info.next_index = info
                        .next_index
                        .saturating_prev()
                        .min(response.last_index_persisted);
                }
                info.last_error_reason = response.reason;
                false
            }
            Err(error) => {
                warn!(participant = %meta.participant_id, %error, "append entries failed");
                info.last_error_reason = Some(AppendEntriesErrorReason::CommunicationError);
                false
            }
        }
    }

    fn check_commit_index(&mut self, term: LogTerm, config: &LogConfig) -> Option<CommitAdvance> {
        let write_concern = config.write_concern;
        let mut acked: Vec<(LogIndex, &ParticipantId)> = self
            .follower
            .iter()
            .map(|info| (info.match_index, info.follower.participant_id()))
            .collect();
        // stable: on ties the local follower stays first
        acked.sort_by(|a, b| b.0.cmp(&a.0));

        let candidate = acked.get(write_concern.checked_sub(1)?)?.0;
        if candidate <= self.commit_index {
            return None;
        }

        let quorum: Vec<ParticipantId> = acked[..write_concern].iter().map(|(_, id)| (*id).clone()).collect();
        debug!(commit = %candidate, ?quorum, "commit index advanced");
        self.commit_index = candidate;
        self.last_quorum = Arc::new(QuorumData::new(candidate, term, quorum));

        let step = config.compaction_step_size;
        let compact_before = if step > 0 && candidate.0 - self.last_compaction.0 >= step {
            self.last_compaction = candidate;
            Some(candidate)
        } else {
            None
        };

        Some(CommitAdvance {
            waiters: self.wait_for_queue.take_up_to(candidate),
            quorum: self.last_quorum.clone(),
            compact_before,
        })
    }
}

// -- leader --

/// Leader role for one term.
pub struct LogLeader {
    participant_id: ParticipantId,
    current_term: LogTerm,
    config: LogConfig,
    local: Arc<LocalFollower>,
    guarded: Mutex<GuardedLeaderData>,
}

impl LogLeader {
    /// take over `log_core` and lead `term`
    ///
    /// the persisted entries become the leader's log. requests to followers
    /// start from all but the last entry, but a follower only counts toward
    /// the quorum once it has acknowledged something.
    pub fn construct(
        participant_id: ParticipantId,
        log_core: LogCore,
        term: LogTerm,
        followers: Vec<Arc<dyn AbstractFollower>>,
        config: LogConfig,
    ) -> Result<Arc<Self>, LogError> {
        Self::validate_write_concern(config.write_concern, followers.len())?;
        let in_memory_log = InMemoryLog::from_core(&log_core)?;
        Ok(Self::with_log(participant_id, log_core, in_memory_log, term, followers, config))
    }

    pub fn validate_write_concern(write_concern: usize, followers: usize) -> Result<(), LogError> {
        let participants = followers + 1;
        if write_concern == 0 || write_concern > participants {
            return Err(LogError::InvalidWriteConcern {
                write_concern,
                participants,
            });
        }
        Ok(())
    }

    pub(crate) fn with_log(
        participant_id: ParticipantId,
        log_core: LogCore,
        in_memory_log: InMemoryLog,
        term: LogTerm,
        followers: Vec<Arc<dyn AbstractFollower>>,
        config: LogConfig,
    ) -> Arc<Self> {
        let last_index = in_memory_log.last_index();
        let local = Arc::new(LocalFollower::new(participant_id.clone(), log_core));

        let mut follower = Vec::with_capacity(followers.len() + 1);
        follower.push(FollowerInfo::new(local.clone(), last_index, last_index));
        for f in followers {
            follower.push(FollowerInfo::new(f, last_index.saturating_prev(), LogIndex::ZERO));
        }

        // nobody else has to confirm what the leader already persisted
        let (commit_index, quorum) = if config.write_concern <= 1 {
            (last_index, vec![participant_id.clone()])
        } else {
            (LogIndex::ZERO, Vec::new())
        };

        info!(participant = %participant_id, %term, write_concern = config.write_concern,
            followers = follower.len() - 1, %last_index, "becoming leader");

        Arc::new(Self {
            participant_id,
            current_term: term,
            local,
            guarded: Mutex::new(GuardedLeaderData {
                in_memory_log,
                follower,
                commit_index,
                last_quorum: Arc::new(QuorumData::new(commit_index, term, quorum)),
                wait_for_queue: WaitForQueue::new(),
                last_compaction: LogIndex::ZERO,
                did_resign: false,
            }),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, GuardedLeaderData> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn term(&self) -> LogTerm {
        self.current_term
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn commit_index(&self) -> LogIndex {
        self.lock().commit_index
    }

    pub fn last_index(&self) -> LogIndex {
        self.lock().in_memory_log.last_index()
    }

    /// append a new entry in the current term; does not wait for replication
    pub fn insert(&self, payload: impl Into<LogPayload>) -> Result<LogIndex, LogError> {
        let mut guard = self.lock();
        if guard.did_resign {
            return Err(LogError::Resigned);
        }
        let index = guard.in_memory_log.last_index().next();
        guard
            .in_memory_log
            .append(LogEntry::new(self.current_term, index, payload));
        debug!(%index, term = %self.current_term, "inserted entry");
        Ok(index)
    }

    /// resolves once `index` is committed
    pub fn wait_for(&self, index: LogIndex) -> WaitForFuture {
        let mut guard = self.lock();
        if guard.did_resign {
            return wait_for::ready(Err(LogError::Resigned));
        }
        if guard.commit_index >= index {
            return wait_for::ready(Ok(guard.last_quorum.clone()));
        }
        guard.wait_for_queue.register(index)
    }

    /// waits for `index`, then iterates the committed entries starting there
    pub fn wait_for_iterator(self: &Arc<Self>, index: LogIndex) -> BoxFuture<'static, Result<LogIter, LogError>> {
        let waiting = self.wait_for(index);
        let leader = self.clone();
        async move {
            waiting.await?;
            Ok(leader.committed_entries(index))
        }
        .boxed()
    }

    /// committed entries starting at `from`
    pub fn committed_entries(&self, from: LogIndex) -> LogIter {
        let guard = self.lock();
        let entries = guard.in_memory_log.entries_between(from, guard.commit_index);
        Box::new(entries.into_iter())
    }

    /// the entry at `index`, only if it is committed
    pub fn read_replicated_entry_by_index(&self, index: LogIndex) -> Option<LogEntry> {
        let guard = self.lock();
        if index > guard.commit_index {
            return None;
        }
        guard.in_memory_log.entry(index).cloned()
    }

    /// every committed entry the leader holds
    pub fn replicated_log_snapshot(&self) -> Vec<LogEntry> {
        let guard = self.lock();
        guard.in_memory_log.entries_between(LogIndex::ZERO, guard.commit_index)
    }

    pub fn status(&self) -> LogStatus {
        let guard = self.lock();
        let follower = guard
            .follower
            .iter()
            .map(|info| {
                (
                    info.follower.participant_id().clone(),
                    FollowerStatistics {
                        commit_index: info.last_acked_commit_index,
                        spear_head: info.match_index,
                        last_error_reason: info.last_error_reason,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        LogStatus::Leader {
            term: self.current_term,
            local: LogStatistics {
                commit_index: guard.commit_index,
                spear_head: guard.in_memory_log.last_index(),
            },
            follower,
        }
    }

    /// send pending entries and commit updates to every follower
    ///
    /// a follower that answers successfully is sent its next request within
    /// the same round; one that fails is left for the caller's next round.
    pub async fn run_async_step(&self) -> Result<ReplicationRound, LogError> {
        let mut in_flight = InFlightGuard {
            leader: self,
            positions: HashSet::new(),
        };
        let mut failed_positions = HashSet::new();
        let mut round = ReplicationRound::default();

        let prepared = {
            let mut guard = self.lock();
            if guard.did_resign {
                return Err(LogError::Resigned);
            }
            guard.prepare_append_entries(&self.participant_id, self.current_term, &failed_positions)
        };

        let mut pending = FuturesUnordered::new();
        for request in prepared {
            in_flight.positions.insert(request.meta.position);
            pending.push(send(request));
        }

        while let Some((meta, result)) = pending.next().await {
            in_flight.positions.remove(&meta.position);

            let (advance, next) = {
                let mut guard = self.lock();
                if guard.did_resign {
                    return Err(LogError::Resigned);
                }
                if guard.handle_append_entries_response(&meta, result) {
                    round.acknowledged.insert(meta.participant_id.clone());
                } else {
                    round.failed.insert(meta.participant_id.clone());
                    failed_positions.insert(meta.position);
                }
                let advance = guard.check_commit_index(self.current_term, &self.config);
                let next = guard.prepare_append_entries(&self.participant_id, self.current_term, &failed_positions);
                (advance, next)
            };

            if let Some(advance) = advance {
                advance.waiters.resolve(advance.quorum);
                if let Some(stop) = advance.compact_before {
                    self.compact(stop);
                }
            }
            for request in next {
                in_flight.positions.insert(request.meta.position);
                pending.push(send(request));
            }
        }

        round.commit_index = self.commit_index();
        Ok(round)
    }

    fn compact(&self, stop: LogIndex) {
        match self.local.remove_front(stop) {
            Ok(()) => debug!(%stop, "compacted persisted log"),
            Err(error) => warn!(%stop, %error, "log compaction failed"),
        }
    }

    /// stop leading: reject all waiters and hand the log core back
    pub fn resign(&self) -> Result<LogCore, LogError> {
        let waiters = {
            let mut guard = self.lock();
            if guard.did_resign {
                return Err(LogError::AlreadyResigned);
            }
            guard.did_resign = true;
            guard.wait_for_queue.take_all()
        };
        info!(participant = %self.participant_id, term = %self.current_term, rejected = waiters.len(), "leader resigned");
        waiters.reject(|| LogError::Resigned);
        self.local.resign()
    }
}
