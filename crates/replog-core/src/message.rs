//! # message
//!
//! why: define the replication messages exchanged between leader and followers
//! relations: built by the leader in replog-participant, handled by followers, serialized for the transport
//! what: AppendEntriesRequest, AppendEntriesResult, AppendEntriesErrorReason, QuorumData

use crate::index::{LogIndex, LogTerm, ParticipantId};
use crate::log::LogEntry;
use serde::{Deserialize, Serialize};

/// Replicate log entries (also serves as a commit-index update when entries is empty)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesRequest {
    pub leader_term: LogTerm,
    pub leader_id: ParticipantId,
    /// index of the entry directly before `entries`, 0 if they start the log
    pub prev_log_index: LogIndex,
    pub prev_log_term: LogTerm,
    #[serde(rename = "leaderCommitIndex")]
    pub leader_commit: LogIndex,
    pub entries: Vec<LogEntry>,
}

/// why a follower refused an append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppendEntriesErrorReason {
    #[error("leader id was invalid")]
    InvalidLeaderId,
    #[error("term has changed and an internal state was lost")]
    LostLogCore,
    /// the request carried a term older than the follower's
    #[error("current term is different from leader term")]
    TermTooOld,
    #[error("previous log index did not match")]
    NoPrevLogMatch,
    #[error("writing the entries to the persisted log failed")]
    PersistenceFailure,
    /// set by the leader when the request itself failed
    #[error("communication with the participant failed")]
    CommunicationError,
    /// set by the leader when the follower needs entries that were compacted away
    #[error("required log entries are no longer available")]
    MissingLogEntries,
}

/// Response to AppendEntriesRequest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesResult {
    pub success: bool,
    /// the follower's term after handling the request
    pub term: LogTerm,
    pub last_index_persisted: LogIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AppendEntriesErrorReason>,
}

impl AppendEntriesResult {
    pub fn accepted(term: LogTerm, last_index_persisted: LogIndex) -> Self {
        Self {
            success: true,
            term,
            last_index_persisted,
            reason: None,
        }
    }

    pub fn rejected(
        term: LogTerm,
        last_index_persisted: LogIndex,
        reason: AppendEntriesErrorReason,
    ) -> Self {
        Self {
            success: false,
            term,
            last_index_persisted,
            reason: Some(reason),
        }
    }
}

/// produced once when an index reaches write concern
///
/// every waiter released by the same commit shares one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumData {
    pub index: LogIndex,
    pub term: LogTerm,
    /// participants whose acknowledgement formed the quorum
    pub quorum: Vec<ParticipantId>,
}

impl QuorumData {
    pub fn new(index: LogIndex, term: LogTerm, quorum: Vec<ParticipantId>) -> Self {
        Self { index, term, quorum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let request = AppendEntriesRequest {
            leader_term: LogTerm(3),
            leader_id: "leader".into(),
            prev_log_index: LogIndex(1),
            prev_log_term: LogTerm(2),
            leader_commit: LogIndex(1),
            entries: vec![LogEntry::new(LogTerm(3), LogIndex(2), "x")],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["leaderTerm"], json!(3));
        assert_eq!(value["prevLogIndex"], json!(1));
        assert_eq!(value["prevLogTerm"], json!(2));
        assert_eq!(value["leaderCommitIndex"], json!(1));
        assert_eq!(value["entries"][0]["index"], json!(2));
    }

    #[test]
    fn rejected_result_carries_reason() {
        let result =
            AppendEntriesResult::rejected(LogTerm(4), LogIndex(9), AppendEntriesErrorReason::TermTooOld);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "term": 4, "lastIndexPersisted": 9, "reason": "TERM_TOO_OLD"})
        );

        let accepted = serde_json::to_value(AppendEntriesResult::accepted(LogTerm(1), LogIndex(2))).unwrap();
        assert!(accepted.get("reason").is_none());
    }

    #[test]
    fn reasons_have_readable_messages() {
        assert_eq!(
            AppendEntriesErrorReason::NoPrevLogMatch.to_string(),
            "previous log index did not match"
        );
        assert_eq!(
            AppendEntriesErrorReason::InvalidLeaderId.to_string(),
            "leader id was invalid"
        );
    }
}
