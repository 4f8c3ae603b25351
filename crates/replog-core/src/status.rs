//! # status
//!
//! why: let the request-handling layer inspect a participant without touching its internals
//! relations: produced by each role in replog-participant
//! what: LogStatistics, FollowerStatistics, LogStatus

use crate::index::{LogIndex, LogTerm, ParticipantId};
use crate::message::AppendEntriesErrorReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStatistics {
    pub commit_index: LogIndex,
    /// last index present in the log
    pub spear_head: LogIndex,
}

/// the leader's view of one follower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerStatistics {
    pub commit_index: LogIndex,
    pub spear_head: LogIndex,
    pub last_error_reason: Option<AppendEntriesErrorReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum LogStatus {
    Leader {
        term: LogTerm,
        local: LogStatistics,
        follower: BTreeMap<ParticipantId, FollowerStatistics>,
    },
    Follower {
        leader: ParticipantId,
        term: LogTerm,
        local: LogStatistics,
    },
    Unconfigured,
}

impl LogStatus {
    pub fn term(&self) -> Option<LogTerm> {
        match self {
            LogStatus::Leader { term, .. } | LogStatus::Follower { term, .. } => Some(*term),
            LogStatus::Unconfigured => None,
        }
    }

    pub fn local(&self) -> Option<LogStatistics> {
        match self {
            LogStatus::Leader { local, .. } | LogStatus::Follower { local, .. } => Some(*local),
            LogStatus::Unconfigured => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_is_tagged_by_role() {
        let status = LogStatus::Follower {
            leader: "A".into(),
            term: LogTerm(2),
            local: LogStatistics {
                commit_index: LogIndex(1),
                spear_head: LogIndex(3),
            },
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({"role": "follower", "leader": "A", "term": 2, "local": {"commitIndex": 1, "spearHead": 3}})
        );

        let value = serde_json::to_value(LogStatus::Unconfigured).unwrap();
        assert_eq!(value, json!({"role": "unconfigured"}));
        assert_eq!(LogStatus::Unconfigured.term(), None);
    }
}
