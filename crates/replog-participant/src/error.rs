//! Error types for log participants.

use replog_core::{LogTerm, ParticipantId};
use replog_storage::StorageError;

/// Errors returned by participant operations.
///
/// Rejections a follower reports over the wire are not errors; they travel
/// inside [`AppendEntriesResult`](replog_core::AppendEntriesResult).
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The persisted log failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A role change asked for a term older than the current one.
    #[error("term {requested} is older than current term {current}")]
    StaleTerm { current: LogTerm, requested: LogTerm },

    /// The operation needs the leader role.
    #[error("participant is not the leader")]
    NotTheLeader,

    /// The operation needs the follower role.
    #[error("participant is not a follower")]
    NotAFollower,

    /// The participant has no role yet.
    #[error("participant is unconfigured")]
    Unconfigured,

    /// The role resigned; pending and new waiters are rejected with this.
    #[error("participant resigned")]
    Resigned,

    /// `resign` was called on a role that already gave up its log core.
    #[error("participant already resigned")]
    AlreadyResigned,

    /// Write concern must be between 1 and the number of participants.
    #[error("write concern {write_concern} is invalid for {participants} participants")]
    InvalidWriteConcern {
        write_concern: usize,
        participants: usize,
    },

    /// Sending a request to a participant failed.
    ///
    /// Returned by `AbstractFollower` implementations when the transport to
    /// a remote follower breaks; the leader records it as a communication error.
    #[error("request to {participant} failed: {message}")]
    Network {
        participant: ParticipantId,
        message: String,
    },
}
