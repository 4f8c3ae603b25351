//! # network
//!
//! why: the leader replicates without knowing whether a follower is local, remote or a test double
//! relations: implemented by LogFollower, LocalFollower and transport adapters outside this crate
//! what: AbstractFollower

use crate::error::LogError;
use async_trait::async_trait;
use replog_core::{AppendEntriesRequest, AppendEntriesResult, ParticipantId};

/// Something the leader can send append-entries requests to.
///
/// An `Err` means the request never produced an answer (transport failure);
/// a follower that refuses the entries answers with `Ok` and `success == false`.
#[async_trait]
pub trait AbstractFollower: Send + Sync {
    fn participant_id(&self) -> &ParticipantId;

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, LogError>;
}
