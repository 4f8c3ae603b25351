//! # replog-core
//!
//! why: shared value types for the replicated log, free of io and async
//! relations: used by replog-storage for persistence, replog-participant for replication, agency-store for replay
//! what: indices and terms, log entries, append-entries messages, quorum data, status, config

pub mod config;
pub mod index;
pub mod log;
pub mod message;
pub mod status;

pub use config::LogConfig;
pub use index::{LogIndex, LogTerm, ParticipantId};
pub use log::{LogEntry, LogPayload};
pub use message::{AppendEntriesErrorReason, AppendEntriesRequest, AppendEntriesResult, QuorumData};
pub use status::{FollowerStatistics, LogStatistics, LogStatus};
