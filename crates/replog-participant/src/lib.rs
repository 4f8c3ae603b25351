//! # replog-participant
//!
//! why: run the leader/follower protocol on top of a persisted log
//! relations: uses replog-core types and replog-storage logs, transports implement AbstractFollower
//! what: LogCore ownership, leader and follower roles, quorum tracking, wait-for queue

pub mod error;
pub mod follower;
pub mod in_memory_log;
pub mod leader;
pub mod log_core;
pub mod network;
pub mod participant;
pub mod unconfigured;
pub mod wait_for;

pub use error::LogError;
pub use follower::LogFollower;
pub use in_memory_log::InMemoryLog;
pub use leader::{LocalFollower, LogLeader, ReplicationRound};
pub use log_core::LogCore;
pub use network::AbstractFollower;
pub use participant::{Participant, ReplicatedLog};
pub use unconfigured::LogUnconfigured;
pub use wait_for::{WaitForFuture, WaitForQueue, WaitForResult};
