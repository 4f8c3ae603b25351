//! # agency-store
//!
//! why: turn the committed log into a path-addressed json tree clients can read and guard writes on
//! relations: replays replog-core entries, independent of the participant roles
//! what: path tree, preconditions, mutation operators, ttl expiry, observers, client-id ledger

pub mod clock;
pub mod config;
pub mod error;
pub mod json;
pub mod node;
pub mod operation;
pub mod path;
pub mod precondition;
pub mod store;
pub mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::StoreError;
pub use node::{Node, NodeValue};
pub use operation::{EraseTarget, Mutation, Operation};
pub use precondition::Precondition;
pub use store::{CommittedResults, Observers, Store};
pub use transaction::{ApplyResult, Transaction};
