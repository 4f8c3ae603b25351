//! # index
//!
//! why: keep log positions and election epochs from being mixed up with plain integers
//! relations: used everywhere a log position or a term crosses an api boundary
//! what: LogIndex, LogTerm newtypes and the ParticipantId alias

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// identifier of a log participant (server id)
pub type ParticipantId = String;

/// position of an entry in a participant's log
///
/// indices start at 1; `LogIndex(0)` is the sentinel meaning "no entry",
/// used as prev-log-index for the very first append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogIndex(pub u64);

impl LogIndex {
    pub const ZERO: LogIndex = LogIndex(0);

    /// the index directly before this one, never going below zero
    pub fn saturating_prev(self) -> LogIndex {
        LogIndex(self.0.saturating_sub(1))
    }

    pub fn next(self) -> LogIndex {
        LogIndex(self.0 + 1)
    }

    pub fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

impl Add<u64> for LogIndex {
    type Output = LogIndex;

    fn add(self, rhs: u64) -> LogIndex {
        LogIndex(self.0 + rhs)
    }
}

impl From<u64> for LogIndex {
    fn from(value: u64) -> Self {
        LogIndex(value)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// election epoch; only grows when a new leader is installed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogTerm(pub u64);

impl From<u64> for LogTerm {
    fn from(value: u64) -> Self {
        LogTerm(value)
    }
}

impl fmt::Display for LogTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_compare_by_value() {
        let one = LogIndex(1);
        let two = LogIndex(2);

        assert!(one < two);
        assert!(two > one);
        assert!(one <= one);
        assert_ne!(one, two);
        assert_eq!(one + 1, two);
    }

    #[test]
    fn saturating_prev_stops_at_sentinel() {
        assert_eq!(LogIndex(3).saturating_prev(), LogIndex(2));
        assert_eq!(LogIndex(0).saturating_prev(), LogIndex::ZERO);
        assert!(LogIndex::ZERO.is_sentinel());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&LogIndex(42)).unwrap();
        assert_eq!(json, "42");
        let term: LogTerm = serde_json::from_str("7").unwrap();
        assert_eq!(term, LogTerm(7));
    }
}
