//! # in_memory_log
//!
//! why: roles answer index and term lookups without going to storage
//! relations: rebuilt from a LogCore when a role is constructed, kept in step with it afterwards
//! what: InMemoryLog

use crate::error::LogError;
use crate::log_core::LogCore;
use replog_core::{LogEntry, LogIndex, LogTerm};

/// ordered copy of the entries a role knows about
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    entries: Vec<LogEntry>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// load every entry the persisted log still holds
    pub fn from_core(core: &LogCore) -> Result<Self, LogError> {
        Ok(Self {
            entries: core.read(LogIndex::ZERO)?.collect(),
        })
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries.last().map(|e| e.index).unwrap_or_default()
    }

    pub fn last_term(&self) -> LogTerm {
        self.entries.last().map(|e| e.term).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, index: LogIndex) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&index, |e| e.index)
    }

    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.position(index).ok().map(|pos| &self.entries[pos])
    }

    /// caller guarantees `entry.index` is past the tail
    pub fn append(&mut self, entry: LogEntry) {
        debug_assert!(entry.index > self.last_index());
        self.entries.push(entry);
    }

    /// drop every entry with index >= `start`
    pub fn truncate_from(&mut self, start: LogIndex) {
        let pos = self.position(start).unwrap_or_else(|pos| pos);
        self.entries.truncate(pos);
    }

    /// entries with index > `after`
    pub fn entries_after(&self, after: LogIndex) -> Vec<LogEntry> {
        let start = match self.position(after) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        };
        self.entries[start..].to_vec()
    }

    /// entries with `from <= index <= to`
    pub fn entries_between(&self, from: LogIndex, to: LogIndex) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.index >= from && e.index <= to)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_storage::MemoryLog;

    fn entry(term: u64, index: u64) -> LogEntry {
        LogEntry::new(LogTerm(term), LogIndex(index), "x")
    }

    #[test]
    fn empty_log_reports_sentinel() {
        let log = InMemoryLog::new();
        assert_eq!(log.last_index(), LogIndex::ZERO);
        assert_eq!(log.last_term(), LogTerm(0));
        assert!(log.entry(LogIndex(1)).is_none());
    }

    #[test]
    fn loads_from_core() {
        let persisted = MemoryLog::with_entries(vec![entry(1, 1), entry(2, 2)]).unwrap();
        let log = InMemoryLog::from_core(&LogCore::new(persisted)).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.last_index(), LogIndex(2));
        assert_eq!(log.last_term(), LogTerm(2));
    }

    #[test]
    fn slicing_by_index() {
        let mut log = InMemoryLog::new();
        for i in 1..=5 {
            log.append(entry(1, i));
        }

        let after: Vec<u64> = log.entries_after(LogIndex(3)).iter().map(|e| e.index.0).collect();
        assert_eq!(after, vec![4, 5]);
        assert_eq!(log.entries_after(LogIndex::ZERO).len(), 5);
        assert_eq!(log.entries_between(LogIndex(2), LogIndex(3)).len(), 2);

        log.truncate_from(LogIndex(3));
        assert_eq!(log.last_index(), LogIndex(2));
    }

    #[test]
    fn lookups_work_when_the_front_was_compacted() {
        let mut log = InMemoryLog::new();
        log.append(entry(1, 4));
        log.append(entry(1, 5));

        assert!(log.entry(LogIndex(3)).is_none());
        assert_eq!(log.entry(LogIndex(5)).unwrap().index, LogIndex(5));
        assert_eq!(log.entries_after(LogIndex(2)).len(), 2);
    }
}
