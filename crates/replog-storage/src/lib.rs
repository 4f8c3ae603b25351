//! # replog-storage
//!
//! why: provide durable persistence for a participant's log using standard rust fs apis
//! relations: owned through LogCore by replog-participant, holds replog-core entries
//! what: PersistedLog trait, FileLog implementation, MemoryLog for testing

use replog_core::{LogEntry, LogIndex};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// lazy forward sequence of entries returned by [`PersistedLog::read`]
pub type LogIter = Box<dyn Iterator<Item = LogEntry> + Send>;

/// Errors returned by [`PersistedLog`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The log file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An appended entry did not come after the previous one.
    #[error("index {offered} does not follow {previous}")]
    NonIncreasingIndex { previous: LogIndex, offered: LogIndex },

    /// An appended entry carried a term lower than the previous one.
    #[error("term {offered} at index {index} is below previous term {previous}")]
    TermWentBackwards {
        index: LogIndex,
        previous: replog_core::LogTerm,
        offered: replog_core::LogTerm,
    },
}

/// trait for durable storage of a participant's log
///
/// this abstraction allows the same participant code to work with:
/// - real filesystem (native)
/// - in-memory (testing)
pub trait PersistedLog: Send {
    /// append entries after the current tail
    ///
    /// indices must be strictly increasing and terms non-decreasing, both
    /// within `entries` and relative to the stored tail.
    fn append(&mut self, entries: &[LogEntry]) -> Result<(), StorageError>;

    /// entries in index order starting at the first stored index >= `start`
    fn read(&self, start: LogIndex) -> Result<LogIter, StorageError>;

    /// drop every entry with index < `stop`
    fn remove_front(&mut self, stop: LogIndex) -> Result<(), StorageError>;

    /// drop every entry with index >= `start`
    fn remove_back(&mut self, start: LogIndex) -> Result<(), StorageError>;

    /// remove the whole log
    fn drop_log(&mut self) -> Result<(), StorageError>;
}

/// check that `entries` may be appended after `tail`
pub fn check_append(tail: Option<&LogEntry>, entries: &[LogEntry]) -> Result<(), StorageError> {
    let mut previous = tail;
    for entry in entries {
        if let Some(prev) = previous {
            if entry.index <= prev.index {
                return Err(StorageError::NonIncreasingIndex {
                    previous: prev.index,
                    offered: entry.index,
                });
            }
            if entry.term < prev.term {
                return Err(StorageError::TermWentBackwards {
                    index: entry.index,
                    previous: prev.term,
                    offered: entry.term,
                });
            }
        }
        previous = Some(entry);
    }
    Ok(())
}

// -- file log implementation --

/// file-based log using std::fs
///
/// keeps the entries in memory and rewrites `log.json` in the given
/// directory on every mutation, via temp file + rename so a crash never
/// leaves a half-written log behind.
pub struct FileLog {
    /// directory path for storing the log file
    dir: PathBuf,
    entries: BTreeMap<LogIndex, LogEntry>,
}

impl FileLog {
    /// open the log stored in `dir`, creating the directory if it doesn't exist
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let entries = load_entries(&dir.join("log.json"))?
            .into_iter()
            .map(|e| (e.index, e))
            .collect::<BTreeMap<_, _>>();
        debug!(dir = %dir.display(), entries = entries.len(), "opened file log");
        Ok(Self { dir, entries })
    }

    /// get the path to the log file
    fn log_path(&self) -> PathBuf {
        self.dir.join("log.json")
    }

    /// write `entries` to disk and only then make them the cached state
    fn replace_with(&mut self, entries: BTreeMap<LogIndex, LogEntry>) -> Result<(), StorageError> {
        Self::persist(&self.dir, &entries)?;
        self.entries = entries;
        Ok(())
    }

    fn persist(dir: &Path, entries: &BTreeMap<LogIndex, LogEntry>) -> Result<(), StorageError> {
        let log: Vec<&LogEntry> = entries.values().collect();
        let json = serde_json::to_string_pretty(&log)?;

        // atomic write: write to temp file then rename
        let temp_path = dir.join("log.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, dir.join("log.json"))?;

        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<LogEntry>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    Ok(serde_json::from_str(&contents)?)
}

impl PersistedLog for FileLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_append(self.entries.values().next_back(), entries)?;
        let mut next = self.entries.clone();
        for entry in entries {
            next.insert(entry.index, entry.clone());
        }
        self.replace_with(next)
    }

    fn read(&self, start: LogIndex) -> Result<LogIter, StorageError> {
        let snapshot: Vec<LogEntry> = self.entries.range(start..).map(|(_, e)| e.clone()).collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn remove_front(&mut self, stop: LogIndex) -> Result<(), StorageError> {
        let mut next = self.entries.clone();
        next.retain(|index, _| *index >= stop);
        self.replace_with(next)
    }

    fn remove_back(&mut self, start: LogIndex) -> Result<(), StorageError> {
        let mut next = self.entries.clone();
        next.retain(|index, _| *index < start);
        self.replace_with(next)
    }

    fn drop_log(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        match fs::remove_file(self.log_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// -- in-memory log implementation --

/// in-memory log for testing
///
/// stores all entries in an ordered map, no persistence across restarts
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    entries: BTreeMap<LogIndex, LogEntry>,
}

impl MemoryLog {
    /// create a new empty in-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// create a log that already holds `entries`
    pub fn with_entries(entries: impl IntoIterator<Item = LogEntry>) -> Result<Self, StorageError> {
        let mut log = Self::new();
        let entries: Vec<LogEntry> = entries.into_iter().collect();
        log.append(&entries)?;
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistedLog for MemoryLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<(), StorageError> {
        check_append(self.entries.values().next_back(), entries)?;
        for entry in entries {
            self.entries.insert(entry.index, entry.clone());
        }
        Ok(())
    }

    fn read(&self, start: LogIndex) -> Result<LogIter, StorageError> {
        let snapshot: Vec<LogEntry> = self.entries.range(start..).map(|(_, e)| e.clone()).collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn remove_front(&mut self, stop: LogIndex) -> Result<(), StorageError> {
        self.entries.retain(|index, _| *index >= stop);
        Ok(())
    }

    fn remove_back(&mut self, start: LogIndex) -> Result<(), StorageError> {
        self.entries.retain(|index, _| *index < start);
        Ok(())
    }

    fn drop_log(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Ok(())
    }
}
