//! # log
//!
//! why: the immutable unit that the leader replicates and the store consumes
//! relations: stored via replog-storage, shipped inside AppendEntriesRequest
//! what: LogPayload, LogEntry

use crate::index::{LogIndex, LogTerm};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// opaque client content carried by an entry
///
/// structured as json so the agency store can replay transactions
/// straight out of the log. equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogPayload(pub Value);

impl LogPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// size of the serialized payload in bytes
    pub fn byte_size(&self) -> usize {
        self.0.to_string().len()
    }
}

impl From<&str> for LogPayload {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_owned()))
    }
}

impl From<Value> for LogPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term of the leader that created this entry
    pub term: LogTerm,
    /// The index of this entry in the log (1-indexed)
    pub index: LogIndex,
    /// The client content
    pub payload: LogPayload,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: LogTerm, index: LogIndex, payload: impl Into<LogPayload>) -> Self {
        Self {
            term,
            index,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_from_str_is_json_string() {
        let payload = LogPayload::from("hello");
        assert_eq!(payload.value(), &json!("hello"));
        assert_eq!(payload.byte_size(), "\"hello\"".len());
    }

    #[test]
    fn entry_wire_shape() {
        let entry = LogEntry::new(LogTerm(2), LogIndex(5), json!({"a": 1}));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"term": 2, "index": 5, "payload": {"a": 1}}));
    }
}
