//! # transaction
//!
//! why: the wire shape `[mutations, preconditions?, clientId?]` is what the log carries
//! relations: built by callers or parsed from log payloads, applied by store.rs
//! what: Transaction, ApplyResult

use crate::error::StoreError;
use crate::operation::Mutation;
use crate::precondition::{self, Preconditions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// outcome of one transaction, reported per entry of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyResult {
    Applied,
    PreconditionFailed,
    /// touched a protected top-level key
    Forbidden,
    /// could not be parsed; nothing was applied
    UnknownError,
}

impl ApplyResult {
    pub fn is_applied(self) -> bool {
        self == ApplyResult::Applied
    }
}

/// a write transaction in its raw json form
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub mutations: Value,
    pub preconditions: Option<Value>,
    pub client_id: Option<String>,
}

/// validated form, what the store actually applies
#[derive(Debug)]
pub(crate) struct ParsedTransaction {
    pub mutations: Vec<Mutation>,
    pub preconditions: Preconditions,
}

impl Transaction {
    pub fn write(mutations: Value) -> Self {
        Self {
            mutations,
            preconditions: None,
            client_id: None,
        }
    }

    pub fn with_precondition(mut self, preconditions: Value) -> Self {
        self.preconditions = Some(preconditions);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// parse `[mutations, preconditions?, clientId?]`
    ///
    /// a `null` precondition is the same as none.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        let parts = value
            .as_array()
            .filter(|parts| (1..=3).contains(&parts.len()))
            .ok_or_else(|| StoreError::malformed("a transaction is an array of one to three elements"))?;

        let preconditions = parts.get(1).filter(|p| !p.is_null()).cloned();
        let client_id = match parts.get(2) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(StoreError::malformed("client id must be a string")),
        };
        Ok(Self {
            mutations: parts[0].clone(),
            preconditions,
            client_id,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut parts = vec![self.mutations.clone()];
        if self.preconditions.is_some() || self.client_id.is_some() {
            parts.push(self.preconditions.clone().unwrap_or_else(|| Value::Object(Default::default())));
        }
        if let Some(id) = &self.client_id {
            parts.push(Value::String(id.clone()));
        }
        Value::Array(parts)
    }

    pub(crate) fn parse(&self) -> Result<ParsedTransaction, StoreError> {
        let mutations = self
            .mutations
            .as_object()
            .ok_or_else(|| StoreError::malformed("mutations must be an object"))?
            .iter()
            .map(|(key, value)| Mutation::parse(key, value))
            .collect::<Result<Vec<_>, _>>()?;

        let preconditions = match &self.preconditions {
            None => Vec::new(),
            Some(Value::Object(map)) => precondition::parse_all(map)?,
            Some(_) => return Err(StoreError::malformed("preconditions must be an object")),
        };
        Ok(ParsedTransaction {
            mutations,
            preconditions,
        })
    }
}

/// parse a batch, keeping per-transaction failures in place
pub fn parse_batch(value: &Value) -> Result<Vec<Result<Transaction, StoreError>>, StoreError> {
    let batch = value
        .as_array()
        .ok_or_else(|| StoreError::malformed("a transaction batch is an array"))?;
    Ok(batch.iter().map(Transaction::from_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_round_trips() {
        let txn = Transaction::write(json!({"a": 1}))
            .with_precondition(json!({"a": {"oldEmpty": true}}))
            .with_client_id("c-1");
        assert_eq!(Transaction::from_json(&txn.to_json()).unwrap(), txn);
        assert_eq!(Transaction::write(json!({})).to_json(), json!([{}]));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(Transaction::from_json(&json!({"a": 1})).is_err());
        assert!(Transaction::from_json(&json!([])).is_err());
        assert!(Transaction::from_json(&json!([{}, {}, "id", 4])).is_err());
        assert!(Transaction::from_json(&json!([{}, {}, 12])).is_err());
        assert!(Transaction::from_json(&json!([{}, null])).unwrap().preconditions.is_none());
    }

    #[test]
    fn parse_keeps_mutation_order() {
        let txn = Transaction::write(json!({"b": 1, "a": {"op": "delete"}}));
        let parsed = txn.parse().unwrap();
        assert_eq!(parsed.mutations.len(), 2);
        assert_eq!(parsed.mutations[0].path, vec!["b".to_string()]);
        assert!(Transaction::write(json!([1])).parse().is_err());
        assert!(Transaction::write(json!({}))
            .with_precondition(json!(3))
            .parse()
            .is_err());
    }

    #[test]
    fn results_serialize_as_codes() {
        assert_eq!(serde_json::to_value(ApplyResult::PreconditionFailed).unwrap(), json!("PRECONDITION_FAILED"));
        assert_eq!(serde_json::to_value(ApplyResult::Applied).unwrap(), json!("APPLIED"));
    }
}
