//! # precondition
//!
//! why: transactions only apply when the tree still looks the way the writer expects
//! relations: evaluated by store.rs against live nodes before any mutation
//! what: Precondition, check

use crate::error::StoreError;
use crate::json::json_eq;
use crate::path;
use serde_json::{Map, Value};

/// a single precondition clause on one path
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// node exists and equals the value
    Old(Value),
    /// `true`: node must be missing, `false`: node must exist
    OldEmpty(bool),
    IsArray(bool),
    /// node is an array containing the value
    In(Value),
    /// node is not an array containing the value
    NotIn(Value),
    /// node shares no element with the given array
    IntersectionEmpty(Vec<Value>),
    /// a clause nobody understands, always fails
    Unknown(String),
    /// a bare expected value, compared like `old`
    Equals(Value),
}

impl Precondition {
    /// parse all clauses for one path
    ///
    /// a non-object, or an empty object, is a plain equality check.
    pub fn parse(value: &Value) -> Result<Vec<Self>, StoreError> {
        let clauses = match value {
            Value::Object(map) if !map.is_empty() => map,
            other => return Ok(vec![Precondition::Equals(other.clone())]),
        };
        clauses.iter().map(|(key, arg)| Self::parse_clause(key, arg)).collect()
    }

    fn parse_clause(key: &str, arg: &Value) -> Result<Self, StoreError> {
        let clause = match key {
            "old" => Precondition::Old(arg.clone()),
            "oldEmpty" => Precondition::OldEmpty(
                arg.as_bool()
                    .ok_or_else(|| StoreError::malformed("oldEmpty takes a boolean"))?,
            ),
            "isArray" => Precondition::IsArray(
                arg.as_bool()
                    .ok_or_else(|| StoreError::malformed("isArray takes a boolean"))?,
            ),
            "in" => Precondition::In(arg.clone()),
            "notin" => Precondition::NotIn(arg.clone()),
            "intersectionEmpty" => Precondition::IntersectionEmpty(
                arg.as_array()
                    .cloned()
                    .ok_or_else(|| StoreError::malformed("intersectionEmpty takes an array"))?,
            ),
            other => Precondition::Unknown(other.to_owned()),
        };
        Ok(clause)
    }

    /// evaluate against the current live value, `None` when the node is missing
    pub fn holds(&self, current: Option<&Value>) -> bool {
        let array = current.and_then(Value::as_array);
        match self {
            Precondition::Old(expected) | Precondition::Equals(expected) => {
                current.is_some_and(|value| json_eq(value, expected))
            }
            Precondition::OldEmpty(empty) => current.is_none() == *empty,
            Precondition::IsArray(want) => array.is_some() == *want,
            Precondition::In(needle) => {
                array.is_some_and(|items| items.iter().any(|item| json_eq(item, needle)))
            }
            Precondition::NotIn(needle) => {
                !array.is_some_and(|items| items.iter().any(|item| json_eq(item, needle)))
            }
            Precondition::IntersectionEmpty(others) => array.map_or(true, |items| {
                !items
                    .iter()
                    .any(|item| others.iter().any(|other| json_eq(item, other)))
            }),
            Precondition::Unknown(_) => false,
        }
    }
}

/// all preconditions of a transaction, keyed by normalized path
pub type Preconditions = Vec<(Vec<String>, Vec<Precondition>)>;

pub fn parse_all(map: &Map<String, Value>) -> Result<Preconditions, StoreError> {
    map.iter()
        .map(|(key, value)| Ok((path::normalize(key), Precondition::parse(value)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(condition: Value, current: Option<Value>) -> bool {
        Precondition::parse(&condition)
            .unwrap()
            .iter()
            .all(|clause| clause.holds(current.as_ref()))
    }

    #[test]
    fn bare_values_mean_equality() {
        assert!(check(json!(12), Some(json!(12.0))));
        assert!(!check(json!(12), None));
        assert!(check(json!({}), Some(json!({}))));
        assert!(!check(json!({}), None));
    }

    #[test]
    fn old_and_old_empty() {
        assert!(check(json!({"old": [1, 2]}), Some(json!([1, 2]))));
        assert!(!check(json!({"old": 1}), Some(json!(2))));
        assert!(check(json!({"oldEmpty": true}), None));
        assert!(!check(json!({"oldEmpty": true}), Some(json!(0))));
        assert!(check(json!({"oldEmpty": false}), Some(json!(0))));
    }

    #[test]
    fn array_membership() {
        let current = Some(json!(["a", 2]));
        assert!(check(json!({"isArray": true}), current.clone()));
        assert!(check(json!({"isArray": false}), None));
        assert!(check(json!({"in": 2.0}), current.clone()));
        assert!(!check(json!({"in": "b"}), current.clone()));
        assert!(check(json!({"notin": "b"}), current.clone()));
        assert!(check(json!({"notin": "b"}), None));
        assert!(!check(json!({"in": "b"}), Some(json!("b"))));
    }

    #[test]
    fn intersection_empty() {
        assert!(check(json!({"intersectionEmpty": [3, 4]}), Some(json!([1, 2]))));
        assert!(!check(json!({"intersectionEmpty": [2, 4]}), Some(json!([1, 2]))));
        assert!(check(json!({"intersectionEmpty": [2]}), None));
        assert!(Precondition::parse(&json!({"intersectionEmpty": 2})).is_err());
    }

    #[test]
    fn clauses_combine_and_unknown_fails() {
        assert!(check(json!({"old": [1], "isArray": true}), Some(json!([1]))));
        assert!(!check(json!({"old": [1], "isArray": false}), Some(json!([1]))));
        assert!(!check(json!({"wat": 1}), Some(json!(1))));
    }
}
