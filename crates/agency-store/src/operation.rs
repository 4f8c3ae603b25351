//! # operation
//!
//! why: a transaction is validated completely before any of it touches the tree
//! relations: parsed by store.rs from mutation objects, applied to node.rs nodes
//! what: Operation, Mutation, parsing of op objects, value transforms

use crate::error::StoreError;
use crate::json::{add_numbers, json_eq, negate};
use crate::path;
use serde_json::{Number, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum EraseTarget {
    Value(Value),
    Position(usize),
}

/// one typed mutation, ready to apply
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// literal value, replaces the node
    Assign(Value),
    /// `new` replaces the node when present; `ttl` schedules expiry
    Set {
        new: Option<Value>,
        ttl: Option<Duration>,
    },
    Delete,
    Increment(Number),
    Push(Value),
    Prepend(Value),
    Pop,
    Shift,
    Erase(EraseTarget),
    Replace {
        val: Value,
        new: Value,
    },
    Observe(String),
    Unobserve(String),
}

impl Operation {
    /// operations that never materialize a missing node
    pub fn is_non_creating(&self) -> bool {
        matches!(
            self,
            Operation::Delete
                | Operation::Erase(_)
                | Operation::Replace { .. }
                | Operation::Observe(_)
                | Operation::Unobserve(_)
        ) || matches!(self, Operation::Set { new: None, .. })
    }

    /// literal values written by this operation, if any
    pub fn written_value(&self) -> Option<&Value> {
        match self {
            Operation::Assign(value) => Some(value),
            Operation::Set { new, .. } => new.as_ref(),
            _ => None,
        }
    }

    /// parse the right-hand side of a mutation clause
    ///
    /// only objects with an `op` key are operators; anything else is a literal.
    pub fn parse(value: &Value) -> Result<Self, StoreError> {
        let Some(op) = value.as_object().and_then(|o| o.get("op")) else {
            return Ok(Operation::Assign(value.clone()));
        };
        let op = op
            .as_str()
            .ok_or_else(|| StoreError::malformed("op must be a string"))?;

        let arg = |key: &str| value.get(key);
        let required = |key: &str| {
            arg(key)
                .cloned()
                .ok_or_else(|| StoreError::malformed(format!("operator {op} needs '{key}'")))
        };

        let operation = match op {
            "set" => Operation::Set {
                new: arg("new").cloned(),
                ttl: arg("ttl").map(parse_ttl).transpose()?,
            },
            "delete" => Operation::Delete,
            "increment" => Operation::Increment(parse_step(arg("step"))?),
            "decrement" => Operation::Increment(negate(&parse_step(arg("step"))?)),
            "push" => Operation::Push(required("new")?),
            "prepend" => Operation::Prepend(required("new")?),
            "pop" => Operation::Pop,
            "shift" => Operation::Shift,
            "erase" => match (arg("val"), arg("pos")) {
                (Some(val), _) => Operation::Erase(EraseTarget::Value(val.clone())),
                (None, Some(pos)) => {
                    let pos = pos
                        .as_u64()
                        .and_then(|p| usize::try_from(p).ok())
                        .ok_or_else(|| StoreError::malformed("erase pos must be a non-negative integer"))?;
                    Operation::Erase(EraseTarget::Position(pos))
                }
                (None, None) => return Err(StoreError::malformed("erase needs 'val' or 'pos'")),
            },
            "replace" => Operation::Replace {
                val: required("val")?,
                new: required("new")?,
            },
            "observe" => Operation::Observe(parse_url(arg("url"))?),
            "unobserve" => Operation::Unobserve(parse_url(arg("url"))?),
            other => return Err(StoreError::malformed(format!("unknown operator {other}"))),
        };
        Ok(operation)
    }
}

fn parse_ttl(value: &Value) -> Result<Duration, StoreError> {
    value
        .as_f64()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| StoreError::malformed("ttl must be a positive number of seconds"))
}

fn parse_step(value: Option<&Value>) -> Result<Number, StoreError> {
    match value {
        None => Ok(Number::from(1)),
        Some(Value::Number(step)) => Ok(step.clone()),
        Some(_) => Err(StoreError::malformed("step must be a number")),
    }
}

fn parse_url(value: Option<&Value>) -> Result<String, StoreError> {
    value
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StoreError::malformed("observer url must be a string"))
}

/// a path together with what to do there
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub path: Vec<String>,
    pub operation: Operation,
}

impl Mutation {
    pub fn parse(key: &str, value: &Value) -> Result<Self, StoreError> {
        Ok(Self {
            path: path::normalize(key),
            operation: Operation::parse(value)?,
        })
    }
}

/// the prior value seen by array operators: anything that is not an array
/// counts as empty and is discarded
fn as_array(prior: Option<&Value>) -> Vec<Value> {
    match prior {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// new leaf value for the value-transforming operators
///
/// `prior` is the current leaf, `None` for missing or object nodes.
/// returns `None` for operators that do not produce a leaf.
pub fn transform(operation: &Operation, prior: Option<&Value>) -> Option<Value> {
    let value = match operation {
        Operation::Increment(step) => match prior {
            Some(Value::Number(base)) => add_numbers(base, step),
            _ => add_numbers(&Number::from(0), step),
        },
        Operation::Push(new) => {
            let mut items = as_array(prior);
            items.push(new.clone());
            Value::Array(items)
        }
        Operation::Prepend(new) => {
            let mut items = as_array(prior);
            items.insert(0, new.clone());
            Value::Array(items)
        }
        Operation::Pop => {
            let mut items = as_array(prior);
            items.pop();
            Value::Array(items)
        }
        Operation::Shift => {
            let mut items = as_array(prior);
            if !items.is_empty() {
                items.remove(0);
            }
            Value::Array(items)
        }
        Operation::Erase(EraseTarget::Value(val)) => {
            let mut items = as_array(prior);
            items.retain(|item| !json_eq(item, val));
            Value::Array(items)
        }
        Operation::Erase(EraseTarget::Position(pos)) => {
            let mut items = as_array(prior);
            if *pos < items.len() {
                items.remove(*pos);
            }
            Value::Array(items)
        }
        Operation::Replace { val, new } => Value::Array(
            as_array(prior)
                .into_iter()
                .map(|item| if json_eq(&item, val) { new.clone() } else { item })
                .collect(),
        ),
        Operation::Assign(_)
        | Operation::Set { .. }
        | Operation::Delete
        | Operation::Observe(_)
        | Operation::Unobserve(_) => return None,
    };
    Some(value)
}
