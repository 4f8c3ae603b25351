//! # node
//!
//! why: hold the store's values as a tree so paths address subtrees, not just leaves
//! relations: built and mutated by store.rs, read by precondition.rs
//! what: Node, NodeValue, json conversion with expiry filtering

use crate::path;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// scalar or array, stored verbatim
    Leaf(Value),
    Object(BTreeMap<String, Node>),
}

impl NodeValue {
    /// children of this value, turning a leaf into an empty object first
    pub fn make_object(&mut self) -> &mut BTreeMap<String, Node> {
        match self {
            NodeValue::Object(children) => children,
            leaf => {
                *leaf = NodeValue::Object(BTreeMap::new());
                leaf.make_object()
            }
        }
    }
}

/// one path-addressed value, optionally expiring
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: NodeValue,
    pub ttl: Option<SystemTime>,
}

impl Default for Node {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl Node {
    pub fn empty_object() -> Self {
        Self {
            value: NodeValue::Object(BTreeMap::new()),
            ttl: None,
        }
    }

    pub fn leaf(value: Value) -> Self {
        Self {
            value: NodeValue::Leaf(value),
            ttl: None,
        }
    }

    /// build a subtree from a json value
    ///
    /// object keys are paths too: `{"a/b": 1}` becomes `a -> b -> 1`.
    /// arrays are leaves and are never looked into.
    pub fn from_json(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::leaf(value.clone());
        };
        let mut node = Self::empty_object();
        for (key, child) in map {
            let segments = path::normalize(key);
            *node.get_or_create(&segments) = Self::from_json(child);
        }
        node
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= now)
    }

    pub fn is_empty_object(&self) -> bool {
        matches!(&self.value, NodeValue::Object(children) if children.is_empty())
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match &self.value {
            NodeValue::Object(children) => Some(children),
            NodeValue::Leaf(_) => None,
        }
    }

    /// render as json, leaving out expired descendants
    pub fn to_json(&self, now: SystemTime) -> Value {
        match &self.value {
            NodeValue::Leaf(value) => value.clone(),
            NodeValue::Object(children) => Value::Object(
                children
                    .iter()
                    .filter(|(_, child)| !child.is_expired(now))
                    .map(|(key, child)| (key.clone(), child.to_json(now)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    pub fn get(&self, segments: &[String]) -> Option<&Node> {
        let mut node = self;
        for segment in segments {
            node = node.children()?.get(segment)?;
        }
        Some(node)
    }

    /// like [`get`](Self::get), but expired nodes count as missing
    pub fn get_live(&self, segments: &[String], now: SystemTime) -> Option<&Node> {
        if self.is_expired(now) {
            return None;
        }
        let mut node = self;
        for segment in segments {
            node = node.children()?.get(segment)?;
            if node.is_expired(now) {
                return None;
            }
        }
        Some(node)
    }

    pub fn get_mut(&mut self, segments: &[String]) -> Option<&mut Node> {
        let mut node = self;
        for segment in segments {
            node = match &mut node.value {
                NodeValue::Object(children) => children.get_mut(segment)?,
                NodeValue::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    /// walk to `segments`, creating empty objects on the way
    ///
    /// a leaf in the way is replaced by an object.
    pub fn get_or_create(&mut self, segments: &[String]) -> &mut Node {
        let mut node = self;
        for segment in segments {
            node = node.value.make_object().entry(segment.clone()).or_default();
        }
        node
    }

    /// detach the node at a non-empty path
    pub fn remove(&mut self, segments: &[String]) -> Option<Node> {
        let (last, parent) = segments.split_last()?;
        match &mut self.get_mut(parent)?.value {
            NodeValue::Object(children) => children.remove(last),
            NodeValue::Leaf(_) => None,
        }
    }
}
