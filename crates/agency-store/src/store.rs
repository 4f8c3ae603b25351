//! # store
//!
//! why: the key/value view clients read is the result of applying committed transactions in order
//! relations: owns the node.rs tree, applies transaction.rs batches, replays replog-core entries
//! what: Store, read and write entry points, ttl expiry, observer registry, client-id ledger

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::node::{Node, NodeValue};
use crate::operation::{self, Mutation, Operation};
use crate::path;
use crate::transaction::{self, ApplyResult, ParsedTransaction, Transaction};
use replog_core::{LogEntry, LogIndex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use tracing::{debug, warn};

/// observer urls keyed by canonical path string
pub type Observers = BTreeMap<String, BTreeSet<String>>;

/// per replayed log entry, the results of its transactions
pub type CommittedResults = Vec<(LogIndex, Vec<ApplyResult>)>;

/// Everything behind the store's lock.
#[derive(Debug, Default)]
struct StoreData {
    root: Node,
    /// expiry time to the paths that were given a ttl then
    time_table: BTreeMap<SystemTime, Vec<Vec<String>>>,
    observers: Observers,
    client_results: HashMap<String, ApplyResult>,
    client_order: VecDeque<String>,
    last_applied: LogIndex,
}

/// hierarchical json store driven by transactions
///
/// writers are serialized per batch; readers run concurrently and see the
/// state as of the last complete batch.
pub struct Store {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    inner: RwLock<StoreData>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: RwLock::new(StoreData::default()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, StoreData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -- writes --

    /// apply a batch of client transactions in order
    ///
    /// each transaction stands alone: a failed precondition or a forbidden
    /// path only rejects that transaction.
    pub fn apply_transactions(&self, transactions: &[Transaction]) -> Vec<ApplyResult> {
        let now = self.clock.now();
        let mut data = self.write_guard();
        data.expire(now, &self.config);
        transactions
            .iter()
            .map(|txn| data.apply(txn, now, &self.config, true))
            .collect()
    }

    /// wire form of [`apply_transactions`](Self::apply_transactions)
    ///
    /// takes `[[mutations, preconditions?, clientId?], ...]` and answers with
    /// one result code per transaction.
    pub fn apply_transactions_json(&self, batch: &Value) -> Result<Value, StoreError> {
        let parsed = transaction::parse_batch(batch)?;
        let now = self.clock.now();
        let mut data = self.write_guard();
        data.expire(now, &self.config);
        let results = parsed
            .iter()
            .map(|txn| match txn {
                Ok(txn) => data.apply(txn, now, &self.config, true),
                Err(err) => {
                    warn!(error = %err, "rejecting malformed transaction");
                    ApplyResult::UnknownError
                }
            })
            .collect::<Vec<_>>();
        Ok(serde_json::to_value(results)?)
    }

    /// replay committed log entries, each carrying a transaction batch
    ///
    /// entries at or below [`last_applied`](Self::last_applied) are skipped so
    /// replaying an overlapping range is harmless. protected keys are not
    /// checked here; the entries were admitted before they were replicated.
    pub fn apply_committed<I>(&self, entries: I) -> CommittedResults
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let now = self.clock.now();
        let mut data = self.write_guard();
        data.expire(now, &self.config);

        let mut applied = Vec::new();
        for entry in entries {
            if entry.index <= data.last_applied {
                debug!(index = %entry.index, "skipping entry that was already applied");
                continue;
            }
            data.last_applied = entry.index;
            let batch = match transaction::parse_batch(entry.payload.value()) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(index = %entry.index, error = %err, "committed entry is not a transaction batch");
                    continue;
                }
            };
            let results = batch
                .iter()
                .map(|txn| match txn {
                    Ok(txn) => data.apply(txn, now, &self.config, false),
                    Err(_) => ApplyResult::UnknownError,
                })
                .collect();
            applied.push((entry.index, results));
        }
        applied
    }

    /// prune every node whose ttl has passed
    pub fn expire(&self) {
        let now = self.clock.now();
        self.write_guard().expire(now, &self.config);
    }

    // -- reads --

    /// one result per query, each holding only the requested subtrees
    ///
    /// a query is a list of paths. missing paths contribute nothing but the
    /// part of their prefix that exists, rendered as empty objects.
    pub fn read(&self, queries: &[Vec<String>]) -> Vec<Value> {
        let now = self.clock.now();
        let data = self.read_guard();
        queries
            .iter()
            .map(|query| {
                let mut result = Value::Object(Map::new());
                for raw in query {
                    data.read_into(&mut result, &path::normalize(raw), now);
                }
                result
            })
            .collect()
    }

    /// wire form of [`read`](Self::read); a query may also be a single path string
    pub fn read_json(&self, queries: &Value) -> Result<Value, StoreError> {
        let queries = queries
            .as_array()
            .ok_or_else(|| StoreError::malformed("read expects an array of queries"))?
            .iter()
            .map(parse_query)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(self.read(&queries)))
    }

    /// live value at `path`, `None` when missing or expired
    pub fn get(&self, raw_path: &str) -> Option<Value> {
        let now = self.clock.now();
        let data = self.read_guard();
        data.root
            .get_live(&path::normalize(raw_path), now)
            .map(|node| node.to_json(now))
    }

    /// the whole live tree
    pub fn dump(&self) -> Value {
        let now = self.clock.now();
        self.read_guard().root_json(now)
    }

    pub fn observers(&self) -> Observers {
        self.read_guard().observers.clone()
    }

    /// last recorded result per client id, aligned with `client_ids`
    pub fn inquire(&self, client_ids: &[String]) -> Vec<Option<ApplyResult>> {
        let data = self.read_guard();
        client_ids
            .iter()
            .map(|id| data.client_results.get(id).copied())
            .collect()
    }

    pub fn last_applied(&self) -> LogIndex {
        self.read_guard().last_applied
    }
}

fn leaf_value(node: &Node) -> Option<&Value> {
    match &node.value {
        NodeValue::Leaf(value) => Some(value),
        NodeValue::Object(_) => None,
    }
}

fn parse_query(query: &Value) -> Result<Vec<String>, StoreError> {
    match query {
        Value::String(single) => Ok(vec![single.clone()]),
        Value::Array(paths) => paths
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| StoreError::malformed("read paths must be strings"))
            })
            .collect(),
        _ => Err(StoreError::malformed("a read query is a path or a list of paths")),
    }
}

/// walk into `target`, turning anything in the way into an object
fn object_at<'a>(target: &'a mut Value, segments: &[String]) -> &'a mut Value {
    let mut current = target;
    for segment in segments {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            break;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current
}

fn expiry_overflows(mutation: &Mutation, now: SystemTime) -> bool {
    match &mutation.operation {
        Operation::Set { ttl: Some(ttl), .. } => now.checked_add(*ttl).is_none(),
        _ => false,
    }
}

impl StoreData {
    fn apply(&mut self, txn: &Transaction, now: SystemTime, config: &StoreConfig, check_protected: bool) -> ApplyResult {
        let result = match txn.parse() {
            Err(err) => {
                warn!(error = %err, "transaction could not be parsed");
                ApplyResult::UnknownError
            }
            Ok(parsed) => self.apply_parsed(parsed, now, config, check_protected),
        };
        debug!(?result, client_id = ?txn.client_id, "transaction finished");
        if let Some(id) = &txn.client_id {
            self.record_client(id, result, config.client_id_history);
        }
        result
    }

    fn apply_parsed(
        &mut self,
        parsed: ParsedTransaction,
        now: SystemTime,
        config: &StoreConfig,
        check_protected: bool,
    ) -> ApplyResult {
        if parsed.mutations.iter().any(|m| expiry_overflows(m, now)) {
            warn!("ttl reaches past the representable time range");
            return ApplyResult::UnknownError;
        }
        if check_protected && parsed.mutations.iter().any(|m| touches_protected(m, config)) {
            return ApplyResult::Forbidden;
        }

        for (segments, clauses) in &parsed.preconditions {
            let current = self.root.get_live(segments, now).map(|node| node.to_json(now));
            if !clauses.iter().all(|clause| clause.holds(current.as_ref())) {
                return ApplyResult::PreconditionFailed;
            }
        }

        for mutation in parsed.mutations {
            self.apply_mutation(mutation, now, config);
        }
        ApplyResult::Applied
    }

    fn apply_mutation(&mut self, mutation: Mutation, now: SystemTime, config: &StoreConfig) {
        let Mutation { path: segments, operation } = mutation;
        match operation {
            Operation::Assign(value) => self.replace(&segments, Node::from_json(&value)),
            Operation::Set { new, ttl } => {
                if let Some(value) = new {
                    self.replace(&segments, Node::from_json(&value));
                }
                let Some(node) = self.root.get_mut(&segments) else {
                    return;
                };
                node.ttl = ttl.and_then(|ttl| now.checked_add(ttl));
                if let Some(at) = node.ttl {
                    self.time_table.entry(at).or_default().push(segments);
                }
            }
            Operation::Delete => self.delete(&segments, config),
            Operation::Observe(url) => {
                self.observers
                    .entry(path::to_path_string(&segments))
                    .or_default()
                    .insert(url);
            }
            Operation::Unobserve(url) => {
                let key = path::to_path_string(&segments);
                if let Some(urls) = self.observers.get_mut(&key) {
                    urls.remove(&url);
                    if urls.is_empty() {
                        self.observers.remove(&key);
                    }
                }
            }
            other if other.is_non_creating() => {
                // erase and replace only touch a node that is already there
                let Some(node) = self.root.get_mut(&segments) else {
                    return;
                };
                if let Some(value) = operation::transform(&other, leaf_value(node)) {
                    *node = Node::leaf(value);
                }
            }
            other => {
                let prior = self.root.get(&segments).and_then(leaf_value);
                if let Some(value) = operation::transform(&other, prior) {
                    self.replace(&segments, Node::leaf(value));
                }
            }
        }
    }

    /// put `node` at `segments`, dropping whatever was there, ttl included
    fn replace(&mut self, segments: &[String], node: Node) {
        *self.root.get_or_create(segments) = node;
    }

    fn delete(&mut self, segments: &[String], config: &StoreConfig) {
        if segments.is_empty() {
            self.root = Node::empty_object();
            return;
        }
        if self.root.remove(segments).is_some() && config.prune_empty_parents {
            self.prune_from(segments);
        }
    }

    /// drop ancestors of a removed node while they are empty and unobserved
    fn prune_from(&mut self, removed: &[String]) {
        let mut depth = removed.len().saturating_sub(1);
        while depth > 0 {
            let prefix = &removed[..depth];
            let prunable = self.root.get(prefix).is_some_and(Node::is_empty_object)
                && !self.observers.contains_key(&path::to_path_string(prefix));
            if !prunable {
                break;
            }
            self.root.remove(prefix);
            depth -= 1;
        }
    }

    fn expire(&mut self, now: SystemTime, config: &StoreConfig) {
        while let Some(entry) = self.time_table.first_entry() {
            if *entry.key() > now {
                break;
            }
            for segments in entry.remove() {
                // the node may have been rewritten or given a later ttl since
                let due = self
                    .root
                    .get(&segments)
                    .is_some_and(|node| node.is_expired(now));
                if due {
                    debug!(path = %path::to_path_string(&segments), "ttl expired");
                    self.delete(&segments, config);
                }
            }
        }
    }

    fn root_json(&self, now: SystemTime) -> Value {
        self.root
            .get_live(&[], now)
            .map_or_else(|| Value::Object(Map::new()), |root| root.to_json(now))
    }

    fn read_into(&self, result: &mut Value, segments: &[String], now: SystemTime) {
        if segments.is_empty() {
            *result = self.root_json(now);
            return;
        }
        if let Some(node) = self.root.get_live(segments, now) {
            *object_at(result, segments) = node.to_json(now);
            return;
        }
        // render the part of the path that exists as objects
        let mut node = &self.root;
        let mut depth = 0;
        for segment in segments {
            match node.children().and_then(|children| children.get(segment)) {
                Some(child) if !child.is_expired(now) && child.children().is_some() => {
                    node = child;
                    depth += 1;
                }
                _ => break,
            }
        }
        if depth > 0 {
            object_at(result, &segments[..depth]);
        }
    }

    fn record_client(&mut self, id: &str, result: ApplyResult, history: usize) {
        if history == 0 {
            return;
        }
        if self.client_results.insert(id.to_owned(), result).is_none() {
            self.client_order.push_back(id.to_owned());
        }
        while self.client_order.len() > history {
            if let Some(oldest) = self.client_order.pop_front() {
                self.client_results.remove(&oldest);
            }
        }
    }
}

/// whether a mutation writes below a protected top-level key
///
/// a root-level object assignment is checked by its own top-level keys.
fn touches_protected(mutation: &Mutation, config: &StoreConfig) -> bool {
    if let Some(first) = mutation.path.first() {
        return config.is_protected(first);
    }
    match mutation.operation.written_value() {
        Some(Value::Object(map)) => map
            .keys()
            .filter_map(|key| path::normalize(key).into_iter().next())
            .any(|first| config.is_protected(&first)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    fn write(store: &Store, mutations: Value) -> ApplyResult {
        store.apply_transactions(&[Transaction::write(mutations)])[0]
    }

    #[test]
    fn read_of_missing_path_is_empty() {
        let store = Store::default();
        assert_eq!(store.read(&[vec!["/x".into()]]), vec![json!({})]);
    }

    #[test]
    fn read_renders_existing_prefix() {
        let store = Store::default();
        write(&store, json!({"a/other": 1}));
        assert_eq!(store.read(&[vec!["/a/b/c".into()]]), vec![json!({"a": {}})]);
        assert_eq!(store.read(&[vec!["/a/other/deeper".into()]]), vec![json!({"a": {}})]);
    }

    #[test]
    fn read_merges_paths_of_one_query() {
        let store = Store::default();
        write(&store, json!({"a": {"b": 1, "c": 2}, "d": 3}));
        let result = store.read(&[vec!["/a/b".into(), "/d".into()], vec!["/".into()]]);
        assert_eq!(result[0], json!({"a": {"b": 1}, "d": 3}));
        assert_eq!(result[1], json!({"a": {"b": 1, "c": 2}, "d": 3}));
    }

    #[test]
    fn delete_prunes_unless_disabled() {
        let store = Store::default();
        write(&store, json!({"x/y": 1}));
        write(&store, json!({"x/y": {"op": "delete"}}));
        assert_eq!(store.dump(), json!({}));

        let keeping = Store::new(StoreConfig {
            prune_empty_parents: false,
            ..StoreConfig::default()
        });
        write(&keeping, json!({"x/y": 1}));
        write(&keeping, json!({"x/y": {"op": "delete"}}));
        assert_eq!(keeping.dump(), json!({"x": {}}));
    }

    #[test]
    fn observed_parents_survive_pruning() {
        let store = Store::default();
        write(&store, json!({"x/y": 1, "x": {"op": "observe", "url": "http://cb"}}));
        write(&store, json!({"x/y": {"op": "delete"}}));
        assert_eq!(store.dump(), json!({"x": {}}));
    }

    #[test]
    fn ttl_refresh_and_clear() {
        let clock = Arc::new(ManualClock::default());
        let store = Store::with_clock(StoreConfig::default(), clock.clone());

        write(&store, json!({"a": {"op": "set", "new": 1, "ttl": 5}}));
        write(&store, json!({"b": {"op": "set", "new": 1, "ttl": 5}}));
        clock.advance(Duration::from_secs(3));
        write(&store, json!({"a": {"op": "set", "ttl": 5}}));
        write(&store, json!({"b": 2}));
        clock.advance(Duration::from_secs(3));

        assert_eq!(store.dump(), json!({"a": 1, "b": 2}));
        clock.advance(Duration::from_secs(3));
        assert_eq!(store.get("a"), None);
        store.expire();
        assert_eq!(store.dump(), json!({"b": 2}));
    }

    #[test]
    fn client_history_is_bounded() {
        let store = Store::new(StoreConfig {
            client_id_history: 2,
            ..StoreConfig::default()
        });
        let txns: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| Transaction::write(json!({"k": 1})).with_client_id(*id))
            .collect();
        store.apply_transactions(&txns);
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            store.inquire(&ids),
            vec![None, Some(ApplyResult::Applied), Some(ApplyResult::Applied)]
        );
    }

    #[test]
    fn root_assignment_checks_protected_keys() {
        let store = Store::default();
        assert_eq!(write(&store, json!({"/": {".agency/x": 1}})), ApplyResult::Forbidden);
        assert_eq!(write(&store, json!({"/": {"agency": 1}})), ApplyResult::Applied);
    }
}
