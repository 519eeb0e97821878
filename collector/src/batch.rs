use serde_json::{
    Map,
    Value,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

pub const STATS_KEY: &str = "stats";
pub const SERVER_STATS_KEY: &str = "serverStats";
pub const ADMIN_STATS_KEY: &str = "adminUtilsServerStats";

/// Everything collected from one host group during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateBatch {
    accounts: BTreeMap<String, BTreeMap<String, Value>>,
    server_stats: Option<Value>,
    admin_stats: Option<Value>,
}

impl AggregateBatch {
    pub fn insert(&mut self, sink_key: impl Into<String>, shard: impl Into<String>, snapshot: Map<String, Value>) {
        self.accounts
            .entry(sink_key.into())
            .or_default()
            .insert(shard.into(), Value::Object(snapshot));
    }

    pub fn set_server_stats(&mut self, stats: Value) {
        self.server_stats = Some(stats);
    }

    pub fn set_admin_stats(&mut self, stats: Value) {
        self.admin_stats = Some(stats);
    }

    pub fn snapshot(&self, sink_key: &str, shard: &str) -> Option<&Value> {
        self.accounts.get(sink_key)?.get(shard)
    }

    pub fn snapshot_count(&self) -> usize {
        self.accounts.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.server_stats.is_none() && self.admin_stats.is_none()
    }

    /// The tree that is published, with every non-numeric leaf nulled:
    ///
    /// ```json
    /// { "stats": { "<sink key>": { "<shard>": { ... } } }, "serverStats": ..., "adminUtilsServerStats": ... }
    /// ```
    pub fn into_tree(self) -> Value {
        let mut tree = Map::new();
        if !self.accounts.is_empty() {
            let stats = self
                .accounts
                .into_iter()
                .map(|(key, shards)| (key, Value::Object(shards.into_iter().collect())))
                .collect();
            tree.insert(STATS_KEY.to_string(), Value::Object(stats));
        }
        if let Some(stats) = self.server_stats {
            tree.insert(SERVER_STATS_KEY.to_string(), stats);
        }
        if let Some(stats) = self.admin_stats {
            tree.insert(ADMIN_STATS_KEY.to_string(), stats);
        }
        let mut tree = Value::Object(tree);
        sanitize_numeric(&mut tree);
        tree
    }
}

/// Keeps numbers, objects and arrays; every other leaf becomes `null`.
pub fn sanitize_numeric(value: &mut Value) {
    match value {
        Value::Object(map) => map.values_mut().for_each(sanitize_numeric),
        Value::Array(items) => items.iter_mut().for_each(sanitize_numeric),
        Value::Number(_) => {}
        other => *other = Value::Null,
    }
}

/// Shared by the concurrent fetches of a host group. Each fetch owns a distinct
/// `(sink key, shard)` slot.
#[derive(Debug, Clone, Default)]
pub struct BatchWriter(Arc<Mutex<AggregateBatch>>);

impl BatchWriter {
    pub fn fold(&self, sink_key: impl Into<String>, shard: impl Into<String>, snapshot: Map<String, Value>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sink_key, shard, snapshot);
    }

    pub fn into_batch(self) -> AggregateBatch {
        match Arc::try_unwrap(self.0) {
            Ok(batch) => batch.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}
