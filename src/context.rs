use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::{
    error::{FlowError, FlowErrorLocation, Result},
    resolve::get_in_map,
    storage::{ContextPersistence, MemoryStorage, storage_key},
};

/// Accumulated key/value state of one running flow instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowContext(Map<String, Value>);

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dotted-path lookup (`user.address.city`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        get_in_map(&self.0, path)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Shallow key-wise overwrite: keys in `patch` replace ours, all other keys stay.
    pub fn merged(mut self, patch: &FlowContext) -> Self {
        self.merge_in(patch);
        self
    }

    fn merge_in(&mut self, patch: &FlowContext) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl From<Map<String, Value>> for FlowContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for FlowContext {
    type Error = FlowError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FlowError::InvalidPatch {
                found: value_kind(&other).to_string(),
                location: FlowErrorLocation::at_path("context"),
            }),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FlowContext {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Owns the context of one flow instance and writes every settled change through persistence.
pub struct ContextStore {
    flow_id: String,
    key: String,
    context: FlowContext,
    persistence: Arc<dyn ContextPersistence>,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("flow_id", &self.flow_id)
            .field("key", &self.key)
            .field("context", &self.context)
            .finish()
    }
}

impl ContextStore {
    /// Open the store for `flow_id`, restoring any previously persisted context.
    pub fn open(
        flow_id: impl Into<String>,
        key_prefix: &str,
        persistence: Arc<dyn ContextPersistence>,
    ) -> Result<Self> {
        let flow_id = flow_id.into();
        let key = storage_key(key_prefix, &flow_id);
        let context = persistence.load(&key)?.unwrap_or_default();
        tracing::debug!(flow_id = %flow_id, keys = context.len(), "context store opened");
        Ok(Self {
            flow_id,
            key,
            context,
            persistence,
        })
    }

    /// Non-persistent store, handy for previews and tests.
    pub fn in_memory(flow_id: impl Into<String>) -> Self {
        let flow_id = flow_id.into();
        Self {
            key: storage_key(crate::storage::DEFAULT_KEY_PREFIX, &flow_id),
            flow_id,
            context: FlowContext::new(),
            persistence: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Key under which the context is persisted.
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> &FlowContext {
        &self.context
    }

    /// The merged context is saved before it replaces the current one, so a failed save
    /// leaves the store unchanged.
    pub fn merge(&mut self, patch: &FlowContext) -> Result<&FlowContext> {
        let merged = self.context.clone().merged(patch);
        self.commit(merged)?;
        tracing::debug!(
            flow_id = %self.flow_id,
            patched = ?patch.keys().collect::<Vec<_>>(),
            "context merged"
        );
        Ok(&self.context)
    }

    /// Merge an arbitrary JSON value; anything but an object is rejected.
    pub fn merge_value(&mut self, patch: Value) -> Result<&FlowContext> {
        let patch = FlowContext::try_from(patch)?;
        self.merge(&patch)
    }

    pub fn reset(&mut self) -> Result<&FlowContext> {
        self.commit(FlowContext::new())?;
        tracing::debug!(flow_id = %self.flow_id, "context reset");
        Ok(&self.context)
    }

    fn commit(&mut self, next: FlowContext) -> Result<()> {
        self.persistence.save(&self.key, &next)?;
        self.context = next;
        Ok(())
    }
}
