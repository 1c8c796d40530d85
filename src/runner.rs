//! Orchestration of a single flow instance: form submissions, automatic nodes and API calls.

use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

use crate::{
    api::{ApiFailurePolicy, ApiInvoker, HttpTransport, ReqwestTransport},
    config::RunnerConfig,
    content::{ContentResolver, Destination, StaticContent, resolve_destination},
    context::{ContextStore, FlowContext},
    error::{FlowError, FlowErrorLocation, Result},
    mapping::extract_and_map,
    model::{FlowDoc, Node},
    navigator::{Arrival, FlowNavigator},
    storage::{ContextPersistence, FileStorage, MemoryStorage},
};

/// One submitted form input. Only inputs bound to a context key end up in the context.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: Value,
    pub context_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSubmission {
    fields: Vec<FormField>,
}

impl FormSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input bound to `context_key` (the name doubles as the key).
    pub fn bind(mut self, context_key: impl Into<String>, value: Value) -> Self {
        let key = context_key.into();
        self.fields.push(FormField {
            name: key.clone(),
            value,
            context_key: Some(key),
        });
        self
    }

    /// Input without a context binding; it is ignored when building the patch.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value,
            context_key: None,
        });
        self
    }

    pub fn push(&mut self, field: FormField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Treat every key of a JSON object as a bound input.
    pub fn from_object(value: Value) -> Result<Self> {
        let patch = FlowContext::try_from(value)?;
        Ok(patch
            .as_map()
            .iter()
            .fold(Self::new(), |form, (key, value)| {
                form.bind(key.clone(), value.clone())
            }))
    }

    /// Patch built from bound inputs; later inputs win on duplicate keys.
    pub fn to_patch(&self) -> FlowContext {
        self.fields
            .iter()
            .filter_map(|field| {
                field
                    .context_key
                    .as_ref()
                    .map(|key| (key.clone(), field.value.clone()))
            })
            .collect()
    }
}

/// Result of handling one event, handed to the routing layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// A page node was reached; show `destination` and wait for the next submission.
    Render {
        node_id: String,
        destination: Destination,
    },
    /// An `end` node was reached.
    Complete { node_id: String },
    /// No outgoing edge matched; the instance stays on `node_id`.
    Halted { node_id: String },
}

impl StepOutcome {
    pub fn node_id(&self) -> &str {
        match self {
            StepOutcome::Render { node_id, .. }
            | StepOutcome::Complete { node_id }
            | StepOutcome::Halted { node_id } => node_id,
        }
    }
}

pub struct FlowRunnerBuilder {
    doc: FlowDoc,
    config: RunnerConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    content: Option<Arc<dyn ContentResolver>>,
    persistence: Option<Arc<dyn ContextPersistence>>,
}

impl FlowRunnerBuilder {
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn content(mut self, content: Arc<dyn ContentResolver>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn ContextPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Fails with `MissingStartNode`/`MultipleStartNodes` before any navigation happens.
    pub fn build(self) -> Result<FlowRunner> {
        let navigator = FlowNavigator::from_doc(self.doc);
        navigator.start_node()?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(Duration::from_millis(
                self.config.request_timeout_ms,
            ))?),
        };
        let persistence: Arc<dyn ContextPersistence> = match (self.persistence, &self.config.storage_dir) {
            (Some(persistence), _) => persistence,
            (None, Some(dir)) => Arc::new(FileStorage::new(dir.clone())),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let store = ContextStore::open(
            navigator.flow_id(),
            &self.config.storage_key_prefix,
            persistence,
        )?;

        let content: Arc<dyn ContentResolver> = match self.content {
            Some(content) => content,
            None => Arc::new(StaticContent::new()),
        };

        Ok(FlowRunner {
            invoker: ApiInvoker::new(transport).with_base_url(self.config.api_base_url.clone()),
            content,
            policy: self.config.api_failure_policy,
            max_auto_steps: self.config.max_auto_steps,
            navigator,
            store,
            current: None,
        })
    }
}

/// Drives one flow instance. Every event takes `&mut self`, so steps never interleave.
pub struct FlowRunner {
    navigator: FlowNavigator,
    store: ContextStore,
    invoker: ApiInvoker,
    content: Arc<dyn ContentResolver>,
    policy: ApiFailurePolicy,
    max_auto_steps: usize,
    current: Option<String>,
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("flow_id", &self.navigator.flow_id())
            .field("current", &self.current)
            .field("policy", &self.policy)
            .field("context", self.store.get())
            .finish_non_exhaustive()
    }
}

impl FlowRunner {
    pub fn builder(doc: FlowDoc) -> FlowRunnerBuilder {
        FlowRunnerBuilder {
            doc,
            config: RunnerConfig::default(),
            transport: None,
            content: None,
            persistence: None,
        }
    }

    pub fn navigator(&self) -> &FlowNavigator {
        &self.navigator
    }

    pub fn context(&self) -> &FlowContext {
        self.store.get()
    }

    pub fn current_node(&self) -> Option<&Node> {
        self.current
            .as_deref()
            .and_then(|id| self.navigator.node(id).ok())
    }

    /// Enter the flow at its start node and run automatic nodes up to the first page.
    pub async fn start(&mut self) -> Result<StepOutcome> {
        let start = self.navigator.start_node()?.id.clone();
        tracing::info!(flow_id = %self.navigator.flow_id(), start = %start, "flow started");
        self.arrive(start).await
    }

    /// Re-enter a persisted instance at `node_id` (for example after a page reload).
    pub async fn resume(&mut self, node_id: &str) -> Result<StepOutcome> {
        self.arrive(node_id.to_string()).await
    }

    /// Handle a form submitted on the current node.
    pub async fn submit(&mut self, form: &FormSubmission) -> Result<StepOutcome> {
        let current = self.current.clone().ok_or_else(|| FlowError::Internal {
            message: format!("flow '{}' has not been started", self.navigator.flow_id()),
            location: FlowErrorLocation::default(),
        })?;
        let node = self.navigator.node(&current)?;
        if Arrival::for_kind(node.kind) == Arrival::Complete {
            return Ok(StepOutcome::Complete { node_id: current });
        }

        let patch = form.to_patch();
        if !patch.is_empty() {
            self.store.merge(&patch)?;
        }
        if node.data.api.is_some() {
            apply_node_api(&self.invoker, &mut self.store, self.policy, node).await?;
        }

        let next = self.navigator.next(&current, self.store.get())?;
        match next {
            Some(target) => {
                let target = target.id.clone();
                self.arrive(target).await
            }
            None => Ok(StepOutcome::Halted { node_id: current }),
        }
    }

    /// Clear the context and forget the current node.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()?;
        self.current = None;
        Ok(())
    }

    async fn arrive(&mut self, mut node_id: String) -> Result<StepOutcome> {
        let entry = node_id.clone();
        let mut auto_steps = 0usize;
        loop {
            let node = self.navigator.node(&node_id)?;
            self.current = Some(node_id.clone());
            match Arrival::for_kind(node.kind) {
                Arrival::AwaitInput => {
                    let destination =
                        resolve_destination(self.content.as_ref(), self.navigator.flow_id(), node)
                            .await?;
                    return Ok(StepOutcome::Render {
                        node_id,
                        destination,
                    });
                }
                Arrival::Complete => {
                    tracing::info!(flow_id = %self.navigator.flow_id(), node_id = %node_id, "flow completed");
                    return Ok(StepOutcome::Complete { node_id });
                }
                Arrival::AutoAdvance => {}
            }

            auto_steps += 1;
            if auto_steps > self.max_auto_steps {
                return Err(FlowError::TraversalLimit {
                    node_id: entry,
                    limit: self.max_auto_steps,
                    location: FlowErrorLocation::at_path(format!("graph.nodes[{node_id}]")),
                });
            }

            if node.data.api.is_some() {
                apply_node_api(&self.invoker, &mut self.store, self.policy, node).await?;
            }
            match self.navigator.next(&node_id, self.store.get())? {
                Some(target) => node_id = target.id.clone(),
                None => return Ok(StepOutcome::Halted { node_id }),
            }
        }
    }
}

/// Invoke the node's API, map the response and merge it. Failures go through `policy`.
async fn apply_node_api(
    invoker: &ApiInvoker,
    store: &mut ContextStore,
    policy: ApiFailurePolicy,
    node: &Node,
) -> Result<()> {
    let Some(spec) = node.data.api.as_ref() else {
        return Ok(());
    };
    let result = invoker.invoke(spec, store.get()).await;
    let Some(response) = policy.decide(&node.id, result)? else {
        return Ok(());
    };
    match node.response_mapping() {
        Some(mapping) => {
            let patch = extract_and_map(&response, mapping);
            store.merge(&patch)?;
        }
        None => {
            tracing::debug!(node_id = %node.id, "api response ignored, node has no responseMapping");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_bound_fields_reach_the_patch() {
        let form = FormSubmission::new()
            .bind("email", json!("x@y.com"))
            .field("csrf", json!("token"))
            .bind("email", json!("z@y.com"));
        assert_eq!(form.to_patch().into_value(), json!({"email": "z@y.com"}));
    }

    #[test]
    fn from_object_binds_every_key() {
        let form = FormSubmission::from_object(json!({"a": 1, "b": "two"})).unwrap();
        assert_eq!(form.fields().len(), 2);
        assert_eq!(form.to_patch().into_value(), json!({"a": 1, "b": "two"}));
        assert!(FormSubmission::from_object(json!("nope")).is_err());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = StepOutcome::Render {
            node_id: "a".to_string(),
            destination: Destination::Path {
                path: "/signup".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "render", "node_id": "a", "destination": {"kind": "path", "path": "/signup"}})
        );
    }
}
