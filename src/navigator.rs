use std::collections::HashMap;

use crate::{
    context::FlowContext,
    error::{FlowError, FlowErrorLocation, Result},
    model::{Edge, FlowDoc, FlowGraph, Node, NodeKind},
};

/// What the caller does after arriving on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Resolve the next node right away (start, condition and apiCondition nodes).
    AutoAdvance,
    /// Render the node's content and wait for a form submission.
    AwaitInput,
    /// Terminal node; the instance is finished.
    Complete,
}

impl Arrival {
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Start | NodeKind::Condition | NodeKind::ApiCondition => Arrival::AutoAdvance,
            NodeKind::Page => Arrival::AwaitInput,
            NodeKind::End => Arrival::Complete,
        }
    }
}

/// Read-only view over a flow graph that decides transitions.
#[derive(Debug, Clone)]
pub struct FlowNavigator {
    flow_id: String,
    graph: FlowGraph,
    index: HashMap<String, usize>,
}

impl FlowNavigator {
    pub fn new(flow_id: impl Into<String>, graph: FlowGraph) -> Self {
        let index = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id.clone(), idx))
            .collect();
        Self {
            flow_id: flow_id.into(),
            graph,
            index,
        }
    }

    pub fn from_doc(doc: FlowDoc) -> Self {
        Self::new(doc.id, doc.graph)
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn node(&self, node_id: &str) -> Result<&Node> {
        self.lookup(node_id, None)
    }

    /// The single `start` node of the graph.
    pub fn start_node(&self) -> Result<&Node> {
        let starts: Vec<&Node> = self.graph.start_nodes().collect();
        match starts.as_slice() {
            [start] => Ok(*start),
            [] => Err(FlowError::MissingStartNode {
                flow_id: self.flow_id.clone(),
                location: FlowErrorLocation::at_path("graph.nodes"),
            }),
            many => Err(FlowError::MultipleStartNodes {
                flow_id: self.flow_id.clone(),
                node_ids: many.iter().map(|node| node.id.clone()).collect(),
                location: FlowErrorLocation::at_path("graph.nodes"),
            }),
        }
    }

    /// First edge out of `node_id` whose condition holds, else the first unconditioned edge.
    pub fn select_edge(&self, node_id: &str, ctx: &FlowContext) -> Option<&Edge> {
        self.graph
            .outgoing(node_id)
            .find(|edge| {
                edge.condition
                    .as_ref()
                    .is_some_and(|condition| condition.evaluate(ctx))
            })
            .or_else(|| {
                self.graph
                    .outgoing(node_id)
                    .find(|edge| edge.condition.is_none())
            })
    }

    /// Decide the node that follows `node_id`; `None` means the flow stops here.
    pub fn next(&self, node_id: &str, ctx: &FlowContext) -> Result<Option<&Node>> {
        let current = self.node(node_id)?;
        if current.kind == NodeKind::End {
            return Ok(None);
        }
        let Some(edge) = self.select_edge(node_id, ctx) else {
            tracing::debug!(flow_id = %self.flow_id, node_id = %node_id, "no outgoing edge matched");
            return Ok(None);
        };
        let target = self.lookup(&edge.target, Some(node_id))?;
        tracing::debug!(
            flow_id = %self.flow_id,
            from = %node_id,
            to = %target.id,
            edge = %edge.describe(),
            "transition"
        );
        Ok(Some(target))
    }

    fn lookup(&self, node_id: &str, referenced_from: Option<&str>) -> Result<&Node> {
        self.index
            .get(node_id)
            .and_then(|idx| self.graph.nodes.get(*idx))
            .ok_or_else(|| FlowError::NodeNotFound {
                node_id: node_id.to_string(),
                referenced_from: referenced_from.map(str::to_string),
                location: FlowErrorLocation::at_path(match referenced_from {
                    Some(from) => format!("graph.edges[{from}->{node_id}]"),
                    None => format!("graph.nodes[{node_id}]"),
                }),
            })
    }
}
