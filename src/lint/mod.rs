mod reachable;

use crate::model::{FlowDoc, NodeKind};

pub use reachable::ReachableRule;

/// Run the structural lint rules over a loaded flow.
///
/// The loader already rejects documents that cannot run at all; these rules report
/// authoring mistakes that only surface on some paths through the graph.
pub fn lint_builtin_rules(flow: &FlowDoc) -> Vec<String> {
    let graph = &flow.graph;
    let mut errors = Vec::new();

    for (idx, edge) in graph.edges.iter().enumerate() {
        for (role, id) in [("source", &edge.source), ("target", &edge.target)] {
            if graph.node(id).is_none() {
                errors.push(format!(
                    "edge_endpoints_exist: edge #{idx} ({}) {role} '{id}' not found in nodes",
                    edge.describe()
                ));
            }
        }
    }

    for (idx, node) in graph.nodes.iter().enumerate() {
        match node.kind {
            NodeKind::End if graph.outgoing(&node.id).next().is_some() => {
                errors.push(format!(
                    "end_has_no_edges: node #{idx} ('{}') is an end node with outgoing edges",
                    node.id
                ));
            }
            NodeKind::ApiCondition if node.data.api.is_none() => {
                errors.push(format!(
                    "api_condition_has_api: node #{idx} ('{}') has no data.api",
                    node.id
                ));
            }
            NodeKind::Page if node.data.page_path.is_none() && node.data.page_id.is_none() => {
                errors.push(format!(
                    "page_has_content: node #{idx} ('{}') has neither pagePath nor pageId",
                    node.id
                ));
            }
            _ => {}
        }
    }

    errors.extend(ReachableRule::check(flow));
    errors
}
