use std::collections::{HashSet, VecDeque};

use crate::model::{FlowDoc, NodeKind};

/// Flags nodes that no path from the start node can reach.
#[derive(Clone, Debug, Default)]
pub struct ReachableRule;

impl ReachableRule {
    pub fn check(flow: &FlowDoc) -> Vec<String> {
        let graph = &flow.graph;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = graph
            .nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Start)
            .map(|node| node.id.as_str())
            .collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            for edge in graph.outgoing(id) {
                if !seen.contains(edge.target.as_str()) {
                    queue.push_back(edge.target.as_str());
                }
            }
        }

        graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !seen.contains(node.id.as_str()))
            .map(|(idx, node)| {
                format!(
                    "node_reachable: node #{idx} ('{}') cannot be reached from the start node",
                    node.id
                )
            })
            .collect()
    }
}
