use jsonschema::Draft;
use serde_json::Value;
use std::{collections::HashSet, fs, path::Path};

use crate::{
    condition::Condition,
    error::{FlowError, FlowErrorLocation, Result, SchemaErrorDetail},
    model::{FlowDoc, NodeKind},
};

const INLINE_SOURCE: &str = "<inline>";
const EMBEDDED_SCHEMA_LABEL: &str = "<embedded schema>";
const EMBEDDED_SCHEMA: &str = include_str!("../schemas/flow.schema.json");

/// Load a flow document from JSON text using the embedded schema.
pub fn load_flow_from_str(json: &str) -> Result<FlowDoc> {
    load_with_schema_text(json, EMBEDDED_SCHEMA, EMBEDDED_SCHEMA_LABEL, INLINE_SOURCE, None)
}

/// Load a flow document from a JSON file using the embedded schema.
pub fn load_flow_from_path(path: &Path) -> Result<FlowDoc> {
    let content = fs::read_to_string(path).map_err(|e| FlowError::Internal {
        message: format!("failed to read {}: {e}", path.display()),
        location: FlowErrorLocation::at_path(path.display().to_string())
            .with_source_path(Some(path)),
    })?;
    load_with_schema_text(
        &content,
        EMBEDDED_SCHEMA,
        EMBEDDED_SCHEMA_LABEL,
        path.display().to_string(),
        Some(path),
    )
}

/// Load an already-parsed CMS record.
pub fn load_flow_from_value(doc: Value) -> Result<FlowDoc> {
    load_value(doc, EMBEDDED_SCHEMA, EMBEDDED_SCHEMA_LABEL, INLINE_SOURCE, None)
}

pub(crate) fn load_with_schema_text(
    json: &str,
    schema_text: &str,
    schema_label: &str,
    source_label: impl Into<String>,
    source_path: Option<&Path>,
) -> Result<FlowDoc> {
    let source_label = source_label.into();
    let value: Value = serde_json::from_str(json).map_err(|e| FlowError::Json {
        message: e.to_string(),
        location: FlowErrorLocation::at_path(format!(
            "{source_label}:{}:{}",
            e.line(),
            e.column()
        ))
        .with_source_path(source_path),
    })?;
    load_value(value, schema_text, schema_label, source_label, source_path)
}

fn load_value(
    value: Value,
    schema_text: &str,
    schema_label: &str,
    source_label: impl Into<String>,
    source_path: Option<&Path>,
) -> Result<FlowDoc> {
    let source_label = source_label.into();
    validate_json(&value, schema_text, schema_label, &source_label, source_path)?;
    check_conditions(&value, &source_label, source_path)?;

    let flow: FlowDoc = serde_json::from_value(value).map_err(|e| FlowError::Json {
        message: e.to_string(),
        location: FlowErrorLocation::at_path(source_label.clone()).with_source_path(source_path),
    })?;

    let mut seen = HashSet::new();
    for (idx, node) in flow.graph.nodes.iter().enumerate() {
        if !seen.insert(node.id.as_str()) {
            return Err(FlowError::DuplicateNode {
                node_id: node.id.clone(),
                location: node_location(&source_label, source_path, idx),
            });
        }
    }

    let starts: Vec<String> = flow
        .graph
        .nodes
        .iter()
        .filter(|node| node.kind == NodeKind::Start)
        .map(|node| node.id.clone())
        .collect();
    match starts.len() {
        0 => {
            return Err(FlowError::MissingStartNode {
                flow_id: flow.id.clone(),
                location: FlowErrorLocation::at_path(format!("{source_label}::graph.nodes"))
                    .with_source_path(source_path),
            });
        }
        1 => {}
        _ => {
            return Err(FlowError::MultipleStartNodes {
                flow_id: flow.id.clone(),
                node_ids: starts,
                location: FlowErrorLocation::at_path(format!("{source_label}::graph.nodes"))
                    .with_source_path(source_path),
            });
        }
    }

    tracing::debug!(
        flow_id = %flow.id,
        nodes = flow.graph.nodes.len(),
        edges = flow.graph.edges.len(),
        "flow loaded"
    );
    Ok(flow)
}

/// Parse every edge condition up front so a bad expression names its edge.
fn check_conditions(doc: &Value, source_label: &str, source_path: Option<&Path>) -> Result<()> {
    let Some(edges) = doc.pointer("/graph/edges").and_then(Value::as_array) else {
        return Ok(());
    };
    for (idx, edge) in edges.iter().enumerate() {
        let raw = match edge.get("condition") {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(raw) => raw,
        };
        if let Err(e) = serde_json::from_value::<Condition>(raw.clone()) {
            let label = edge
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "{}->{}",
                        edge.get("source").and_then(Value::as_str).unwrap_or("?"),
                        edge.get("target").and_then(Value::as_str).unwrap_or("?")
                    )
                });
            let condition = match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(FlowError::InvalidCondition {
                edge: label,
                condition,
                message: e.to_string(),
                location: FlowErrorLocation::at_path(format!(
                    "{source_label}::graph.edges[{idx}].condition"
                ))
                .with_source_path(source_path)
                .with_json_pointer(Some(format!("/graph/edges/{idx}/condition"))),
            });
        }
    }
    Ok(())
}

fn validate_json(
    doc: &Value,
    schema_text: &str,
    schema_label: &str,
    source_label: &str,
    source_path: Option<&Path>,
) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_text).map_err(|e| FlowError::Internal {
        message: format!("schema parse for {schema_label}: {e}"),
        location: FlowErrorLocation::at_path(schema_label.to_string()),
    })?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|e| FlowError::Internal {
            message: format!("schema compile for {schema_label}: {e}"),
            location: FlowErrorLocation::at_path(schema_label.to_string()),
        })?;
    let details: Vec<SchemaErrorDetail> = validator
        .iter_errors(doc)
        .map(|e| {
            let pointer = e.instance_path().to_string();
            let pointer = if pointer.is_empty() {
                "/".to_string()
            } else {
                pointer
            };
            SchemaErrorDetail {
                message: e.to_string(),
                location: FlowErrorLocation::at_path(source_label.to_string())
                    .with_source_path(source_path)
                    .with_json_pointer(Some(pointer)),
            }
        })
        .collect();
    if !details.is_empty() {
        let message = details
            .iter()
            .map(|detail| {
                let where_str = detail
                    .location
                    .describe()
                    .unwrap_or_else(|| source_label.to_string());
                format!("{where_str}: {}", detail.message)
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Err(FlowError::Schema {
            message,
            details,
            location: FlowErrorLocation::at_path(source_label.to_string())
                .with_source_path(source_path),
        });
    }
    Ok(())
}

fn node_location(source_label: &str, source_path: Option<&Path>, idx: usize) -> FlowErrorLocation {
    FlowErrorLocation::at_path(format!("{source_label}::graph.nodes[{idx}]"))
        .with_source_path(source_path)
        .with_json_pointer(Some(format!("/graph/nodes/{idx}")))
}
