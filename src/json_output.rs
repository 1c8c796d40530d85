use serde::Serialize;
use std::path::Path;

use crate::{
    error::{FlowError, FlowErrorLocation},
    lint::lint_builtin_rules,
    loader::{load_flow_from_path, load_flow_from_str},
    model::FlowDoc,
};

#[derive(Serialize, Clone, Debug)]
pub struct JsonDiagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_pointer: Option<String>,
}

impl JsonDiagnostic {
    pub fn from_location(message: String, location: FlowErrorLocation) -> Self {
        let FlowErrorLocation {
            path,
            source_path,
            json_pointer,
        } = location;
        JsonDiagnostic {
            message,
            source_path: source_path
                .as_ref()
                .map(|p| p.display().to_string())
                .or(path),
            json_pointer,
        }
    }

    pub fn from_message(message: String, source_path: Option<String>) -> Self {
        JsonDiagnostic {
            message,
            source_path,
            json_pointer: None,
        }
    }
}

/// Summary of a flow that loaded cleanly.
#[derive(Serialize, Clone, Debug)]
pub struct FlowSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub nodes: usize,
    pub edges: usize,
    pub start: Option<String>,
}

impl From<&FlowDoc> for FlowSummary {
    fn from(flow: &FlowDoc) -> Self {
        FlowSummary {
            id: flow.id.clone(),
            title: flow.title.clone(),
            nodes: flow.graph.nodes.len(),
            edges: flow.graph.edges.len(),
            start: flow.graph.start_nodes().next().map(|node| node.id.clone()),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ValidateJsonOutput {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<JsonDiagnostic>,
}

impl ValidateJsonOutput {
    pub fn success(flow: &FlowDoc) -> Self {
        ValidateJsonOutput {
            ok: true,
            flow: Some(FlowSummary::from(flow)),
            errors: Vec::new(),
        }
    }

    pub fn lint_failure(flow: &FlowDoc, messages: Vec<String>, source_path: Option<String>) -> Self {
        let errors = messages
            .into_iter()
            .map(|message| JsonDiagnostic::from_message(message, source_path.clone()))
            .collect();
        ValidateJsonOutput {
            ok: false,
            flow: Some(FlowSummary::from(flow)),
            errors,
        }
    }

    pub fn error(err: FlowError) -> Self {
        ValidateJsonOutput {
            ok: false,
            flow: None,
            errors: flow_error_to_reports(err),
        }
    }

    pub fn into_string(self) -> String {
        serde_json::to_string(&self).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"errors":[{{"message":"serialize diagnostics: {e}"}}]}}"#)
        })
    }
}

pub fn flow_error_to_reports(err: FlowError) -> Vec<JsonDiagnostic> {
    let display_message = err.to_string();
    match err {
        FlowError::Schema {
            details, location, ..
        } => {
            if details.is_empty() {
                vec![JsonDiagnostic::from_location(display_message, location)]
            } else {
                details
                    .into_iter()
                    .map(|detail| JsonDiagnostic::from_location(detail.message, detail.location))
                    .collect()
            }
        }
        other => {
            let location = other.location().clone();
            vec![JsonDiagnostic::from_location(display_message, location)]
        }
    }
}

/// Load and lint `json`, reporting the outcome as a single JSON document.
pub fn validate_to_json(json: &str) -> ValidateJsonOutput {
    report(load_flow_from_str(json), None)
}

/// Same as [`validate_to_json`] for a file on disk.
pub fn validate_path_to_json(path: &Path) -> ValidateJsonOutput {
    report(load_flow_from_path(path), Some(path.display().to_string()))
}

fn report(loaded: crate::error::Result<FlowDoc>, source_path: Option<String>) -> ValidateJsonOutput {
    match loaded {
        Ok(flow) => {
            let lint_errors = lint_builtin_rules(&flow);
            if lint_errors.is_empty() {
                ValidateJsonOutput::success(&flow)
            } else {
                ValidateJsonOutput::lint_failure(&flow, lint_errors, source_path)
            }
        }
        Err(err) => ValidateJsonOutput::error(err),
    }
}
