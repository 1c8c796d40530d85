use std::path::{Path, PathBuf};

use thiserror::Error;

/// Where in a flow document (or on disk) an error was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowErrorLocation {
    pub path: Option<String>,
    pub source_path: Option<PathBuf>,
    pub json_pointer: Option<String>,
}

impl FlowErrorLocation {
    pub fn new(
        path: Option<String>,
        source_path: Option<PathBuf>,
        json_pointer: Option<String>,
    ) -> Self {
        Self {
            path,
            source_path,
            json_pointer,
        }
    }

    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_source_path(mut self, source_path: Option<&Path>) -> Self {
        self.source_path = source_path.map(Path::to_path_buf);
        self
    }

    pub fn with_json_pointer(mut self, pointer: Option<String>) -> Self {
        self.json_pointer = pointer;
        self
    }

    /// Human readable location, preferring the on-disk path when known.
    pub fn describe(&self) -> Option<String> {
        let base = self
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| self.path.clone())?;
        match &self.json_pointer {
            Some(pointer) if !base.ends_with(pointer.as_str()) => Some(format!("{base}{pointer}")),
            _ => Some(base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaErrorDetail {
    pub message: String,
    pub location: FlowErrorLocation,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("JSON parse error at {}: {message}", .location.describe().unwrap_or_default())]
    Json {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Schema validation failed:\n{message}")]
    Schema {
        message: String,
        details: Vec<SchemaErrorDetail>,
        location: FlowErrorLocation,
    },
    #[error("Flow '{flow_id}' has no start node")]
    MissingStartNode {
        flow_id: String,
        location: FlowErrorLocation,
    },
    #[error("Flow '{flow_id}' has more than one start node: {}", .node_ids.join(", "))]
    MultipleStartNodes {
        flow_id: String,
        node_ids: Vec<String>,
        location: FlowErrorLocation,
    },
    #[error("Node id '{node_id}' is defined more than once")]
    DuplicateNode {
        node_id: String,
        location: FlowErrorLocation,
    },
    #[error("Invalid condition '{condition}' on edge {edge}: {message}")]
    InvalidCondition {
        edge: String,
        condition: String,
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Node '{node_id}' not found{}", .referenced_from.as_ref().map(|from| format!(" (referenced from '{from}')")).unwrap_or_default())]
    NodeNotFound {
        node_id: String,
        referenced_from: Option<String>,
        location: FlowErrorLocation,
    },
    #[error("Automatic traversal exceeded {limit} steps starting at node '{node_id}'")]
    TraversalLimit {
        node_id: String,
        limit: usize,
        location: FlowErrorLocation,
    },
    #[error("Context patch must be a JSON object, got {found}")]
    InvalidPatch {
        found: String,
        location: FlowErrorLocation,
    },
    #[error("Context persistence failed: {message}")]
    Persistence {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Content resolution for node '{node_id}' failed: {message}")]
    Content {
        node_id: String,
        message: String,
        location: FlowErrorLocation,
    },
    #[error("API call for node '{node_id}' failed: {source}")]
    Api {
        node_id: String,
        #[source]
        source: ApiError,
        location: FlowErrorLocation,
    },
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: FlowErrorLocation,
    },
}

impl FlowError {
    pub fn location(&self) -> &FlowErrorLocation {
        match self {
            FlowError::Json { location, .. }
            | FlowError::Schema { location, .. }
            | FlowError::MissingStartNode { location, .. }
            | FlowError::MultipleStartNodes { location, .. }
            | FlowError::DuplicateNode { location, .. }
            | FlowError::InvalidCondition { location, .. }
            | FlowError::NodeNotFound { location, .. }
            | FlowError::TraversalLimit { location, .. }
            | FlowError::InvalidPatch { location, .. }
            | FlowError::Persistence { location, .. }
            | FlowError::Content { location, .. }
            | FlowError::Api { location, .. }
            | FlowError::Internal { location, .. } => location,
        }
    }

    /// Errors caused by the flow definition itself, as opposed to a single running instance.
    ///
    /// Callers render these as a "Flow Configuration Error" panel for the author.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FlowError::Json { .. }
                | FlowError::Schema { .. }
                | FlowError::MissingStartNode { .. }
                | FlowError::MultipleStartNodes { .. }
                | FlowError::DuplicateNode { .. }
                | FlowError::InvalidCondition { .. }
                | FlowError::NodeNotFound { .. }
                | FlowError::TraversalLimit { .. }
        )
    }
}

/// Failure of a single API call made on behalf of a node.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
}

pub type Result<T> = std::result::Result<T, FlowError>;
