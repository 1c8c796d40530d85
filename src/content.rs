use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    error::{FlowError, FlowErrorLocation, Result},
    model::Node,
};

/// Where the router should send the user for a page node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// Navigate to an application path.
    Path { path: String },
    /// Render CMS content in place. The HTML is passed through untouched.
    Content { page_id: String, html: String },
}

/// Looks up page content held by the CMS.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// HTML for `page_id`, `None` when the CMS has no such page.
    async fn page_html(&self, page_id: &str) -> Result<Option<String>>;
}

/// In-memory pages keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    pages: HashMap<String, String>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page_id: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(page_id.into(), html.into());
        self
    }
}

#[async_trait]
impl ContentResolver for StaticContent {
    async fn page_html(&self, page_id: &str) -> Result<Option<String>> {
        Ok(self.pages.get(page_id).cloned())
    }
}

/// Default route for a page node that names neither a path nor a CMS page.
pub fn node_route(flow_id: &str, node_id: &str) -> String {
    format!("/flow/{flow_id}/{node_id}")
}

/// `pagePath` wins; otherwise `pageId` is resolved through the CMS.
pub async fn resolve_destination(
    resolver: &dyn ContentResolver,
    flow_id: &str,
    node: &Node,
) -> Result<Destination> {
    if let Some(path) = &node.data.page_path {
        return Ok(Destination::Path { path: path.clone() });
    }
    if let Some(page_id) = &node.data.page_id {
        let html = resolver
            .page_html(page_id)
            .await?
            .ok_or_else(|| FlowError::Content {
                node_id: node.id.clone(),
                message: format!("page '{page_id}' not found"),
                location: FlowErrorLocation::at_path(format!("nodes.{}.data.pageId", node.id)),
            })?;
        return Ok(Destination::Content {
            page_id: page_id.clone(),
            html,
        });
    }
    Ok(Destination::Path {
        path: node_route(flow_id, &node.id),
    })
}
