use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use url::Url;

use crate::{
    context::FlowContext,
    error::{ApiError, FlowError, FlowErrorLocation, Result},
    model::{ApiSpec, HttpMethod},
    template::interpolate,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends the requests made by API nodes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, ApiError>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlowError::Internal {
                message: format!("build http client: {e}"),
                location: FlowErrorLocation::default(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, ApiError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };
        let url = request.url.to_string();
        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(|e| ApiError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            url,
            message: format!("read body: {e}"),
        })?;
        Ok(HttpResponse { status, body })
    }
}

/// What the orchestration step does when a node's API call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFailurePolicy {
    /// Log the failure and navigate with the context as it was before the call.
    #[default]
    #[serde(alias = "continue")]
    ContinueNavigation,
    /// Surface the failure to the caller and stay on the node.
    Halt,
}

impl ApiFailurePolicy {
    /// Turn a call result into the response to map, `None` when the failure is tolerated.
    pub fn decide(
        self,
        node_id: &str,
        result: std::result::Result<Value, ApiError>,
    ) -> Result<Option<Value>> {
        match (result, self) {
            (Ok(body), _) => Ok(Some(body)),
            (Err(err), ApiFailurePolicy::ContinueNavigation) => {
                tracing::warn!(node_id = %node_id, error = %err, "api call failed, continuing navigation");
                Ok(None)
            }
            (Err(err), ApiFailurePolicy::Halt) => Err(FlowError::Api {
                node_id: node_id.to_string(),
                source: err,
                location: FlowErrorLocation::at_path(format!("nodes.{node_id}.data.api")),
            }),
        }
    }
}

/// Performs the HTTP call attached to a node.
#[derive(Clone)]
pub struct ApiInvoker {
    transport: Arc<dyn HttpTransport>,
    base_url: Option<Url>,
}

impl std::fmt::Debug for ApiInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiInvoker")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiInvoker {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Resolve the url and render the body template; no I/O.
    pub fn build_request(
        &self,
        spec: &ApiSpec,
        ctx: &FlowContext,
    ) -> std::result::Result<HttpRequest, ApiError> {
        let url = self.resolve_url(&spec.url)?;
        let body = spec
            .body_template
            .as_deref()
            .map(|template| interpolate(template, ctx));
        let headers = if body.is_some() {
            vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())]
        } else {
            Vec::new()
        };
        Ok(HttpRequest {
            method: spec.method,
            url,
            headers,
            body,
        })
    }

    /// Send the request and parse the response body as JSON.
    pub async fn invoke(
        &self,
        spec: &ApiSpec,
        ctx: &FlowContext,
    ) -> std::result::Result<Value, ApiError> {
        let request = self.build_request(spec, ctx)?;
        let url = request.url.to_string();
        tracing::debug!(method = %request.method, url = %url, "invoking node api");
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status,
            });
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }

    fn resolve_url(&self, raw: &str) -> std::result::Result<Url, ApiError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| ApiError::InvalidUrl {
                    url: raw.to_string(),
                    message: "relative url and no api_base_url configured".to_string(),
                })?;
                base.join(raw).map_err(|e| ApiError::InvalidUrl {
                    url: raw.to_string(),
                    message: e.to_string(),
                })
            }
            Err(e) => Err(ApiError::InvalidUrl {
                url: raw.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        reply: Option<HttpResponse>,
    }

    #[async_trait]
    impl HttpTransport for Recorder {
        async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, ApiError> {
            let url = request.url.to_string();
            self.requests.lock().unwrap().push(request);
            self.reply.clone().ok_or(ApiError::Transport {
                url,
                message: "connection refused".to_string(),
            })
        }
    }

    fn spec(value: Value) -> ApiSpec {
        serde_json::from_value(value).unwrap()
    }

    fn ctx(value: Value) -> FlowContext {
        FlowContext::try_from(value).unwrap()
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn post_renders_body_and_sets_content_type() {
        let transport = Arc::new(Recorder {
            reply: Some(ok(r#"{"status":"ok"}"#)),
            ..Default::default()
        });
        let invoker = ApiInvoker::new(transport.clone())
            .with_base_url(Some(Url::parse("https://api.example.com/v1/").unwrap()));
        let body = invoker
            .invoke(
                &spec(json!({"method": "POST", "url": "check", "bodyTemplate": "{\"email\":\"{{email}}\"}"})),
                &ctx(json!({"email": "x@y.com"})),
            )
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok"}));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "https://api.example.com/v1/check");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"email":"x@y.com"}"#));
        assert_eq!(
            requests[0].headers,
            vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())]
        );
    }

    #[tokio::test]
    async fn get_without_template_has_no_body() {
        let transport = Arc::new(Recorder {
            reply: Some(ok("[]")),
            ..Default::default()
        });
        let invoker = ApiInvoker::new(transport.clone());
        invoker
            .invoke(&spec(json!({"url": "https://example.com/items"})), &FlowContext::new())
            .await
            .unwrap();
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert!(requests[0].body.is_none());
        assert!(requests[0].headers.is_empty());
    }

    #[tokio::test]
    async fn classifies_failures() {
        let relative = ApiInvoker::new(Arc::new(Recorder::default()))
            .invoke(&spec(json!({"url": "/check"})), &FlowContext::new())
            .await;
        assert!(matches!(relative, Err(ApiError::InvalidUrl { .. })));

        let refused = ApiInvoker::new(Arc::new(Recorder::default()))
            .invoke(&spec(json!({"url": "https://example.com"})), &FlowContext::new())
            .await;
        assert!(matches!(refused, Err(ApiError::Transport { .. })));

        let server_error = ApiInvoker::new(Arc::new(Recorder {
            reply: Some(HttpResponse {
                status: 502,
                body: "{}".to_string(),
            }),
            ..Default::default()
        }))
        .invoke(&spec(json!({"url": "https://example.com"})), &FlowContext::new())
        .await;
        assert!(matches!(server_error, Err(ApiError::Status { status: 502, .. })));

        let not_json = ApiInvoker::new(Arc::new(Recorder {
            reply: Some(ok("<html>")),
            ..Default::default()
        }))
        .invoke(&spec(json!({"url": "https://example.com"})), &FlowContext::new())
        .await;
        assert!(matches!(not_json, Err(ApiError::Decode { .. })));
    }

    #[test]
    fn policy_continue_swallows_errors() {
        let err = ApiError::Status {
            url: "https://example.com".to_string(),
            status: 500,
        };
        let decided = ApiFailurePolicy::ContinueNavigation.decide("b", Err(err));
        assert!(matches!(decided, Ok(None)));
        let passed = ApiFailurePolicy::ContinueNavigation.decide("b", Ok(json!(1)));
        assert!(matches!(passed, Ok(Some(_))));
    }

    #[test]
    fn policy_halt_surfaces_errors() {
        let err = ApiError::Decode {
            url: "https://example.com".to_string(),
            message: "eof".to_string(),
        };
        let decided = ApiFailurePolicy::Halt.decide("b", Err(err));
        assert!(matches!(decided, Err(FlowError::Api { ref node_id, .. }) if node_id == "b"));
    }
}
