//! Per-request invocation pipeline
//!
//! Runs the optional setup hook, builds the invocation payload, calls the
//! remote platform through the cached handle or the configured name, runs
//! the optional completion hook, and finalizes the HTTP response. Every
//! failure is caught here; nothing propagates to the host server.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use lambdabridge_core::{BoxError, ErrorKind, RequestError, RequestId};

use crate::cache::{DeploymentCache, RouteId};
use crate::platform::{PlatformClient, PlatformError};

/// Request-time failures, recovered at the pipeline boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("setup hook failed: {0}")]
    Setup(#[source] BoxError),

    #[error("invocation failed: {0}")]
    Invocation(#[source] PlatformError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup(_) => ErrorKind::Setup,
            Self::Invocation(_) => ErrorKind::Invocation,
        }
    }
}

/// Snapshot of the inbound request handed to hooks and the default envelope.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    pub request_id: RequestId,
}

impl RequestContext {
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        body: Bytes,
    ) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            headers,
            query,
            body,
            request_id: RequestId::new(),
        }
    }

    /// Default invocation payload: the request, namespaced under its origin,
    /// suitable for reconstruction by the remote function.
    pub fn to_envelope(&self) -> serde_json::Value {
        let (body, is_base64_encoded) = if self.body.is_empty() {
            (None, false)
        } else {
            match std::str::from_utf8(&self.body) {
                Ok(text) => (Some(text.to_string()), false),
                Err(_) => (Some(general_purpose::STANDARD.encode(&self.body)), true),
            }
        };

        let envelope = InvocationEnvelope {
            request: EnvelopeRequest {
                method: &self.method,
                path: &self.path,
                headers: &self.headers,
                query: &self.query,
                body,
                is_base64_encoded,
            },
            request_id: self.request_id.as_str(),
        };

        serde_json::to_value(&envelope).unwrap_or_else(|_| serde_json::Value::Null)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvocationEnvelope<'a> {
    request: EnvelopeRequest<'a>,
    request_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRequest<'a> {
    method: &'a str,
    path: &'a str,
    headers: &'a HashMap<String, String>,
    query: &'a HashMap<String, String>,
    body: Option<String>,
    is_base64_encoded: bool,
}

/// Pre-invocation hook: its return value replaces the default payload
/// wholesale.
#[async_trait]
pub trait PayloadBuilder: Send + Sync {
    async fn build(&self, ctx: &RequestContext) -> Result<serde_json::Value, BoxError>;
}

/// Post-invocation hook: fully owns response construction, including on
/// error. It may convert a remote error into a success response or vice
/// versa.
#[async_trait]
pub trait ResponseFinalizer: Send + Sync {
    async fn finalize(
        &self,
        error: Option<&PipelineError>,
        result: Option<&Bytes>,
        ctx: &RequestContext,
    ) -> Response;
}

/// Per-route request orchestration, bound as the route's handler.
pub struct InvocationPipeline {
    route: RouteId,
    fallback_name: Option<String>,
    cache: Arc<DeploymentCache>,
    client: Arc<dyn PlatformClient>,
    setup: Option<Arc<dyn PayloadBuilder>>,
    complete: Option<Arc<dyn ResponseFinalizer>>,
}

impl InvocationPipeline {
    pub fn new(
        route: RouteId,
        fallback_name: Option<String>,
        cache: Arc<DeploymentCache>,
        client: Arc<dyn PlatformClient>,
        setup: Option<Arc<dyn PayloadBuilder>>,
        complete: Option<Arc<dyn ResponseFinalizer>>,
    ) -> Self {
        Self {
            route,
            fallback_name,
            cache,
            client,
            setup,
            complete,
        }
    }

    /// Run one request through setup, invocation and completion.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        match self.run(&ctx).await {
            Ok(result) => match &self.complete {
                Some(complete) => complete.finalize(None, Some(&result), &ctx).await,
                None => success_response(result),
            },
            Err(err) => {
                warn!(
                    route = %self.route,
                    request_id = %ctx.request_id,
                    error = %err,
                    "request failed"
                );
                match &self.complete {
                    Some(complete) => complete.finalize(Some(&err), None, &ctx).await,
                    None => error_response(&err, &ctx),
                }
            }
        }
    }

    async fn run(&self, ctx: &RequestContext) -> Result<Bytes, PipelineError> {
        // Setup must complete before invocation begins; a failure here
        // short-circuits without ever calling the platform.
        let payload = match &self.setup {
            Some(setup) => setup.build(ctx).await.map_err(PipelineError::Setup)?,
            None => ctx.to_envelope(),
        };

        let identity = self.resolve_identity().ok_or_else(|| {
            PipelineError::Invocation(PlatformError::new("route has no invocable target"))
        })?;

        debug!(
            route = %self.route,
            identity = %identity,
            request_id = %ctx.request_id,
            "invoking"
        );

        let payload = serde_json::to_vec(&payload)
            .map(Bytes::from)
            .map_err(|e| PipelineError::Setup(Box::new(e)))?;

        self.client
            .invoke(&identity, payload)
            .await
            .map_err(PipelineError::Invocation)
    }

    /// Cached deployed handle first, configured name otherwise.
    fn resolve_identity(&self) -> Option<String> {
        self.cache
            .get(&self.route)
            .map(|handle| handle.identity)
            .or_else(|| self.fallback_name.clone())
    }
}

fn success_response(result: Bytes) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(result))
        .unwrap()
}

fn error_response(err: &PipelineError, ctx: &RequestContext) -> Response {
    let status = StatusCode::from_u16(err.kind().http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = RequestError::new(err.kind(), ctx.request_id.as_str()).to_json();

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}
