//! Error taxonomy and HTTP status mapping

use serde::Serialize;
use thiserror::Error;

/// Opaque collaborator failure (bundler, platform SDK, user hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The four failure classes of the dispatch layer.
///
/// Configuration and deployment failures are fatal at registration time and
/// never reach an HTTP response; setup and invocation failures are recovered
/// at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Deployment,
    Setup,
    Invocation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::Deployment => "DeploymentError",
            Self::Setup => "SetupError",
            Self::Invocation => "InvocationError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            // Registration-time kinds only show up over HTTP if a host
            // serves a router it was told not to serve.
            Self::Configuration | Self::Deployment => 500,
            Self::Setup | Self::Invocation => 500,
        }
    }

    /// Whether this kind aborts server startup rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration | Self::Deployment)
    }
}

/// A request-boundary error, rendered as a generic JSON body.
///
/// The underlying collaborator error is intentionally not included in the
/// body; callers log it and emit only the kind and a request id.
#[derive(Debug, Error)]
#[error("{}: request {request_id}", kind.as_str())]
pub struct RequestError {
    pub kind: ErrorKind,
    pub request_id: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, request_id: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
        }
    }

    /// Format as the generic JSON error body.
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            error: &'static str,
            request_id: &'a str,
        }

        let error = JsonError {
            error: self.kind.as_str(),
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","requestId":"{}"}}"#,
                self.kind.as_str(),
                self.request_id
            )
        })
    }
}
