//! Remote platform client seam
//!
//! The actual platform SDK is an external collaborator; this module defines
//! the surface the plugin calls and the opaque error it passes through.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use lambdabridge_core::BoxError;

use crate::config::Runtime;

/// Opaque failure from the platform SDK, surfaced verbatim.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct PlatformError(BoxError);

impl PlatformError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }

    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

/// Handle to a published remote function
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    /// Platform-assigned function identity (ARN-style)
    pub identity: String,
    pub version: String,
    pub published_at: DateTime<Utc>,
}

impl FunctionHandle {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            version: "$LATEST".to_string(),
            published_at: Utc::now(),
        }
    }
}

/// A packaged deployable archive
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Zip archive bytes
    pub data: Bytes,
    /// Base64-encoded SHA-256 of the archive
    pub sha256: String,
    /// Handler string, `{file_stem}.{export}`
    pub handler: String,
    pub size: i64,
}

/// Runtime metadata forwarded alongside a publish call
#[derive(Debug, Clone)]
pub struct PublishMeta {
    pub function_name: String,
    pub role: String,
    pub runtime: Runtime,
    pub handler: String,
    pub memory_size: i32,
    pub timeout: i32,
    pub environment: HashMap<String, String>,
}

/// Calls produced against the remote function platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Invoke a remote function with a JSON payload
    async fn invoke(&self, identity: &str, payload: Bytes) -> Result<Bytes, PlatformError>;

    /// Publish a packaged artifact as a new remote function
    async fn publish(
        &self,
        artifact: &Artifact,
        meta: &PublishMeta,
    ) -> Result<FunctionHandle, PlatformError>;
}
