//! In-memory mock platform client

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lambdabridge::{Artifact, FunctionHandle, PlatformClient, PlatformError, PublishMeta};

/// Programmable stand-in for the remote function platform.
///
/// Results are keyed by function identity: a plain name for by-name
/// invocation, or the ARN-style identity produced by [`MockPlatform::arn`]
/// for published functions.
#[derive(Default)]
pub struct MockPlatform {
    results: DashMap<String, Result<Bytes, String>>,
    invocations: DashMap<String, u64>,
    payloads: DashMap<String, Bytes>,
    publishes: AtomicU64,
    publish_failure: Mutex<Option<String>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity a publish of `name` will produce.
    pub fn arn(name: &str) -> String {
        format!("arn:aws:lambda:local:000000000000:function:{}", name)
    }

    /// Program a successful invoke result for an identity.
    pub fn set_result(&self, identity: impl Into<String>, result: impl Into<Bytes>) {
        self.results.insert(identity.into(), Ok(result.into()));
    }

    /// Program an invoke failure for an identity.
    pub fn set_error(&self, identity: impl Into<String>, message: impl Into<String>) {
        self.results.insert(identity.into(), Err(message.into()));
    }

    /// Make every subsequent publish fail with the given message.
    pub fn fail_publishes(&self, message: impl Into<String>) {
        *self.publish_failure.lock().unwrap() = Some(message.into());
    }

    /// How many times an identity was invoked.
    pub fn invocation_count(&self, identity: &str) -> u64 {
        self.invocations.get(identity).map(|c| *c).unwrap_or(0)
    }

    /// Total invocations across all identities.
    pub fn total_invocations(&self) -> u64 {
        self.invocations.iter().map(|c| *c.value()).sum()
    }

    /// Total publish calls.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }

    /// The payload most recently sent to an identity.
    pub fn last_payload(&self, identity: &str) -> Option<Bytes> {
        self.payloads.get(identity).map(|p| p.clone())
    }

    /// The payload most recently sent to an identity, parsed as JSON.
    pub fn last_payload_json(&self, identity: &str) -> Option<serde_json::Value> {
        self.last_payload(identity)
            .and_then(|p| serde_json::from_slice(&p).ok())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn invoke(&self, identity: &str, payload: Bytes) -> Result<Bytes, PlatformError> {
        *self.invocations.entry(identity.to_string()).or_insert(0) += 1;
        self.payloads.insert(identity.to_string(), payload);

        match self.results.get(identity) {
            Some(entry) => match entry.value() {
                Ok(result) => Ok(result.clone()),
                Err(message) => Err(PlatformError::new(message.clone())),
            },
            None => Err(PlatformError::new(format!(
                "function not found: {}",
                identity
            ))),
        }
    }

    async fn publish(
        &self,
        _artifact: &Artifact,
        meta: &PublishMeta,
    ) -> Result<FunctionHandle, PlatformError> {
        if let Some(message) = self.publish_failure.lock().unwrap().clone() {
            return Err(PlatformError::new(message));
        }

        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(FunctionHandle::new(Self::arn(&meta.function_name)))
    }
}
