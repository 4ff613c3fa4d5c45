//! Integration tests for the lambda dispatch plugin
//!
//! These drive a registered axum router end to end against the mock
//! platform client.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use lambdabridge::{
    BoxError, ConfigError, DeploySpec, LambdaRoute, LambdaSpec, PayloadBuilder, PipelineError,
    PlatformConfig, PluginConfig, RegisterError, Registrar, RequestContext, ResponseFinalizer,
    RouteLambda, Runtime,
};
use lambdabridge_test::MockPlatform;

fn plugin_config(with_platform: bool) -> PluginConfig {
    PluginConfig {
        role: "arn:aws:iam::000000000000:role/dispatch".to_string(),
        platform: with_platform.then(|| PlatformConfig {
            region: "us-east-1".to_string(),
            endpoint: None,
        }),
    }
}

fn named_spec(name: &str) -> LambdaSpec {
    LambdaSpec {
        name: Some(name.to_string()),
        deploy: None,
    }
}

fn deploy_spec(source: PathBuf) -> DeploySpec {
    DeploySpec {
        source,
        export: "handler".to_string(),
        runtime: Runtime::Nodejs20,
        memory_size: 128,
        timeout: 3,
        environment: HashMap::new(),
    }
}

fn write_handler_source(dir: &tempfile::TempDir) -> PathBuf {
    let source = dir.path().join("greet.js");
    std::fs::write(&source, b"exports.handler = async () => ({ ok: true });").unwrap();
    source
}

async fn get(router: Router, path: &str) -> (StatusCode, Bytes) {
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

// === Hooks used by the scenarios ===

struct StaticPayload(serde_json::Value);

#[async_trait]
impl PayloadBuilder for StaticPayload {
    async fn build(&self, _ctx: &RequestContext) -> Result<serde_json::Value, BoxError> {
        Ok(self.0.clone())
    }
}

struct FailingSetup;

#[async_trait]
impl PayloadBuilder for FailingSetup {
    async fn build(&self, _ctx: &RequestContext) -> Result<serde_json::Value, BoxError> {
        Err("setup exploded".into())
    }
}

/// Always answers 418, masking errors and wrapping successes.
struct TeapotFinalizer;

#[async_trait]
impl ResponseFinalizer for TeapotFinalizer {
    async fn finalize(
        &self,
        error: Option<&PipelineError>,
        result: Option<&Bytes>,
        _ctx: &RequestContext,
    ) -> Response {
        let body = match (error, result) {
            (Some(err), _) => format!("masked: {}", err),
            (None, Some(result)) => format!("wrapped: {}", String::from_utf8_lossy(result)),
            (None, None) => "empty".to_string(),
        };
        Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .body(Body::from(body))
            .unwrap()
    }
}

// === Registration ===

#[tokio::test]
async fn registration_rejects_route_without_name_or_deploy() {
    let platform = Arc::new(MockPlatform::new());
    let registrar = Registrar::new(plugin_config(true), platform);

    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(LambdaSpec::default()),
    );
    let result = registrar.register(Router::new(), vec![route]).await;

    assert!(matches!(
        result,
        Err(RegisterError::Config {
            source: ConfigError::MissingTarget,
            ..
        })
    ));
}

#[tokio::test]
async fn registration_fails_when_publish_fails() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_handler_source(&dir);

    let platform = Arc::new(MockPlatform::new());
    platform.fail_publishes("bundler blew up");

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(LambdaSpec {
            name: None,
            deploy: Some(deploy_spec(source)),
        }),
    );

    let result = registrar.register(Router::new(), vec![route]).await;
    match result {
        Err(RegisterError::Deploy { route, source }) => {
            assert_eq!(route.as_str(), "GET /foo");
            assert!(source.to_string().contains("bundler blew up"));
        }
        other => panic!("expected deploy failure, got {:?}", other.map(|_| "router")),
    }
    assert_eq!(platform.total_invocations(), 0);
}

#[tokio::test]
async fn deploy_without_credentials_requires_name_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_handler_source(&dir);

    let platform = Arc::new(MockPlatform::new());
    let registrar = Registrar::new(plugin_config(false), platform.clone());

    // No name: nothing left to invoke, so registration fails.
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(LambdaSpec {
            name: None,
            deploy: Some(deploy_spec(source.clone())),
        }),
    );
    let result = registrar.register(Router::new(), vec![route]).await;
    assert!(matches!(
        result,
        Err(RegisterError::Config {
            source: ConfigError::DeployWithoutTarget,
            ..
        })
    ));

    // With a name the route registers, skips publishing, and invokes by name.
    let registrar = Registrar::new(plugin_config(false), platform.clone());
    platform.set_result("greeter", r#"{"fallback":true}"#);
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(LambdaSpec {
            name: Some("greeter".to_string()),
            deploy: Some(deploy_spec(source)),
        }),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from(r#"{"fallback":true}"#));
    assert_eq!(platform.publish_count(), 0);
    assert_eq!(platform.invocation_count("greeter"), 1);
}

// === Invocation by name ===

#[tokio::test]
async fn named_route_returns_raw_remote_result() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_result("foo", r#"{"answer":42}"#);

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(Method::GET, "/foo", RouteLambda::new(named_spec("foo")));
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from(r#"{"answer":42}"#));
    assert_eq!(platform.invocation_count("foo"), 1);
}

#[tokio::test]
async fn default_envelope_carries_the_request() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_result("foo", "{}");

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(Method::POST, "/foo", RouteLambda::new(named_spec("foo")));
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/foo?page=2")
                .header("x-tenant", "acme")
                .body(Body::from(r#"{"hello":"world"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let envelope = platform.last_payload_json("foo").unwrap();
    let request = &envelope["request"];
    assert_eq!(request["method"], "POST");
    assert_eq!(request["path"], "/foo");
    assert_eq!(request["query"]["page"], "2");
    assert_eq!(request["headers"]["x-tenant"], "acme");
    assert_eq!(request["body"], r#"{"hello":"world"}"#);
    assert!(envelope["requestId"].is_string());
}

#[tokio::test]
async fn invocation_failure_without_complete_is_500() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_error("foo", "function timed out");

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(Method::GET, "/foo", RouteLambda::new(named_spec("foo")));
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "InvocationError");
    // The collaborator's error text stays out of the response body.
    assert!(!body.to_string().contains("function timed out"));
}

// === Deploy-before-serve ===

#[tokio::test]
async fn deploy_route_publishes_once_and_reuses_the_handle() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_handler_source(&dir);

    let platform = Arc::new(MockPlatform::new());
    let arn = MockPlatform::arn("handler");
    platform.set_result(arn.clone(), r#"{"deployed":true}"#);

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(LambdaSpec {
            name: None,
            deploy: Some(deploy_spec(source)),
        }),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    assert_eq!(platform.publish_count(), 1);
    assert_eq!(registrar.cache().len(), 1);

    for _ in 0..3 {
        let (status, body) = get(router.clone(), "/foo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from(r#"{"deployed":true}"#));
    }

    // Still exactly one publish; every request went through the cached handle.
    assert_eq!(platform.publish_count(), 1);
    assert_eq!(platform.invocation_count(&arn), 3);
}

// === Hooks ===

#[tokio::test]
async fn setup_failure_never_reaches_the_platform() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_result("foo", "{}");

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(named_spec("foo")).with_setup(Arc::new(FailingSetup)),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "SetupError");
    assert_eq!(platform.total_invocations(), 0);
}

#[tokio::test]
async fn setup_payload_replaces_the_default_envelope() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_result("foo", "{}");

    let payload = serde_json::json!({"custom": "payload"});
    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(named_spec("foo")).with_setup(Arc::new(StaticPayload(payload.clone()))),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, _) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(platform.last_payload_json("foo"), Some(payload));
}

#[tokio::test]
async fn complete_owns_the_response_on_success() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_result("foo", r#"{"answer":42}"#);

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(named_spec("foo")).with_complete(Arc::new(TeapotFinalizer)),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, Bytes::from(r#"wrapped: {"answer":42}"#));
}

#[tokio::test]
async fn complete_can_mask_an_invocation_failure() {
    let platform = Arc::new(MockPlatform::new());
    platform.set_error("foo", "remote is down");

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(named_spec("foo")).with_complete(Arc::new(TeapotFinalizer)),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.starts_with("masked:"));
    assert!(body.contains("remote is down"));
}

#[tokio::test]
async fn complete_receives_setup_failures_too() {
    let platform = Arc::new(MockPlatform::new());

    let registrar = Registrar::new(plugin_config(true), platform.clone());
    let route = LambdaRoute::new(
        Method::GET,
        "/foo",
        RouteLambda::new(named_spec("foo"))
            .with_setup(Arc::new(FailingSetup))
            .with_complete(Arc::new(TeapotFinalizer)),
    );
    let router = registrar.register(Router::new(), vec![route]).await.unwrap();

    let (status, body) = get(router, "/foo").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert!(String::from_utf8_lossy(&body).contains("setup exploded"));
    assert_eq!(platform.total_invocations(), 0);
}
