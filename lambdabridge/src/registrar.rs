//! Startup-time route registration
//!
//! Executes once, before the server accepts connections: validates every
//! lambda route, deploys the ones that request it, and binds an invocation
//! pipeline as each route's handler. Returns `Err` on the first failure;
//! the host decides whether that aborts process startup, but must not serve
//! the router it never received.

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::{on, MethodFilter};
use axum::Router;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::bundler::{Bundler, DeployError};
use crate::cache::{DeploymentCache, RouteId};
use crate::config::{ConfigError, LambdaSpec, PluginConfig};
use crate::pipeline::{InvocationPipeline, PayloadBuilder, RequestContext, ResponseFinalizer};
use crate::platform::PlatformClient;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid configuration for route {route}: {source}")]
    Config {
        route: RouteId,
        #[source]
        source: ConfigError,
    },

    #[error("deployment failed for route {route}: {source}")]
    Deploy {
        route: RouteId,
        #[source]
        source: DeployError,
    },
}

/// A route's full lambda configuration: the declarative spec plus the two
/// capability hooks.
#[derive(Clone)]
pub struct RouteLambda {
    pub spec: LambdaSpec,
    pub setup: Option<Arc<dyn PayloadBuilder>>,
    pub complete: Option<Arc<dyn ResponseFinalizer>>,
}

impl RouteLambda {
    pub fn new(spec: LambdaSpec) -> Self {
        Self {
            spec,
            setup: None,
            complete: None,
        }
    }

    pub fn with_setup(mut self, setup: Arc<dyn PayloadBuilder>) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_complete(mut self, complete: Arc<dyn ResponseFinalizer>) -> Self {
        self.complete = Some(complete);
        self
    }
}

/// A route slated for lambda dispatch. Routes without lambda configuration
/// stay on the host's own router and never reach the registrar.
pub struct LambdaRoute {
    pub method: Method,
    pub path: String,
    pub lambda: RouteLambda,
}

impl LambdaRoute {
    pub fn new(method: Method, path: impl Into<String>, lambda: RouteLambda) -> Self {
        Self {
            method,
            path: path.into(),
            lambda,
        }
    }
}

/// Validates, deploys and binds lambda routes at server startup.
pub struct Registrar {
    config: PluginConfig,
    client: Arc<dyn PlatformClient>,
    bundler: Bundler,
    cache: Arc<DeploymentCache>,
}

impl Registrar {
    pub fn new(config: PluginConfig, client: Arc<dyn PlatformClient>) -> Self {
        let bundler = Bundler::new(&config);
        Self {
            config,
            client,
            bundler,
            cache: Arc::new(DeploymentCache::new()),
        }
    }

    /// The cache the registrar writes to; read-only once `register` returns.
    pub fn cache(&self) -> Arc<DeploymentCache> {
        self.cache.clone()
    }

    /// Register every lambda route on the given router.
    ///
    /// All deployments complete before this returns, so cache writes always
    /// precede cache reads. The first validation or deployment failure
    /// aborts with no partial registration contract: the returned router
    /// only exists on `Ok`.
    pub async fn register(
        &self,
        mut router: Router,
        routes: Vec<LambdaRoute>,
    ) -> Result<Router, RegisterError> {
        let total = routes.len();
        let mut deployed = 0usize;

        for route in routes {
            let route_id = RouteId::new(route.method.as_str(), &route.path);

            route
                .lambda
                .spec
                .validate()
                .map_err(|source| RegisterError::Config {
                    route: route_id.clone(),
                    source,
                })?;

            if let Some(deploy) = &route.lambda.spec.deploy {
                // Without credentials the bundle is packaged but never
                // published; the route must then carry a name to fall back
                // to, or it has no invocable target at all.
                if self.config.platform.is_none() && route.lambda.spec.usable_name().is_none() {
                    return Err(RegisterError::Config {
                        route: route_id,
                        source: ConfigError::DeployWithoutTarget,
                    });
                }

                let function_name = route
                    .lambda
                    .spec
                    .usable_name()
                    .unwrap_or(&deploy.export)
                    .to_string();

                let (_artifact, handle) = self
                    .bundler
                    .bundle_and_publish(&route_id, &function_name, deploy, &self.client)
                    .await
                    .map_err(|source| RegisterError::Deploy {
                        route: route_id.clone(),
                        source,
                    })?;

                if let Some(handle) = handle {
                    self.cache.put(route_id.clone(), handle);
                    deployed += 1;
                }
            }

            let filter = MethodFilter::try_from(route.method.clone()).map_err(|_| {
                RegisterError::Config {
                    route: route_id.clone(),
                    source: ConfigError::UnsupportedMethod(route.method.to_string()),
                }
            })?;

            let pipeline = Arc::new(InvocationPipeline::new(
                route_id.clone(),
                route.lambda.spec.name.clone(),
                self.cache.clone(),
                self.client.clone(),
                route.lambda.setup.clone(),
                route.lambda.complete.clone(),
            ));

            router = router.route(&route.path, on(filter, route_handler(pipeline)));
            info!(route = %route_id, "registered lambda route");
        }

        info!(routes = total, deployed, "lambda registration complete");
        Ok(router)
    }
}

/// Adapt a pipeline into an axum handler.
fn route_handler(
    pipeline: Arc<InvocationPipeline>,
) -> impl Fn(
    Method,
    Uri,
    Query<HashMap<String, String>>,
    HeaderMap,
    Bytes,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = axum::response::Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |method: Method,
          uri: Uri,
          Query(query): Query<HashMap<String, String>>,
          headers: HeaderMap,
          body: Bytes| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            let ctx = RequestContext::from_parts(&method, &uri, &headers, query, body);
            pipeline.handle(ctx).await
        })
    }
}
