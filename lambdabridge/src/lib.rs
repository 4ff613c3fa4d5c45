//! lambdabridge - route HTTP requests to remote serverless functions
//!
//! Routes carry a declarative lambda configuration; registration validates
//! it, optionally bundles and publishes the function code, and binds an
//! invocation pipeline as the route's request handler.

pub mod bundler;
pub mod cache;
pub mod config;
pub mod pipeline;
pub mod platform;
pub mod registrar;

pub use lambdabridge_core::{BoxError, ErrorKind, RequestError, RequestId};

pub use bundler::{Bundler, DeployError};
pub use cache::{DeploymentCache, RouteId};
pub use config::{ConfigError, DeploySpec, LambdaSpec, PlatformConfig, PluginConfig, Runtime};
pub use pipeline::{
    InvocationPipeline, PayloadBuilder, PipelineError, RequestContext, ResponseFinalizer,
};
pub use platform::{Artifact, FunctionHandle, PlatformClient, PlatformError, PublishMeta};
pub use registrar::{LambdaRoute, RegisterError, Registrar, RouteLambda};
