//! Bundling and publishing of route function code
//!
//! Wraps the packaging step (zip archive of the deploy source) and, when the
//! plugin carries platform credentials, the publish call that turns the
//! archive into a live remote function. Invoked at most once per route,
//! during registration.

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::cache::RouteId;
use crate::config::{DeploySpec, PluginConfig};
use crate::platform::{Artifact, FunctionHandle, PlatformClient, PlatformError, PublishMeta};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to read deploy source: {0}")]
    Bundle(#[from] std::io::Error),

    #[error("failed to package deploy archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("publish failed: {0}")]
    Publish(#[source] PlatformError),
}

/// Wraps the external bundling tool and the platform publish step.
pub struct Bundler {
    role: String,
    can_publish: bool,
}

impl Bundler {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            role: config.role.clone(),
            can_publish: config.platform.is_some(),
        }
    }

    /// Package the deploy source into a deployable zip archive.
    pub fn bundle(&self, deploy: &DeploySpec) -> Result<Artifact, DeployError> {
        let code = std::fs::read(&deploy.source)?;

        let entry_name = deploy
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "deploy source has no file name",
                )
            })?;

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            writer.start_file(entry_name.as_str(), FileOptions::default())?;
            writer.write_all(&code)?;
            writer.finish()?;
        }
        let data = cursor.into_inner();

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let sha256 = general_purpose::STANDARD.encode(hasher.finalize());

        let stem = deploy
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry_name.clone());
        let handler = format!("{}.{}", stem, deploy.export);
        let size = data.len() as i64;

        Ok(Artifact {
            data: Bytes::from(data),
            sha256,
            handler,
            size,
        })
    }

    /// Bundle and, when platform credentials are configured, publish.
    ///
    /// Returns `None` for the handle when publishing is disabled; a
    /// subsequent invocation falls back to lookup-by-name. Any failure
    /// propagates to the caller and is fatal to startup for that route.
    pub async fn bundle_and_publish(
        &self,
        route: &RouteId,
        function_name: &str,
        deploy: &DeploySpec,
        client: &Arc<dyn PlatformClient>,
    ) -> Result<(Artifact, Option<FunctionHandle>), DeployError> {
        let artifact = self.bundle(deploy)?;

        if !self.can_publish {
            warn!(
                route = %route,
                sha256 = %artifact.sha256,
                "platform credentials absent, skipping publish"
            );
            return Ok((artifact, None));
        }

        let meta = PublishMeta {
            function_name: function_name.to_string(),
            role: self.role.clone(),
            runtime: deploy.runtime.clone(),
            handler: artifact.handler.clone(),
            memory_size: deploy.memory_size,
            timeout: deploy.timeout,
            environment: deploy.environment.clone(),
        };

        let handle = client
            .publish(&artifact, &meta)
            .await
            .map_err(DeployError::Publish)?;

        info!(
            route = %route,
            identity = %handle.identity,
            sha256 = %artifact.sha256,
            size = artifact.size,
            "published function"
        );

        Ok((artifact, Some(handle)))
    }
}
