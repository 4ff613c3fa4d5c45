//! Route and plugin configuration

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("route declares neither a function name nor a deploy block")]
    MissingTarget,

    #[error("function name must be a non-empty string")]
    EmptyName,

    #[error("deploy source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("deploy export must be a non-empty string")]
    EmptyExport,

    #[error("deploy requested without platform credentials and no fallback function name")]
    DeployWithoutTarget,

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

/// Supported runtimes for deployed functions
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum Runtime {
    #[serde(rename = "nodejs18.x")]
    Nodejs18,
    #[serde(rename = "nodejs20.x")]
    Nodejs20,
    #[serde(rename = "python3.11")]
    Python311,
    #[serde(rename = "python3.12")]
    Python312,
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
}

impl Runtime {
    /// Parse runtime string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "nodejs18.x" => Some(Self::Nodejs18),
            "nodejs20.x" => Some(Self::Nodejs20),
            "python3.11" => Some(Self::Python311),
            "python3.12" => Some(Self::Python312),
            "provided.al2023" => Some(Self::ProvidedAl2023),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nodejs18 => "nodejs18.x",
            Self::Nodejs20 => "nodejs20.x",
            Self::Python311 => "python3.11",
            Self::Python312 => "python3.12",
            Self::ProvidedAl2023 => "provided.al2023",
        }
    }
}

/// Deploy-before-serve instructions for a route
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySpec {
    /// Entry-point file to bundle
    pub source: PathBuf,

    /// Exported handler symbol inside the entry point
    pub export: String,

    #[serde(default = "default_runtime")]
    pub runtime: Runtime,

    #[serde(default = "default_memory_size")]
    pub memory_size: i32,

    #[serde(default = "default_timeout")]
    pub timeout: i32,

    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_runtime() -> Runtime {
    Runtime::Nodejs20
}

fn default_memory_size() -> i32 {
    128
}

fn default_timeout() -> i32 {
    3
}

/// Declarative half of a route's lambda configuration.
///
/// The capability hooks live on [`crate::registrar::RouteLambda`]; this is
/// the part a host can read straight out of its route table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaSpec {
    /// Remote function to invoke when no deployment is requested
    #[serde(default)]
    pub name: Option<String>,

    /// Presence triggers the deploy-before-serve path
    #[serde(default)]
    pub deploy: Option<DeploySpec>,
}

impl LambdaSpec {
    /// Check the configuration against the schema. Runs synchronously during
    /// route registration; a failure here is fatal to server startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
        }

        match &self.deploy {
            Some(deploy) => {
                if deploy.export.trim().is_empty() {
                    return Err(ConfigError::EmptyExport);
                }
                if !deploy.source.is_file() {
                    return Err(ConfigError::SourceNotFound(deploy.source.clone()));
                }
            }
            None => {
                if self.name.is_none() {
                    return Err(ConfigError::MissingTarget);
                }
            }
        }

        Ok(())
    }

    /// The by-name invocation fallback, if one is configured.
    pub fn usable_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Remote-platform client credentials and region.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub region: String,

    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Process-wide plugin configuration, set once at registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Execution-role identifier used for any deployment
    pub role: String,

    /// When absent, publishing is disabled; by-name invocation still works
    #[serde(default)]
    pub platform: Option<PlatformConfig>,
}
