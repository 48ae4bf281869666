use crate::hooks::CachePolicy;
use crate::source::Deployment;
use crate::types::Camera;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub datasets: DatasetsConfig,
    pub cache: CacheConfig,
    pub view: ViewConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Development,
    Published,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub origin: String,
    pub mode: DeploymentMode,
    /// Prefix applied to relative identifiers in a published build.
    pub base_path: String,
    pub timeout_secs: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            mode: DeploymentMode::Development,
            base_path: "/".to_string(),
            timeout_secs: None,
        }
    }
}

/// Identifiers of the four datasets, relative to the deployment base path
/// unless absolute URLs.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetsConfig {
    pub boundaries: String,
    pub stations: String,
    pub coverage: String,
    pub totals: String,
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            boundaries: "data/us_states.geojson".to_string(),
            stations: "data/stations.geo.json".to_string(),
            coverage: "data/coverage_scores.json".to_string(),
            totals: "data/infra_totals.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            retry_attempts: 0,
            retry_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ViewConfig {
    pub camera: Camera,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory served under `/`, normally holding the dataset documents.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("public"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Resolves the deployment context. `EVMAP_DEPLOYMENT` overrides the
    /// configured mode.
    pub fn deployment(&self) -> Deployment {
        let mode = match std::env::var("EVMAP_DEPLOYMENT").as_deref() {
            Ok("development") => DeploymentMode::Development,
            Ok("published") => DeploymentMode::Published,
            _ => self.source.mode,
        };
        match mode {
            DeploymentMode::Development => Deployment::Development,
            DeploymentMode::Published => Deployment::Published {
                base_path: self.source.base_path.clone(),
            },
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: self.cache.ttl_secs.map(Duration::from_secs),
            retry_attempts: self.cache.retry_attempts,
            retry_backoff: Duration::from_millis(self.cache.retry_backoff_ms),
        }
    }
}
