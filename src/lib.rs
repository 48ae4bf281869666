pub mod compose;
pub mod config;
pub mod data;
pub mod error;
pub mod hooks;
pub mod router;
pub mod server;
pub mod source;
pub mod style;
pub mod types;

use crate::config::AppConfig;
use crate::hooks::{DatasetCache, Datasets};
use crate::source::{DataSource, ReqwestTransport};
use std::sync::Arc;
use std::time::Duration;

/// Builds the dataset hooks for a config, resolving the deployment once.
pub fn datasets_from_config(config: &AppConfig) -> anyhow::Result<Datasets> {
    let transport = ReqwestTransport::new(config.source.timeout_secs.map(Duration::from_secs))?;
    let source = DataSource::new(&config.source.origin, config.deployment(), Arc::new(transport));
    let cache = Arc::new(DatasetCache::new(config.cache_policy()));
    Ok(Datasets::new(source, cache, &config.datasets))
}
