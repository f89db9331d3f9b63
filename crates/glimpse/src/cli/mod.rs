//! Command implementations.

pub mod config;
pub mod export;
pub mod index;
pub mod search;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use glimpse_core::{Config, ProcessorFactory, SqliteStore, ToolProbe};

/// Config from `--config`, else the platform default.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(&expand(path))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load()?),
    }
}

/// Open (or create) the catalog database named in the config.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let path = config.database_path();
    tracing::debug!("Opening catalog at {:?}", path);
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open catalog at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Probe the external tool and build the processor chain.
pub async fn build_factory(config: &Config) -> Arc<ProcessorFactory> {
    let tool = ToolProbe::probe(&config.external_tool).await;
    Arc::new(ProcessorFactory::from_config(config, tool))
}

/// `~` expansion for paths given on the command line.
pub fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
