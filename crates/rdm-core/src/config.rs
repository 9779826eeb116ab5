//! Engine configuration loaded from `~/.config/rdm/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default cap on concurrently admitted transfer loops.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default chunk size for new task plans (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

fn default_namespace() -> String {
    "default".to_string()
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// Global configuration for the engine and its CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdmConfig {
    /// Persistence namespace; one store per namespace. Embedding apps use
    /// this to keep per-user task state apart.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Maximum number of transfer loops admitted at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    /// Chunk size in bytes used when planning new tasks.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
