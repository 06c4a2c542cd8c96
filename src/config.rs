use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Path value that selects the in-memory store instead of SQLite.
pub const MEMORY_DB: &str = ":memory:";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_url")]
    pub url: String,
    #[serde(default, skip_serializing)]
    pub project_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_pool_bundle_staleness_secs")]
    pub pool_bundle_staleness_secs: u64,
    #[serde(default = "default_pool_stats_staleness_secs")]
    pub pool_stats_staleness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub indexer_url: Option<String>,
    pub project_id: Option<String>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/fiso-rewards/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("failed parsing TOML config: {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.indexer_url {
            self.indexer.url = url;
        }
        if let Some(project_id) = overrides.project_id {
            self.indexer.project_id = project_id;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn uses_memory_store(&self) -> bool {
        self.storage.db_path.trim() == MEMORY_DB
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[indexer]
url = "https://cardano-mainnet.blockfrost.io/api/v0"
project_id = ""
timeout_secs = 20

[storage]
db_path = "~/.local/share/fiso-rewards/fiso.db"

[cache]
pool_bundle_staleness_secs = 600
pool_stats_staleness_secs = 1800

[server]
host = "127.0.0.1"
port = 3001
"#;
        template.to_string()
    }
}

impl CacheConfig {
    pub fn pool_bundle_staleness(&self) -> Duration {
        Duration::from_secs(self.pool_bundle_staleness_secs)
    }

    pub fn pool_stats_staleness(&self) -> Duration {
        Duration::from_secs(self.pool_stats_staleness_secs)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            url: default_indexer_url(),
            project_id: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_bundle_staleness_secs: default_pool_bundle_staleness_secs(),
            pool_stats_staleness_secs: default_pool_stats_staleness_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_indexer_url() -> String {
    "https://cardano-mainnet.blockfrost.io/api/v0".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_db_path() -> String {
    "~/.local/share/fiso-rewards/fiso.db".to_string()
}

fn default_pool_bundle_staleness_secs() -> u64 {
    600
}

fn default_pool_stats_staleness_secs() -> u64 {
    1800
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}
