//! Configuration management for the sync agent.
//!
//! Loads configuration from a TOML file; every field except the resource list
//! has a default.

use crate::digest::DigestAlgorithm;
use crate::fs::WalkOptions;
use crate::remote::{HttpRemote, LocalRemote, RemoteCatalog};
use crate::sync::{RetryPolicy, SyncDriver, SyncOptions};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Control API port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Sync server base URL
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Access token sent with every catalog request
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest wait for response data, per read
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Read buffer size in bytes when hashing (default: 1MB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Digest algorithm: sha256, xor32, xor<N>
    #[serde(default = "default_digest_algorithm")]
    pub digest_algorithm: String,

    /// Delete local files that no longer exist on the server
    #[serde(default)]
    pub prune_local: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Minimum spacing between progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// File names skipped while scanning
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum resources synced at the same time
    #[serde(default = "default_max_concurrent_syncs")]
    pub max_concurrent_syncs: usize,
}

/// One mirrored resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource name on the server
    pub name: String,

    /// Local mirror directory
    pub local_path: PathBuf,

    /// Read the resource from this mounted directory instead of the server
    #[serde(default)]
    pub local_source: Option<PathBuf>,
}

// Default values
fn default_agent_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "sync-agent-01".to_string())
}

fn default_port() -> u16 {
    9990
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_digest_algorithm() -> String {
    "sha256".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_syncs() -> usize {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            port: default_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            token: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            digest_algorithm: default_digest_algorithm(),
            prune_local: false,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            exclude: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_syncs: default_max_concurrent_syncs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig::default(),
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            log: LogConfig::default(),
            performance: PerformanceConfig::default(),
            resources: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.digest_algorithm()?;

        let mut names = HashSet::new();
        for resource in &self.resources {
            if !names.insert(resource.name.as_str()) {
                bail!("resource '{}' is configured twice", resource.name);
            }
        }
        Ok(())
    }

    pub fn digest_algorithm(&self) -> anyhow::Result<DigestAlgorithm> {
        self.sync
            .digest_algorithm
            .parse()
            .map_err(|e| anyhow::anyhow!("sync.digest_algorithm: {}", e))
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn sync_options(&self) -> anyhow::Result<SyncOptions> {
        Ok(SyncOptions {
            algorithm: self.digest_algorithm()?,
            chunk_size: self.sync.chunk_size.max(1),
            prune_local: self.sync.prune_local,
            retry: RetryPolicy {
                max_attempts: self.sync.max_attempts.max(1),
                base_delay: Duration::from_millis(self.sync.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.sync.retry_max_delay_ms),
            },
            walk_options: WalkOptions {
                exclude_names: self.sync.exclude.clone(),
            },
            progress_interval: Duration::from_millis(self.sync.progress_interval_ms),
            stall_timeout: Duration::from_secs(self.server.read_timeout_secs.max(1)),
        })
    }

    /// Transport for `resource`: the mounted directory when one is set,
    /// otherwise the configured server.
    pub fn remote_for(&self, resource: &ResourceConfig) -> anyhow::Result<Arc<dyn RemoteCatalog>> {
        if let Some(source) = &resource.local_source {
            return Ok(Arc::new(
                LocalRemote::new(source).with_chunk_size(self.sync.chunk_size),
            ));
        }
        let remote = HttpRemote::new(
            &self.server.url,
            &self.server.token,
            &resource.name,
            Duration::from_secs(self.server.connect_timeout_secs),
            Duration::from_secs(self.server.read_timeout_secs.max(1)),
        )?;
        Ok(Arc::new(remote))
    }

    /// A ready-to-run driver for `resource`.
    pub fn driver_for(&self, resource: &ResourceConfig) -> anyhow::Result<SyncDriver> {
        Ok(SyncDriver::new(
            resource.name.clone(),
            resource.local_path.clone(),
            self.remote_for(resource)?,
        )
        .with_options(self.sync_options()?))
    }
}
