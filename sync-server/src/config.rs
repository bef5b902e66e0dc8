use crate::models::resource::Resource;
use crate::models::user::User;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use sync_agent::digest::DigestAlgorithm;

pub const CONFIG_PATH_ENV: &str = "SYNC_SERVER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sync-server.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port", alias = "serverPort")]
    pub port: u16,
    /// Algorithm used when a sum request names none
    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,
    /// Requests served at the same time
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// How long a request may wait for a free worker before a 503
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
    #[serde(default = "default_sum_cache_ttl_secs")]
    pub sum_cache_ttl_secs: u64,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub users: Vec<User>,
}

fn default_port() -> u16 {
    3000
}

fn default_workers() -> usize {
    8
}

fn default_queue_timeout_ms() -> u64 {
    5_000
}

fn default_sum_cache_ttl_secs() -> u64 {
    300
}

impl AppConfig {
    /// Config file location: `SYNC_SERVER_CONFIG` (also read from `.env`),
    /// else `sync-server.toml` in the working directory.
    pub fn path_from_env() -> PathBuf {
        let _ = dotenvy::dotenv();
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_aliases() {
        let config = AppConfig::from_toml(
            r#"
            serverPort = 8080

            [[resources]]
            name = "photos"
            rootPath = "/srv/photos"

            [[users]]
            login = "alice"
            token = "t"
            allowedResources = ["photos"]
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.workers, 8);
        assert_eq!(config.resources[0].root_path, PathBuf::from("/srv/photos"));
        assert!(config.users[0].may_access("photos"));
    }

    #[test]
    fn test_snake_case_keys() {
        let config = AppConfig::from_toml(
            r#"
            port = 3001
            digest_algorithm = "xor32"
            workers = 2
            queue_timeout_ms = 100

            [[resources]]
            name = "docs"
            root_path = "/srv/docs"
            "#,
        )
        .unwrap();

        assert_eq!(config.digest_algorithm, DigestAlgorithm::Xor { width: 32 });
        assert_eq!(config.queue_timeout_ms, 100);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        assert!(AppConfig::from_toml("digest_algorithm = \"crc\"").is_err());
    }
}
