use crate::config::AppConfig;
use crate::registry::{Registry, RegistryError};
use crate::services::sum_cache::SumCache;
use crate::services::worker_pool::WorkerPool;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use sync_agent::digest::DigestAlgorithm;

/// Everything a request needs from the current configuration. Replaced as a
/// whole on reload.
#[derive(Debug)]
pub struct Snapshot {
    pub registry: Registry,
    pub generation: u64,
    pub digest_algorithm: DigestAlgorithm,
}

pub struct AppState {
    /// File the configuration was loaded from, if any.
    pub config_path: Option<PathBuf>,
    current: RwLock<Arc<Snapshot>>,
    pub workers: WorkerPool,
    pub sum_cache: SumCache,
}

impl AppState {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self, RegistryError> {
        let snapshot = Snapshot {
            registry: Registry::build(config.resources, config.users)?,
            generation: 1,
            digest_algorithm: config.digest_algorithm,
        };
        Ok(Self {
            config_path,
            current: RwLock::new(Arc::new(snapshot)),
            workers: WorkerPool::new(
                config.workers,
                Duration::from_millis(config.queue_timeout_ms),
            ),
            sum_cache: SumCache::new(Duration::from_secs(config.sum_cache_ttl_secs)),
        })
    }

    /// The registry and settings in force right now.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Build a registry from `config` and make it current. On error the
    /// previous registry stays in force. Returns the new generation.
    pub fn install(&self, config: AppConfig) -> Result<u64, RegistryError> {
        let registry = Registry::build(config.resources, config.users)?;

        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let generation = current.generation + 1;
        *current = Arc::new(Snapshot {
            registry,
            generation,
            digest_algorithm: config.digest_algorithm,
        });
        drop(current);

        self.sum_cache.clear();
        Ok(generation)
    }
}
