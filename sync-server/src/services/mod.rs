pub mod reload;
pub mod sum_cache;
pub mod worker_pool;
