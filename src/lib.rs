//! Relay Cache
//!
//! Caching and coordination layer for AI orchestration workloads:
//! - One shared backend: local Redis over TCP or a managed Redis REST endpoint
//! - Serialised connection establishment with linear-backoff retry
//! - Enveloped key/value entries with native and lazy expiry
//! - Content-addressed embedding cache with integrity verification
//! - Periodic health probing

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{CacheEntry, CacheError, HealthSnapshot, HealthStatus};
pub use infrastructure::cache::{
    BackendConnector, CacheLayer, CacheService, ConnectorEvent, HealthMonitor, VectorCache,
    VectorInput,
};
