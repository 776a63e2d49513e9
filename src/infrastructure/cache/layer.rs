//! Wiring of connector, operations, vector cache and health monitor

use std::sync::Arc;

use tracing::info;

use crate::config::CacheSettings;
use crate::domain::cache::{Clock, KeySpace, SystemClock};
use crate::domain::{CacheError, HealthSnapshot};

use super::connector::BackendConnector;
use super::factory::{BackendFactory, DefaultBackendFactory};
use super::health::HealthMonitor;
use super::service::CacheService;
use super::vector::VectorCache;

/// The cache subsystem as one long-lived object
///
/// Build once at startup and share; every component borrows the connector's
/// single backend handle.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    connector: Arc<BackendConnector>,
    service: Arc<CacheService>,
    vectors: VectorCache,
    health: Arc<HealthMonitor>,
}

impl CacheLayer {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_factory(
            settings,
            Arc::new(DefaultBackendFactory::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_factory(
        settings: &CacheSettings,
        factory: Arc<dyn BackendFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let connector = Arc::new(BackendConnector::with_factory(settings, factory));

        let service = Arc::new(
            CacheService::new(connector.clone(), settings).with_clock(clock.clone()),
        );
        let vectors = VectorCache::new(service.clone(), settings);
        let health = Arc::new(
            HealthMonitor::new(
                connector.clone(),
                KeySpace::new(settings.key_prefix.clone()),
                settings.health_check_interval(),
            )
            .with_clock(clock),
        );

        Self {
            connector,
            service,
            vectors,
            health,
        }
    }

    /// Connects and starts periodic health probing
    ///
    /// The monitor keeps running after a failed first attempt so snapshots
    /// follow the connector's scheduled retries.
    pub async fn start(&self) -> Result<(), CacheError> {
        let result = self.connector.connect().await;

        if self.connector.is_configured() {
            self.health.start();
        }

        result
    }

    /// Stops probing and drops the connection
    pub async fn shutdown(&self) {
        self.health.stop();
        self.connector.disconnect().await;
        info!("Cache layer shut down");
    }

    pub async fn get_health(&self) -> HealthSnapshot {
        self.health.get_health().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.health.is_healthy().await
    }

    pub fn connector(&self) -> &Arc<BackendConnector> {
        &self.connector
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.service
    }

    pub fn vectors(&self) -> &VectorCache {
        &self.vectors
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }
}
