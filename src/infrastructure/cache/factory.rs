//! Backend construction for the selected target

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendTarget;
use crate::domain::cache::CacheBackend;
use crate::domain::CacheError;

use super::redis::RedisBackend;
use super::rest::RestBackend;

/// Opens a connection to a backend target
///
/// The connector calls this once per connection attempt.
#[async_trait]
pub trait BackendFactory: Send + Sync + Debug {
    async fn create(&self, target: &BackendTarget) -> Result<Arc<dyn CacheBackend>, CacheError>;
}

/// Factory building the Redis or REST backend
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl DefaultBackendFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn create(&self, target: &BackendTarget) -> Result<Arc<dyn CacheBackend>, CacheError> {
        match target {
            BackendTarget::Local(config) => {
                let backend = RedisBackend::connect(config.clone()).await?;
                Ok(Arc::new(backend))
            }
            BackendTarget::Remote(config) => {
                let backend = RestBackend::connect(config).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}
