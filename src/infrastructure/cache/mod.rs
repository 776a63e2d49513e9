//! Cache infrastructure - backends, connection lifecycle and cache services

mod connector;
pub(crate) mod factory;
mod health;
mod layer;
mod redis;
mod rest;
mod service;
mod vector;

pub use connector::{BackendConnector, ConnectionStatus, ConnectorEvent};
pub use factory::{BackendFactory, DefaultBackendFactory};
pub use health::HealthMonitor;
pub use layer::CacheLayer;
pub use redis::RedisBackend;
pub use rest::RestBackend;
pub use service::CacheService;
pub use vector::{VectorCache, VectorInput};
