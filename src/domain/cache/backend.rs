//! Backend capability trait

use std::fmt::{self, Debug};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::CacheError;

/// Which of the two mutually exclusive backends is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Cache service reached over a persistent TCP connection
    Local,
    /// Managed cache service reached over HTTP
    Remote,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Local => write!(f, "local"),
            BackendMode::Remote => write!(f, "remote"),
        }
    }
}

/// Capability set every cache backend provides
///
/// Keys passed here are fully qualified; prefixing is done by the caller.
/// Values are raw JSON strings so the trait stays dyn-compatible.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// The backend variant
    fn mode(&self) -> BackendMode;

    /// Reads a raw value
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes a raw value; `None` means no native expiry
    async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    /// Deletes a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes several keys, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut deleted = 0;

        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Checks whether a key exists
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Lists keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Minimal round trip
    async fn ping(&self) -> Result<(), CacheError>;
}
