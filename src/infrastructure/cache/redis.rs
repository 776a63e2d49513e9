//! Local cache backend over a persistent TCP connection

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::config::LocalBackendConfig;
use crate::domain::cache::{BackendMode, CacheBackend};
use crate::domain::CacheError;

const SCAN_COUNT: usize = 100;

/// Redis backend
///
/// Features:
/// - Multiplexed connection via ConnectionManager
/// - Native TTL through SET EX
/// - Non-blocking pattern listing via SCAN
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    config: LocalBackendConfig,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisBackend {
    /// Opens the connection and verifies it with a PING
    pub async fn connect(config: LocalBackendConfig) -> Result<Self, CacheError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                password: config.password.clone(),
                ..Default::default()
            },
        };

        let client = Client::open(info)
            .map_err(|e| CacheError::connection(format!("Failed to create Redis client: {}", e)))?;

        let connection =
            tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    CacheError::connection(format!(
                        "Timed out connecting to Redis at {}:{}",
                        config.host, config.port
                    ))
                })?
                .map_err(|e| CacheError::connection(format!("Failed to connect to Redis: {}", e)))?;

        let backend = Self { connection, config };
        backend
            .ping()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))?;

        debug!(
            host = %backend.config.host,
            port = backend.config.port,
            database = backend.config.database,
            "Redis backend connected"
        );

        Ok(backend)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Local
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();

        conn.get(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to get key '{}': {}", key, e)))
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
            None => conn.set(key, value).await,
        };

        result.map_err(|e| CacheError::backend(format!("Failed to set key '{}': {}", key, e)))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();

        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to delete key '{}': {}", key, e)))?;

        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();

        let deleted: i64 = conn
            .del(keys)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to delete keys: {}", e)))?;

        Ok(deleted.max(0) as usize)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();

        conn.exists(key).await.map_err(|e| {
            CacheError::backend(format!("Failed to check existence of key '{}': {}", key, e))
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let mut cursor = 0u64;
        let mut found = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    CacheError::backend(format!(
                        "Failed to scan keys with pattern '{}': {}",
                        pattern, e
                    ))
                })?;

            found.extend(keys);
            cursor = next_cursor;

            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();

        Ok(found)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend(format!("Redis PING failed: {}", e)))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::backend(format!("Unexpected PING reply: {}", pong)))
        }
    }
}
