//! Managed cache backend over HTTP
//!
//! Speaks the Redis-over-REST command protocol: each command is POSTed as a
//! JSON array (`["SET", "key", "value", "EX", "60"]`) with a bearer token and
//! answered with `{"result": ...}` or `{"error": "..."}`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::RemoteBackendConfig;
use crate::domain::cache::{BackendMode, CacheBackend};
use crate::domain::CacheError;

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP backend for a managed cache service
#[derive(Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    url: String,
    auth_header: String,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("url", &self.url)
            .field("auth_header", &"Bearer ***")
            .finish()
    }
}

impl RestBackend {
    /// Builds the client without touching the network
    pub fn new(config: &RemoteBackendConfig) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CacheError::connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {}", config.token),
        })
    }

    /// Builds the client and verifies credentials with a PING
    pub async fn connect(config: &RemoteBackendConfig) -> Result<Self, CacheError> {
        let backend = Self::new(config)?;

        backend
            .ping()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))?;

        debug!(url = %backend.url, "REST backend connected");

        Ok(backend)
    }

    async fn command<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, CacheError> {
        let name = args.first().copied().unwrap_or_default();

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.auth_header)
            .json(&args)
            .send()
            .await
            .map_err(|e| CacheError::backend(format!("{} request failed: {}", name, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CacheError::backend(format!("{} response unreadable: {}", name, e)))?;

        let reply: RestReply = serde_json::from_str(&body).map_err(|_| {
            CacheError::backend(format!("{} returned HTTP {}: {}", name, status, body))
        })?;

        if let Some(error) = reply.error {
            return Err(CacheError::backend(format!("{} failed: {}", name, error)));
        }

        if !status.is_success() {
            return Err(CacheError::backend(format!(
                "{} returned HTTP {}",
                name, status
            )));
        }

        serde_json::from_value(reply.result).map_err(|e| {
            CacheError::backend(format!("{} returned an unexpected result: {}", name, e))
        })
    }
}

#[async_trait]
impl CacheBackend for RestBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.command(&["GET", key]).await
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let _: String = match ttl {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1).to_string();
                self.command(&["SET", key, value, "EX", seconds.as_str()]).await?
            }
            None => self.command(&["SET", key, value]).await?,
        };

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let deleted: i64 = self.command(&["DEL", key]).await?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("DEL");
        args.extend(keys.iter().map(String::as_str));

        let deleted: i64 = self.command(&args).await?;
        Ok(deleted.max(0) as usize)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let count: i64 = self.command(&["EXISTS", key]).await?;
        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.command(&["KEYS", pattern]).await?;
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self.command(&["PING"]).await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::backend(format!("Unexpected PING reply: {}", pong)))
        }
    }
}
