//! Cache backend configuration

use std::time::Duration;

use serde::Deserialize;

use crate::domain::{BackendMode, CacheError};

const LOCAL_HOST_VAR: &str = "REDIS_HOST";
const LOCAL_PORT_VAR: &str = "REDIS_PORT";
const LOCAL_PASSWORD_VAR: &str = "REDIS_PASSWORD";
const LOCAL_DB_VAR: &str = "REDIS_DB";
const REMOTE_ENV_PAIRS: &[(&str, &str)] = &[
    ("UPSTASH_REDIS_REST_URL", "UPSTASH_REDIS_REST_TOKEN"),
    ("KV_REST_API_URL", "KV_REST_API_TOKEN"),
];

/// Local TCP backend parameters
#[derive(Clone, Deserialize, PartialEq)]
pub struct LocalBackendConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl std::fmt::Debug for LocalBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl LocalBackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            database: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Managed HTTP backend parameters
#[derive(Clone, Deserialize, PartialEq)]
pub struct RemoteBackendConfig {
    pub url: String,
    pub token: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl std::fmt::Debug for RemoteBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackendConfig")
            .field("url", &self.url)
            .field("token", &"***")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl RemoteBackendConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// The backend selected from configuration
#[derive(Debug, Clone, PartialEq)]
pub enum BackendTarget {
    Local(LocalBackendConfig),
    Remote(RemoteBackendConfig),
}

impl BackendTarget {
    pub fn mode(&self) -> BackendMode {
        match self {
            BackendTarget::Local(_) => BackendMode::Local,
            BackendTarget::Remote(_) => BackendMode::Remote,
        }
    }

    /// Connection description safe to log
    pub fn describe(&self) -> String {
        match self {
            BackendTarget::Local(local) => {
                format!("redis://{}:{}/{}", local.host, local.port, local.database)
            }
            BackendTarget::Remote(remote) => remote.url.clone(),
        }
    }
}

/// Cache layer settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub local: Option<LocalBackendConfig>,
    pub remote: Option<RemoteBackendConfig>,
    pub key_prefix: String,
    pub ttl_seconds: u64,
    pub vector_ttl_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_secs: u64,
}

fn default_port() -> u16 {
    6379
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            key_prefix: "relay:".to_string(),
            ttl_seconds: 3600,
            vector_ttl_seconds: 300,
            max_retries: 3,
            retry_delay_ms: 1000,
            health_check_interval_secs: 300,
        }
    }
}

impl CacheSettings {
    pub fn with_local(mut self, local: LocalBackendConfig) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: RemoteBackendConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay.as_millis() as u64;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn vector_ttl(&self) -> Duration {
        Duration::from_secs(self.vector_ttl_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Fills unset backends from well-known environment variables
    pub fn apply_env_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.local.is_none() {
            if let Some(host) = lookup(LOCAL_HOST_VAR).filter(|h| !h.is_empty()) {
                let port = lookup(LOCAL_PORT_VAR)
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_else(default_port);
                let database = lookup(LOCAL_DB_VAR)
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0);

                let mut local = LocalBackendConfig::new(host, port).with_database(database);
                local.password = lookup(LOCAL_PASSWORD_VAR).filter(|p| !p.is_empty());
                self.local = Some(local);
            }
        }

        if self.remote.is_none() {
            self.remote = REMOTE_ENV_PAIRS.iter().find_map(|(url_var, token_var)| {
                match (lookup(url_var), lookup(token_var)) {
                    (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                        Some(RemoteBackendConfig::new(url, token))
                    }
                    _ => None,
                }
            });
        }

        self
    }

    /// Local takes precedence over remote; `None` means the cache runs disabled
    pub fn backend_target(&self) -> Option<BackendTarget> {
        if let Some(local) = &self.local {
            return Some(BackendTarget::Local(local.clone()));
        }

        self.remote.clone().map(BackendTarget::Remote)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if let Some(local) = &self.local {
            if local.host.trim().is_empty() {
                return Err(CacheError::configuration("Local backend host is empty"));
            }
        }

        if let Some(remote) = &self.remote {
            if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
                return Err(CacheError::configuration(format!(
                    "Managed backend URL must be http(s): {}",
                    remote.url
                )));
            }
            if remote.token.is_empty() {
                return Err(CacheError::configuration("Managed backend token is empty"));
            }
        }

        if self.max_retries == 0 {
            return Err(CacheError::configuration("max_retries must be at least 1"));
        }

        if self.health_check_interval_secs == 0 {
            return Err(CacheError::configuration(
                "health_check_interval_secs must be at least 1",
            ));
        }

        Ok(())
    }
}
