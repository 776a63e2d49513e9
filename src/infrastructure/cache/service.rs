//! Generic key/value operations over the active backend

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::domain::cache::{
    CacheBackend, CacheEntry, Clock, EntryHeader, Envelope, KeySpace, SystemClock,
};
use crate::domain::CacheError;

use super::connector::BackendConnector;

/// Cache operations layer
///
/// All keys are transparently prefixed and every value is wrapped in a
/// self-describing envelope. Expiry is enforced twice: natively by the backend
/// and lazily on read against the envelope timestamp.
///
/// Unavailability is reported as an error which callers should treat as a
/// miss. Corrupted entries are deleted and reported as misses.
#[derive(Debug, Clone)]
pub struct CacheService {
    connector: Arc<BackendConnector>,
    keys: KeySpace,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheService {
    pub fn new(connector: Arc<BackendConnector>, settings: &CacheSettings) -> Self {
        Self {
            connector,
            keys: KeySpace::new(settings.key_prefix.clone()),
            default_ttl: settings.default_ttl(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    pub fn connector(&self) -> &Arc<BackendConnector> {
        &self.connector
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Stores `value` under `key`; `ttl` defaults to the configured TTL
    pub async fn set<V>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<bool, CacheError>
    where
        V: Serialize + Sync + ?Sized,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl_seconds = whole_seconds(ttl);

        let mut entry = CacheEntry::new(value, self.now_millis());
        if ttl_seconds > 0 {
            entry = entry.with_ttl(ttl_seconds);
        }
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }

        self.write_envelope(key, &entry, Some(ttl)).await?;
        Ok(true)
    }

    /// Reads the entry under `key`
    ///
    /// Returns `None` when missing, expired, or unreadable; the latter two are
    /// deleted on the way out.
    pub async fn get<V>(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError>
    where
        V: DeserializeOwned,
    {
        self.read_envelope(key).await
    }

    /// Reads only the payload under `key`
    pub async fn get_value<V>(&self, key: &str) -> Result<Option<V>, CacheError>
    where
        V: DeserializeOwned,
    {
        Ok(self.get::<V>(key).await?.map(|entry| entry.value))
    }

    pub async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let backend = self.backend().await?;
        let full_key = self.keys.key(key);

        backend.delete(&full_key).await.inspect_err(|e| {
            warn!(key = %key, error = %e, "Cache delete failed");
        })
    }

    /// True only for a live, readable entry
    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let backend = self.backend().await?;
        let full_key = self.keys.key(key);

        if !backend.exists(&full_key).await? {
            return Ok(false);
        }

        let Some(raw) = backend.get_raw(&full_key).await? else {
            return Ok(false);
        };

        match serde_json::from_str::<EntryHeader>(&raw) {
            Ok(header) if header.is_expired(self.now_millis()) => {
                debug!(key = %key, "Cache entry expired");
                self.evict(backend.as_ref(), &full_key).await;
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupted cache entry removed");
                self.evict(backend.as_ref(), &full_key).await;
                Ok(false)
            }
        }
    }

    /// Lists keys matching `pattern` within the prefix, returned without it
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let backend = self.backend().await?;

        let keys = backend.keys(&self.keys.pattern(pattern)).await?;

        Ok(keys
            .iter()
            .filter_map(|k| self.keys.strip(k))
            .map(str::to_string)
            .collect())
    }

    /// Deletes keys matching `pattern` within the prefix
    pub async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let backend = self.backend().await?;

        let keys = backend.keys(&self.keys.pattern(pattern)).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        backend.delete_many(&keys).await
    }

    /// Deletes every key under the prefix, never anything outside it
    pub async fn flush_all(&self) -> Result<bool, CacheError> {
        if self.keys.prefix().is_empty() {
            return Err(CacheError::configuration(
                "refusing to flush a shared backend without a key prefix",
            ));
        }

        let deleted = self.delete_matching("*").await?;
        info!(prefix = %self.keys.prefix(), deleted, "Cache flushed");

        Ok(true)
    }

    /// Number of keys under the prefix
    pub async fn size(&self) -> Result<usize, CacheError> {
        Ok(self.keys("*").await?.len())
    }

    /// Serializes and writes any envelope under the prefixed key
    pub async fn write_envelope<T>(
        &self,
        key: &str,
        envelope: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let backend = self.backend().await?;
        let full_key = self.keys.key(key);

        let raw = serde_json::to_string(envelope).map_err(|e| {
            CacheError::serialization(format!("Failed to serialize cache value: {}", e))
        })?;

        let native_ttl = ttl
            .map(whole_seconds)
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);

        backend
            .set_raw(&full_key, &raw, native_ttl)
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Cache write failed"))?;

        debug!(key = %key, ttl_secs = ?native_ttl.map(|t| t.as_secs()), "Cache SET");
        Ok(())
    }

    /// Reads and validates an envelope, repairing corrupt or expired entries
    ///
    /// A readable entry whose payload does not fit `T` is a miss and is left
    /// in place.
    pub async fn read_envelope<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Envelope,
    {
        let backend = self.backend().await?;
        let full_key = self.keys.key(key);

        let raw = backend
            .get_raw(&full_key)
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Cache read failed"))?;

        let Some(raw) = raw else {
            debug!(key = %key, "Cache MISS");
            return Ok(None);
        };

        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupted cache entry removed");
                self.evict(backend.as_ref(), &full_key).await;
                return Ok(None);
            }
        };

        let shape = match <T::Shape as Deserialize<'_>>::deserialize(&document) {
            Ok(shape) => shape,
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed cache envelope removed");
                self.evict(backend.as_ref(), &full_key).await;
                return Ok(None);
            }
        };

        if shape.is_expired(self.now_millis()) {
            debug!(key = %key, "Cache entry expired");
            self.evict(backend.as_ref(), &full_key).await;
            return Ok(None);
        }

        // A well-formed entry of another payload type belongs to someone else
        match serde_json::from_value(document) {
            Ok(envelope) => {
                debug!(key = %key, "Cache HIT");
                Ok(Some(envelope))
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Cache entry has a different payload type");
                Ok(None)
            }
        }
    }

    /// Deletes a prefixed key, logging instead of failing
    pub async fn remove(&self, key: &str) {
        if let Ok(backend) = self.backend().await {
            self.evict(backend.as_ref(), &self.keys.key(key)).await;
        }
    }

    async fn evict(&self, backend: &dyn CacheBackend, full_key: &str) {
        if let Err(e) = backend.delete(full_key).await {
            warn!(key = %full_key, error = %e, "Failed to evict cache entry");
        }
    }

    async fn backend(&self) -> Result<Arc<dyn CacheBackend>, CacheError> {
        self.connector.backend_or_connect().await
    }
}

/// Rounds up to whole seconds, the granularity of backend-native expiry
pub(crate) fn whole_seconds(ttl: Duration) -> u64 {
    let seconds = ttl.as_secs();

    if ttl.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalBackendConfig;
    use crate::domain::cache::{ManualClock, MockBackend};
    use crate::infrastructure::cache::factory::mock::MockBackendFactory;
    use serde_json::{json, Value};

    struct Fixture {
        service: CacheService,
        backend: Arc<MockBackend>,
        clock: Arc<ManualClock>,
    }

    async fn fixture_with(backend: MockBackend, settings: CacheSettings) -> Fixture {
        let backend = Arc::new(backend);
        let factory = Arc::new(MockBackendFactory::with_backend(backend.clone()));
        let connector = Arc::new(BackendConnector::with_factory(&settings, factory));
        connector.connect().await.unwrap();

        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let service = CacheService::new(connector, &settings).with_clock(clock.clone());

        Fixture {
            service,
            backend,
            clock,
        }
    }

    fn test_settings() -> CacheSettings {
        CacheSettings::default()
            .with_local(LocalBackendConfig::new("localhost", 6379))
            .with_key_prefix("test:")
            .with_ttl_seconds(60)
    }

    async fn fixture() -> Fixture {
        fixture_with(MockBackend::new(), test_settings()).await
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let f = fixture().await;

        let value = json!({"model": "gpt", "tokens": [1, 2, 3]});
        assert!(f.service.set("a", &value, None, None).await.unwrap());

        let entry = f.service.get::<Value>("a").await.unwrap().unwrap();
        assert_eq!(entry.value, value);
        assert_eq!(entry.ttl, Some(60));
        assert_eq!(entry.timestamp, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_set_writes_prefixed_envelope_with_native_ttl() {
        let f = fixture().await;

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "analysis".to_string());
        f.service
            .set("a", &json!({"x": 1}), Some(Duration::from_secs(30)), Some(metadata))
            .await
            .unwrap();

        let raw: Value = serde_json::from_str(&f.backend.raw("test:a").unwrap()).unwrap();
        assert_eq!(raw["value"], json!({"x": 1}));
        assert_eq!(raw["ttl"], 30);
        assert_eq!(raw["metadata"]["source"], "analysis");
        assert_eq!(f.backend.native_ttl("test:a"), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_lazy_expiration_scenario() {
        let settings = test_settings().with_ttl_seconds(1);
        let f = fixture_with(MockBackend::new(), settings).await;

        f.service.set("a", &json!({"x": 1}), None, None).await.unwrap();
        assert_eq!(
            f.service.get_value::<Value>("a").await.unwrap(),
            Some(json!({"x": 1}))
        );

        f.clock.advance(Duration::from_millis(1100));

        assert_eq!(f.service.get_value::<Value>("a").await.unwrap(), None);
        assert!(!f.service.exists("a").await.unwrap());
        assert!(!f.backend.contains("test:a"));
    }

    #[tokio::test]
    async fn test_exists_enforces_expiry_without_get() {
        let f = fixture().await;

        f.service
            .set("a", &"v", Some(Duration::from_secs(1)), None)
            .await
            .unwrap();
        assert!(f.service.exists("a").await.unwrap());

        f.clock.advance(Duration::from_secs(2));

        assert!(!f.service.exists("a").await.unwrap());
        assert!(!f.backend.contains("test:a"));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let f = fixture().await;

        f.service.set("a", &1, Some(Duration::ZERO), None).await.unwrap();
        f.clock.advance(Duration::from_secs(86_400));

        assert_eq!(f.service.get_value::<i32>("a").await.unwrap(), Some(1));
        assert_eq!(f.backend.native_ttl("test:a"), None);
    }

    #[tokio::test]
    async fn test_sub_second_ttl_rounds_up() {
        let f = fixture().await;

        f.service
            .set("a", &1, Some(Duration::from_millis(200)), None)
            .await
            .unwrap();

        assert_eq!(f.backend.native_ttl("test:a"), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_repaired() {
        let backend = MockBackend::new().with_raw("test:bad", "{not json");
        let f = fixture_with(backend, test_settings()).await;

        assert!(f.service.get::<Value>("bad").await.unwrap().is_none());
        assert!(!f.backend.contains("test:bad"));
        assert!(!f.service.exists("bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_corruption_detected_by_exists() {
        let backend = MockBackend::new().with_raw("test:bad", "\"bare string\"");
        let f = fixture_with(backend, test_settings()).await;

        assert!(!f.service.exists("bad").await.unwrap());
        assert!(!f.backend.contains("test:bad"));
    }

    #[tokio::test]
    async fn test_payload_type_mismatch_keeps_entry() {
        let f = fixture().await;

        f.service.set("a", &"text", None, None).await.unwrap();

        assert_eq!(f.service.get_value::<u64>("a").await.unwrap(), None);
        assert!(f.backend.contains("test:a"));
        assert!(f.service.exists("a").await.unwrap());
        assert_eq!(
            f.service.get_value::<String>("a").await.unwrap(),
            Some("text".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_repaired() {
        let backend = MockBackend::new()
            .with_raw("test:bare", "\"bare string\"")
            .with_raw("test:no-value", r#"{"timestamp":1}"#);
        let f = fixture_with(backend, test_settings()).await;

        assert!(f.service.get::<Value>("bare").await.unwrap().is_none());
        assert!(!f.backend.contains("test:bare"));

        assert!(f.service.get::<Value>("no-value").await.unwrap().is_none());
        assert!(!f.backend.contains("test:no-value"));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let f = fixture().await;
        assert!(f.service.get::<Value>("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_del() {
        let f = fixture().await;

        f.service.set("a", &1, None, None).await.unwrap();

        assert!(f.service.del("a").await.unwrap());
        assert!(!f.service.del("a").await.unwrap());
        assert!(f.service.get::<i32>("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_strip_prefix() {
        let backend = MockBackend::new().with_raw("other:user:9", "{}");
        let f = fixture_with(backend, test_settings()).await;

        f.service.set("user:1", &1, None, None).await.unwrap();
        f.service.set("user:2", &2, None, None).await.unwrap();
        f.service.set("session:1", &3, None, None).await.unwrap();

        let keys = f.service.keys("user:*").await.unwrap();
        assert_eq!(keys, vec!["user:1", "user:2"]);
        assert_eq!(f.service.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_flush_all_only_touches_prefix() {
        let backend = MockBackend::new()
            .with_raw("other:a", "1")
            .with_raw("testing:b", "2");
        let f = fixture_with(backend, test_settings()).await;

        f.service.set("a", &1, None, None).await.unwrap();
        f.service.set("b", &2, None, None).await.unwrap();

        assert!(f.service.flush_all().await.unwrap());

        assert!(f.service.keys("*").await.unwrap().is_empty());
        assert!(f.backend.contains("other:a"));
        assert!(f.backend.contains("testing:b"));
    }

    #[tokio::test]
    async fn test_flush_all_refuses_empty_prefix() {
        let settings = test_settings().with_key_prefix("");
        let backend = MockBackend::new().with_raw("shared", "1");
        let f = fixture_with(backend, settings).await;

        assert!(matches!(
            f.service.flush_all().await,
            Err(CacheError::Configuration { .. })
        ));
        assert!(f.backend.contains("shared"));
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let f = fixture_with(MockBackend::new().with_error("connection reset"), test_settings()).await;

        let result = f.service.set("a", &1, None, None).await;
        assert!(matches!(result, Err(CacheError::Backend { .. })));
        assert!(f.service.get::<i32>("a").await.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_cache_fails_fast() {
        let settings = CacheSettings::default();
        let factory = Arc::new(MockBackendFactory::new());
        let connector = Arc::new(BackendConnector::with_factory(&settings, factory.clone()));
        let service = CacheService::new(connector, &settings);

        let result = service.set("a", &1, None, None).await;
        assert_eq!(result, Err(CacheError::NotConfigured));
        assert!(service.get::<i32>("a").await.unwrap_err().is_unavailable());
        assert_eq!(factory.attempts(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_cache_is_unavailable() {
        let settings = test_settings().with_retries(1, Duration::from_millis(10));
        let factory = Arc::new(MockBackendFactory::new().always_failing());
        let connector = Arc::new(BackendConnector::with_factory(&settings, factory));
        let service = CacheService::new(connector, &settings);

        let result = service.set("a", &1, None, None).await;
        assert!(matches!(result, Err(CacheError::Unavailable { .. })));

        let result = service.get::<i32>("a").await;
        assert!(matches!(result, Err(CacheError::Unavailable { .. })));
    }

    #[test]
    fn test_whole_seconds() {
        assert_eq!(whole_seconds(Duration::ZERO), 0);
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(5)), 5);
        assert_eq!(whole_seconds(Duration::from_millis(5500)), 6);
    }
}
