//! Content-addressed embedding cache

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::domain::cache::{text_hash, VectorCacheEntry, VectorKey};
use crate::domain::CacheError;

use super::service::{whole_seconds, CacheService};

/// One embedding to store in a batch write
#[derive(Debug, Clone, PartialEq)]
pub struct VectorInput {
    pub text: String,
    pub embedding: Vec<f32>,
    pub provider: String,
    pub model: String,
    pub cost: f64,
}

impl VectorInput {
    pub fn new(
        text: impl Into<String>,
        embedding: Vec<f32>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            embedding,
            provider: provider.into(),
            model: model.into(),
            cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Embedding cache keyed by provider, model, and text digest
///
/// Writes are best-effort and report success as a boolean. Reads verify the
/// stored digest and embedding space against the lookup and drop any entry
/// that does not match.
#[derive(Debug, Clone)]
pub struct VectorCache {
    cache: Arc<CacheService>,
    default_ttl: Duration,
}

impl VectorCache {
    pub fn new(cache: Arc<CacheService>, settings: &CacheSettings) -> Self {
        Self {
            cache,
            default_ttl: settings.vector_ttl(),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores an embedding for `text`; never fails, returns whether it was written
    pub async fn cache_vector(
        &self,
        text: &str,
        embedding: &[f32],
        provider: &str,
        model: &str,
        cost: f64,
        ttl: Option<Duration>,
    ) -> bool {
        let key = VectorKey::new(provider, model, text);
        let ttl = ttl.unwrap_or(self.default_ttl);

        let entry = VectorCacheEntry {
            embedding: embedding.to_vec(),
            timestamp: self.cache.now_millis(),
            ttl: whole_seconds(ttl),
            provider: provider.to_string(),
            model: model.to_string(),
            text_hash: key.text_hash.clone(),
            cost,
        };

        match self
            .cache
            .write_envelope(&key.to_string(), &entry, Some(ttl))
            .await
        {
            Ok(()) => {
                debug!(
                    provider = %provider,
                    model = %model,
                    dimensions = embedding.len(),
                    "Embedding cached"
                );
                true
            }
            Err(e) => {
                warn!(provider = %provider, model = %model, error = %e, "Failed to cache embedding");
                false
            }
        }
    }

    /// Looks up the embedding for `text` in the given embedding space
    ///
    /// Returns `None` on miss, expiry, corruption, or integrity mismatch.
    pub async fn get_cached_vector(
        &self,
        text: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<Vec<f32>>, CacheError> {
        let key = VectorKey::new(provider, model, text).to_string();

        let Some(entry) = self.cache.read_envelope::<VectorCacheEntry>(&key).await? else {
            return Ok(None);
        };

        if entry.text_hash != text_hash(text) || entry.provider != provider || entry.model != model
        {
            warn!(
                provider = %provider,
                model = %model,
                "Cached embedding failed integrity check; entry removed"
            );
            self.cache.remove(&key).await;
            return Ok(None);
        }

        debug!(provider = %provider, model = %model, "Embedding cache HIT");
        Ok(Some(entry.embedding))
    }

    /// Looks up many texts concurrently, treating failures as misses
    pub async fn get_cached_vectors(
        &self,
        texts: &[&str],
        provider: &str,
        model: &str,
    ) -> Vec<Option<Vec<f32>>> {
        let lookups = texts
            .iter()
            .map(|text| self.get_cached_vector(text, provider, model));

        join_all(lookups)
            .await
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|e| {
                    debug!(error = %e, "Embedding lookup failed");
                    None
                })
            })
            .collect()
    }

    /// Writes all inputs concurrently, returning how many succeeded
    pub async fn cache_vector_batch(&self, vectors: &[VectorInput], ttl: Option<Duration>) -> usize {
        let writes = vectors.iter().map(|input| {
            self.cache_vector(
                &input.text,
                &input.embedding,
                &input.provider,
                &input.model,
                input.cost,
                ttl,
            )
        });

        let stored = join_all(writes).await.into_iter().filter(|ok| *ok).count();

        if stored < vectors.len() {
            warn!(stored, total = vectors.len(), "Embedding batch partially cached");
        } else {
            debug!(stored, "Embedding batch cached");
        }

        stored
    }

    /// Deletes every cached embedding of one provider/model pair
    pub async fn invalidate(&self, provider: &str, model: &str) -> Result<usize, CacheError> {
        let deleted = self
            .cache
            .delete_matching(&VectorKey::scope_pattern(provider, model))
            .await?;

        info!(provider = %provider, model = %model, deleted, "Embedding cache invalidated");
        Ok(deleted)
    }
}
