//! Stored entry envelopes

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn is_expired_at(timestamp: u64, ttl: Option<u64>, now_millis: u64) -> bool {
    match ttl {
        Some(ttl) if ttl > 0 => now_millis.saturating_sub(timestamp) > ttl.saturating_mul(1000),
        _ => false,
    }
}

/// A self-describing stored document that knows when it expires
pub trait Envelope {
    /// Payload-agnostic form of the document; failing to parse as this means
    /// the stored bytes are corrupt rather than of another payload type
    type Shape: DeserializeOwned + Envelope;

    fn is_expired(&self, now_millis: u64) -> bool;
}

/// Enveloped value as written to the backend
///
/// Serialized as `{value, timestamp, ttl?, metadata?}`. The envelope carries its
/// own creation time so expiry can be enforced on read regardless of the
/// backend's native TTL handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V = serde_json::Value> {
    /// The cached payload
    pub value: V,
    /// Creation instant (millis since epoch)
    pub timestamp: u64,
    /// Effective TTL in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, timestamp: u64) -> Self {
        Self {
            value,
            timestamp,
            ttl: None,
            metadata: None,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl<V> Envelope for CacheEntry<V> {
    type Shape = CacheEntry<serde_json::Value>;

    /// True once `timestamp + ttl * 1000` has passed
    fn is_expired(&self, now_millis: u64) -> bool {
        is_expired_at(self.timestamp, self.ttl, now_millis)
    }
}

/// Cached embedding vector
///
/// Serialized as `{embedding, timestamp, ttl, provider, model, textHash, cost}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorCacheEntry {
    pub embedding: Vec<f32>,
    pub timestamp: u64,
    pub ttl: u64,
    pub provider: String,
    pub model: String,
    /// SHA-256 hex digest of the source text
    pub text_hash: String,
    /// Informational cost of producing the embedding
    #[serde(default)]
    pub cost: f64,
}

impl Envelope for VectorCacheEntry {
    type Shape = VectorCacheEntry;

    fn is_expired(&self, now_millis: u64) -> bool {
        is_expired_at(self.timestamp, Some(self.ttl), now_millis)
    }
}

/// Fields shared by every envelope, used when only expiry matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EntryHeader {
    pub timestamp: u64,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl Envelope for EntryHeader {
    type Shape = EntryHeader;

    fn is_expired(&self, now_millis: u64) -> bool {
        is_expired_at(self.timestamp, self.ttl, now_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_format() {
        let entry = CacheEntry::new(json!({"x": 1}), 1_000).with_ttl(60);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value, json!({"value": {"x": 1}, "timestamp": 1000, "ttl": 60}));
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new("v", 10_000).with_ttl(1);

        assert!(!entry.is_expired(10_000));
        assert!(!entry.is_expired(11_000));
        assert!(entry.is_expired(11_001));
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry::new("v", 0);
        assert!(!entry.is_expired(u64::MAX));

        let zero = CacheEntry::new("v", 0).with_ttl(0);
        assert!(!zero.is_expired(u64::MAX));
    }

    #[test]
    fn test_vector_entry_uses_camel_case() {
        let entry = VectorCacheEntry {
            embedding: vec![0.5, -0.25],
            timestamp: 5,
            ttl: 300,
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            text_hash: "abc".to_string(),
            cost: 0.0001,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["textHash"], "abc");
        assert_eq!(value["embedding"], json!([0.5, -0.25]));
    }

    #[test]
    fn test_header_reads_both_envelopes() {
        let plain: EntryHeader =
            serde_json::from_str(r#"{"value":"v","timestamp":7,"ttl":2}"#).unwrap();
        assert_eq!(plain, EntryHeader { timestamp: 7, ttl: Some(2) });

        let vector: EntryHeader = serde_json::from_str(
            r#"{"embedding":[1.0],"timestamp":9,"ttl":300,"provider":"p","model":"m","textHash":"h","cost":0}"#,
        )
        .unwrap();
        assert_eq!(vector.ttl, Some(300));
    }
}
