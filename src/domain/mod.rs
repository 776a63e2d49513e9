//! Domain layer - cache contracts, entities and errors

pub mod cache;
pub mod error;
pub mod health;

pub use cache::{
    text_hash, BackendMode, CacheBackend, CacheEntry, Clock, EntryHeader, Envelope, KeySpace,
    SystemClock, VectorCacheEntry, VectorKey,
};
pub use error::CacheError;
pub use health::{HealthSnapshot, HealthStatus};
