//! Cache domain - backend contract, entry envelopes and key addressing

mod backend;
mod clock;
mod entry;
mod key;

pub use backend::{BackendMode, CacheBackend};
pub use clock::{Clock, SystemClock};
pub use entry::{CacheEntry, EntryHeader, Envelope, VectorCacheEntry};
pub use key::{text_hash, KeySpace, VectorKey};

#[cfg(test)]
pub use backend::mock::MockBackend;
#[cfg(test)]
pub use clock::mock::ManualClock;
