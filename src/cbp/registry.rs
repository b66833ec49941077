//! Content-addressed deduplication registry.
//!
//! Payloads are keyed by their xxHash64 (seed 0). A 64-bit non-cryptographic
//! hash has a small but non-zero collision probability; two distinct payloads
//! with the same hash would alias each other. At the message volumes this
//! registry targets (well under 2^32 distinct payloads) the birthday bound
//! keeps that risk below one in four billion.
//!
//! The registry is explicit state: encoders and decoders that must agree on
//! references share one instance through an `Arc`. Entries are never evicted;
//! memory grows with the number of distinct payloads until [`clear`] is
//! called.
//!
//! [`clear`]: SemanticRegistry::clear

use crate::core::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

/// Number of independently locked buckets.
const SHARD_COUNT: usize = 16;

/// A stored payload.
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    /// Serialized payload
    pub payload: Arc<[u8]>,
    /// Number of times the payload was seen again after first insertion
    pub hit_count: u32,
}

/// Result of [`SemanticRegistry::store_or_ref`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Content hash of the payload
    pub hash: ContentHash,
    /// Whether the payload was inserted by this call
    pub is_new: bool,
    /// Bytes saved by sending a reference instead of the payload
    pub bytes_saved: usize,
}

/// Registry statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Distinct payloads stored
    pub entries: usize,
    /// `store_or_ref` calls that found an existing payload
    pub hits: u64,
    /// `store_or_ref` calls that inserted a payload
    pub misses: u64,
    /// hits / (hits + misses), as a percentage
    pub hit_rate_percent: f64,
    /// Cumulative bytes saved by references
    pub bytes_saved: u64,
    /// Total `store_or_ref` calls
    pub total_refs: u64,
}

type Shard = RwLock<HashMap<ContentHash, RegistryEntry>>;

/// Sharded content-addressed payload store.
pub struct SemanticRegistry {
    shards: Vec<Shard>,
    hits: AtomicU64,
    misses: AtomicU64,
    bytes_saved: AtomicU64,
}

impl SemanticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bytes_saved: AtomicU64::new(0),
        }
    }

    /// Create an empty registry ready to be shared.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Content hash of a payload.
    pub fn hash(data: &[u8]) -> ContentHash {
        ContentHash(xxh64(data, 0))
    }

    fn shard(&self, hash: ContentHash) -> &Shard {
        &self.shards[(hash.0 % SHARD_COUNT as u64) as usize]
    }

    fn read(&self, hash: ContentHash) -> RwLockReadGuard<'_, HashMap<ContentHash, RegistryEntry>> {
        self.shard(hash).read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, hash: ContentHash) -> RwLockWriteGuard<'_, HashMap<ContentHash, RegistryEntry>> {
        self.shard(hash).write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `data` if unseen, otherwise count a hit against it.
    ///
    /// The check and the insert happen under one bucket lock, so concurrent
    /// calls with the same new payload insert it exactly once.
    pub fn store_or_ref(&self, data: &[u8]) -> StoreOutcome {
        let hash = Self::hash(data);
        let is_new = match self.write(hash).entry(hash) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.hit_count = entry.hit_count.saturating_add(1);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RegistryEntry {
                    payload: Arc::from(data),
                    hit_count: 0,
                });
                true
            }
        };

        if is_new {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(hash = %hash, len = data.len(), "registry insert");
            return StoreOutcome {
                hash,
                is_new,
                bytes_saved: 0,
            };
        }

        let bytes_saved = data.len().saturating_sub(ContentHash::WIRE_SIZE);
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved.fetch_add(bytes_saved as u64, Ordering::Relaxed);
        trace!(hash = %hash, bytes_saved, "registry hit");
        StoreOutcome {
            hash,
            is_new,
            bytes_saved,
        }
    }

    /// Insert `data` without touching hit or miss counters.
    ///
    /// Used on the receiving side to mirror what the sender stored.
    pub fn register(&self, data: &[u8]) -> ContentHash {
        let hash = Self::hash(data);
        self.write(hash).entry(hash).or_insert_with(|| RegistryEntry {
            payload: Arc::from(data),
            hit_count: 0,
        });
        hash
    }

    /// Payload stored under `hash`.
    pub fn get(&self, hash: ContentHash) -> Option<Arc<[u8]>> {
        self.read(hash).get(&hash).map(|e| Arc::clone(&e.payload))
    }

    /// Whether `hash` is known.
    pub fn contains(&self, hash: ContentHash) -> bool {
        self.read(hash).contains_key(&hash)
    }

    /// Hit count of the entry under `hash`.
    pub fn hit_count(&self, hash: ContentHash) -> Option<u32> {
        self.read(hash).get(&hash).map(|e| e.hit_count)
    }

    /// Number of distinct payloads.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset counters.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.bytes_saved.store(0, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn get_stats(&self) -> RegistryStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        RegistryStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate_percent: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64 * 100.0
            },
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            total_refs: total,
        }
    }
}

impl Default for SemanticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SemanticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRegistry")
            .field("entries", &self.len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_then_ref() {
        let registry = SemanticRegistry::new();
        let payload = vec![7u8; 100];

        let first = registry.store_or_ref(&payload);
        assert!(first.is_new);
        assert_eq!(first.bytes_saved, 0);

        let second = registry.store_or_ref(&payload);
        assert!(!second.is_new);
        assert_eq!(second.hash, first.hash);
        assert_eq!(second.bytes_saved, 92);
        assert_eq!(registry.hit_count(first.hash), Some(1));
        assert_eq!(registry.get(first.hash).as_deref(), Some(payload.as_slice()));
    }

    #[test]
    fn test_tiny_payload_saves_nothing() {
        let registry = SemanticRegistry::new();
        registry.store_or_ref(b"abc");
        assert_eq!(registry.store_or_ref(b"abc").bytes_saved, 0);
    }

    #[test]
    fn test_stats() {
        let registry = SemanticRegistry::new();
        assert_eq!(registry.get_stats(), RegistryStats::default());

        registry.store_or_ref(&[1u8; 40]);
        registry.store_or_ref(&[1u8; 40]);
        registry.store_or_ref(&[1u8; 40]);
        registry.store_or_ref(&[2u8; 40]);

        let stats = registry.get_stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_refs, 4);
        assert_eq!(stats.hit_rate_percent, 50.0);
        assert_eq!(stats.bytes_saved, 64);
    }

    #[test]
    fn test_register_does_not_count() {
        let registry = SemanticRegistry::new();
        let hash = registry.register(b"mirrored payload");
        assert!(registry.contains(hash));
        assert_eq!(registry.get_stats().total_refs, 0);

        // A later store of the same bytes is a hit
        assert!(!registry.store_or_ref(b"mirrored payload").is_new);
    }

    #[test]
    fn test_clear() {
        let registry = SemanticRegistry::new();
        let hash = registry.store_or_ref(b"payload").hash;
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(hash).is_none());
        assert_eq!(registry.get_stats().misses, 0);
    }

    #[test]
    fn test_concurrent_store_inserts_once() {
        let registry = SemanticRegistry::shared();
        let payload = b"the same new content from every thread".to_vec();

        let new_count: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let payload = payload.clone();
                    scope.spawn(move || {
                        (0..100)
                            .filter(|_| registry.store_or_ref(&payload).is_new)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(new_count, 1);
        let stats = registry.get_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 799);
        assert_eq!(registry.hit_count(SemanticRegistry::hash(&payload)), Some(799));
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(SemanticRegistry::hash(b""), ContentHash(0xef46db3751d8e999));
    }
}
