// [libs/core/dedup/src/sharded_set.rs]
/*!
 * APARATO: SHARDED DEDUP SET (ESTRATO L1)
 * RESPONSABILIDAD: DEDUPLICACIÓN CONCURRENTE DE HASHES CRACKEADOS
 *
 * Sharded `RwLock` + SipHash routing over a fixed partition count, applied
 * to a `HashSet<String>` of normalized hash values. The crack ingestion
 * pipeline uses this to answer "have we already seen this hash crack in
 * this process" in O(1) without serializing all ingestion through one
 * global lock.
 */

use siphasher::sip::SipHasher13;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::error;

pub struct ShardedDedupSet {
    shards: Vec<RwLock<HashSet<String>>>,
    partition_count: usize,
    inserted_count: AtomicUsize,
}

impl ShardedDedupSet {
    #[must_use]
    pub fn new(partition_count: usize) -> Self {
        let safe_partition_count = partition_count.max(1);
        let mut shards = Vec::with_capacity(safe_partition_count);
        for _ in 0..safe_partition_count {
            shards.push(RwLock::new(HashSet::new()));
        }
        Self {
            shards,
            partition_count: safe_partition_count,
            inserted_count: AtomicUsize::new(0),
        }
    }

    fn route(&self, key: &str) -> usize {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partition_count
    }

    /// Inserts `key`, returning `true` if it was newly inserted (i.e. this is
    /// the first time this process has seen it) and `false` if it was
    /// already present.
    pub fn insert_if_absent(&self, key: &str) -> bool {
        let shard_index = self.route(key);
        let Some(shard) = self.shards.get(shard_index) else { return true };

        match shard.write() {
            Ok(mut set) => {
                let newly_inserted = set.insert(key.to_string());
                if newly_inserted {
                    self.inserted_count.fetch_add(1, Ordering::Relaxed);
                }
                newly_inserted
            }
            Err(poisoned) => {
                error!("dedup shard {} lock poisoned: {}", shard_index, poisoned);
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let shard_index = self.route(key);
        let Some(shard) = self.shards.get(shard_index) else { return false };
        match shard.read() {
            Ok(set) => set.contains(key),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inserted_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
