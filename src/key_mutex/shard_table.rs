//! Resolution of keys to lock slots.

use std::{collections::HashMap, sync::Arc};

use derive_more::{Deref, Display, From};
use parking_lot::RwLock;

use super::lock_slot::LockSlot;

/// The index of the shard governing a key in a sharded [`HashedKeyMutex`](super::HashedKeyMutex).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deref)]
pub struct ShardIndex(usize);

impl ShardIndex {
    /// Compute the shard index of `key` for `shard_count` shards.
    ///
    /// # Panics
    /// Panics if `shard_count` is zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(key: &str, shard_count: usize) -> Self {
        assert_ne!(shard_count, 0, "shard index requires at least one shard");
        let hash = xxhash_rust::xxh3::xxh3_64(key.as_bytes());
        Self((hash % shard_count as u64) as usize)
    }
}

#[derive(Debug)]
pub(crate) enum ShardTable {
    /// A fixed set of slots, keys are hashed to a slot.
    Sharded(Box<[Arc<LockSlot>]>),
    /// A slot per key, created on first use and never removed.
    Unbounded(RwLock<HashMap<String, Arc<LockSlot>>>),
}

impl ShardTable {
    pub(crate) fn new(shard_count: usize) -> Self {
        if shard_count == 0 {
            Self::Unbounded(RwLock::default())
        } else {
            Self::Sharded((0..shard_count).map(|_| Arc::default()).collect())
        }
    }

    pub(crate) fn shard_count(&self) -> usize {
        match self {
            Self::Sharded(slots) => slots.len(),
            Self::Unbounded(_) => 0,
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        match self {
            Self::Sharded(slots) => slots.len(),
            Self::Unbounded(slots) => slots.read().len(),
        }
    }

    pub(crate) fn shard_index(&self, key: &str) -> Option<ShardIndex> {
        match self {
            Self::Sharded(slots) => Some(ShardIndex::new(key, slots.len())),
            Self::Unbounded(_) => None,
        }
    }

    /// Returns the slot governing `key`, creating it if this is an unbounded table and `key` is new.
    pub(crate) fn resolve(&self, key: &str) -> Arc<LockSlot> {
        match self {
            Self::Sharded(slots) => slots[*ShardIndex::new(key, slots.len())].clone(),
            Self::Unbounded(slots) => {
                if let Some(slot) = slots.read().get(key) {
                    return slot.clone();
                }
                let mut slots = slots.write();
                slots
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        tracing::trace!(key, "creating lock slot");
                        Arc::default()
                    })
                    .clone()
            }
        }
    }

    /// Returns the slot governing `key` without creating it.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<LockSlot>> {
        match self {
            Self::Sharded(_) => Some(self.resolve(key)),
            Self::Unbounded(slots) => slots.read().get(key).cloned(),
        }
    }
}
