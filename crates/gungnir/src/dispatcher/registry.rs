use crate::{operator::OperatorNode, tuple::GroupKey};
use gungnir_types::{
    config::{Config, ConfigError},
    constants::GROUPING_MAX_KEYS,
};
use indexmap::IndexMap;
use std::num::NonZeroUsize;
use tracing::warn;

/// How many per-key operator instances a grouping dispatcher keeps alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyRetention {
    /// Instances live until the task is cleaned up.
    #[default]
    Unbounded,
    /// Past `capacity` keys, the least recently dispatched instance is
    /// cleaned up and dropped.
    Lru { capacity: NonZeroUsize },
}

impl KeyRetention {
    pub fn lru(capacity: NonZeroUsize) -> Self {
        Self::Lru { capacity }
    }

    /// Reads `gungnir.grouping.max_keys`; unset means unbounded.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let Some(max_keys) = config.grouping_max_keys()? else {
            return Ok(Self::Unbounded);
        };
        usize::try_from(max_keys)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self::lru)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: GROUPING_MAX_KEYS.to_string(),
                reason: format!("{max_keys} is not a valid number of keys"),
            })
    }
}

/// Operator instances indexed by partition key.
///
/// Holds at most one instance per key.  Under [`KeyRetention::Lru`] the map
/// order is recency order: the front entry is the next to be evicted.
pub struct PerKeyRegistry {
    instances: IndexMap<GroupKey, OperatorNode>,
    retention: KeyRetention,
    evicted: u64,
}

impl PerKeyRegistry {
    pub fn new(retention: KeyRetention) -> Self {
        Self {
            instances: IndexMap::new(),
            retention,
            evicted: 0,
        }
    }

    pub fn retention(&self) -> KeyRetention {
        self.retention
    }

    pub(crate) fn set_retention(&mut self, retention: KeyRetention) {
        self.retention = retention;
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of instances dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.instances.contains_key(key)
    }

    pub fn get(&self, key: &GroupKey) -> Option<&OperatorNode> {
        self.instances.get(key)
    }

    /// Keys in eviction order under LRU retention, insertion order otherwise.
    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.instances.keys()
    }

    /// Returns the instance for `key`, calling `create` on a miss.  A failed
    /// `create` leaves the registry unchanged.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: GroupKey,
        create: impl FnOnce() -> Result<OperatorNode, E>,
    ) -> Result<&mut OperatorNode, E> {
        let index = self.index_or_try_insert_with(key, create)?;
        Ok(&mut self.instances[index])
    }

    /// Same as [`Self::get_or_try_insert_with`], but returns the position of
    /// the instance so the caller can inspect the registry before using it.
    pub(crate) fn index_or_try_insert_with<E>(
        &mut self,
        key: GroupKey,
        create: impl FnOnce() -> Result<OperatorNode, E>,
    ) -> Result<usize, E> {
        if let Some(index) = self.instances.get_index_of(&key) {
            return Ok(match self.retention {
                KeyRetention::Unbounded => index,
                KeyRetention::Lru { .. } => {
                    let last = self.instances.len() - 1;
                    self.instances.move_index(index, last);
                    last
                }
            });
        }

        let node = create()?;
        if let KeyRetention::Lru { capacity } = self.retention {
            while self.instances.len() >= capacity.get() {
                self.evict_front();
            }
        }
        let (index, _) = self.instances.insert_full(key, node);
        Ok(index)
    }

    /// The instance at a position returned by
    /// [`Self::index_or_try_insert_with`].  Panics if the position is stale.
    pub(crate) fn instance_at(&mut self, index: usize) -> &mut OperatorNode {
        &mut self.instances[index]
    }

    /// Cleans up and drops the instance for `key`.
    pub fn remove(&mut self, key: &GroupKey) -> bool {
        match self.instances.shift_remove(key) {
            Some(mut node) => {
                node.cleanup();
                true
            }
            None => false,
        }
    }

    /// Cleans up and drops every instance.
    pub fn clear(&mut self) {
        for (_, mut node) in self.instances.drain(..) {
            node.cleanup();
        }
    }

    fn evict_front(&mut self) {
        if let Some((key, mut node)) = self.instances.shift_remove_index(0) {
            warn!(operator = node.name(), %key, "evicting per-key operator instance");
            node.cleanup();
            self.evicted += 1;
        }
    }
}
