//! Bounded least-recently-used cache of open resources.
//!
//! Resources are opened on first use through a [`ResourceOpener`] and closed
//! (dropped) when evicted, cleared, or when the cache itself is dropped.

use crate::Result;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Opens the resource identified by a key.
pub trait ResourceOpener<K> {
    type Resource;

    /// Opens the resource for `key`.
    ///
    /// # Errors
    /// Returns an error if the resource is unavailable.
    fn open(&mut self, key: &K) -> Result<Self::Resource>;
}

impl<K, R, F> ResourceOpener<K> for F
where
    F: FnMut(&K) -> Result<R>,
{
    type Resource = R;

    fn open(&mut self, key: &K) -> Result<R> {
        self(key)
    }
}

/// LRU cache holding at most `capacity` open resources.
pub struct LruCache<K, O: ResourceOpener<K>> {
    capacity: usize,
    opener: O,
    entries: HashMap<K, O::Resource>,
    /// Most recently used first.
    order: VecDeque<K>,
}

impl<K, O> LruCache<K, O>
where
    K: Eq + Hash + Clone + Debug,
    O: ResourceOpener<K>,
{
    /// Creates an empty cache.
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize, opener: O) -> Result<Self> {
        if capacity == 0 {
            return Err(vismap_core::Error::ConfigError(
                "cache capacity must be at least 1".to_string(),
            )
            .into());
        }
        Ok(Self {
            capacity,
            opener,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        })
    }

    /// Returns the resource for `key`, opening it on a miss.
    ///
    /// A hit marks the key most recently used. A miss opens the resource
    /// first; only if that succeeds and the cache is full is the least
    /// recently used entry closed. A failed open leaves the cache unchanged.
    ///
    /// # Errors
    /// Returns the opener's error on a failed open.
    pub fn try_get(&mut self, key: &K) -> Result<&O::Resource> {
        if !self.entries.contains_key(key) {
            let resource = self.opener.open(key)?;
            if self.order.len() >= self.capacity {
                self.evict_lru();
            }
            self.order.push_front(key.clone());
            return Ok(self.entries.entry(key.clone()).or_insert(resource));
        }
        self.touch(key);
        // touch only reorders, so the key is still present
        Ok(&self.entries[key])
    }

    /// Like [`try_get`](Self::try_get), but logs a failed open and returns `None`.
    pub fn get(&mut self, key: &K) -> Option<&O::Resource> {
        match self.try_get(key) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!("cache: cannot open {key:?}: {e}");
                None
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Cached keys, most recently used first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    /// Closes every cached resource.
    pub fn clear(&mut self) {
        while !self.order.is_empty() {
            self.evict_lru();
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_front(k);
            }
        }
    }

    fn evict_lru(&mut self) {
        if let Some(old) = self.order.pop_back() {
            drop(self.entries.remove(&old));
            debug!("cache: closed {old:?}");
        }
    }
}
