use std::collections::HashMap;

use crate::Indexers;
use crate::KeyFunc;
use crate::KnownObjects;
use crate::Object;
use crate::Result;
use crate::StoreError;
use crate::ThreadSafeStore;

/// An indexed object cache keyed through a [`KeyFunc`].
///
/// This is the materialized view of the remote store as the client knows it:
/// the controller's processor keeps it current, reconcilers read from it, and
/// the delta FIFO consults it (through [`KnownObjects`]) to synthesize
/// deletions and resync deltas.
pub struct Cache<T> {
    storage: ThreadSafeStore<T>,
    key_fn: KeyFunc<T>,
}

impl<T: Object> Cache<T> {
    pub fn new(key_fn: KeyFunc<T>) -> Self {
        Self::with_indexers(key_fn, Indexers::new())
    }

    pub fn with_indexers(
        key_fn: KeyFunc<T>,
        indexers: Indexers<T>,
    ) -> Self {
        Self {
            storage: ThreadSafeStore::new(indexers),
            key_fn,
        }
    }

    fn key_of(
        &self,
        obj: &T,
    ) -> Result<String> {
        Ok((self.key_fn)(obj)?)
    }

    /// Insert or replace `obj` under its derived key.
    pub fn add(
        &self,
        obj: T,
    ) -> Result<()> {
        let key = self.key_of(&obj)?;
        self.storage.add(&key, obj);
        Ok(())
    }

    /// Semantically identical to [`add`](Self::add).
    pub fn update(
        &self,
        obj: T,
    ) -> Result<()> {
        let key = self.key_of(&obj)?;
        self.storage.update(&key, obj);
        Ok(())
    }

    /// Remove the entry whose key matches `obj`'s.
    pub fn delete(
        &self,
        obj: &T,
    ) -> Result<()> {
        let key = self.key_of(obj)?;
        self.storage.delete(&key);
        Ok(())
    }

    /// Remove the entry at `key` directly. Used when the caller already holds
    /// a key - for instance a tombstone from an inferred deletion.
    pub fn delete_by_key(
        &self,
        key: &str,
    ) {
        self.storage.delete(key);
    }

    /// Last known state for the object sharing `obj`'s key.
    pub fn get(
        &self,
        obj: &T,
    ) -> Result<Option<T>> {
        let key = self.key_of(obj)?;
        Ok(self.storage.get(&key))
    }

    pub fn get_by_key(
        &self,
        key: &str,
    ) -> Option<T> {
        self.storage.get(key)
    }

    pub fn list(&self) -> Vec<T> {
        self.storage.list()
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.storage.list_keys()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Atomically replace the cache contents with `items`, rebuilding all
    /// indices. A key failure on any item aborts the whole replace.
    pub fn replace(
        &self,
        items: Vec<T>,
        resource_version: &str,
    ) -> Result<()> {
        let mut keyed = HashMap::with_capacity(items.len());
        for obj in items {
            let key = self.key_of(&obj)?;
            keyed.insert(key, obj);
        }
        self.storage.replace(keyed, resource_version);
        Ok(())
    }

    /// No-op: the cache itself has nothing to resync. Present for interface
    /// parity with queues that do.
    pub fn resync(&self) -> Result<()> {
        Ok(())
    }

    pub fn index(
        &self,
        index_name: &str,
        obj: &T,
    ) -> std::result::Result<Vec<T>, StoreError> {
        self.storage.index(index_name, obj)
    }

    pub fn by_index(
        &self,
        index_name: &str,
        indexed_value: &str,
    ) -> std::result::Result<Vec<T>, StoreError> {
        self.storage.by_index(index_name, indexed_value)
    }

    pub fn index_keys(
        &self,
        index_name: &str,
        indexed_value: &str,
    ) -> std::result::Result<Vec<String>, StoreError> {
        self.storage.index_keys(index_name, indexed_value)
    }

    pub fn list_index_func_values(
        &self,
        index_name: &str,
    ) -> Vec<String> {
        self.storage.list_index_func_values(index_name)
    }

    pub fn add_indexers(
        &self,
        new_indexers: Indexers<T>,
    ) -> std::result::Result<(), StoreError> {
        self.storage.add_indexers(new_indexers)
    }

    /// The key function this cache derives keys with.
    pub fn key_fn(&self) -> KeyFunc<T> {
        self.key_fn.clone()
    }
}

impl<T: Object> KnownObjects<T> for Cache<T> {
    fn list_keys(&self) -> Vec<String> {
        Cache::list_keys(self)
    }

    fn get_by_key(
        &self,
        key: &str,
    ) -> Option<T> {
        Cache::get_by_key(self, key)
    }
}
