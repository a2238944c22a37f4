use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Object;
use crate::StoreError;

/// Maps an object to zero or more string index values.
pub type IndexFunc<T> = Arc<dyn Fn(&T) -> Vec<String> + Send + Sync>;

/// Index name → index function.
pub type Indexers<T> = HashMap<String, IndexFunc<T>>;

/// Index value → set of object keys.
pub type Index = HashMap<String, HashSet<String>>;

/// Index name → [`Index`].
pub type Indices = HashMap<String, Index>;

/// Concurrent key→object map augmented with user-defined secondary indices.
///
/// A single readers-writer lock protects items, indexers, and indices; all
/// mutators take the exclusive lock, reads take the shared lock. Stored
/// objects are treated as immutable after insertion - accessors return
/// clones, and mutating an object in place would silently desynchronize the
/// indices.
pub struct ThreadSafeStore<T> {
    state: RwLock<StoreState<T>>,
}

struct StoreState<T> {
    items: HashMap<String, T>,
    indexers: Indexers<T>,
    indices: Indices,
}

impl<T: Object> Default for ThreadSafeStore<T> {
    fn default() -> Self {
        Self::new(Indexers::new())
    }
}

impl<T: Object> ThreadSafeStore<T> {
    pub fn new(indexers: Indexers<T>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                items: HashMap::new(),
                indexers,
                indices: Indices::new(),
            }),
        }
    }

    /// Insert or replace the object at `key`, reindexing it.
    pub fn add(
        &self,
        key: &str,
        obj: T,
    ) {
        self.update(key, obj)
    }

    /// Semantically identical to [`add`](Self::add).
    pub fn update(
        &self,
        key: &str,
        obj: T,
    ) {
        let mut state = self.state.write();
        let old = state.items.insert(key.to_string(), obj.clone());
        state.update_indices(old.as_ref(), &obj, key);
    }

    /// Remove the object at `key`, if present, dropping its index entries.
    pub fn delete(
        &self,
        key: &str,
    ) {
        let mut state = self.state.write();
        if let Some(obj) = state.items.remove(key) {
            state.delete_from_indices(&obj, key);
        }
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<T> {
        self.state.read().items.get(key).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.state.read().items.values().cloned().collect()
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.state.read().items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Atomically replace the entire map and rebuild all indices from
    /// scratch. The resource version is informational only.
    pub fn replace(
        &self,
        items: HashMap<String, T>,
        _resource_version: &str,
    ) {
        let mut state = self.state.write();
        state.items = items;
        state.indices = Indices::new();
        let rebuilt: Vec<(String, T)> = state
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, item) in rebuilt {
            state.update_indices(None, &item, &key);
        }
    }

    /// Objects sharing at least one index value with `obj` under the named
    /// index. The result is deduplicated when the index function produces
    /// multiple values.
    pub fn index(
        &self,
        index_name: &str,
        obj: &T,
    ) -> std::result::Result<Vec<T>, StoreError> {
        let state = self.state.read();
        let index_func = state.indexers.get(index_name).ok_or(StoreError::UnknownIndex {
            name: index_name.to_string(),
        })?;

        let indexed_values = index_func(obj);
        let empty = Index::new();
        let index = state.indices.get(index_name).unwrap_or(&empty);

        let mut store_keys: HashSet<&String> = HashSet::new();
        if let [single] = indexed_values.as_slice() {
            // Most index functions produce exactly one value; skip the dedup.
            if let Some(set) = index.get(single) {
                store_keys.extend(set.iter());
            }
        } else {
            for value in &indexed_values {
                if let Some(set) = index.get(value) {
                    store_keys.extend(set.iter());
                }
            }
        }

        Ok(store_keys.into_iter().filter_map(|k| state.items.get(k).cloned()).collect())
    }

    /// Objects whose indexed values under `index_name` include
    /// `indexed_value`.
    pub fn by_index(
        &self,
        index_name: &str,
        indexed_value: &str,
    ) -> std::result::Result<Vec<T>, StoreError> {
        let state = self.state.read();
        if !state.indexers.contains_key(index_name) {
            return Err(StoreError::UnknownIndex {
                name: index_name.to_string(),
            });
        }
        let keys = state
            .indices
            .get(index_name)
            .and_then(|index| index.get(indexed_value));
        Ok(match keys {
            Some(set) => set.iter().filter_map(|k| state.items.get(k).cloned()).collect(),
            None => Vec::new(),
        })
    }

    /// Store keys whose indexed values under `index_name` include
    /// `indexed_value`.
    pub fn index_keys(
        &self,
        index_name: &str,
        indexed_value: &str,
    ) -> std::result::Result<Vec<String>, StoreError> {
        let state = self.state.read();
        if !state.indexers.contains_key(index_name) {
            return Err(StoreError::UnknownIndex {
                name: index_name.to_string(),
            });
        }
        Ok(state
            .indices
            .get(index_name)
            .and_then(|index| index.get(indexed_value))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Current value domain of the named index.
    pub fn list_index_func_values(
        &self,
        index_name: &str,
    ) -> Vec<String> {
        let state = self.state.read();
        state
            .indices
            .get(index_name)
            .map(|index| index.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of the registered indexers.
    pub fn indexer_names(&self) -> Vec<String> {
        self.state.read().indexers.keys().cloned().collect()
    }

    /// Register additional indexers. Rejected once the store holds data (a
    /// race-free rebuild would require a full pause) and on name collisions.
    pub fn add_indexers(
        &self,
        new_indexers: Indexers<T>,
    ) -> std::result::Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.items.is_empty() {
            return Err(StoreError::StorePopulated);
        }

        let mut conflicts: Vec<String> = new_indexers
            .keys()
            .filter(|name| state.indexers.contains_key(*name))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort();
            return Err(StoreError::IndexerConflict { names: conflicts });
        }

        state.indexers.extend(new_indexers);
        Ok(())
    }
}

impl<T: Object> StoreState<T> {
    /// Re-home `key` in every index: remove it under the old object's values,
    /// then add it under the new object's values. This ordering is the only
    /// correct way to handle objects whose index values change on update.
    fn update_indices(
        &mut self,
        old_obj: Option<&T>,
        new_obj: &T,
        key: &str,
    ) {
        if let Some(old) = old_obj {
            self.delete_from_indices(old, key);
        }
        for (name, index_func) in &self.indexers {
            let index = self.indices.entry(name.clone()).or_default();
            for value in index_func(new_obj) {
                index.entry(value).or_default().insert(key.to_string());
            }
        }
    }

    fn delete_from_indices(
        &mut self,
        obj: &T,
        key: &str,
    ) {
        for (name, index_func) in &self.indexers {
            let Some(index) = self.indices.get_mut(name) else {
                continue;
            };
            for value in index_func(obj) {
                if let Some(set) = index.get_mut(&value) {
                    set.remove(key);
                    // Empty buckets are pruned eagerly: high-cardinality
                    // short-lived values would otherwise grow the index
                    // without bound.
                    if set.is_empty() {
                        index.remove(&value);
                    }
                }
            }
        }
    }
}
