//! Keyed collection of cluster objects.

use std::collections::BTreeMap;
use crate::errors::StoreError;

/// Objects are kept under the key computed by `key_fn`. Listing is ordered by key so that
/// everything iterating over a store is deterministic.
pub struct ObjectStore<T> {
    items: BTreeMap<String, T>,
    key_fn: fn(&T) -> String,
}

impl<T: Clone> ObjectStore<T> {
    pub fn new(key_fn: fn(&T) -> String) -> Self {
        Self {
            items: BTreeMap::new(),
            key_fn,
        }
    }

    pub fn add(&mut self, item: T) -> Result<(), StoreError> {
        let key = (self.key_fn)(&item);
        if self.items.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        self.items.insert(key, item);
        Ok(())
    }

    pub fn update(&mut self, item: T) -> Result<(), StoreError> {
        let key = (self.key_fn)(&item);
        match self.items.get_mut(&key) {
            Some(stored) => {
                *stored = item;
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    /// Removes the object stored under the key of `item`.
    pub fn delete(&mut self, item: &T) -> Result<T, StoreError> {
        let key = (self.key_fn)(item);
        self.delete_by_key(&key)
    }

    pub fn delete_by_key(&mut self, key: &str) -> Result<T, StoreError> {
        self.items.remove(key).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Returns the stored object with the same key as `item`.
    pub fn get(&self, item: &T) -> Option<T> {
        self.items.get(&(self.key_fn)(item)).cloned()
    }

    pub fn get_by_key(&self, key: &str) -> Option<T> {
        self.items.get(key).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
