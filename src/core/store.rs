use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::sequence_key;
use crate::core::errors::{StoreError, StoreResult};

/// Byte-level key-value storage with JSON helpers on top.
///
/// The Spin component runs against `spin_sdk::key_value::Store`; the native
/// server and the tests use [`MemoryStore`].
pub trait KvStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    fn delete(&self, key: &str) -> StoreResult<()>;

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes)
    }
}

impl KvStore for spin_sdk::key_value::Store {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        spin_sdk::key_value::Store::get(self, key).map_err(|e| StoreError::Backend(format!("{:?}", e)))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        spin_sdk::key_value::Store::set(self, key, value)
            .map_err(|e| StoreError::Backend(format!("{:?}", e)))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        spin_sdk::key_value::Store::delete(self, key)
            .map_err(|e| StoreError::Backend(format!("{:?}", e)))
    }
}

pub fn open_default() -> StoreResult<spin_sdk::key_value::Store> {
    spin_sdk::key_value::Store::open_default().map_err(|e| StoreError::Backend(format!("{:?}", e)))
}

/// Process-local store used by the native server and the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Allocates the next numeric id for `entity`, starting at 1.
pub fn next_id<S: KvStore>(store: &S, entity: &str) -> StoreResult<u64> {
    let key = sequence_key(entity);
    let next = store.get_json::<u64>(&key)?.unwrap_or(0) + 1;
    store.set_json(&key, &next)?;
    Ok(next)
}

pub fn load_list<S: KvStore>(store: &S, key: &str) -> StoreResult<Vec<u64>> {
    Ok(store.get_json(key)?.unwrap_or_default())
}

pub fn push_to_list<S: KvStore>(store: &S, key: &str, id: u64) -> StoreResult<()> {
    let mut ids = load_list(store, key)?;
    if !ids.contains(&id) {
        ids.push(id);
        store.set_json(key, &ids)?;
    }
    Ok(())
}

pub fn remove_from_list<S: KvStore>(store: &S, key: &str, id: u64) -> StoreResult<()> {
    let mut ids = load_list(store, key)?;
    ids.retain(|existing| *existing != id);
    store.set_json(key, &ids)
}

/// Loads every entity listed under `list_key`, skipping dangling ids.
pub fn load_all<S, T, F>(store: &S, list_key: &str, entity_key: F) -> StoreResult<Vec<T>>
where
    S: KvStore,
    T: DeserializeOwned,
    F: Fn(u64) -> String,
{
    let mut items = Vec::new();
    for id in load_list(store, list_key)? {
        if let Some(item) = store.get_json::<T>(&entity_key(id))? {
            items.push(item);
        }
    }
    Ok(items)
}
