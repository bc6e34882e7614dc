//! In-memory object store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use ingest_remote::{ObjectStore, RemoteError};

#[derive(Debug, Default)]
struct StoreState {
    /// bucket → key → bytes
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    failing: BTreeSet<String>,
    fetches: usize,
}

#[derive(Debug, Default)]
pub struct MockObjectStore {
    state: Mutex<StoreState>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
    }

    pub fn remove(&self, bucket: &str, key: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(objects) = state.buckets.get_mut(bucket) {
            objects.remove(key);
        }
    }

    /// Make every fetch of `key` fail until `heal_key` is called
    pub fn fail_key(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.state.lock().unwrap().failing.remove(key);
    }

    /// Number of `get` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

impl ObjectStore for MockObjectStore {
    fn list(&self, bucket: &str) -> Result<Vec<String>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        if state.failing.contains(key) {
            return Err(RemoteError::Transport(format!("injected failure fetching {}", key)));
        }
        Ok(state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned())
    }
}
