use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::kvs::{EventStoreError, KeyValueStore, StoreTx, TxBody};

type Buckets = HashMap<String, HashMap<String, Vec<u8>>>;

/// In-memory reference backend: a map of maps behind one coarse lock.
///
/// The lock is held for the whole `with_tx` body, which serializes the
/// read-check-write sequence across all streams. Unrelated streams are
/// serialized too; a throughput limitation, not a correctness bug.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new(buckets: &[&str]) -> Self {
        tracing::debug!(?buckets, "assert buckets");
        let buckets = buckets
            .iter()
            .map(|bucket| (bucket.to_string(), HashMap::new()))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }
}

fn assert_bucket(buckets: &Buckets, bucket: &str) -> Result<(), EventStoreError> {
    if buckets.contains_key(bucket) {
        Ok(())
    } else {
        Err(EventStoreError::BucketNotFound(bucket.to_string()))
    }
}

fn get_from(buckets: &Buckets, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
    let entries = buckets
        .get(bucket)
        .ok_or_else(|| EventStoreError::BucketNotFound(bucket.to_string()))?;
    entries
        .get(key)
        .cloned()
        .ok_or_else(|| EventStoreError::KeyNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
}

struct MemoryTx<'a> {
    buckets: &'a Buckets,
    staged: Vec<(String, String, Vec<u8>)>,
}

impl StoreTx for MemoryTx<'_> {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
        // Read-your-writes: the latest staged value wins.
        for (b, k, value) in self.staged.iter().rev() {
            if b == bucket && k == key {
                return Ok(value.clone());
            }
        }
        get_from(self.buckets, bucket, key)
    }

    fn put(&mut self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError> {
        assert_bucket(self.buckets, bucket)?;
        self.staged
            .push((bucket.to_string(), key.to_string(), value.to_vec()));
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn assert_bucket(&self, bucket: &str) -> Result<(), EventStoreError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;
        assert_bucket(&buckets, bucket)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;
        get_from(&buckets, bucket, key)
    }

    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;
        assert_bucket(&buckets, bucket)?;
        if let Some(entries) = buckets.get_mut(bucket) {
            entries.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn with_tx(&self, body: &mut TxBody) -> Result<(), EventStoreError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;
        let mut tx = MemoryTx {
            buckets: &*buckets,
            staged: Vec::new(),
        };
        body(&mut tx)?;
        let staged = tx.staged;
        for (bucket, key, value) in staged {
            if let Some(entries) = buckets.get_mut(&bucket) {
                entries.insert(key, value);
            }
        }
        Ok(())
    }
}
