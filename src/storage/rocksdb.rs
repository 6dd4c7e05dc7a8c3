use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rocksdb::{Options, WriteBatch, DB};

use crate::domain::kvs::{EventStoreError, KeyValueStore, StoreTx, TxBody};

/// Persistent backend on RocksDB. Buckets become key prefixes
/// (`bucket:key`); a transaction stages its puts and commits them as one
/// `WriteBatch`, so the index and content writes land atomically or not at
/// all. A store-wide write lock serializes `with_tx` bodies.
pub struct RocksStore {
    db: DB,
    buckets: HashSet<String>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    pub fn new(path: impl AsRef<Path>, buckets: &[&str]) -> Result<Self, EventStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| EventStoreError::Storage(e.to_string()))?;
        Ok(Self {
            db,
            buckets: buckets.iter().map(|bucket| bucket.to_string()).collect(),
            write_lock: Mutex::new(()),
        })
    }

    fn full_key(bucket: &str, key: &str) -> String {
        format!("{bucket}:{key}")
    }

    fn get_raw(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
        self.assert_bucket(bucket)?;
        match self
            .db
            .get(Self::full_key(bucket, key))
            .map_err(|e| EventStoreError::Storage(e.to_string()))?
        {
            Some(value) => Ok(value),
            None => Err(EventStoreError::KeyNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

struct RocksTx<'a> {
    store: &'a RocksStore,
    staged: Vec<(String, Vec<u8>)>,
}

impl StoreTx for RocksTx<'_> {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
        let full = RocksStore::full_key(bucket, key);
        for (k, value) in self.staged.iter().rev() {
            if *k == full {
                return Ok(value.clone());
            }
        }
        self.store.get_raw(bucket, key)
    }

    fn put(&mut self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError> {
        self.store.assert_bucket(bucket)?;
        self.staged
            .push((RocksStore::full_key(bucket, key), value.to_vec()));
        Ok(())
    }
}

impl KeyValueStore for RocksStore {
    fn assert_bucket(&self, bucket: &str) -> Result<(), EventStoreError> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(EventStoreError::BucketNotFound(bucket.to_string()))
        }
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError> {
        self.get_raw(bucket, key)
    }

    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError> {
        self.assert_bucket(bucket)?;
        self.db
            .put(Self::full_key(bucket, key), value)
            .map_err(|e| EventStoreError::Storage(e.to_string()))
    }

    fn with_tx(&self, body: &mut TxBody) -> Result<(), EventStoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| EventStoreError::Storage("write lock poisoned".to_string()))?;
        let mut tx = RocksTx {
            store: self,
            staged: Vec::new(),
        };
        body(&mut tx)?;

        let mut batch = WriteBatch::default();
        for (key, value) in tx.staged {
            batch.put(key, value);
        }
        self.db
            .write(batch)
            .map_err(|e| EventStoreError::Storage(e.to_string()))
    }
}
