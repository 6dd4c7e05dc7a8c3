use thiserror::Error;

use crate::domain::command::CommandKind;

/// Bucket holding the current version counter per stream, as an 8-byte
/// big-endian value.
pub const BUCKET_INDEX: &str = "_index";
/// Bucket holding the serialized stream record per stream.
pub const BUCKET_CONTENT: &str = "_content";

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("bucket ({0}) not found")]
    BucketNotFound(String),
    #[error("key ({bucket}:{key}) not found")]
    KeyNotFound { bucket: String, key: String },
    #[error("concurrent write mismatch index: {actual}(actual) != {expected}(expected)")]
    ConcurrentWriteConflict { expected: u64, actual: u64 },
    #[error("version mismatch in stream <{stream}>: version={version}, events={events}")]
    CorruptStream {
        stream: String,
        version: u64,
        events: usize,
    },
    #[error("read index failed: {0}")]
    StorageReadFailed(String),
    #[error("unknown command: <{0:?}>")]
    UnknownCommand(CommandKind),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Handle on an open transaction. Writes are staged and only become
/// visible once the enclosing [`KeyValueStore::with_tx`] body returns `Ok`;
/// reads observe staged writes first.
pub trait StoreTx {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError>;
    fn put(&mut self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError>;
}

pub type TxBody<'a> = dyn FnMut(&mut dyn StoreTx) -> Result<(), EventStoreError> + 'a;

/// Port for a bucketed, transactional byte store. Declared by the domain,
/// implemented by the backends under `crate::storage`.
///
/// `with_tx` must serialize the whole read-check-write sequence against
/// concurrent transactions; serializing individual `get`/`put` calls is not
/// enough to keep the optimistic-concurrency gate sound.
pub trait KeyValueStore: Send + Sync {
    /// Fails with [`EventStoreError::BucketNotFound`] unless `bucket` was
    /// provisioned when the store was constructed.
    fn assert_bucket(&self, bucket: &str) -> Result<(), EventStoreError>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EventStoreError>;

    /// Unconditionally replaces the value under `key` (last write wins).
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), EventStoreError>;

    /// Runs `body` against a transaction handle. The first error aborts the
    /// transaction and none of its staged writes become visible.
    fn with_tx(&self, body: &mut TxBody) -> Result<(), EventStoreError>;

    /// Undo partial effects of a failed transaction. A no-op for backends
    /// whose `with_tx` already guarantees staged writes never leak.
    fn rollback(&self) {}
}
