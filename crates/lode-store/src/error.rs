//! Error types for the key/value store.

use thiserror::Error;

/// Errors surfaced by the bucketed key/value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The storage engine reported an error.
    #[error("storage backend: {0}")]
    Backend(String),

    /// The referenced bucket does not exist.
    #[error("bucket not found")]
    BucketNotFound,

    /// Attempted to create a bucket that already exists.
    #[error("bucket already exists")]
    BucketExists,

    /// Bucket names must be non-empty.
    #[error("bucket name required")]
    BucketNameRequired,

    /// Keys must be non-empty.
    #[error("key required")]
    KeyRequired,

    /// The key names an entry of the other kind (value vs. nested bucket).
    #[error("key incompatible with existing entry")]
    IncompatibleValue,

    /// A mutating operation was attempted through a read transaction.
    #[error("transaction not writable")]
    TxNotWritable,
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
