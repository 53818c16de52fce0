//! # lode-store
//! Bucketed transactional key/value storage.
//!
//! Data lives in a hierarchy of named buckets, each holding byte keys mapped
//! to byte values or further nested buckets. All access goes through
//! transactions: read transactions see a consistent snapshot, write
//! transactions stage changes in memory and commit them atomically. One
//! writer runs at a time; readers never block it.
//!
//! The backing engine is RocksDB. Bucket paths are encoded into the flat
//! RocksDB keyspace with self-delimiting length-prefixed segments, so a
//! prefix scan over one bucket can never leak entries of a sibling or a
//! nested bucket.

pub mod error;
pub mod kv;

pub use error::StoreError;
pub use kv::{Bucket, BucketEntry, BucketIter, KvStore, ReadTx, WriteTx};
