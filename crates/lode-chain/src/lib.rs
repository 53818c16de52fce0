//! # lode-chain
//! Header and compact-filter header storage for the SPV chain.
//!
//! Block headers and filter headers live in append-only flat files of
//! fixed-width records, paired with a hash→height index in the key/value
//! store. The files are the source of truth; the index is a cache that
//! crash recovery reconciles at open time. A byte-bounded LRU cache holds
//! recently fetched compact filters in memory.

pub mod block;
pub mod cache;
pub mod error;
pub mod filter;
mod headerfs;
mod index;

pub use block::{BlockHeaderStore, IndexedBlockHeader};
pub use cache::{CacheSize, CachedFilter, FilterCache, FilterCacheKey, SizedLru};
pub use error::{CacheError, HeaderStoreError};
pub use filter::{FilterHeader, FilterHeaderStore};
