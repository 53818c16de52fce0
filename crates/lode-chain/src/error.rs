//! Error types for the header stores and the filter cache.

use lode_core::CodecError;
use lode_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the block and filter header stores.
#[derive(Error, Debug)]
pub enum HeaderStoreError {
    /// Header file I/O failed.
    #[error("header file I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The hash→height index failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A header record failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No header with the requested hash is indexed.
    #[error("header not found")]
    NotFound,

    /// The requested height is beyond the chain tip.
    #[error("height {height} out of range, chain tip is {tip}")]
    OutOfRange { height: u32, tip: u32 },

    /// The genesis record cannot be rolled back.
    #[error("cannot roll back below height 1")]
    RollbackGenesis,

    /// A batch must extend the chain tip contiguously.
    #[error("batch does not extend the tip: expected height {expected}, got {got}")]
    NonContiguous { expected: u32, got: u32 },

    /// `prev` linkage is broken at the given height.
    #[error("headers do not connect at height {height}")]
    Disconnected { height: u32 },

    /// The index claims a hash lives at a different height than the caller
    /// asserted.
    #[error("hash maps to height {actual}, not {expected}")]
    HashHeightMismatch { expected: u32, actual: u32 },

    /// The index tip is ahead of the header file. The write path extends the
    /// file before committing the index, so this cannot result from a crash.
    #[error("index tip {index_tip} is beyond the header file tip {file_tip}")]
    IndexBeyondFile { index_tip: u32, file_tip: u64 },
}

/// Errors surfaced by the size-bounded cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key is not present.
    #[error("unable to find element")]
    NotFound,

    /// The entry alone is larger than the whole cache.
    #[error("entry of {size} bytes exceeds cache capacity {capacity}")]
    TooLarge { size: u64, capacity: u64 },
}
