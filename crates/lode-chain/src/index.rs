//! Hash→height index shared by the header stores.
//!
//! Each store kind gets its own nested bucket under a common top-level
//! bucket. Entries map a 32-byte hash to a big-endian u32 height; a short
//! `tip` key holds the hash of the current chain tip. For the block store
//! the hashes are block-header hashes of the stored records; for the filter
//! store they are the block-header hashes the filter headers correspond to.

use std::sync::Arc;

use lode_core::Hash256;
use lode_store::{Bucket, KvStore, StoreError, WriteTx};

use crate::error::HeaderStoreError;

const INDEX_BUCKET: &[u8] = b"header-index";
const TIP_KEY: &[u8] = b"tip";

/// Which header store an index belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IndexType {
    Block,
    RegularFilter,
}

impl IndexType {
    fn bucket_name(self) -> &'static [u8] {
        match self {
            IndexType::Block => b"block",
            IndexType::RegularFilter => b"regfilter",
        }
    }
}

pub(crate) struct HeaderIndex {
    store: Arc<KvStore>,
    kind: IndexType,
}

impl HeaderIndex {
    /// Open the index, creating its buckets on first use.
    pub(crate) fn new(store: Arc<KvStore>, kind: IndexType) -> Result<Self, HeaderStoreError> {
        store.update::<_, StoreError, _>(|tx| {
            let root = tx.create_bucket_if_not_exists(INDEX_BUCKET)?;
            root.create_bucket_if_not_exists(kind.bucket_name())?;
            Ok(())
        })?;
        Ok(Self { store, kind })
    }

    fn bucket<'a>(&self, tx: &'a WriteTx<'_>) -> Result<Bucket<'a>, HeaderStoreError> {
        Ok(tx
            .bucket(INDEX_BUCKET)?
            .ok_or(StoreError::BucketNotFound)?
            .bucket(self.kind.bucket_name())?
            .ok_or(StoreError::BucketNotFound)?)
    }

    /// Add hash→height entries and move the tip, atomically.
    pub(crate) fn add_headers(
        &self,
        entries: &[(Hash256, u32)],
        new_tip: &Hash256,
    ) -> Result<(), HeaderStoreError> {
        self.store.update::<_, HeaderStoreError, _>(|tx| {
            let bucket = self.bucket(tx)?;
            for (hash, height) in entries {
                bucket.put(hash.as_bytes(), &height.to_be_bytes())?;
            }
            bucket.put(TIP_KEY, new_tip.as_bytes())?;
            Ok(())
        })
    }

    /// Height of the record with the given hash, if indexed.
    pub(crate) fn height_from_hash(
        &self,
        hash: &Hash256,
    ) -> Result<Option<u32>, HeaderStoreError> {
        self.store.view::<_, HeaderStoreError, _>(|tx| {
            let bucket = tx
                .bucket(INDEX_BUCKET)?
                .ok_or(StoreError::BucketNotFound)?
                .bucket(self.kind.bucket_name())?
                .ok_or(StoreError::BucketNotFound)?;
            match bucket.get(hash.as_bytes())? {
                Some(raw) if raw.len() == 4 => {
                    Ok(Some(u32::from_be_bytes(raw.try_into().unwrap())))
                }
                Some(_) => Err(StoreError::Backend("malformed index height".into()).into()),
                None => Ok(None),
            }
        })
    }

    /// The tip hash and its height, or `None` before initialization.
    pub(crate) fn chain_tip(&self) -> Result<Option<(Hash256, u32)>, HeaderStoreError> {
        self.store.view::<_, HeaderStoreError, _>(|tx| {
            let bucket = tx
                .bucket(INDEX_BUCKET)?
                .ok_or(StoreError::BucketNotFound)?
                .bucket(self.kind.bucket_name())?
                .ok_or(StoreError::BucketNotFound)?;
            let tip = match bucket.get(TIP_KEY)? {
                Some(raw) => Hash256::from_slice(&raw)
                    .map_err(|_| StoreError::Backend("malformed index tip".into()))?,
                None => return Ok(None),
            };
            match bucket.get(tip.as_bytes())? {
                Some(raw) if raw.len() == 4 => {
                    Ok(Some((tip, u32::from_be_bytes(raw.try_into().unwrap()))))
                }
                _ => Err(StoreError::Backend("index tip has no height entry".into()).into()),
            }
        })
    }

    /// Move the tip back to `new_tip`, optionally removing the entry for the
    /// tip being abandoned. The filter store keeps the abandoned entry: its
    /// index rows belong to the block domain and are preloaded by the caller.
    pub(crate) fn truncate_index(
        &self,
        new_tip: &Hash256,
        delete_old: bool,
    ) -> Result<(), HeaderStoreError> {
        self.store.update::<_, HeaderStoreError, _>(|tx| {
            let bucket = self.bucket(tx)?;
            if delete_old {
                if let Some(raw) = bucket.get(TIP_KEY)? {
                    bucket.delete(&raw)?;
                }
            }
            bucket.put(TIP_KEY, new_tip.as_bytes())?;
            Ok(())
        })
    }
}
