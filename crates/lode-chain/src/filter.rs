//! Compact-filter header store: a 32-byte-record flat file plus index.
//!
//! Unlike the block store, the index here is keyed on *block* header hashes:
//! the caller records each block hash→height mapping as block headers are
//! accepted, before the corresponding filter headers are written.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use lode_core::{BlockStamp, Hash256, Params};
use lode_store::KvStore;

use crate::error::HeaderStoreError;
use crate::headerfs::HeaderFile;
use crate::index::{HeaderIndex, IndexType};

const FILTER_HEADER_FILE: &str = "reg_filter_headers.bin";
const FILTER_HEADER_LEN: usize = 32;

/// A filter header together with the block it commits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterHeader {
    /// Hash of the block header this filter header corresponds to.
    pub header_hash: Hash256,
    /// The chained filter header digest itself.
    pub filter_hash: Hash256,
    /// Height of the block.
    pub height: u32,
}

/// Append-only store of regular compact-filter headers.
pub struct FilterHeaderStore {
    file: HeaderFile,
    index: HeaderIndex,
    genesis_filter_header: Hash256,
    genesis_hash: Hash256,
}

impl FilterHeaderStore {
    /// Open or create the filter header store in `dir`, recovering from any
    /// partial batch write.
    pub fn new(
        dir: &Path,
        store: Arc<KvStore>,
        params: &Params,
    ) -> Result<Self, HeaderStoreError> {
        let index = HeaderIndex::new(store, IndexType::RegularFilter)?;
        let file = HeaderFile::open(&dir.join(FILTER_HEADER_FILE), FILTER_HEADER_LEN as u64)?;
        let genesis_hash = params.genesis_hash();

        if index.chain_tip()?.is_none() {
            index.add_headers(&[(genesis_hash, 0)], &genesis_hash)?;
            debug!(genesis = %genesis_hash, "initialized filter header index");
        }

        let this = Self {
            file,
            index,
            genesis_filter_header: params.genesis_filter_header,
            genesis_hash,
        };
        this.recover()?;
        Ok(this)
    }

    fn recover(&self) -> Result<(), HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        let file_len = self.file.len()?;
        let expected = tip_height as u64 * FILTER_HEADER_LEN as u64;
        if file_len > expected {
            warn!(
                file_len,
                index_tip = tip_height,
                "filter header file ahead of index, truncating"
            );
            self.file.truncate_to(tip_height as u64)?;
        } else if file_len < expected {
            return Err(HeaderStoreError::IndexBeyondFile {
                index_tip: tip_height,
                file_tip: self.file.record_count()?,
            });
        }
        Ok(())
    }

    fn tip_entry(&self) -> Result<(Hash256, u32), HeaderStoreError> {
        self.index
            .chain_tip()?
            .ok_or(HeaderStoreError::NotFound)
    }

    fn filter_header_at(&self, height: u32) -> Result<Hash256, HeaderStoreError> {
        if height == 0 {
            return Ok(self.genesis_filter_header);
        }
        Ok(Hash256::from_slice(&self.file.read_record(height)?)?)
    }

    /// Record block hash→height mappings for blocks whose filter headers
    /// will be written later. Must be called before `write_headers` covers
    /// those heights.
    pub fn index_block_headers(
        &self,
        entries: &[(Hash256, u32)],
    ) -> Result<(), HeaderStoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let (tip_hash, _) = self.tip_entry()?;
        self.index.add_headers(entries, &tip_hash)
    }

    /// Atomically append a contiguous batch of filter headers and advance
    /// the tip to the last one's block hash.
    pub fn write_headers(&self, headers: &[FilterHeader]) -> Result<(), HeaderStoreError> {
        if headers.is_empty() {
            return Ok(());
        }
        let (_, tip_height) = self.tip_entry()?;
        let mut expected = tip_height + 1;
        for header in headers {
            if header.height != expected {
                return Err(HeaderStoreError::NonContiguous {
                    expected,
                    got: header.height,
                });
            }
            expected += 1;
        }

        let mut bytes = Vec::with_capacity(headers.len() * FILTER_HEADER_LEN);
        for header in headers {
            bytes.extend_from_slice(header.filter_hash.as_bytes());
        }

        // File first, index tip second; recovery at open undoes a torn write.
        self.file.append(&bytes)?;
        self.index
            .truncate_index(&headers.last().unwrap().header_hash, false)?;
        Ok(())
    }

    /// The filter header at the tip and the tip height.
    pub fn chain_tip(&self) -> Result<(Hash256, u32), HeaderStoreError> {
        let (_, height) = self.tip_entry()?;
        Ok((self.filter_header_at(height)?, height))
    }

    /// Fetch the filter header for the given block hash.
    pub fn fetch_header(&self, block_hash: &Hash256) -> Result<Hash256, HeaderStoreError> {
        let height = self
            .index
            .height_from_hash(block_hash)?
            .ok_or(HeaderStoreError::NotFound)?;
        self.filter_header_at(height)
    }

    /// Fetch the filter header stored at the given height.
    pub fn fetch_header_by_height(&self, height: u32) -> Result<Hash256, HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        if height > tip_height {
            return Err(HeaderStoreError::OutOfRange {
                height,
                tip: tip_height,
            });
        }
        self.filter_header_at(height)
    }

    /// Remove the tip filter header, moving the tip to the given block hash.
    /// Returns a stamp carrying the *filter* header now at the tip.
    pub fn rollback_last_block(
        &self,
        new_tip: &Hash256,
    ) -> Result<BlockStamp, HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        if tip_height < 1 {
            return Err(HeaderStoreError::RollbackGenesis);
        }
        let new_height = self
            .index
            .height_from_hash(new_tip)?
            .ok_or(HeaderStoreError::NotFound)?;
        if new_height != tip_height - 1 {
            return Err(HeaderStoreError::HashHeightMismatch {
                expected: tip_height - 1,
                actual: new_height,
            });
        }
        // The block-hash entry being abandoned belongs to the block domain
        // and stays; only the tip pointer moves.
        self.index.truncate_index(new_tip, false)?;
        self.file.truncate_one()?;
        let filter_hash = self.filter_header_at(new_height)?;
        debug!(height = new_height, "rolled back filter header");
        Ok(BlockStamp {
            height: new_height,
            hash: filter_hash,
        })
    }

    /// Test hook: move the index tip without touching the file, simulating a
    /// crash between the file extension and the index commit.
    pub fn truncate_index(&self, new_tip: &Hash256) -> Result<(), HeaderStoreError> {
        self.index.truncate_index(new_tip, false)
    }

    /// The genesis block hash this store was created with.
    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }
}
