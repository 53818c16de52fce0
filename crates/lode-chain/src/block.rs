//! Block header store: an 80-byte-record flat file plus hash→height index.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use lode_core::{BlockHeader, BlockStamp, Hash256, Params};
use lode_store::KvStore;

use crate::error::HeaderStoreError;
use crate::headerfs::HeaderFile;
use crate::index::{HeaderIndex, IndexType};

const BLOCK_HEADER_FILE: &str = "block_headers.bin";

/// A block header paired with its height, as handed to `write_headers`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedBlockHeader {
    pub header: BlockHeader,
    pub height: u32,
}

/// Append-only store of block headers with lookup by hash and by height.
///
/// The flat file is the source of truth. Writes extend the file first and
/// then commit the index; a crash between the two steps leaves the file
/// ahead of the index, which `new` reconciles by truncating the file back
/// to the index tip.
pub struct BlockHeaderStore {
    file: HeaderFile,
    index: HeaderIndex,
    genesis_header: BlockHeader,
    genesis_hash: Hash256,
}

impl BlockHeaderStore {
    /// Open or create the block header store in `dir`, recovering from any
    /// partial batch write.
    pub fn new(
        dir: &Path,
        store: Arc<KvStore>,
        params: &Params,
    ) -> Result<Self, HeaderStoreError> {
        let index = HeaderIndex::new(store, IndexType::Block)?;
        let file = HeaderFile::open(
            &dir.join(BLOCK_HEADER_FILE),
            BlockHeader::ENCODED_LEN as u64,
        )?;
        let genesis_header = params.genesis_header;
        let genesis_hash = genesis_header.block_hash();

        if index.chain_tip()?.is_none() {
            index.add_headers(&[(genesis_hash, 0)], &genesis_hash)?;
            debug!(genesis = %genesis_hash, "initialized block header index");
        }

        let this = Self {
            file,
            index,
            genesis_header,
            genesis_hash,
        };
        this.recover()?;
        Ok(this)
    }

    /// Reconcile the file against the index tip after an unclean shutdown.
    /// Byte lengths are compared so a torn trailing record is dropped too.
    fn recover(&self) -> Result<(), HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        let file_len = self.file.len()?;
        let expected = tip_height as u64 * BlockHeader::ENCODED_LEN as u64;
        if file_len > expected {
            warn!(
                file_len,
                index_tip = tip_height,
                "block header file ahead of index, truncating"
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
        // The index always holds at least the genesis entry after `new`.
        self.index
            .chain_tip()?
            .ok_or(HeaderStoreError::NotFound)
    }

    fn header_at(&self, height: u32) -> Result<BlockHeader, HeaderStoreError> {
        if height == 0 {
            return Ok(self.genesis_header);
        }
        Ok(BlockHeader::decode(&self.file.read_record(height)?)?)
    }

    /// Atomically append a contiguous batch of headers.
    ///
    /// Either the whole batch becomes visible through both the file and the
    /// index, or (after crash recovery) none of it does.
    pub fn write_headers(
        &self,
        headers: &[IndexedBlockHeader],
    ) -> Result<(), HeaderStoreError> {
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

        let mut bytes = Vec::with_capacity(headers.len() * BlockHeader::ENCODED_LEN);
        let mut entries = Vec::with_capacity(headers.len());
        for header in headers {
            bytes.extend_from_slice(&header.header.encode());
            entries.push((header.header.block_hash(), header.height));
        }

        // File first, index second; recovery at open undoes a torn write.
        self.file.append(&bytes)?;
        let new_tip = entries.last().unwrap().0;
        self.index.add_headers(&entries, &new_tip)?;
        Ok(())
    }

    /// Fetch a header and its height by block hash.
    pub fn fetch_header(
        &self,
        hash: &Hash256,
    ) -> Result<(BlockHeader, u32), HeaderStoreError> {
        let height = self.height_from_hash(hash)?;
        Ok((self.header_at(height)?, height))
    }

    /// Fetch the header stored at the given height.
    pub fn fetch_header_by_height(
        &self,
        height: u32,
    ) -> Result<BlockHeader, HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        if height > tip_height {
            return Err(HeaderStoreError::OutOfRange {
                height,
                tip: tip_height,
            });
        }
        self.header_at(height)
    }

    /// Fetch the `count` headers ending at `stop_height`, whose header hash
    /// must be `stop_hash`. The range is clamped so the implicit genesis
    /// record is never returned; the height of the first returned header is
    /// also returned.
    pub fn fetch_header_ancestors(
        &self,
        stop_height: u32,
        stop_hash: &Hash256,
        count: u32,
    ) -> Result<(Vec<BlockHeader>, u32), HeaderStoreError> {
        let actual = self.height_from_hash(stop_hash)?;
        if actual != stop_height {
            return Err(HeaderStoreError::HashHeightMismatch {
                expected: stop_height,
                actual,
            });
        }
        if stop_height == 0 || count == 0 {
            return Ok((Vec::new(), stop_height));
        }
        let start_height = if count >= stop_height {
            1
        } else {
            stop_height - count + 1
        };
        let n = stop_height - start_height + 1;
        let bytes = self.file.read_records(start_height, n)?;
        let mut headers = Vec::with_capacity(n as usize);
        for chunk in bytes.chunks_exact(BlockHeader::ENCODED_LEN) {
            headers.push(BlockHeader::decode(chunk)?);
        }
        Ok((headers, start_height))
    }

    /// The current chain tip header and height.
    pub fn chain_tip(&self) -> Result<(BlockHeader, u32), HeaderStoreError> {
        let (_, height) = self.tip_entry()?;
        Ok((self.header_at(height)?, height))
    }

    /// Height of the header with the given hash.
    pub fn height_from_hash(&self, hash: &Hash256) -> Result<u32, HeaderStoreError> {
        self.index
            .height_from_hash(hash)?
            .ok_or(HeaderStoreError::NotFound)
    }

    /// Verify that every stored header links to the hash of its predecessor,
    /// starting from genesis.
    pub fn check_connectivity(&self) -> Result<(), HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        let mut prev_hash = self.genesis_hash;
        for height in 1..=tip_height {
            let header = self.header_at(height)?;
            if header.prev_block != prev_hash {
                return Err(HeaderStoreError::Disconnected { height });
            }
            prev_hash = header.block_hash();
        }
        Ok(())
    }

    /// Remove the tip header from both the file and the index, returning a
    /// stamp for the new tip.
    pub fn rollback_last_block(&self) -> Result<BlockStamp, HeaderStoreError> {
        let (_, tip_height) = self.tip_entry()?;
        if tip_height < 1 {
            return Err(HeaderStoreError::RollbackGenesis);
        }
        let tip_header = self.header_at(tip_height)?;
        let new_tip = tip_header.prev_block;
        self.index.truncate_index(&new_tip, true)?;
        self.file.truncate_one()?;
        debug!(height = tip_height - 1, tip = %new_tip, "rolled back block header");
        Ok(BlockStamp {
            height: tip_height - 1,
            hash: new_tip,
        })
    }

    /// Test hook: move the index tip back to `new_tip` without touching the
    /// header file, simulating a crash between the file extension and the
    /// index commit of `write_headers`.
    pub fn truncate_index(&self, new_tip: &Hash256) -> Result<(), HeaderStoreError> {
        self.index.truncate_index(new_tip, true)
    }
}
