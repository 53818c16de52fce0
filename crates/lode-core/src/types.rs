//! Core chain types: hashes, block headers, block stamps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block header hashes (double SHA-256), transaction IDs, merkle
/// roots, and compact filter header digests.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a byte slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CodecError::UnexpectedLength {
            got: bytes.len(),
            want: 32,
        })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the double SHA-256 of the given data.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

/// Compute the single SHA-256 of the given data.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

/// A chain block header in its canonical 80-byte form.
///
/// The on-disk and wire encoding is fixed-width little-endian:
/// version(4) || prev_block(32) || merkle_root(32) || timestamp(4) ||
/// bits(4) || nonce(4).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version. The high bits select the proof-of-work algorithm
    /// on multi-algorithm networks.
    pub version: i32,
    /// Hash of the previous block header in the chain.
    pub prev_block: Hash256,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Block time as Unix seconds.
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work counter.
    pub nonce: u32,
}

impl BlockHeader {
    /// Size of an encoded block header in bytes.
    pub const ENCODED_LEN: usize = 80;

    /// Encode the header into its canonical 80-byte form.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..36].copy_from_slice(self.prev_block.as_bytes());
        buf[36..68].copy_from_slice(self.merkle_root.as_bytes());
        buf[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[72..76].copy_from_slice(&self.bits.to_le_bytes());
        buf[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        buf
    }

    /// Decode a header from exactly 80 bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::ENCODED_LEN {
            return Err(CodecError::UnexpectedLength {
                got: buf.len(),
                want: Self::ENCODED_LEN,
            });
        }
        Ok(Self {
            version: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            prev_block: Hash256::from_slice(&buf[4..36]).unwrap(),
            merkle_root: Hash256::from_slice(&buf[36..68]).unwrap(),
            timestamp: u32::from_le_bytes(buf[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(buf[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(buf[76..80].try_into().unwrap()),
        })
    }

    /// The double SHA-256 hash of the canonical encoding.
    pub fn block_hash(&self) -> Hash256 {
        double_sha256(&self.encode())
    }
}

/// A reference to a particular point in the chain: a height and the hash of
/// the record at that height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStamp {
    /// Height of the referenced record.
    pub height: u32,
    /// Hash of the referenced record.
    pub hash: Hash256,
}
