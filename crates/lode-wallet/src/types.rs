//! Wallet-level types: key scopes, address schemas, sync stamps.

use std::fmt;

use lode_core::Hash256;

use crate::error::ManagerError;

/// The most recent manager namespace version.
pub const LATEST_MGR_VERSION: u32 = 5;

/// The account every scope starts with.
pub const DEFAULT_ACCOUNT: u32 = 0;

/// Derivation branch yielding receive addresses.
pub const EXTERNAL_BRANCH: u32 = 0;

/// Derivation branch yielding change addresses.
pub const INTERNAL_BRANCH: u32 = 1;

/// A key derivation scope: a BIP43 purpose paired with a coin type. Each
/// scope isolates one family of accounts and addresses within the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyScope {
    pub purpose: u32,
    pub coin: u32,
}

/// The default BIP44 scope for legacy pay-to-pubkey-hash addresses.
pub const SCOPE_BIP44: KeyScope = KeyScope {
    purpose: 44,
    coin: 0,
};

impl KeyScope {
    /// Serialized size of a scope key.
    pub const ENCODED_LEN: usize = 8;

    /// Little-endian `purpose || coin` used as the scope's bucket name.
    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..4].copy_from_slice(&self.purpose.to_le_bytes());
        out[4..].copy_from_slice(&self.coin.to_le_bytes());
        out
    }

    /// Decode a scope from its 8-byte form.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        Some(Self {
            purpose: u32::from_le_bytes(bytes[..4].try_into().unwrap()),
            coin: u32::from_le_bytes(bytes[4..].try_into().unwrap()),
        })
    }
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}'/{}'", self.purpose, self.coin)
    }
}

/// Which flavor of address a derivation branch yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressKind {
    /// Pay-to-pubkey-hash.
    PubKeyHash = 0,
    /// Pay-to-script-hash.
    ScriptHash = 1,
}

impl AddressKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::PubKeyHash),
            1 => Some(Self::ScriptHash),
            _ => None,
        }
    }
}

/// Declares which address flavor each branch of a scope yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeAddrSchema {
    pub internal_addr_type: AddressKind,
    pub external_addr_type: AddressKind,
}

impl ScopeAddrSchema {
    /// Serialized size of a schema.
    pub const ENCODED_LEN: usize = 2;

    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        [self.internal_addr_type as u8, self.external_addr_type as u8]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManagerError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(ManagerError::Malformed("scope schema"));
        }
        Ok(Self {
            internal_addr_type: AddressKind::from_u8(bytes[0])
                .ok_or(ManagerError::Malformed("scope schema"))?,
            external_addr_type: AddressKind::from_u8(bytes[1])
                .ok_or(ManagerError::Malformed("scope schema"))?,
        })
    }
}

/// The default scopes a new namespace is created with, and the schema each
/// one derives addresses under.
pub fn default_scopes() -> Vec<(KeyScope, ScopeAddrSchema)> {
    vec![(
        SCOPE_BIP44,
        ScopeAddrSchema {
            internal_addr_type: AddressKind::PubKeyHash,
            external_addr_type: AddressKind::PubKeyHash,
        },
    )]
}

/// Per-address synchronization status.
///
/// The discriminants are stored on disk and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncStatus {
    None = 0,
    Full = 2,
}

impl SyncStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            2 => Some(Self::Full),
            _ => None,
        }
    }
}

/// The chain location the wallet has scanned through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncStamp {
    pub height: i32,
    pub hash: Hash256,
    /// Block time as Unix seconds. Zero for records that don't carry one.
    pub timestamp: u32,
}
