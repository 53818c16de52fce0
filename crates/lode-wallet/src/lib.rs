//! # lode-wallet — wallet storage and key management.
//!
//! Versioned, transactional storage for everything a hierarchical-
//! deterministic wallet needs to persist: encrypted master material,
//! per-scope coin-type keys, account rows with next-index counters,
//! address rows, lookup indexes, sync state, and schema migrations.
//! Also home to the symmetric key ring that encrypts stored key material
//! and the voting-pool multi-sig series codec.
//!
//! # Modules
//!
//! - [`error`] — `ManagerError` and `SeriesError` enums
//! - [`keyring`] — AES-256-GCM secret keys and the public/private/script ring
//! - [`types`] — key scopes, address schemas, sync stamps
//! - [`schema`] — bucket and key names of the on-disk namespace layout
//! - [`rows`] — byte-layout codecs for account and address rows
//! - [`store`] — the address-manager store itself
//! - [`migrate`] — version upgrade engine
//! - [`series`] — voting-pool series rows and key validation

pub mod error;
pub mod keyring;
pub mod migrate;
pub mod rows;
pub mod schema;
pub mod series;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use error::{CryptoError, ManagerError, SeriesError};
pub use keyring::{KeyKind, KeyRing, SecretKey};
pub use rows::{AccountInfo, AddressPayload, AddressRow};
pub use series::{SeriesRow, SERIES_MAX_SERIAL, SERIES_MIN_SERIAL};
pub use store::AddrManagerStore;
pub use types::{
    KeyScope, ScopeAddrSchema, SyncStamp, SyncStatus, DEFAULT_ACCOUNT, EXTERNAL_BRANCH,
    INTERNAL_BRANCH, LATEST_MGR_VERSION, SCOPE_BIP44,
};
