//! Wallet error types.

use lode_core::CodecError;
use lode_store::StoreError;
use thiserror::Error;

use crate::types::KeyScope;

/// Errors from the symmetric key ring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// Decryption or authentication failed.
    #[error("decryption failed")]
    Decrypt,

    /// The ciphertext cannot even hold a nonce and tag.
    #[error("ciphertext too short: {got} < {min}")]
    CiphertextTooShort { got: usize, min: usize },

    /// The ring does not hold the key the operation needs, e.g. the private
    /// key of a watching-only wallet.
    #[error("key ring holds no {0} key")]
    MissingKey(&'static str),
}

/// Errors surfaced by the address-manager store.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The underlying key/value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored record failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Key material could not be encrypted or decrypted.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The manager namespace has not been created in this database.
    #[error("address manager namespace not found")]
    NamespaceNotFound,

    /// A required record is malformed.
    #[error("malformed {0} record stored in database")]
    Malformed(&'static str),

    /// A required record is missing.
    #[error("required {0} record not stored in database")]
    MissingRecord(&'static str),

    /// No version number is recorded for the namespace.
    #[error("required version number not stored in database")]
    MissingVersion,

    /// The on-disk version is newer than this build understands.
    #[error("unsupported manager version {got}, latest is {latest}")]
    UnsupportedVersion { got: u32, latest: u32 },

    /// A migration could not be performed.
    #[error("upgrade: {0}")]
    Upgrade(String),

    /// The requested key scope is not registered.
    #[error("scope {0} not found")]
    ScopeNotFound(KeyScope),

    /// The requested account does not exist.
    #[error("account {0} not found")]
    AccountNotFound(u32),

    /// No account carries the requested name.
    #[error("account name '{0}' not found")]
    AccountNameNotFound(String),

    /// The requested address is not managed here.
    #[error("address not found")]
    AddressNotFound,
}

/// Errors surfaced by the voting-pool series codec and key validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// The row carries a version this build does not understand.
    #[error("unsupported series version {0}")]
    Version(u32),

    /// The encoded row violates the series byte layout or its bounds.
    #[error("series serialization: {0}")]
    Serialization(String),

    /// The number of public and private key slots differs.
    #[error("mismatch between number of public keys ({pubs}) and private keys ({privs})")]
    PrivatePublicMismatch { pubs: usize, privs: usize },

    /// Key material failed to decrypt or parse.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A decrypted private key does not correspond to the public key stored
    /// in the same slot.
    #[error("public key at slot {0} does not match its private key")]
    KeyMismatch(usize),
}
