//! AES-256-GCM secret keys and the wallet key ring.
//!
//! Three symmetric keys protect everything the wallet persists: the public
//! key ring member encrypts derivable public material, the private member
//! encrypts private key material, and the script member encrypts redeem
//! scripts. A watching-only wallet carries only the public member.
//!
//! # Wire format
//! ```text
//! nonce (12 bytes) || ciphertext + auth_tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// BLAKE3 KDF context for passphrase-derived keys.
const PASSPHRASE_KDF_CONTEXT: &str = "lode-wallet-master-key-v1";

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Minimum length of any ciphertext this module produces.
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

/// A 256-bit symmetric secret key, wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; 32],
}

impl SecretKey {
    /// Generate a random key from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Derive a key from a passphrase and salt using BLAKE3.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> Self {
        let mut ikm = Vec::with_capacity(passphrase.len() + salt.len());
        ikm.extend_from_slice(passphrase);
        ikm.extend_from_slice(salt);
        let bytes = blake3::derive_key(PASSPHRASE_KDF_CONTEXT, &ikm);
        ikm.zeroize();
        Self { bytes }
    }

    /// Encrypt plaintext under this key. Returns `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        use rand::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let cipher =
            Aes256Gcm::new_from_slice(&self.bytes).map_err(|_| CryptoError::Encrypt)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt data produced by [`encrypt`], authenticating the tag.
    ///
    /// [`encrypt`]: SecretKey::encrypt
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::CiphertextTooShort {
                got: data.len(),
                min: MIN_CIPHERTEXT_LEN,
            });
        }
        let cipher =
            Aes256Gcm::new_from_slice(&self.bytes).map_err(|_| CryptoError::Decrypt)?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Which ring member an operation addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Protects derivable public key material.
    Public,
    /// Protects private key material.
    Private,
    /// Protects redeem scripts.
    Script,
}

/// The wallet's set of symmetric crypto keys.
pub struct KeyRing {
    public: SecretKey,
    private: Option<SecretKey>,
    script: Option<SecretKey>,
}

impl KeyRing {
    /// Assemble a ring from its members. Watching-only rings pass `None`
    /// for the private and script members.
    pub fn new(public: SecretKey, private: Option<SecretKey>, script: Option<SecretKey>) -> Self {
        Self {
            public,
            private,
            script,
        }
    }

    /// Generate a full ring of random keys.
    pub fn generate() -> Self {
        Self {
            public: SecretKey::generate(),
            private: Some(SecretKey::generate()),
            script: Some(SecretKey::generate()),
        }
    }

    /// Whether the ring can only handle public material.
    pub fn is_watching_only(&self) -> bool {
        self.private.is_none()
    }

    fn key(&self, kind: KeyKind) -> Result<&SecretKey, CryptoError> {
        match kind {
            KeyKind::Public => Ok(&self.public),
            KeyKind::Private => self.private.as_ref().ok_or(CryptoError::MissingKey("private")),
            KeyKind::Script => self.script.as_ref().ok_or(CryptoError::MissingKey("script")),
        }
    }

    /// Encrypt plaintext with the given ring member.
    pub fn encrypt(&self, kind: KeyKind, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.key(kind)?.encrypt(plaintext)
    }

    /// Decrypt ciphertext with the given ring member.
    pub fn decrypt(&self, kind: KeyKind, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.key(kind)?.decrypt(data)
    }
}
