//! Voting-pool series rows.
//!
//! A series is an m-of-n multi-sig group: n encrypted public keys, one per
//! participant, and an encrypted private key for each participant the local
//! operator holds. Rows serialize little-endian:
//!
//! ```text
//! version(4) || active(1) || req_sigs(4) || n_keys(4) ||
//! n_keys × [len(4) || enc_pub] || n_keys × [len(4) || enc_priv]
//! ```
//!
//! A zero private-key length marks a slot with no private key held.

use ed25519_dalek::{SigningKey, VerifyingKey};

use lode_core::codec::{ByteReader, ByteWriter};

use crate::error::{CryptoError, SeriesError};
use crate::keyring::{KeyKind, KeyRing};

/// The series serialization version this build writes.
pub const SERIES_VERSION: u32 = 1;

/// Maximum number of participants in a series.
pub const SERIES_MAX_KEYS: usize = 15;

/// Generous upper bound on one encrypted key blob: nonce, tag, and an
/// encrypted extended key.
pub const SERIES_MAX_ENC_KEY_LEN: usize = 160;

/// Smallest possible encoded series row: the fixed header alone.
pub const SERIES_MIN_SERIAL: usize = 4 + 1 + 4 + 4;

/// Largest possible encoded series row: a full complement of maximum-size
/// public and private keys.
pub const SERIES_MAX_SERIAL: usize =
    SERIES_MIN_SERIAL + SERIES_MAX_KEYS * 2 * (4 + SERIES_MAX_ENC_KEY_LEN);

/// One stored multi-sig series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesRow {
    /// Serialization version the row was read with. Legacy version-0 rows
    /// pass through on read; writing always emits [`SERIES_VERSION`].
    pub version: u32,
    /// Whether the series accepts new deposits.
    pub active: bool,
    /// Signatures required to spend from the series.
    pub req_sigs: u32,
    /// Encrypted public key per participant.
    pub enc_pub_keys: Vec<Vec<u8>>,
    /// Encrypted private key per slot; `None` when not held locally.
    pub enc_priv_keys: Vec<Option<Vec<u8>>>,
}

impl SeriesRow {
    /// Assemble a new row at the current version.
    pub fn new(
        active: bool,
        req_sigs: u32,
        enc_pub_keys: Vec<Vec<u8>>,
        enc_priv_keys: Vec<Option<Vec<u8>>>,
    ) -> Self {
        Self {
            version: SERIES_VERSION,
            active,
            req_sigs,
            enc_pub_keys,
            enc_priv_keys,
        }
    }

    /// How many private keys the local operator holds.
    pub fn private_key_count(&self) -> usize {
        self.enc_priv_keys.iter().filter(|k| k.is_some()).count()
    }

    /// A series is complete once every slot's private key is held.
    pub fn is_complete(&self) -> bool {
        self.private_key_count() == self.enc_priv_keys.len()
    }
}

/// Serialize a series row, emitting the current version.
pub fn serialize_series_row(row: &SeriesRow) -> Result<Vec<u8>, SeriesError> {
    if row.version > SERIES_VERSION {
        return Err(SeriesError::Version(row.version));
    }
    if row.enc_pub_keys.len() != row.enc_priv_keys.len() {
        return Err(SeriesError::Serialization(format!(
            "{} public keys but {} private key slots",
            row.enc_pub_keys.len(),
            row.enc_priv_keys.len()
        )));
    }
    if row.enc_pub_keys.len() > SERIES_MAX_KEYS {
        return Err(SeriesError::Serialization(format!(
            "too many keys: {} > {SERIES_MAX_KEYS}",
            row.enc_pub_keys.len()
        )));
    }

    let mut w = ByteWriter::with_capacity(SERIES_MIN_SERIAL);
    w.write_u32_le(SERIES_VERSION);
    w.write_u8(row.active as u8);
    w.write_u32_le(row.req_sigs);
    w.write_u32_le(row.enc_pub_keys.len() as u32);
    for enc_pub in &row.enc_pub_keys {
        if enc_pub.is_empty() || enc_pub.len() > SERIES_MAX_ENC_KEY_LEN {
            return Err(SeriesError::Serialization(format!(
                "invalid encrypted public key length {}",
                enc_pub.len()
            )));
        }
        w.write_var_bytes_le(enc_pub);
    }
    for enc_priv in &row.enc_priv_keys {
        match enc_priv {
            None => w.write_u32_le(0),
            Some(enc_priv) => {
                if enc_priv.is_empty() || enc_priv.len() > SERIES_MAX_ENC_KEY_LEN {
                    return Err(SeriesError::Serialization(format!(
                        "invalid encrypted private key length {}",
                        enc_priv.len()
                    )));
                }
                w.write_var_bytes_le(enc_priv);
            }
        }
    }

    let bytes = w.into_bytes();
    if bytes.len() < SERIES_MIN_SERIAL || bytes.len() > SERIES_MAX_SERIAL {
        return Err(SeriesError::Serialization(format!(
            "encoded length {} outside [{SERIES_MIN_SERIAL}, {SERIES_MAX_SERIAL}]",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Decode a series row, enforcing the length bounds and key invariants.
pub fn deserialize_series_row(bytes: &[u8]) -> Result<SeriesRow, SeriesError> {
    if bytes.len() < SERIES_MIN_SERIAL || bytes.len() > SERIES_MAX_SERIAL {
        return Err(SeriesError::Serialization(format!(
            "encoded length {} outside [{SERIES_MIN_SERIAL}, {SERIES_MAX_SERIAL}]",
            bytes.len()
        )));
    }

    let mut r = ByteReader::new(bytes);
    let map_codec =
        |e: lode_core::CodecError| SeriesError::Serialization(e.to_string());
    let version = r.read_u32_le("series version").map_err(map_codec)?;
    if version > SERIES_VERSION {
        return Err(SeriesError::Version(version));
    }
    let active = r.read_u8("series active flag").map_err(map_codec)? != 0;
    let req_sigs = r.read_u32_le("series required signatures").map_err(map_codec)?;
    let n_keys = r.read_u32_le("series key count").map_err(map_codec)? as usize;
    if n_keys > SERIES_MAX_KEYS {
        return Err(SeriesError::Serialization(format!(
            "too many keys: {n_keys} > {SERIES_MAX_KEYS}"
        )));
    }
    if req_sigs as usize > n_keys {
        return Err(SeriesError::Serialization(format!(
            "required signatures {req_sigs} exceed key count {n_keys}"
        )));
    }

    let mut enc_pub_keys = Vec::with_capacity(n_keys);
    for _ in 0..n_keys {
        let key = r
            .read_var_bytes_le("encrypted public key")
            .map_err(map_codec)?;
        if key.is_empty() || key.len() > SERIES_MAX_ENC_KEY_LEN {
            return Err(SeriesError::Serialization(format!(
                "invalid encrypted public key length {}",
                key.len()
            )));
        }
        enc_pub_keys.push(key);
    }
    let mut enc_priv_keys = Vec::with_capacity(n_keys);
    for _ in 0..n_keys {
        let key = r
            .read_var_bytes_le("encrypted private key")
            .map_err(map_codec)?;
        if key.len() > SERIES_MAX_ENC_KEY_LEN {
            return Err(SeriesError::Serialization(format!(
                "invalid encrypted private key length {}",
                key.len()
            )));
        }
        enc_priv_keys.push(if key.is_empty() { None } else { Some(key) });
    }
    r.expect_end().map_err(map_codec)?;

    Ok(SeriesRow {
        version,
        active,
        req_sigs,
        enc_pub_keys,
        enc_priv_keys,
    })
}

/// Decrypt a series' key slots and verify their internal consistency.
///
/// The slot counts must match before any decryption is attempted. Every
/// private key present must be the companion of the public key in its slot:
/// its derived public key is compared against the decrypted one.
pub fn validate_and_decrypt(
    ring: &KeyRing,
    enc_pub_keys: &[Vec<u8>],
    enc_priv_keys: &[Option<Vec<u8>>],
) -> Result<(Vec<VerifyingKey>, Vec<Option<SigningKey>>), SeriesError> {
    if enc_pub_keys.len() != enc_priv_keys.len() {
        return Err(SeriesError::PrivatePublicMismatch {
            pubs: enc_pub_keys.len(),
            privs: enc_priv_keys.len(),
        });
    }

    let mut pub_keys = Vec::with_capacity(enc_pub_keys.len());
    for enc_pub in enc_pub_keys {
        let raw = ring.decrypt(KeyKind::Public, enc_pub)?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Decrypt)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::Decrypt)?;
        pub_keys.push(key);
    }

    let mut priv_keys = Vec::with_capacity(enc_priv_keys.len());
    for (slot, enc_priv) in enc_priv_keys.iter().enumerate() {
        match enc_priv {
            None => priv_keys.push(None),
            Some(enc_priv) => {
                let raw = ring.decrypt(KeyKind::Private, enc_priv)?;
                let bytes: [u8; 32] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| CryptoError::Decrypt)?;
                let key = SigningKey::from_bytes(&bytes);
                if key.verifying_key() != pub_keys[slot] {
                    return Err(SeriesError::KeyMismatch(slot));
                }
                priv_keys.push(Some(key));
            }
        }
    }
    Ok((pub_keys, priv_keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ring() -> KeyRing {
        KeyRing::generate()
    }

    /// A deterministic key pair from a seed byte.
    fn keypair(seed: u8) -> (SigningKey, VerifyingKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let verifying = signing.verifying_key();
        (signing, verifying)
    }

    fn encrypted_pub(ring: &KeyRing, seed: u8) -> Vec<u8> {
        let (_, verifying) = keypair(seed);
        ring.encrypt(KeyKind::Public, verifying.as_bytes()).unwrap()
    }

    fn encrypted_priv(ring: &KeyRing, seed: u8) -> Vec<u8> {
        let (signing, _) = keypair(seed);
        ring.encrypt(KeyKind::Private, &signing.to_bytes()).unwrap()
    }

    fn sample_row(ring: &KeyRing) -> SeriesRow {
        SeriesRow::new(
            true,
            2,
            vec![
                encrypted_pub(ring, 1),
                encrypted_pub(ring, 2),
                encrypted_pub(ring, 3),
            ],
            vec![Some(encrypted_priv(ring, 1)), None, None],
        )
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    #[test]
    fn roundtrip_preserves_row() {
        let ring = test_ring();
        let row = sample_row(&ring);
        let bytes = serialize_series_row(&row).unwrap();
        assert_eq!(deserialize_series_row(&bytes).unwrap(), row);
    }

    #[test]
    fn roundtrip_full_and_empty_priv_slots() {
        let ring = test_ring();
        for privs in [
            vec![None, None],
            vec![Some(encrypted_priv(&ring, 1)), Some(encrypted_priv(&ring, 2))],
        ] {
            let row = SeriesRow::new(
                false,
                1,
                vec![encrypted_pub(&ring, 1), encrypted_pub(&ring, 2)],
                privs,
            );
            let bytes = serialize_series_row(&row).unwrap();
            assert_eq!(deserialize_series_row(&bytes).unwrap(), row);
        }
    }

    #[test]
    fn serialize_rejects_future_version() {
        let ring = test_ring();
        let mut row = sample_row(&ring);
        row.version = 2;
        assert_eq!(
            serialize_series_row(&row).unwrap_err(),
            SeriesError::Version(2)
        );
    }

    #[test]
    fn serialize_accepts_legacy_version_zero_but_emits_current() {
        let ring = test_ring();
        let mut row = sample_row(&ring);
        row.version = 0;
        let bytes = serialize_series_row(&row).unwrap();
        let decoded = deserialize_series_row(&bytes).unwrap();
        assert_eq!(decoded.version, SERIES_VERSION);
    }

    #[test]
    fn serialize_rejects_count_mismatch() {
        let ring = test_ring();
        let row = SeriesRow {
            version: SERIES_VERSION,
            active: true,
            req_sigs: 1,
            enc_pub_keys: vec![encrypted_pub(&ring, 1), encrypted_pub(&ring, 2)],
            enc_priv_keys: vec![Some(encrypted_priv(&ring, 1))],
        };
        assert!(matches!(
            serialize_series_row(&row).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn serialize_rejects_oversized_key() {
        let ring = test_ring();
        let mut row = sample_row(&ring);
        row.enc_pub_keys[0] = vec![0; SERIES_MAX_ENC_KEY_LEN + 1];
        assert!(matches!(
            serialize_series_row(&row).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn deserialize_rejects_out_of_bounds_lengths() {
        assert!(matches!(
            deserialize_series_row(&vec![0; SERIES_MIN_SERIAL - 1]).unwrap_err(),
            SeriesError::Serialization(_)
        ));
        assert!(matches!(
            deserialize_series_row(&vec![0; SERIES_MAX_SERIAL + 1]).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn deserialize_rejects_header_without_keys() {
        // Valid header claiming three keys, but no key data follows.
        let mut w = ByteWriter::new();
        w.write_u32_le(1);
        w.write_u8(0);
        w.write_u32_le(2);
        w.write_u32_le(3);
        assert!(matches!(
            deserialize_series_row(&w.into_bytes()).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn deserialize_rejects_unsupported_version() {
        let mut w = ByteWriter::new();
        w.write_u32_le(2);
        w.write_u8(0);
        w.write_u32_le(0);
        w.write_u32_le(0);
        assert_eq!(
            deserialize_series_row(&w.into_bytes()).unwrap_err(),
            SeriesError::Version(2)
        );
    }

    #[test]
    fn deserialize_rejects_req_sigs_above_key_count() {
        let ring = test_ring();
        let enc = encrypted_pub(&ring, 1);
        let mut w = ByteWriter::new();
        w.write_u32_le(1);
        w.write_u8(1);
        w.write_u32_le(2); // req_sigs > n_keys
        w.write_u32_le(1);
        w.write_var_bytes_le(&enc);
        w.write_u32_le(0);
        assert!(matches!(
            deserialize_series_row(&w.into_bytes()).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn deserialize_rejects_trailing_bytes() {
        let ring = test_ring();
        let mut bytes = serialize_series_row(&sample_row(&ring)).unwrap();
        bytes.push(0);
        assert!(matches!(
            deserialize_series_row(&bytes).unwrap_err(),
            SeriesError::Serialization(_)
        ));
    }

    #[test]
    fn completeness_tracks_private_slots() {
        let ring = test_ring();
        let row = sample_row(&ring);
        assert_eq!(row.private_key_count(), 1);
        assert!(!row.is_complete());

        let full = SeriesRow::new(
            true,
            1,
            vec![encrypted_pub(&ring, 1)],
            vec![Some(encrypted_priv(&ring, 1))],
        );
        assert!(full.is_complete());
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    #[test]
    fn validate_decrypts_matching_keys() {
        let ring = test_ring();
        let enc_pubs = vec![encrypted_pub(&ring, 1), encrypted_pub(&ring, 2)];
        let enc_privs = vec![Some(encrypted_priv(&ring, 1)), None];

        let (pubs, privs) = validate_and_decrypt(&ring, &enc_pubs, &enc_privs).unwrap();
        assert_eq!(pubs.len(), 2);
        assert_eq!(privs.len(), 2);
        assert_eq!(pubs[0], keypair(1).1);
        assert_eq!(pubs[1], keypair(2).1);
        assert!(privs[1].is_none());
        assert_eq!(privs[0].as_ref().unwrap().verifying_key(), pubs[0]);
    }

    #[test]
    fn validate_rejects_count_mismatch_before_decrypting() {
        // Garbage ciphertexts: if the decryptor were touched first, the
        // error would be Crypto rather than the expected mismatch.
        let ring = test_ring();
        let err = validate_and_decrypt(&ring, &[b"junk".to_vec()], &[]).unwrap_err();
        assert_eq!(
            err,
            SeriesError::PrivatePublicMismatch { pubs: 1, privs: 0 }
        );
    }

    #[test]
    fn validate_rejects_undecryptable_public_key() {
        let ring = test_ring();
        let err = validate_and_decrypt(
            &ring,
            &[b"not-a-ciphertext".to_vec()],
            &[None],
        )
        .unwrap_err();
        assert!(matches!(err, SeriesError::Crypto(_)));
    }

    #[test]
    fn validate_rejects_undecryptable_private_key() {
        let ring = test_ring();
        let err = validate_and_decrypt(
            &ring,
            &[encrypted_pub(&ring, 1)],
            &[Some(b"not-a-ciphertext".to_vec())],
        )
        .unwrap_err();
        assert!(matches!(err, SeriesError::Crypto(_)));
    }

    #[test]
    fn validate_rejects_mismatched_key_pair() {
        let ring = test_ring();
        // Public key from seed 1, private key from seed 2.
        let err = validate_and_decrypt(
            &ring,
            &[encrypted_pub(&ring, 1)],
            &[Some(encrypted_priv(&ring, 2))],
        )
        .unwrap_err();
        assert_eq!(err, SeriesError::KeyMismatch(0));
    }
}
