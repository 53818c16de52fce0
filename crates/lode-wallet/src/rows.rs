//! Byte-layout codecs for account and address rows.
//!
//! Rows share a common header followed by kind-specific raw data. The
//! address payload is a tagged variant in memory, but the on-disk layout
//! keeps the original `type byte + raw data` form:
//!
//! ```text
//! account row:  acct_type(1) || raw_len(4 LE) || raw
//!   default:    enc_pub_len(4) || enc_pub || enc_priv_len(4) || enc_priv ||
//!               next_ext(4) || next_int(4) || name_len(4) || name
//! address row:  addr_type(1) || account(4) || add_time(8) || sync(1) ||
//!               raw_len(4) || raw
//!   chained:    branch(4) || index(4)
//!   imported:   enc_pub_len(4) || enc_pub || enc_priv_len(4) || enc_priv
//!   script:     enc_hash_len(4) || enc_hash || enc_script_len(4) || enc_script
//! ```
//! All integers are little-endian.

use lode_core::codec::{ByteReader, ByteWriter};

use crate::error::ManagerError;
use crate::types::SyncStatus;

/// Row tag for the default (BIP44-like) account kind.
pub const ACCOUNT_KIND_DEFAULT: u8 = 0;

/// Row tags for the three address kinds. Stable on disk.
pub const ADDR_KIND_CHAINED: u8 = 0;
pub const ADDR_KIND_IMPORTED: u8 = 1;
pub const ADDR_KIND_SCRIPT: u8 = 2;

/// A default account's stored state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Encrypted account extended public key.
    pub enc_pub_key: Vec<u8>,
    /// Encrypted account extended private key; empty for watching-only.
    pub enc_priv_key: Vec<u8>,
    /// Next unused external (receive) child index.
    pub next_external_index: u32,
    /// Next unused internal (change) child index.
    pub next_internal_index: u32,
    /// Human-readable account name.
    pub name: String,
}

/// Kind-specific payload of an address row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressPayload {
    /// An address derived from the account chain.
    Chained { branch: u32, index: u32 },
    /// An individually imported key pair.
    Imported {
        enc_pub_key: Vec<u8>,
        /// Empty once private material has been deleted.
        enc_priv_key: Vec<u8>,
    },
    /// A pay-to-script address.
    Script {
        enc_script_hash: Vec<u8>,
        /// Empty once private material has been deleted.
        enc_script: Vec<u8>,
    },
}

impl AddressPayload {
    /// The on-disk type tag of this payload.
    pub fn kind(&self) -> u8 {
        match self {
            AddressPayload::Chained { .. } => ADDR_KIND_CHAINED,
            AddressPayload::Imported { .. } => ADDR_KIND_IMPORTED,
            AddressPayload::Script { .. } => ADDR_KIND_SCRIPT,
        }
    }
}

/// A stored address row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressRow {
    /// Account the address belongs to.
    pub account: u32,
    /// Unix seconds when the address was added.
    pub added_secs: u64,
    /// Per-address sync status.
    pub sync_status: SyncStatus,
    /// Kind-specific payload.
    pub payload: AddressPayload,
}

/// Wrap kind-specific raw data in the common account row header.
pub fn serialize_account_row(kind: u8, raw: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(5 + raw.len());
    w.write_u8(kind);
    w.write_var_bytes_le(raw);
    w.into_bytes()
}

/// Split a serialized account row into its kind tag and raw data.
pub fn split_account_row(bytes: &[u8]) -> Result<(u8, Vec<u8>), ManagerError> {
    let mut r = ByteReader::new(bytes);
    let kind = r.read_u8("account row type")?;
    let raw = r.read_var_bytes_le("account row data")?;
    Ok((kind, raw))
}

/// Serialize a default account's raw data.
pub fn serialize_default_account(info: &AccountInfo) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(
        20 + info.enc_pub_key.len() + info.enc_priv_key.len() + info.name.len(),
    );
    w.write_var_bytes_le(&info.enc_pub_key);
    w.write_var_bytes_le(&info.enc_priv_key);
    w.write_u32_le(info.next_external_index);
    w.write_u32_le(info.next_internal_index);
    w.write_var_bytes_le(info.name.as_bytes());
    w.into_bytes()
}

/// Decode a default account's raw data.
pub fn deserialize_default_account(raw: &[u8]) -> Result<AccountInfo, ManagerError> {
    let mut r = ByteReader::new(raw);
    let enc_pub_key = r.read_var_bytes_le("encrypted account public key")?;
    let enc_priv_key = r.read_var_bytes_le("encrypted account private key")?;
    let next_external_index = r.read_u32_le("next external index")?;
    let next_internal_index = r.read_u32_le("next internal index")?;
    let name_bytes = r.read_var_bytes_le("account name")?;
    r.expect_end()?;
    let name = String::from_utf8(name_bytes)
        .map_err(|_| ManagerError::Malformed("account name"))?;
    Ok(AccountInfo {
        enc_pub_key,
        enc_priv_key,
        next_external_index,
        next_internal_index,
        name,
    })
}

/// Serialize a full address row.
pub fn serialize_address_row(row: &AddressRow) -> Vec<u8> {
    let raw = match &row.payload {
        AddressPayload::Chained { branch, index } => {
            let mut w = ByteWriter::with_capacity(8);
            w.write_u32_le(*branch);
            w.write_u32_le(*index);
            w.into_bytes()
        }
        AddressPayload::Imported {
            enc_pub_key,
            enc_priv_key,
        } => {
            let mut w = ByteWriter::with_capacity(8 + enc_pub_key.len() + enc_priv_key.len());
            w.write_var_bytes_le(enc_pub_key);
            w.write_var_bytes_le(enc_priv_key);
            w.into_bytes()
        }
        AddressPayload::Script {
            enc_script_hash,
            enc_script,
        } => {
            let mut w = ByteWriter::with_capacity(8 + enc_script_hash.len() + enc_script.len());
            w.write_var_bytes_le(enc_script_hash);
            w.write_var_bytes_le(enc_script);
            w.into_bytes()
        }
    };

    let mut w = ByteWriter::with_capacity(18 + raw.len());
    w.write_u8(row.payload.kind());
    w.write_u32_le(row.account);
    w.write_u64_le(row.added_secs);
    w.write_u8(row.sync_status as u8);
    w.write_var_bytes_le(&raw);
    w.into_bytes()
}

/// Decode a full address row, dispatching on the type tag.
pub fn deserialize_address_row(bytes: &[u8]) -> Result<AddressRow, ManagerError> {
    let mut r = ByteReader::new(bytes);
    let kind = r.read_u8("address row type")?;
    let account = r.read_u32_le("address account")?;
    let added_secs = r.read_u64_le("address add time")?;
    let sync_status = SyncStatus::from_u8(r.read_u8("address sync status")?)
        .ok_or(ManagerError::Malformed("address sync status"))?;
    let raw = r.read_var_bytes_le("address row data")?;
    r.expect_end()?;

    let mut raw_reader = ByteReader::new(&raw);
    let payload = match kind {
        ADDR_KIND_CHAINED => {
            let branch = raw_reader.read_u32_le("chained branch")?;
            let index = raw_reader.read_u32_le("chained index")?;
            AddressPayload::Chained { branch, index }
        }
        ADDR_KIND_IMPORTED => {
            let enc_pub_key = raw_reader.read_var_bytes_le("imported public key")?;
            let enc_priv_key = raw_reader.read_var_bytes_le("imported private key")?;
            AddressPayload::Imported {
                enc_pub_key,
                enc_priv_key,
            }
        }
        ADDR_KIND_SCRIPT => {
            let enc_script_hash = raw_reader.read_var_bytes_le("script hash")?;
            let enc_script = raw_reader.read_var_bytes_le("script")?;
            AddressPayload::Script {
                enc_script_hash,
                enc_script,
            }
        }
        _ => return Err(ManagerError::Malformed("address row type")),
    };
    raw_reader.expect_end()?;

    Ok(AddressRow {
        account,
        added_secs,
        sync_status,
        payload,
    })
}

/// Serialize an account name the way the name index keys it:
/// `len(4 LE) || bytes`.
pub fn serialize_account_name(name: &str) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(4 + name.len());
    w.write_var_bytes_le(name.as_bytes());
    w.into_bytes()
}

/// Decode an account name from its length-prefixed form.
pub fn deserialize_account_name(bytes: &[u8]) -> Result<String, ManagerError> {
    let mut r = ByteReader::new(bytes);
    let raw = r.read_var_bytes_le("account name")?;
    String::from_utf8(raw).map_err(|_| ManagerError::Malformed("account name"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account() -> AccountInfo {
        AccountInfo {
            enc_pub_key: vec![0xAA; 40],
            enc_priv_key: vec![0xBB; 44],
            next_external_index: 7,
            next_internal_index: 3,
            name: "default".to_string(),
        }
    }

    #[test]
    fn default_account_roundtrip() {
        let info = sample_account();
        let raw = serialize_default_account(&info);
        assert_eq!(deserialize_default_account(&raw).unwrap(), info);
    }

    #[test]
    fn account_row_header_roundtrip() {
        let raw = serialize_default_account(&sample_account());
        let row = serialize_account_row(ACCOUNT_KIND_DEFAULT, &raw);
        let (kind, data) = split_account_row(&row).unwrap();
        assert_eq!(kind, ACCOUNT_KIND_DEFAULT);
        assert_eq!(data, raw);
    }

    #[test]
    fn account_with_empty_priv_key_roundtrip() {
        let mut info = sample_account();
        info.enc_priv_key = Vec::new();
        let raw = serialize_default_account(&info);
        assert_eq!(deserialize_default_account(&raw).unwrap(), info);
    }

    #[test]
    fn chained_address_roundtrip() {
        let row = AddressRow {
            account: 2,
            added_secs: 1_600_000_000,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Chained {
                branch: 1,
                index: 42,
            },
        };
        let bytes = serialize_address_row(&row);
        assert_eq!(deserialize_address_row(&bytes).unwrap(), row);
    }

    #[test]
    fn imported_address_roundtrip() {
        let row = AddressRow {
            account: 0,
            added_secs: 1_600_000_001,
            sync_status: SyncStatus::Full,
            payload: AddressPayload::Imported {
                enc_pub_key: vec![1; 61],
                enc_priv_key: vec![2; 60],
            },
        };
        let bytes = serialize_address_row(&row);
        assert_eq!(deserialize_address_row(&bytes).unwrap(), row);
    }

    #[test]
    fn script_address_roundtrip() {
        let row = AddressRow {
            account: 0,
            added_secs: 1_600_000_002,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Script {
                enc_script_hash: vec![3; 48],
                enc_script: vec![4; 90],
            },
        };
        let bytes = serialize_address_row(&row);
        assert_eq!(deserialize_address_row(&bytes).unwrap(), row);
    }

    #[test]
    fn chained_layout_is_stable() {
        // One fixed vector pins the byte layout against accidental change.
        let row = AddressRow {
            account: 1,
            added_secs: 2,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Chained {
                branch: 0,
                index: 5,
            },
        };
        let bytes = serialize_address_row(&row);
        let expected = [
            0u8, // chained tag
            1, 0, 0, 0, // account
            2, 0, 0, 0, 0, 0, 0, 0, // add time
            0, // sync status
            8, 0, 0, 0, // raw len
            0, 0, 0, 0, // branch
            5, 0, 0, 0, // index
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn truncated_address_row_fails() {
        let row = AddressRow {
            account: 2,
            added_secs: 0,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Chained {
                branch: 0,
                index: 0,
            },
        };
        let bytes = serialize_address_row(&row);
        assert!(deserialize_address_row(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn unknown_address_tag_fails() {
        let row = AddressRow {
            account: 2,
            added_secs: 0,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Chained {
                branch: 0,
                index: 0,
            },
        };
        let mut bytes = serialize_address_row(&row);
        bytes[0] = 9;
        assert!(matches!(
            deserialize_address_row(&bytes).unwrap_err(),
            ManagerError::Malformed("address row type")
        ));
    }

    #[test]
    fn hostile_length_prefix_fails_cleanly() {
        // An imported row whose inner pubkey length claims more than the
        // buffer holds.
        let mut w = lode_core::codec::ByteWriter::new();
        w.write_u8(ADDR_KIND_IMPORTED);
        w.write_u32_le(0); // account
        w.write_u64_le(0); // time
        w.write_u8(0); // sync status
        let mut inner = lode_core::codec::ByteWriter::new();
        inner.write_u32_le(0xFFFF_FFFF); // hostile length
        inner.write_bytes(&[1, 2, 3]);
        w.write_var_bytes_le(&inner.into_bytes());
        assert!(deserialize_address_row(&w.into_bytes()).is_err());
    }

    #[test]
    fn account_name_index_form_roundtrip() {
        let bytes = serialize_account_name("savings");
        assert_eq!(bytes[..4], [7, 0, 0, 0]);
        assert_eq!(deserialize_account_name(&bytes).unwrap(), "savings");
    }
}
