//! Bucket and key names of the on-disk manager namespace.
//!
//! Layout within one namespace bucket:
//!
//! ```text
//! main/                 version, create date, encrypted master material,
//!                       watching-only flag
//! sync/                 synced-to stamp, start block, birthday,
//!                       big-endian height → block hash rows
//! scope-schema/         scope key → 2-byte address schema
//! scope/<scope>/        ctpub, ctpriv
//!   acct/               account id (LE u32) → account row
//!   addr/               SHA-256(addr id) → address row
//!   usedaddrs/          SHA-256(addr id) → 1-byte marker
//!   addracctidx/        SHA-256(addr id) → account id, plus a nested
//!                       bucket per account listing its address hashes
//!   acctnameidx/        length-prefixed name → account id
//!   acctididx/          account id → length-prefixed name
//!   meta/               last account counter
//! ```

pub const MAIN_BUCKET: &[u8] = b"main";
pub const SYNC_BUCKET: &[u8] = b"sync";
pub const SCOPE_BUCKET: &[u8] = b"scope";
pub const SCOPE_SCHEMA_BUCKET: &[u8] = b"scope-schema";

pub const ACCT_BUCKET: &[u8] = b"acct";
pub const ADDR_BUCKET: &[u8] = b"addr";
pub const USED_ADDR_BUCKET: &[u8] = b"usedaddrs";
pub const ADDR_ACCT_IDX_BUCKET: &[u8] = b"addracctidx";
pub const ACCT_NAME_IDX_BUCKET: &[u8] = b"acctnameidx";
pub const ACCT_ID_IDX_BUCKET: &[u8] = b"acctididx";
pub const META_BUCKET: &[u8] = b"meta";

pub const COIN_TYPE_PRIV_KEY: &[u8] = b"ctpriv";
pub const COIN_TYPE_PUB_KEY: &[u8] = b"ctpub";

pub const MGR_VERSION_KEY: &[u8] = b"mgrver";
pub const MGR_CREATE_DATE_KEY: &[u8] = b"mgrcreated";
pub const MASTER_PRIV_PARAMS_KEY: &[u8] = b"mpriv";
pub const MASTER_PUB_PARAMS_KEY: &[u8] = b"mpub";
pub const CRYPTO_PRIV_KEY: &[u8] = b"cpriv";
pub const CRYPTO_PUB_KEY: &[u8] = b"cpub";
pub const CRYPTO_SCRIPT_KEY: &[u8] = b"cscript";
pub const MASTER_HD_PRIV_KEY: &[u8] = b"mhdpriv";
pub const MASTER_HD_PUB_KEY: &[u8] = b"mhdpub";
pub const WATCHING_ONLY_KEY: &[u8] = b"watchonly";

pub const SYNCED_TO_KEY: &[u8] = b"syncedto";
pub const START_BLOCK_KEY: &[u8] = b"startblock";
pub const BIRTHDAY_KEY: &[u8] = b"birthday";

pub const LAST_ACCOUNT_KEY: &[u8] = b"lastaccount";

/// Null byte used as a flag value in index bucket entries.
pub const NULL_VAL: &[u8] = &[0];
