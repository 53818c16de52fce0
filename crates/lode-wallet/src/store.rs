//! The address-manager store.
//!
//! Every mutating operation runs inside a single write transaction: any
//! error aborts the whole transaction. Reads run against a snapshot. The
//! store owns one namespace (a top-level bucket) in the node's key/value
//! database; see [`crate::schema`] for the layout within it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::info;

use lode_core::Hash256;
use lode_store::{Bucket, BucketEntry, KvStore};

use crate::error::ManagerError;
use crate::migrate;
use crate::rows::{
    deserialize_account_name, deserialize_address_row, deserialize_default_account,
    serialize_account_name, serialize_account_row, serialize_address_row,
    serialize_default_account, split_account_row, AccountInfo, AddressPayload, AddressRow,
    ACCOUNT_KIND_DEFAULT,
};
use crate::schema::*;
use crate::types::{
    KeyScope, ScopeAddrSchema, SyncStamp, SyncStatus, DEFAULT_ACCOUNT, INTERNAL_BRANCH,
    LATEST_MGR_VERSION,
};

/// Versioned, transactional storage for one wallet's key metadata.
pub struct AddrManagerStore {
    db: Arc<KvStore>,
    namespace: Vec<u8>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn addr_hash(addr_id: &[u8]) -> [u8; 32] {
    Sha256::digest(addr_id).into()
}

fn account_key(account: u32) -> [u8; 4] {
    account.to_le_bytes()
}

// --- Namespace-internal helpers, shared with the migration engine ---

pub(crate) fn fetch_version(ns: &Bucket<'_>) -> Result<u32, ManagerError> {
    let main = ns
        .bucket(MAIN_BUCKET)?
        .ok_or(ManagerError::NamespaceNotFound)?;
    let raw = main
        .get(MGR_VERSION_KEY)?
        .ok_or(ManagerError::MissingVersion)?;
    if raw.len() != 4 {
        return Err(ManagerError::Malformed("manager version"));
    }
    Ok(u32::from_le_bytes(raw.try_into().unwrap()))
}

pub(crate) fn put_version(ns: &Bucket<'_>, version: u32) -> Result<(), ManagerError> {
    let main = ns
        .bucket(MAIN_BUCKET)?
        .ok_or(ManagerError::NamespaceNotFound)?;
    main.put(MGR_VERSION_KEY, &version.to_le_bytes())?;
    Ok(())
}

pub(crate) fn fetch_scope_bucket<'a>(
    ns: &Bucket<'a>,
    scope: &KeyScope,
) -> Result<Bucket<'a>, ManagerError> {
    let root = ns
        .bucket(SCOPE_BUCKET)?
        .ok_or(ManagerError::ScopeNotFound(*scope))?;
    root.bucket(&scope.to_bytes())?
        .ok_or(ManagerError::ScopeNotFound(*scope))
}

/// Create the bucket tree a scoped manager needs.
pub(crate) fn create_scoped_buckets<'a>(
    scope_root: &Bucket<'a>,
    scope: &KeyScope,
) -> Result<Bucket<'a>, ManagerError> {
    let scoped = scope_root.create_bucket(&scope.to_bytes())?;
    scoped.create_bucket(ACCT_BUCKET)?;
    scoped.create_bucket(ADDR_BUCKET)?;
    scoped.create_bucket(USED_ADDR_BUCKET)?;
    scoped.create_bucket(ADDR_ACCT_IDX_BUCKET)?;
    scoped.create_bucket(ACCT_NAME_IDX_BUCKET)?;
    scoped.create_bucket(ACCT_ID_IDX_BUCKET)?;
    scoped.create_bucket(META_BUCKET)?;
    Ok(scoped)
}

fn scoped_child<'a>(
    scoped: &Bucket<'a>,
    name: &'static [u8],
    what: &'static str,
) -> Result<Bucket<'a>, ManagerError> {
    scoped.bucket(name)?.ok_or(ManagerError::Malformed(what))
}

fn fetch_address_by_hash(
    scoped: &Bucket<'_>,
    hash: &[u8],
) -> Result<AddressRow, ManagerError> {
    let bucket = scoped_child(scoped, ADDR_BUCKET, "address bucket")?;
    let raw = bucket.get(hash)?.ok_or(ManagerError::AddressNotFound)?;
    deserialize_address_row(&raw)
}

/// Store an address row and keep the address→account index in step.
fn put_address(
    scoped: &Bucket<'_>,
    addr_id: &[u8],
    row: &AddressRow,
) -> Result<(), ManagerError> {
    // Rows are keyed by the hash of the address id, which conceals the
    // address while still allowing keyed lookups.
    let hash = addr_hash(addr_id);
    scoped_child(scoped, ADDR_BUCKET, "address bucket")?
        .put(&hash, &serialize_address_row(row))?;

    let idx = scoped_child(scoped, ADDR_ACCT_IDX_BUCKET, "address account index")?;
    idx.put(&hash, &account_key(row.account))?;
    let per_account = idx.create_bucket_if_not_exists(&account_key(row.account))?;
    per_account.put(&hash, NULL_VAL)?;
    Ok(())
}

fn fetch_account_info_in(
    scoped: &Bucket<'_>,
    account: u32,
) -> Result<AccountInfo, ManagerError> {
    let bucket = scoped_child(scoped, ACCT_BUCKET, "account bucket")?;
    let raw = bucket
        .get(&account_key(account))?
        .ok_or(ManagerError::AccountNotFound(account))?;
    let (kind, data) = split_account_row(&raw)?;
    if kind != ACCOUNT_KIND_DEFAULT {
        return Err(ManagerError::Malformed("account row type"));
    }
    deserialize_default_account(&data)
}

impl AddrManagerStore {
    /// Create the manager namespace, installing the given default scopes,
    /// their schemas and bucket trees, the version, and the creation date.
    /// Fails if the namespace already holds a manager.
    pub fn create(
        db: Arc<KvStore>,
        namespace: &[u8],
        default_scopes: &[(KeyScope, ScopeAddrSchema)],
    ) -> Result<Self, ManagerError> {
        db.update::<_, ManagerError, _>(|tx| {
            let ns = tx.create_bucket_if_not_exists(namespace)?;
            let main = ns.create_bucket(MAIN_BUCKET)?;
            ns.create_bucket(SYNC_BUCKET)?;
            let scope_root = ns.create_bucket(SCOPE_BUCKET)?;
            let schemas = ns.create_bucket(SCOPE_SCHEMA_BUCKET)?;

            for (scope, schema) in default_scopes {
                schemas.put(&scope.to_bytes(), &schema.to_bytes())?;
                let scoped = create_scoped_buckets(&scope_root, scope)?;
                scoped_child(&scoped, META_BUCKET, "meta bucket")?
                    .put(LAST_ACCOUNT_KEY, &account_key(DEFAULT_ACCOUNT))?;
            }

            main.put(MGR_VERSION_KEY, &LATEST_MGR_VERSION.to_le_bytes())?;
            main.put(MGR_CREATE_DATE_KEY, &now_secs().to_le_bytes())?;
            main.put(WATCHING_ONLY_KEY, &[0])?;
            Ok(())
        })?;
        info!(namespace = %String::from_utf8_lossy(namespace), "created address manager namespace");
        Ok(Self {
            db,
            namespace: namespace.to_vec(),
        })
    }

    /// Open an existing namespace, running any pending migrations. Fails if
    /// the on-disk version is newer than this build.
    pub fn open(db: Arc<KvStore>, namespace: &[u8]) -> Result<Self, ManagerError> {
        let store = Self {
            db,
            namespace: namespace.to_vec(),
        };
        migrate::upgrade_manager(&store)?;
        Ok(store)
    }

    /// Whether a manager has been created in the given namespace.
    pub fn exists(db: &KvStore, namespace: &[u8]) -> Result<bool, ManagerError> {
        db.view::<_, ManagerError, _>(|tx| {
            match tx.bucket(namespace)? {
                Some(ns) => Ok(ns.bucket(MAIN_BUCKET)?.is_some()),
                None => Ok(false),
            }
        })
    }

    pub(crate) fn database(&self) -> &KvStore {
        &self.db
    }

    pub(crate) fn namespace(&self) -> &[u8] {
        &self.namespace
    }

    fn with_ns_read<T>(
        &self,
        f: impl FnOnce(&Bucket<'_>) -> Result<T, ManagerError>,
    ) -> Result<T, ManagerError> {
        self.db.view(|tx| {
            let ns = tx
                .bucket(&self.namespace)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            f(&ns)
        })
    }

    fn with_ns_write<T>(
        &self,
        f: impl FnOnce(&Bucket<'_>) -> Result<T, ManagerError>,
    ) -> Result<T, ManagerError> {
        self.db.update(|tx| {
            let ns = tx
                .bucket(&self.namespace)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            f(&ns)
        })
    }

    /// The namespace's current schema version.
    pub fn manager_version(&self) -> Result<u32, ManagerError> {
        self.with_ns_read(|ns| fetch_version(ns))
    }

    /// Unix seconds when the namespace was created.
    pub fn fetch_create_date(&self) -> Result<u64, ManagerError> {
        self.with_ns_read(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            let raw = main
                .get(MGR_CREATE_DATE_KEY)?
                .ok_or(ManagerError::MissingRecord("creation date"))?;
            if raw.len() != 8 {
                return Err(ManagerError::Malformed("creation date"));
            }
            Ok(u64::from_le_bytes(raw.try_into().unwrap()))
        })
    }

    // --- main bucket: master material ---

    /// Store the master key derivation parameters. Either can be `None`, in
    /// which case that slot is left untouched.
    pub fn put_master_key_params(
        &self,
        pub_params: Option<&[u8]>,
        priv_params: Option<&[u8]>,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            if let Some(priv_params) = priv_params {
                main.put(MASTER_PRIV_PARAMS_KEY, priv_params)?;
            }
            if let Some(pub_params) = pub_params {
                main.put(MASTER_PUB_PARAMS_KEY, pub_params)?;
            }
            Ok(())
        })
    }

    /// The master key parameters. The public half is required; the private
    /// half is absent for watching-only wallets.
    pub fn fetch_master_key_params(
        &self,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), ManagerError> {
        self.with_ns_read(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            let pub_params = main
                .get(MASTER_PUB_PARAMS_KEY)?
                .ok_or(ManagerError::MissingRecord("master public key parameters"))?;
            Ok((pub_params, main.get(MASTER_PRIV_PARAMS_KEY)?))
        })
    }

    /// Store the encrypted crypto keys protecting derived and imported
    /// material. Any slot passed as `None` is left untouched.
    pub fn put_crypto_keys(
        &self,
        enc_pub: Option<&[u8]>,
        enc_priv: Option<&[u8]>,
        enc_script: Option<&[u8]>,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            if let Some(enc_pub) = enc_pub {
                main.put(CRYPTO_PUB_KEY, enc_pub)?;
            }
            if let Some(enc_priv) = enc_priv {
                main.put(CRYPTO_PRIV_KEY, enc_priv)?;
            }
            if let Some(enc_script) = enc_script {
                main.put(CRYPTO_SCRIPT_KEY, enc_script)?;
            }
            Ok(())
        })
    }

    /// The encrypted crypto keys: public (required), private and script
    /// (absent for watching-only wallets).
    pub fn fetch_crypto_keys(
        &self,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>, Option<Vec<u8>>), ManagerError> {
        self.with_ns_read(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            let enc_pub = main
                .get(CRYPTO_PUB_KEY)?
                .ok_or(ManagerError::MissingRecord("encrypted crypto public key"))?;
            Ok((
                enc_pub,
                main.get(CRYPTO_PRIV_KEY)?,
                main.get(CRYPTO_SCRIPT_KEY)?,
            ))
        })
    }

    /// Store the encrypted master HD keys, from which new scopes derive.
    pub fn put_master_hd_keys(
        &self,
        enc_priv: Option<&[u8]>,
        enc_pub: Option<&[u8]>,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            if let Some(enc_priv) = enc_priv {
                main.put(MASTER_HD_PRIV_KEY, enc_priv)?;
            }
            if let Some(enc_pub) = enc_pub {
                main.put(MASTER_HD_PUB_KEY, enc_pub)?;
            }
            Ok(())
        })
    }

    /// The encrypted master HD keys `(priv, pub)`; either may be absent.
    pub fn fetch_master_hd_keys(
        &self,
    ) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), ManagerError> {
        self.with_ns_read(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            Ok((main.get(MASTER_HD_PRIV_KEY)?, main.get(MASTER_HD_PUB_KEY)?))
        })
    }

    pub fn put_watching_only(&self, watching_only: bool) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            main.put(WATCHING_ONLY_KEY, &[watching_only as u8])?;
            Ok(())
        })
    }

    pub fn fetch_watching_only(&self) -> Result<bool, ManagerError> {
        self.with_ns_read(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            let raw = main
                .get(WATCHING_ONLY_KEY)?
                .ok_or(ManagerError::Malformed("watching-only flag"))?;
            if raw.len() != 1 {
                return Err(ManagerError::Malformed("watching-only flag"));
            }
            Ok(raw[0] != 0)
        })
    }

    // --- sync bucket ---

    /// Record the chain location the wallet has scanned through, linking it
    /// against the previously recorded parent height.
    pub fn put_synced_to(&self, stamp: &SyncStamp) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            // Require the parent mapping so a reorg can always walk back.
            if stamp.height > 0 {
                let parent = ((stamp.height - 1) as u32).to_be_bytes();
                if sync.get(&parent)?.is_none() {
                    return Err(ManagerError::MissingRecord("parent block hash"));
                }
            }
            // Big-endian height keys keep the rows ordered for backends
            // that write sorted keys more efficiently.
            sync.put(&(stamp.height as u32).to_be_bytes(), stamp.hash.as_bytes())?;

            let mut buf = Vec::with_capacity(40);
            buf.extend_from_slice(&(stamp.height as u32).to_le_bytes());
            buf.extend_from_slice(stamp.hash.as_bytes());
            buf.extend_from_slice(&stamp.timestamp.to_le_bytes());
            sync.put(SYNCED_TO_KEY, &buf)?;
            Ok(())
        })
    }

    /// The last recorded sync stamp.
    pub fn fetch_synced_to(&self) -> Result<SyncStamp, ManagerError> {
        self.with_ns_read(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            let raw = sync
                .get(SYNCED_TO_KEY)?
                .ok_or(ManagerError::MissingRecord("sync information"))?;
            if raw.len() < 36 {
                return Err(ManagerError::Malformed("sync information"));
            }
            let height = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as i32;
            let hash = Hash256::from_slice(&raw[4..36])
                .map_err(|_| ManagerError::Malformed("sync information"))?;
            let timestamp = if raw.len() >= 40 {
                u32::from_le_bytes(raw[36..40].try_into().unwrap())
            } else {
                0
            };
            Ok(SyncStamp {
                height,
                hash,
                timestamp,
            })
        })
    }

    /// The block hash recorded for a height the wallet has synced past.
    pub fn fetch_block_hash(&self, height: i32) -> Result<Hash256, ManagerError> {
        self.with_ns_read(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            let raw = sync
                .get(&(height as u32).to_be_bytes())?
                .ok_or(ManagerError::MissingRecord("block hash"))?;
            Hash256::from_slice(&raw).map_err(|_| ManagerError::Malformed("block hash"))
        })
    }

    /// Record the earliest block the wallet must scan from.
    pub fn put_start_block(&self, stamp: &SyncStamp) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            let mut buf = Vec::with_capacity(36);
            buf.extend_from_slice(&(stamp.height as u32).to_le_bytes());
            buf.extend_from_slice(stamp.hash.as_bytes());
            sync.put(START_BLOCK_KEY, &buf)?;
            Ok(())
        })
    }

    /// The recorded start block; its timestamp field is always zero.
    pub fn fetch_start_block(&self) -> Result<SyncStamp, ManagerError> {
        self.with_ns_read(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            let raw = sync
                .get(START_BLOCK_KEY)?
                .ok_or(ManagerError::MissingRecord("start block"))?;
            if raw.len() != 36 {
                return Err(ManagerError::Malformed("start block"));
            }
            Ok(SyncStamp {
                height: u32::from_le_bytes(raw[0..4].try_into().unwrap()) as i32,
                hash: Hash256::from_slice(&raw[4..36])
                    .map_err(|_| ManagerError::Malformed("start block"))?,
                timestamp: 0,
            })
        })
    }

    /// Record the wallet birthday as Unix seconds.
    pub fn put_birthday(&self, birthday_secs: u64) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            sync.put(BIRTHDAY_KEY, &birthday_secs.to_be_bytes())?;
            Ok(())
        })
    }

    pub fn fetch_birthday(&self) -> Result<u64, ManagerError> {
        self.with_ns_read(|ns| {
            let sync = scoped_child(ns, SYNC_BUCKET, "sync bucket")?;
            let raw = sync
                .get(BIRTHDAY_KEY)?
                .ok_or(ManagerError::MissingRecord("birthday"))?;
            if raw.len() != 8 {
                return Err(ManagerError::Malformed("birthday"));
            }
            Ok(u64::from_be_bytes(raw.try_into().unwrap()))
        })
    }

    // --- scopes ---

    /// The address schema registered for a scope.
    pub fn fetch_scope_schema(
        &self,
        scope: &KeyScope,
    ) -> Result<ScopeAddrSchema, ManagerError> {
        self.with_ns_read(|ns| {
            let schemas = ns
                .bucket(SCOPE_SCHEMA_BUCKET)?
                .ok_or(ManagerError::ScopeNotFound(*scope))?;
            let raw = schemas
                .get(&scope.to_bytes())?
                .ok_or(ManagerError::ScopeNotFound(*scope))?;
            ScopeAddrSchema::from_bytes(&raw)
        })
    }

    /// Every scope registered in the store.
    pub fn key_scopes(&self) -> Result<Vec<KeyScope>, ManagerError> {
        self.with_ns_read(|ns| {
            let root = ns
                .bucket(SCOPE_BUCKET)?
                .ok_or(ManagerError::Malformed("scope bucket"))?;
            let mut scopes = Vec::new();
            for item in root.iter() {
                let (name, entry) = item?;
                if let (BucketEntry::Bucket, Some(scope)) =
                    (&entry, KeyScope::from_bytes(&name))
                {
                    scopes.push(scope);
                }
            }
            Ok(scopes)
        })
    }

    /// Store a scope's encrypted coin-type keys. Either slot may be `None`.
    pub fn put_coin_type_keys(
        &self,
        scope: &KeyScope,
        enc_pub: Option<&[u8]>,
        enc_priv: Option<&[u8]>,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            if let Some(enc_pub) = enc_pub {
                scoped.put(COIN_TYPE_PUB_KEY, enc_pub)?;
            }
            if let Some(enc_priv) = enc_priv {
                scoped.put(COIN_TYPE_PRIV_KEY, enc_priv)?;
            }
            Ok(())
        })
    }

    /// A scope's encrypted coin-type key pair `(pub, priv)`.
    pub fn fetch_coin_type_keys(
        &self,
        scope: &KeyScope,
    ) -> Result<(Vec<u8>, Vec<u8>), ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let enc_pub = scoped.get(COIN_TYPE_PUB_KEY)?.ok_or(
                ManagerError::MissingRecord("encrypted coin type public key"),
            )?;
            let enc_priv = scoped.get(COIN_TYPE_PRIV_KEY)?.ok_or(
                ManagerError::MissingRecord("encrypted coin type private key"),
            )?;
            Ok((enc_pub, enc_priv))
        })
    }

    // --- accounts ---

    /// Store an account row and update both name indexes, all in one
    /// transaction.
    pub fn put_account_info(
        &self,
        scope: &KeyScope,
        account: u32,
        info: &AccountInfo,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let row = serialize_account_row(
                ACCOUNT_KIND_DEFAULT,
                &serialize_default_account(info),
            );
            scoped_child(&scoped, ACCT_BUCKET, "account bucket")?
                .put(&account_key(account), &row)?;
            scoped_child(&scoped, ACCT_ID_IDX_BUCKET, "account id index")?
                .put(&account_key(account), &serialize_account_name(&info.name))?;
            scoped_child(&scoped, ACCT_NAME_IDX_BUCKET, "account name index")?
                .put(&serialize_account_name(&info.name), &account_key(account))?;
            Ok(())
        })
    }

    /// Load an account row.
    pub fn fetch_account_info(
        &self,
        scope: &KeyScope,
        account: u32,
    ) -> Result<AccountInfo, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            fetch_account_info_in(&scoped, account)
        })
    }

    /// The highest account number created in a scope.
    pub fn fetch_last_account(&self, scope: &KeyScope) -> Result<u32, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let meta = scoped_child(&scoped, META_BUCKET, "meta bucket")?;
            let raw = meta
                .get(LAST_ACCOUNT_KEY)?
                .ok_or(ManagerError::MissingRecord("last account"))?;
            if raw.len() != 4 {
                return Err(ManagerError::Malformed("last account"));
            }
            Ok(u32::from_le_bytes(raw.try_into().unwrap()))
        })
    }

    pub fn put_last_account(
        &self,
        scope: &KeyScope,
        account: u32,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            scoped_child(&scoped, META_BUCKET, "meta bucket")?
                .put(LAST_ACCOUNT_KEY, &account_key(account))?;
            Ok(())
        })
    }

    /// The name of an account, via the id index.
    pub fn fetch_account_name(
        &self,
        scope: &KeyScope,
        account: u32,
    ) -> Result<String, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let idx = scoped_child(&scoped, ACCT_ID_IDX_BUCKET, "account id index")?;
            let raw = idx
                .get(&account_key(account))?
                .ok_or(ManagerError::AccountNotFound(account))?;
            deserialize_account_name(&raw)
        })
    }

    /// The account number carrying a name, via the name index.
    pub fn fetch_account_by_name(
        &self,
        scope: &KeyScope,
        name: &str,
    ) -> Result<u32, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let idx = scoped_child(&scoped, ACCT_NAME_IDX_BUCKET, "account name index")?;
            let raw = idx
                .get(&serialize_account_name(name))?
                .ok_or_else(|| ManagerError::AccountNameNotFound(name.to_string()))?;
            if raw.len() != 4 {
                return Err(ManagerError::Malformed("account name index"));
            }
            Ok(u32::from_le_bytes(raw.try_into().unwrap()))
        })
    }

    /// Rename an account, updating the row and both indexes together.
    pub fn rename_account(
        &self,
        scope: &KeyScope,
        account: u32,
        new_name: &str,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let mut info = fetch_account_info_in(&scoped, account)?;
            let old_name = std::mem::replace(&mut info.name, new_name.to_string());

            let name_idx = scoped_child(&scoped, ACCT_NAME_IDX_BUCKET, "account name index")?;
            name_idx.delete(&serialize_account_name(&old_name))?;
            name_idx.put(&serialize_account_name(new_name), &account_key(account))?;
            scoped_child(&scoped, ACCT_ID_IDX_BUCKET, "account id index")?
                .put(&account_key(account), &serialize_account_name(new_name))?;
            scoped_child(&scoped, ACCT_BUCKET, "account bucket")?.put(
                &account_key(account),
                &serialize_account_row(
                    ACCOUNT_KIND_DEFAULT,
                    &serialize_default_account(&info),
                ),
            )?;
            Ok(())
        })
    }

    /// Call `f` with each account number in the scope, aborting on the
    /// first error.
    pub fn for_each_account(
        &self,
        scope: &KeyScope,
        mut f: impl FnMut(u32) -> Result<(), ManagerError>,
    ) -> Result<(), ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let bucket = scoped_child(&scoped, ACCT_BUCKET, "account bucket")?;
            for item in bucket.iter() {
                let (key, entry) = item?;
                if let BucketEntry::Value(_) = entry {
                    if key.len() == 4 {
                        f(u32::from_le_bytes(key.try_into().unwrap()))?;
                    }
                }
            }
            Ok(())
        })
    }

    // --- addresses ---

    /// Store a chained address row and advance the owning account's next
    /// index for the derived branch.
    pub fn put_chained_address(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
        account: u32,
        status: SyncStatus,
        branch: u32,
        index: u32,
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            put_address(
                &scoped,
                addr_id,
                &AddressRow {
                    account,
                    added_secs: now_secs(),
                    sync_status: status,
                    payload: AddressPayload::Chained { branch, index },
                },
            )?;

            let mut info = fetch_account_info_in(&scoped, account)?;
            if branch == INTERNAL_BRANCH {
                info.next_internal_index = index + 1;
            } else {
                info.next_external_index = index + 1;
            }
            scoped_child(&scoped, ACCT_BUCKET, "account bucket")?.put(
                &account_key(account),
                &serialize_account_row(
                    ACCOUNT_KIND_DEFAULT,
                    &serialize_default_account(&info),
                ),
            )?;
            Ok(())
        })
    }

    /// Store an imported key-pair address row.
    pub fn put_imported_address(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
        account: u32,
        status: SyncStatus,
        enc_pub_key: &[u8],
        enc_priv_key: &[u8],
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            put_address(
                &scoped,
                addr_id,
                &AddressRow {
                    account,
                    added_secs: now_secs(),
                    sync_status: status,
                    payload: AddressPayload::Imported {
                        enc_pub_key: enc_pub_key.to_vec(),
                        enc_priv_key: enc_priv_key.to_vec(),
                    },
                },
            )
        })
    }

    /// Store a script address row.
    pub fn put_script_address(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
        account: u32,
        status: SyncStatus,
        enc_script_hash: &[u8],
        enc_script: &[u8],
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            put_address(
                &scoped,
                addr_id,
                &AddressRow {
                    account,
                    added_secs: now_secs(),
                    sync_status: status,
                    payload: AddressPayload::Script {
                        enc_script_hash: enc_script_hash.to_vec(),
                        enc_script: enc_script.to_vec(),
                    },
                },
            )
        })
    }

    /// Load an address row by address id.
    pub fn fetch_address(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
    ) -> Result<AddressRow, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            fetch_address_by_hash(&scoped, &addr_hash(addr_id))
        })
    }

    /// Whether an address id is managed in the scope.
    pub fn exists_address(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
    ) -> Result<bool, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let bucket = scoped_child(&scoped, ADDR_BUCKET, "address bucket")?;
            Ok(bucket.get(&addr_hash(addr_id))?.is_some())
        })
    }

    /// The account an address belongs to, via the address→account index.
    pub fn fetch_addr_account(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
    ) -> Result<u32, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let idx = scoped_child(&scoped, ADDR_ACCT_IDX_BUCKET, "address account index")?;
            let raw = idx
                .get(&addr_hash(addr_id))?
                .ok_or(ManagerError::AddressNotFound)?;
            if raw.len() != 4 {
                return Err(ManagerError::Malformed("address account index"));
            }
            Ok(u32::from_le_bytes(raw.try_into().unwrap()))
        })
    }

    /// Flag an address id as having appeared on chain. Idempotent.
    pub fn mark_address_used(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
    ) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let bucket = scoped_child(&scoped, USED_ADDR_BUCKET, "used address bucket")?;
            let hash = addr_hash(addr_id);
            if bucket.get(&hash)?.is_some() {
                return Ok(());
            }
            bucket.put(&hash, NULL_VAL)?;
            Ok(())
        })
    }

    /// Whether an address id has been flagged as used.
    pub fn fetch_address_used(
        &self,
        scope: &KeyScope,
        addr_id: &[u8],
    ) -> Result<bool, ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let bucket = scoped_child(&scoped, USED_ADDR_BUCKET, "used address bucket")?;
            Ok(bucket.get(&addr_hash(addr_id))?.is_some())
        })
    }

    /// Call `f` with each address row of one account, aborting on error.
    pub fn for_each_account_address(
        &self,
        scope: &KeyScope,
        account: u32,
        mut f: impl FnMut(&AddressRow) -> Result<(), ManagerError>,
    ) -> Result<(), ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let idx = scoped_child(&scoped, ADDR_ACCT_IDX_BUCKET, "address account index")?;
            // No per-account bucket means no addresses yet.
            let per_account = match idx.bucket(&account_key(account))? {
                Some(bucket) => bucket,
                None => return Ok(()),
            };
            for item in per_account.iter() {
                let (hash, entry) = item?;
                if let BucketEntry::Value(_) = entry {
                    let row = fetch_address_by_hash(&scoped, &hash)?;
                    f(&row)?;
                }
            }
            Ok(())
        })
    }

    /// Call `f` with every address row in the scope, aborting on error.
    pub fn for_each_active_address(
        &self,
        scope: &KeyScope,
        mut f: impl FnMut(&AddressRow) -> Result<(), ManagerError>,
    ) -> Result<(), ManagerError> {
        self.with_ns_read(|ns| {
            let scoped = fetch_scope_bucket(ns, scope)?;
            let bucket = scoped_child(&scoped, ADDR_BUCKET, "address bucket")?;
            for item in bucket.iter() {
                let (_, entry) = item?;
                if let BucketEntry::Value(raw) = entry {
                    let row = deserialize_address_row(&raw)?;
                    f(&row)?;
                }
            }
            Ok(())
        })
    }

    /// Remove all private key material, leaving a watching-only store: the
    /// master and crypto private keys, every scope's coin-type private key,
    /// every account's private slot, and the private halves of imported and
    /// script address rows. Public companions and address structure remain.
    pub fn delete_private_keys(&self) -> Result<(), ManagerError> {
        self.with_ns_write(|ns| {
            let main = ns
                .bucket(MAIN_BUCKET)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            main.delete(MASTER_PRIV_PARAMS_KEY)?;
            main.delete(CRYPTO_PRIV_KEY)?;
            main.delete(CRYPTO_SCRIPT_KEY)?;
            main.delete(MASTER_HD_PRIV_KEY)?;
            main.put(WATCHING_ONLY_KEY, &[1])?;

            let scope_root = ns
                .bucket(SCOPE_BUCKET)?
                .ok_or(ManagerError::Malformed("scope bucket"))?;
            let mut scope_names = Vec::new();
            for item in scope_root.iter() {
                let (name, entry) = item?;
                if entry == BucketEntry::Bucket && name.len() == KeyScope::ENCODED_LEN {
                    scope_names.push(name);
                }
            }

            for name in scope_names {
                let scoped = scope_root
                    .bucket(&name)?
                    .ok_or(ManagerError::Malformed("scope bucket"))?;
                scoped.delete(COIN_TYPE_PRIV_KEY)?;

                // Strip each account's private slot.
                let acct_bucket = scoped_child(&scoped, ACCT_BUCKET, "account bucket")?;
                for item in acct_bucket.iter() {
                    let (key, entry) = item?;
                    if let BucketEntry::Value(raw) = entry {
                        let (kind, data) = split_account_row(&raw)?;
                        if kind != ACCOUNT_KIND_DEFAULT {
                            continue;
                        }
                        let mut info = deserialize_default_account(&data)?;
                        info.enc_priv_key.clear();
                        acct_bucket.put(
                            &key,
                            &serialize_account_row(
                                kind,
                                &serialize_default_account(&info),
                            ),
                        )?;
                    }
                }

                // Strip imported private keys and scripts.
                let addr_bucket = scoped_child(&scoped, ADDR_BUCKET, "address bucket")?;
                for item in addr_bucket.iter() {
                    let (key, entry) = item?;
                    if let BucketEntry::Value(raw) = entry {
                        let mut row = deserialize_address_row(&raw)?;
                        let changed = match &mut row.payload {
                            AddressPayload::Imported { enc_priv_key, .. } => {
                                enc_priv_key.clear();
                                true
                            }
                            AddressPayload::Script { enc_script, .. } => {
                                enc_script.clear();
                                true
                            }
                            AddressPayload::Chained { .. } => false,
                        };
                        if changed {
                            addr_bucket.put(&key, &serialize_address_row(&row))?;
                        }
                    }
                }
            }
            info!("deleted all private key material from address manager");
            Ok(())
        })
    }
}
