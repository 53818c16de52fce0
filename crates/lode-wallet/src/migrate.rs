//! Version upgrade engine for the manager namespace.
//!
//! `open` calls [`upgrade_manager`], which reads the stored version and runs
//! each pending migration inside its own write transaction, recording the
//! new version on success. The only live migration is v4→v5, which
//! introduced key scopes: coin-type keys move out of `main/`, the last
//! account counter moves into per-scope metadata, and the account/address
//! trees are relocated under the default scope bucket.

use tracing::info;

use lode_store::{Bucket, BucketEntry};

use crate::error::ManagerError;
use crate::rows::ADDR_KIND_SCRIPT;
use crate::schema::*;
use crate::store::{
    create_scoped_buckets, fetch_version, put_version, AddrManagerStore,
};
use crate::types::{default_scopes, LATEST_MGR_VERSION, SCOPE_BIP44};

/// Bring the namespace up to [`LATEST_MGR_VERSION`], or fail if it is newer
/// than this build or too old to have an upgrade path.
pub(crate) fn upgrade_manager(store: &AddrManagerStore) -> Result<(), ManagerError> {
    let db = store.database();
    let namespace = store.namespace().to_vec();

    let version = db.view::<_, ManagerError, _>(|tx| {
        let ns = tx
            .bucket(&namespace)?
            .ok_or(ManagerError::NamespaceNotFound)?;
        fetch_version(&ns)
    })?;

    if version > LATEST_MGR_VERSION {
        return Err(ManagerError::UnsupportedVersion {
            got: version,
            latest: LATEST_MGR_VERSION,
        });
    }
    if version < 4 {
        return Err(ManagerError::Upgrade(format!(
            "no upgrade path from manager version {version}"
        )));
    }

    if version == 4 {
        db.update::<_, ManagerError, _>(|tx| {
            let ns = tx
                .bucket(&namespace)?
                .ok_or(ManagerError::NamespaceNotFound)?;
            upgrade_to_version5(&ns)
        })?;
        info!("upgraded address manager namespace from version 4 to 5");
    }

    // A version still below latest here means a migration is missing from
    // this build; refuse rather than run on a half-upgraded namespace.
    let version = db.view::<_, ManagerError, _>(|tx| {
        let ns = tx
            .bucket(&namespace)?
            .ok_or(ManagerError::NamespaceNotFound)?;
        fetch_version(&ns)
    })?;
    if version < LATEST_MGR_VERSION {
        return Err(ManagerError::Upgrade(format!(
            "latest manager version is {LATEST_MGR_VERSION}, but only {version} after upgrades"
        )));
    }
    Ok(())
}

/// The v4→v5 scope migration. Runs inside one write transaction.
fn upgrade_to_version5(ns: &Bucket<'_>) -> Result<(), ManagerError> {
    // Rows of a kind newer than script addresses cannot be expressed in the
    // scoped layout; refuse to migrate a namespace holding any.
    let addr_bucket = ns
        .bucket(ADDR_BUCKET)?
        .ok_or_else(|| ManagerError::Upgrade("version 4 layout has no address tree".into()))?;
    for item in addr_bucket.iter() {
        let (_, entry) = item?;
        if let BucketEntry::Value(raw) = entry {
            let kind = *raw.first().ok_or(ManagerError::Malformed("address row"))?;
            if kind > ADDR_KIND_SCRIPT {
                return Err(ManagerError::Upgrade(format!(
                    "address of unmigratable type {kind} exists in wallet"
                )));
            }
        }
    }

    // Create the scope machinery with the single default scope.
    let scope_root = ns.create_bucket(SCOPE_BUCKET)?;
    let schemas = ns.create_bucket(SCOPE_SCHEMA_BUCKET)?;
    let schema = default_scopes()[0].1;
    schemas.put(&SCOPE_BIP44.to_bytes(), &schema.to_bytes())?;
    let scoped = create_scoped_buckets(&scope_root, &SCOPE_BIP44)?;

    // Move the coin-type keys out of main/.
    let main = ns
        .bucket(MAIN_BUCKET)?
        .ok_or(ManagerError::NamespaceNotFound)?;
    if let Some(enc_priv) = main.get(COIN_TYPE_PRIV_KEY)? {
        scoped.put(COIN_TYPE_PRIV_KEY, &enc_priv)?;
        main.delete(COIN_TYPE_PRIV_KEY)?;
    }
    if let Some(enc_pub) = main.get(COIN_TYPE_PUB_KEY)? {
        scoped.put(COIN_TYPE_PUB_KEY, &enc_pub)?;
        main.delete(COIN_TYPE_PUB_KEY)?;
    }

    // Move the last-account counter into the scope's metadata.
    if let Some(meta) = ns.bucket(META_BUCKET)? {
        if let Some(last_account) = meta.get(LAST_ACCOUNT_KEY)? {
            meta.delete(LAST_ACCOUNT_KEY)?;
            scoped
                .bucket(META_BUCKET)?
                .ok_or(ManagerError::Malformed("meta bucket"))?
                .put(LAST_ACCOUNT_KEY, &last_account)?;
        }
    }

    // Relocate the account and address trees under the scope bucket.
    for tree in [
        ACCT_BUCKET,
        ADDR_BUCKET,
        USED_ADDR_BUCKET,
        ADDR_ACCT_IDX_BUCKET,
        ACCT_NAME_IDX_BUCKET,
        ACCT_ID_IDX_BUCKET,
    ] {
        migrate_recursively(ns, &scoped, tree)?;
    }

    put_version(ns, 5)
}

/// Move the bucket `name` from `src` to `dst`, recursing into nested
/// buckets and deleting the source as it goes.
fn migrate_recursively(
    src: &Bucket<'_>,
    dst: &Bucket<'_>,
    name: &[u8],
) -> Result<(), ManagerError> {
    let from = src
        .bucket(name)?
        .ok_or(ManagerError::Malformed("bucket to migrate"))?;
    let to = dst.create_bucket_if_not_exists(name)?;
    for item in from.iter() {
        let (key, entry) = item?;
        match entry {
            BucketEntry::Bucket => migrate_recursively(&from, &to, &key)?,
            BucketEntry::Value(value) => {
                to.put(&key, &value)?;
                from.delete(&key)?;
            }
        }
    }
    src.delete_bucket(name)?;
    Ok(())
}
