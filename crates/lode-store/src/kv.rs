//! RocksDB-backed bucketed key/value store.
//!
//! The bucket hierarchy is flattened into the RocksDB keyspace:
//!
//! ```text
//!   bucket marker:  'b' || depth || seg(name_1) .. seg(name_depth)
//!   entry:          'e' || depth || seg(name_1) .. seg(name_depth) || key
//! ```
//!
//! where `seg(name)` is a u16 big-endian length followed by the name bytes.
//! Segments are self-delimiting, so for a fixed depth no two distinct bucket
//! paths share a prefix: a prefix scan over one bucket's entries or child
//! markers is exact.
//!
//! Write transactions stage mutations in an ordered in-memory overlay and
//! apply them as a single RocksDB `WriteBatch` on commit. Read transactions
//! pin a RocksDB snapshot. A store-wide mutex admits one writer at a time;
//! readers are unaffected.

use parking_lot::{Mutex, MutexGuard};
use rocksdb::{DBIteratorWithThreadMode, Direction, IteratorMode, Options, WriteBatch, DB};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;

const TAG_BUCKET: u8 = b'b';
const TAG_ENTRY: u8 = b'e';

/// A bucketed transactional key/value store.
pub struct KvStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl KvStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened key/value store");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Begin a read transaction pinned to the current state.
    pub fn begin_read_tx(&self) -> ReadTx<'_> {
        ReadTx {
            snapshot: self.db.snapshot(),
        }
    }

    /// Begin a write transaction. Blocks while another writer is active.
    pub fn begin_write_tx(&self) -> WriteTx<'_> {
        WriteTx {
            store: self,
            overlay: RefCell::new(BTreeMap::new()),
            _guard: self.write_lock.lock(),
        }
    }

    /// Run `f` inside a read transaction.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
    {
        let tx = self.begin_read_tx();
        f(&tx)
    }

    /// Run `f` inside a write transaction, committing on success and
    /// discarding every staged change on error.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&WriteTx<'_>) -> Result<T, E>,
    {
        let tx = self.begin_write_tx();
        match f(&tx) {
            Ok(v) => {
                tx.commit().map_err(E::from)?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }
}

/// A read transaction over a pinned snapshot.
pub struct ReadTx<'s> {
    snapshot: rocksdb::SnapshotWithThreadMode<'s, DB>,
}

impl<'s> ReadTx<'s> {
    /// Look up a top-level bucket. Returns `None` if it does not exist.
    pub fn bucket(&self, name: &[u8]) -> Result<Option<Bucket<'_>>, StoreError> {
        self.root().bucket(name)
    }

    fn root(&self) -> Bucket<'_> {
        Bucket {
            ctx: Ctx::Read(self),
            depth: 0,
            path: Vec::new(),
        }
    }
}

/// A write transaction staging mutations in memory.
pub struct WriteTx<'s> {
    store: &'s KvStore,
    /// Staged mutations: `Some` is a pending put, `None` a pending delete.
    overlay: RefCell<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    _guard: MutexGuard<'s, ()>,
}

impl<'s> WriteTx<'s> {
    /// Look up a top-level bucket. Returns `None` if it does not exist.
    pub fn bucket(&self, name: &[u8]) -> Result<Option<Bucket<'_>>, StoreError> {
        self.root().bucket(name)
    }

    /// Create a top-level bucket, failing if it already exists.
    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'_>, StoreError> {
        self.root().create_bucket(name)
    }

    /// Create a top-level bucket if it does not already exist.
    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'_>, StoreError> {
        self.root().create_bucket_if_not_exists(name)
    }

    /// Delete a top-level bucket and everything beneath it.
    pub fn delete_bucket(&self, name: &[u8]) -> Result<(), StoreError> {
        self.root().delete_bucket(name)
    }

    /// Atomically apply every staged mutation.
    pub fn commit(self) -> Result<(), StoreError> {
        let overlay = self.overlay.into_inner();
        if overlay.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for (key, value) in overlay {
            match value {
                Some(v) => batch.put(key, v),
                None => batch.delete(key),
            }
        }
        self.store.db.write(batch)?;
        Ok(())
    }

    /// Discard every staged mutation.
    pub fn rollback(self) {}

    fn root(&self) -> Bucket<'_> {
        Bucket {
            ctx: Ctx::Write(self),
            depth: 0,
            path: Vec::new(),
        }
    }

    /// Collect all live keys under `prefix`, merging the committed state
    /// with the overlay. Keys are full storage keys.
    fn collect_prefix(&self, prefix: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        let mut out = BTreeMap::new();
        let iter = self
            .store
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            out.insert(k.to_vec(), v.to_vec());
        }
        let overlay = self.overlay.borrow();
        let upper = prefix_upper_bound(prefix);
        let lower = Bound::Included(prefix.to_vec());
        let range: Box<dyn Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> + '_> = match upper {
            Some(end) => Box::new(overlay.range((lower, Bound::Excluded(end)))),
            None => Box::new(overlay.range((lower, Bound::Unbounded))),
        };
        for (k, v) in range {
            match v {
                Some(v) => {
                    out.insert(k.clone(), v.clone());
                }
                None => {
                    out.remove(k);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Copy)]
enum Ctx<'a> {
    Read(&'a ReadTx<'a>),
    Write(&'a WriteTx<'a>),
}

impl<'a> Ctx<'a> {
    fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Ctx::Read(tx) => Ok(tx.snapshot.get(key)?),
            Ctx::Write(tx) => {
                if let Some(staged) = tx.overlay.borrow().get(key) {
                    return Ok(staged.clone());
                }
                Ok(tx.store.db.get(key)?)
            }
        }
    }

    fn write_tx(&self) -> Result<&'a WriteTx<'a>, StoreError> {
        match *self {
            Ctx::Read(_) => Err(StoreError::TxNotWritable),
            Ctx::Write(tx) => Ok(tx),
        }
    }
}

/// A handle to one bucket within a transaction.
#[derive(Clone)]
pub struct Bucket<'a> {
    ctx: Ctx<'a>,
    depth: u8,
    /// Concatenated length-prefixed path segments.
    path: Vec<u8>,
}

/// One item yielded by bucket iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketEntry {
    /// A key/value pair stored directly in the bucket.
    Value(Vec<u8>),
    /// A nested bucket with the yielded name.
    Bucket,
}

impl<'a> Bucket<'a> {
    /// Look up a nested bucket. Returns `None` if it does not exist.
    pub fn bucket(&self, name: &[u8]) -> Result<Option<Bucket<'a>>, StoreError> {
        if name.is_empty() {
            return Ok(None);
        }
        let marker = self.child_marker_key(name);
        if self.ctx.raw_get(&marker)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.child(name)))
    }

    /// Create a nested bucket, failing if one already exists.
    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'a>, StoreError> {
        let tx = self.ctx.write_tx()?;
        if name.is_empty() {
            return Err(StoreError::BucketNameRequired);
        }
        if self.ctx.raw_get(&self.entry_key(name))?.is_some() {
            return Err(StoreError::IncompatibleValue);
        }
        let marker = self.child_marker_key(name);
        if self.ctx.raw_get(&marker)?.is_some() {
            return Err(StoreError::BucketExists);
        }
        tx.overlay.borrow_mut().insert(marker, Some(Vec::new()));
        Ok(self.child(name))
    }

    /// Create a nested bucket if it does not already exist.
    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'a>, StoreError> {
        match self.create_bucket(name) {
            Err(StoreError::BucketExists) => Ok(self.child(name)),
            other => other,
        }
    }

    /// Delete a nested bucket and, recursively, everything beneath it.
    pub fn delete_bucket(&self, name: &[u8]) -> Result<(), StoreError> {
        let tx = self.ctx.write_tx()?;
        if name.is_empty() {
            return Err(StoreError::BucketNameRequired);
        }
        let marker = self.child_marker_key(name);
        if self.ctx.raw_get(&marker)?.is_none() {
            return Err(StoreError::BucketNotFound);
        }
        let mut child_path = self.path.clone();
        child_path.extend_from_slice(&seg(name));
        delete_bucket_tree(tx, self.depth + 1, &child_path)
    }

    /// Get the value stored for `key`. Returns `None` if the key does not
    /// exist or names a nested bucket.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }
        self.ctx.raw_get(&self.entry_key(key))
    }

    /// Store a key/value pair, overwriting any existing value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let tx = self.ctx.write_tx()?;
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        if self.ctx.raw_get(&self.child_marker_key(key))?.is_some() {
            return Err(StoreError::IncompatibleValue);
        }
        tx.overlay
            .borrow_mut()
            .insert(self.entry_key(key), Some(value.to_vec()));
        Ok(())
    }

    /// Remove `key`. Removing a missing key is not an error; removing the
    /// name of a nested bucket is.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let tx = self.ctx.write_tx()?;
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        if self.ctx.raw_get(&self.child_marker_key(key))?.is_some() {
            return Err(StoreError::IncompatibleValue);
        }
        tx.overlay.borrow_mut().insert(self.entry_key(key), None);
        Ok(())
    }

    /// Iterate the bucket's direct contents: nested bucket names first, then
    /// key/value pairs, each in byte order.
    ///
    /// Inside a read transaction the sequence streams lazily from the
    /// snapshot; dropping it stops the scan. Inside a write transaction the
    /// contents are captured when `iter` is called, so the bucket may be
    /// mutated while iterating.
    pub fn iter(&self) -> BucketIter<'a> {
        match self.ctx {
            Ctx::Read(tx) => BucketIter {
                state: IterState::Lazy {
                    markers: PrefixScan::new(
                        tx.snapshot.iterator(IteratorMode::From(
                            &self.children_prefix(),
                            Direction::Forward,
                        )),
                        self.children_prefix(),
                    ),
                    entries: PrefixScan::new(
                        tx.snapshot.iterator(IteratorMode::From(
                            &self.entries_prefix(),
                            Direction::Forward,
                        )),
                        self.entries_prefix(),
                    ),
                    in_entries: false,
                },
            },
            Ctx::Write(tx) => {
                let collected = self.collect_write(tx);
                match collected {
                    Ok(items) => BucketIter {
                        state: IterState::Eager(items.into_iter()),
                    },
                    Err(e) => BucketIter {
                        state: IterState::Failed(Some(e)),
                    },
                }
            }
        }
    }

    fn collect_write(
        &self,
        tx: &WriteTx<'_>,
    ) -> Result<Vec<(Vec<u8>, BucketEntry)>, StoreError> {
        let mut items = Vec::new();
        let child_prefix = self.children_prefix();
        for (full, _) in tx.collect_prefix(&child_prefix)? {
            // Strip the prefix and the segment's length bytes.
            items.push((full[child_prefix.len() + 2..].to_vec(), BucketEntry::Bucket));
        }
        let entry_prefix = self.entries_prefix();
        for (full, value) in tx.collect_prefix(&entry_prefix)? {
            items.push((
                full[entry_prefix.len()..].to_vec(),
                BucketEntry::Value(value),
            ));
        }
        Ok(items)
    }

    fn child(&self, name: &[u8]) -> Bucket<'a> {
        let mut path = self.path.clone();
        path.extend_from_slice(&seg(name));
        Bucket {
            ctx: self.ctx,
            depth: self.depth + 1,
            path,
        }
    }

    fn entry_key(&self, key: &[u8]) -> Vec<u8> {
        let mut k = self.entries_prefix();
        k.extend_from_slice(key);
        k
    }

    fn entries_prefix(&self) -> Vec<u8> {
        let mut k = Vec::with_capacity(2 + self.path.len());
        k.push(TAG_ENTRY);
        k.push(self.depth);
        k.extend_from_slice(&self.path);
        k
    }

    fn children_prefix(&self) -> Vec<u8> {
        let mut k = Vec::with_capacity(2 + self.path.len());
        k.push(TAG_BUCKET);
        k.push(self.depth + 1);
        k.extend_from_slice(&self.path);
        k
    }

    fn child_marker_key(&self, name: &[u8]) -> Vec<u8> {
        let mut k = self.children_prefix();
        k.extend_from_slice(&seg(name));
        k
    }
}

fn delete_bucket_tree(tx: &WriteTx<'_>, depth: u8, path: &[u8]) -> Result<(), StoreError> {
    // Children first.
    let mut child_prefix = Vec::with_capacity(2 + path.len());
    child_prefix.push(TAG_BUCKET);
    child_prefix.push(depth + 1);
    child_prefix.extend_from_slice(path);
    for (full, _) in tx.collect_prefix(&child_prefix)? {
        // The remainder after the prefix is the child's length-prefixed
        // segment; append it whole to form the child path.
        let mut child_path = path.to_vec();
        child_path.extend_from_slice(&full[child_prefix.len()..]);
        delete_bucket_tree(tx, depth + 1, &child_path)?;
    }

    let mut entry_prefix = Vec::with_capacity(2 + path.len());
    entry_prefix.push(TAG_ENTRY);
    entry_prefix.push(depth);
    entry_prefix.extend_from_slice(path);
    let entries = tx.collect_prefix(&entry_prefix)?;
    let mut overlay = tx.overlay.borrow_mut();
    for (full, _) in entries {
        overlay.insert(full, None);
    }

    let mut marker = Vec::with_capacity(2 + path.len());
    marker.push(TAG_BUCKET);
    marker.push(depth);
    marker.extend_from_slice(path);
    overlay.insert(marker, None);
    Ok(())
}

fn seg(name: &[u8]) -> Vec<u8> {
    debug_assert!(name.len() <= u16::MAX as usize);
    let mut out = Vec::with_capacity(2 + name.len());
    out.extend_from_slice(&(name.len() as u16).to_be_bytes());
    out.extend_from_slice(name);
    out
}

/// Smallest key strictly greater than every key starting with `prefix`, or
/// `None` when the prefix is all 0xFF.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}

/// Iterator over one bucket's direct contents.
pub struct BucketIter<'a> {
    state: IterState<'a>,
}

enum IterState<'a> {
    Eager(std::vec::IntoIter<(Vec<u8>, BucketEntry)>),
    Failed(Option<StoreError>),
    Lazy {
        markers: PrefixScan<'a>,
        entries: PrefixScan<'a>,
        in_entries: bool,
    },
}

struct PrefixScan<'a> {
    iter: DBIteratorWithThreadMode<'a, DB>,
    prefix: Vec<u8>,
    done: bool,
}

impl<'a> PrefixScan<'a> {
    fn new(iter: DBIteratorWithThreadMode<'a, DB>, prefix: Vec<u8>) -> Self {
        Self {
            iter,
            prefix,
            done: false,
        }
    }

    fn next_pair(&mut self) -> Option<Result<(Vec<u8>, Vec<u8>), StoreError>> {
        if self.done {
            return None;
        }
        match self.iter.next() {
            None => {
                self.done = true;
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e.into()))
            }
            Some(Ok((k, v))) => {
                if !k.starts_with(&self.prefix) {
                    self.done = true;
                    return None;
                }
                Some(Ok((k.to_vec(), v.to_vec())))
            }
        }
    }
}

impl Iterator for BucketIter<'_> {
    type Item = Result<(Vec<u8>, BucketEntry), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            IterState::Eager(items) => items.next().map(Ok),
            IterState::Failed(err) => err.take().map(Err),
            IterState::Lazy {
                markers,
                entries,
                in_entries,
            } => {
                if !*in_entries {
                    match markers.next_pair() {
                        Some(Err(e)) => return Some(Err(e)),
                        Some(Ok((full, _))) => {
                            let name = full[markers.prefix.len() + 2..].to_vec();
                            return Some(Ok((name, BucketEntry::Bucket)));
                        }
                        None => *in_entries = true,
                    }
                }
                match entries.next_pair() {
                    Some(Err(e)) => Some(Err(e)),
                    Some(Ok((full, value))) => {
                        let key = full[entries.prefix.len()..].to_vec();
                        Some(Ok((key, BucketEntry::Value(value))))
                    }
                    None => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (KvStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("kv")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_roundtrip() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.create_bucket(b"main")?;
                bucket.put(b"alpha", b"one")?;
                bucket.put(b"beta", b"two")?;
                Ok(())
            })
            .unwrap();

        store
            .view::<_, StoreError, _>(|tx| {
                let bucket = tx.bucket(b"main")?.unwrap();
                assert_eq!(bucket.get(b"alpha")?.unwrap(), b"one");
                assert_eq!(bucket.get(b"beta")?.unwrap(), b"two");
                assert_eq!(bucket.get(b"gamma")?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn missing_bucket_is_none() {
        let (store, _dir) = temp_store();
        store
            .view::<_, StoreError, _>(|tx| {
                assert!(tx.bucket(b"nope")?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn create_bucket_twice_fails() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.create_bucket(b"dup")?;
                assert_eq!(
                    tx.create_bucket(b"dup").unwrap_err(),
                    StoreError::BucketExists
                );
                tx.create_bucket_if_not_exists(b"dup")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn nested_buckets_do_not_leak_into_parent() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let outer = tx.create_bucket(b"outer")?;
                outer.put(b"k", b"outer-value")?;
                let inner = outer.create_bucket(b"inner")?;
                inner.put(b"k", b"inner-value")?;
                Ok(())
            })
            .unwrap();

        store
            .view::<_, StoreError, _>(|tx| {
                let outer = tx.bucket(b"outer")?.unwrap();
                assert_eq!(outer.get(b"k")?.unwrap(), b"outer-value");
                let inner = outer.bucket(b"inner")?.unwrap();
                assert_eq!(inner.get(b"k")?.unwrap(), b"inner-value");

                // Iterating the parent sees one child bucket and one value.
                let items: Vec<_> = outer.iter().collect::<Result<_, _>>()?;
                assert_eq!(
                    items,
                    vec![
                        (b"inner".to_vec(), BucketEntry::Bucket),
                        (b"k".to_vec(), BucketEntry::Value(b"outer-value".to_vec())),
                    ]
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn sibling_prefix_names_do_not_collide() {
        // "ab"/"c" and "ab"/"cd" must be distinct buckets.
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let ab = tx.create_bucket(b"ab")?;
                ab.create_bucket(b"c")?.put(b"x", b"1")?;
                ab.create_bucket(b"cd")?.put(b"x", b"2")?;
                Ok(())
            })
            .unwrap();

        store
            .view::<_, StoreError, _>(|tx| {
                let ab = tx.bucket(b"ab")?.unwrap();
                assert_eq!(ab.bucket(b"c")?.unwrap().get(b"x")?.unwrap(), b"1");
                assert_eq!(ab.bucket(b"cd")?.unwrap().get(b"x")?.unwrap(), b"2");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn rollback_discards_staged_changes() {
        let (store, _dir) = temp_store();
        let tx = store.begin_write_tx();
        tx.create_bucket(b"gone").unwrap();
        tx.rollback();

        store
            .view::<_, StoreError, _>(|tx| {
                assert!(tx.bucket(b"gone")?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn update_rolls_back_on_error() {
        let (store, _dir) = temp_store();
        let result: Result<(), StoreError> = store.update(|tx| {
            tx.create_bucket(b"half")?;
            Err(StoreError::KeyRequired)
        });
        assert!(result.is_err());

        store
            .view::<_, StoreError, _>(|tx| {
                assert!(tx.bucket(b"half")?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn read_tx_is_snapshot_isolated() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.create_bucket(b"b")?.put(b"k", b"before")?;
                Ok(())
            })
            .unwrap();

        let read = store.begin_read_tx();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.bucket(b"b")?.unwrap().put(b"k", b"after")?;
                Ok(())
            })
            .unwrap();

        let bucket = read.bucket(b"b").unwrap().unwrap();
        assert_eq!(bucket.get(b"k").unwrap().unwrap(), b"before");
    }

    #[test]
    fn write_tx_reads_its_own_writes() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.create_bucket(b"b")?;
                bucket.put(b"k", b"v")?;
                assert_eq!(bucket.get(b"k")?.unwrap(), b"v");
                bucket.delete(b"k")?;
                assert_eq!(bucket.get(b"k")?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.create_bucket(b"b")?.delete(b"missing")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn key_and_bucket_names_are_incompatible() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.create_bucket(b"b")?;
                bucket.put(b"taken", b"v")?;
                assert_eq!(
                    bucket.create_bucket(b"taken").unwrap_err(),
                    StoreError::IncompatibleValue
                );
                bucket.create_bucket(b"nested")?;
                assert_eq!(
                    bucket.put(b"nested", b"v").unwrap_err(),
                    StoreError::IncompatibleValue
                );
                assert_eq!(
                    bucket.delete(b"nested").unwrap_err(),
                    StoreError::IncompatibleValue
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_bucket_removes_entire_tree() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let top = tx.create_bucket(b"top")?;
                top.put(b"k", b"v")?;
                let mid = top.create_bucket(b"mid")?;
                mid.put(b"k", b"v")?;
                mid.create_bucket(b"leaf")?.put(b"k", b"v")?;
                Ok(())
            })
            .unwrap();

        store
            .update::<_, StoreError, _>(|tx| {
                tx.delete_bucket(b"top")?;
                Ok(())
            })
            .unwrap();

        store
            .view::<_, StoreError, _>(|tx| {
                assert!(tx.bucket(b"top")?.is_none());
                Ok(())
            })
            .unwrap();

        // Deleting again reports the bucket missing.
        let err = store
            .update::<_, StoreError, _>(|tx| tx.delete_bucket(b"top"))
            .unwrap_err();
        assert_eq!(err, StoreError::BucketNotFound);
    }

    #[test]
    fn read_transaction_rejects_writes() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.create_bucket(b"b")?;
                Ok(())
            })
            .unwrap();

        let read = store.begin_read_tx();
        let bucket = read.bucket(b"b").unwrap().unwrap();
        assert_eq!(bucket.put(b"k", b"v").unwrap_err(), StoreError::TxNotWritable);
        assert_eq!(bucket.delete(b"k").unwrap_err(), StoreError::TxNotWritable);
        assert_eq!(
            bucket.create_bucket(b"c").unwrap_err(),
            StoreError::TxNotWritable
        );
    }

    #[test]
    fn iteration_in_write_tx_sees_staged_state() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.create_bucket(b"b")?;
                bucket.put(b"committed", b"1")?;
                Ok(())
            })
            .unwrap();

        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.bucket(b"b")?.unwrap();
                bucket.put(b"staged", b"2")?;
                bucket.delete(b"committed")?;
                let items: Vec<_> = bucket.iter().collect::<Result<_, _>>()?;
                assert_eq!(
                    items,
                    vec![(b"staged".to_vec(), BucketEntry::Value(b"2".to_vec()))]
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn iteration_is_in_key_order() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                let bucket = tx.create_bucket(b"b")?;
                bucket.put(b"c", b"3")?;
                bucket.put(b"a", b"1")?;
                bucket.put(b"b", b"2")?;
                Ok(())
            })
            .unwrap();

        store
            .view::<_, StoreError, _>(|tx| {
                let keys: Vec<Vec<u8>> = tx
                    .bucket(b"b")?
                    .unwrap()
                    .iter()
                    .map(|item| item.map(|(k, _)| k))
                    .collect::<Result<_, _>>()?;
                assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn empty_values_are_preserved() {
        let (store, _dir) = temp_store();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.create_bucket(b"b")?.put(b"marker", b"")?;
                Ok(())
            })
            .unwrap();
        store
            .view::<_, StoreError, _>(|tx| {
                assert_eq!(tx.bucket(b"b")?.unwrap().get(b"marker")?, Some(Vec::new()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv");
        {
            let store = KvStore::open(&path).unwrap();
            store
                .update::<_, StoreError, _>(|tx| {
                    tx.create_bucket(b"b")?.put(b"k", b"v")?;
                    Ok(())
                })
                .unwrap();
        }
        let store = KvStore::open(&path).unwrap();
        store
            .view::<_, StoreError, _>(|tx| {
                assert_eq!(tx.bucket(b"b")?.unwrap().get(b"k")?.unwrap(), b"v");
                Ok(())
            })
            .unwrap();
    }
}
