//! Flat-file plumbing shared by the header stores.
//!
//! A header file is a concatenation of fixed-width records in chain order:
//! the record for height `h` lives at offset `(h - 1) * stride`. Height 0 is
//! implicit and never stored.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::HeaderStoreError;

pub(crate) struct HeaderFile {
    path: PathBuf,
    stride: u64,
    /// `None` only transiently while a Windows truncate has the handle
    /// closed.
    file: Mutex<Option<File>>,
}

impl HeaderFile {
    pub(crate) fn open(path: &Path, stride: u64) -> Result<Self, HeaderStoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        // A torn append can leave a trailing partial record; the owning
        // store's recovery pass truncates back to the index tip, so no
        // alignment check happens here.
        Ok(Self {
            path: path.to_path_buf(),
            stride,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(
        &self,
        f: impl FnOnce(&mut File) -> std::io::Result<T>,
    ) -> Result<T, HeaderStoreError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(|| {
            std::io::Error::other(format!(
                "handle for {} lost during truncate",
                self.path.display()
            ))
        })?;
        Ok(f(file)?)
    }

    pub(crate) fn len(&self) -> Result<u64, HeaderStoreError> {
        self.with_file(|f| f.metadata().map(|m| m.len()))
    }

    /// Number of whole records currently in the file, which equals the
    /// height of the last stored record.
    pub(crate) fn record_count(&self) -> Result<u64, HeaderStoreError> {
        Ok(self.len()? / self.stride)
    }

    /// Append raw record bytes to the end of the file.
    pub(crate) fn append(&self, bytes: &[u8]) -> Result<(), HeaderStoreError> {
        debug_assert_eq!(bytes.len() as u64 % self.stride, 0);
        self.with_file(|f| {
            f.seek(SeekFrom::End(0))?;
            f.write_all(bytes)?;
            f.flush()
        })
    }

    /// Read the single record stored at `height` (>= 1).
    pub(crate) fn read_record(&self, height: u32) -> Result<Vec<u8>, HeaderStoreError> {
        self.read_records(height, 1)
    }

    /// Bulk-read `count` consecutive records starting at `start_height`.
    pub(crate) fn read_records(
        &self,
        start_height: u32,
        count: u32,
    ) -> Result<Vec<u8>, HeaderStoreError> {
        debug_assert!(start_height >= 1);
        let offset = (start_height as u64 - 1) * self.stride;
        let mut buf = vec![0u8; (count as u64 * self.stride) as usize];
        self.with_file(|f| {
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(&mut buf)
        })?;
        Ok(buf)
    }

    /// Remove the last record from the file.
    pub(crate) fn truncate_one(&self) -> Result<(), HeaderStoreError> {
        let len = self.len()?;
        if len < self.stride {
            return Err(HeaderStoreError::RollbackGenesis);
        }
        self.truncate_len(len - self.stride)
    }

    /// Shrink the file to hold exactly `records` records.
    pub(crate) fn truncate_to(&self, records: u64) -> Result<(), HeaderStoreError> {
        self.truncate_len(records * self.stride)
    }

    #[cfg(not(windows))]
    fn truncate_len(&self, new_len: u64) -> Result<(), HeaderStoreError> {
        self.with_file(|f| f.set_len(new_len))
    }

    // Windows refuses to truncate a file that is held open, so the handle is
    // closed, the file truncated by path, and the handle reopened. Both paths
    // produce the same bytes on disk.
    #[cfg(windows)]
    fn truncate_len(&self, new_len: u64) -> Result<(), HeaderStoreError> {
        let mut guard = self.file.lock();
        drop(guard.take());
        {
            let f = OpenOptions::new().write(true).open(&self.path)?;
            f.set_len(new_len)?;
        }
        *guard = Some(
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)?,
        );
        Ok(())
    }
}
