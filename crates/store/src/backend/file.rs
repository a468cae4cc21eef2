//! File-based storage backend using position-based I/O (`pread`/`pwrite`).
//!
//! Block reads go through [`std::os::unix::fs::FileExt`] and never touch the
//! file cursor. Writes and file extension are serialized via a
//! [`parking_lot::Mutex`] guard. The sidecar index is small and rewritten as
//! a whole: it is written to a temporary sibling, synced and renamed over the
//! previous version.

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::BlockBackend;
use crate::error::{BlockId, Error, Result};

/// File-based storage backend.
///
/// Durability of block data requires the caller to invoke
/// [`sync`](BlockBackend::sync); blocks are not guaranteed on disk until
/// `fsync` completes.
pub struct FileBackend {
    /// The data file handle.
    file: File,
    /// Serializes writes and file extension operations.
    write_lock: Mutex<()>,
    /// Path of the sidecar index file.
    index_path: PathBuf,
    /// Block size in bytes.
    block_size: usize,
}

impl FileBackend {
    /// Opens an existing table consisting of `data_path` and `index_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file is missing or cannot be opened.
    pub fn open(
        data_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        block_size: usize,
    ) -> Result<Self> {
        // The sidecar must exist: a table without index is not a table.
        fs::metadata(index_path.as_ref())?;
        let file = OpenOptions::new().read(true).write(true).open(data_path.as_ref())?;

        Ok(Self {
            file,
            write_lock: Mutex::new(()),
            index_path: index_path.as_ref().to_path_buf(),
            block_size,
        })
    }

    /// Creates (or truncates) the data file of a new table.
    ///
    /// The sidecar index is not written here; the caller persists the
    /// initial index through [`write_index`](BlockBackend::write_index).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the data file cannot be created.
    pub fn create(
        data_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        block_size: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(data_path.as_ref())?;
        file.sync_all()?;

        Ok(Self {
            file,
            write_lock: Mutex::new(()),
            index_path: index_path.as_ref().to_path_buf(),
            block_size,
        })
    }

    /// Returns the current data file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the metadata query fails.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Returns the path of the sidecar index file.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

impl BlockBackend for FileBackend {
    fn read_index(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.index_path)?)
    }

    fn write_index(&self, bytes: &[u8]) -> Result<()> {
        let mut tmp_name = self.index_path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.index_path)?;
        Ok(())
    }

    fn read_block(&self, block: BlockId) -> Result<Vec<u8>> {
        let offset = self.block_offset(block);

        let file_len = self.file.metadata()?.len();
        if offset >= file_len {
            // Allocated but never written; reads as zeros.
            return Ok(vec![0u8; self.block_size]);
        }
        if offset + self.block_size as u64 > file_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("block {block} cut off at data file length {file_len}"),
            )
            .into());
        }

        let mut buf = vec![0u8; self.block_size];
        read_exact_at_offset(&self.file, &mut buf, offset)?;
        Ok(buf)
    }

    fn write_block(&self, block: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(Error::Corrupted {
                reason: format!(
                    "Invalid block data size: {} (expected {})",
                    data.len(),
                    self.block_size
                ),
            });
        }

        let offset = self.block_offset(block);

        let _guard = self.write_lock.lock();

        let file_len = self.file.metadata()?.len();
        let required_len = offset + self.block_size as u64;
        if file_len < required_len {
            self.file.set_len(required_len)?;
        }

        write_all_at_offset(&self.file, data, offset)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

// ---------------------------------------------------------------------------
// Platform-specific position-based I/O helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset)?;
    Ok(())
}

/// `seek_read` moves the file cursor; callers hold the store lock.
#[cfg(windows)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of file during seek_read",
            )
            .into());
        }
        pos += n;
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    file.write_all_at(data, offset)?;
    Ok(())
}

#[cfg(windows)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let n = file.seek_write(&data[pos..], offset + pos as u64)?;
        pos += n;
    }
    Ok(())
}
