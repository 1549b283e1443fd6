//! File-backed byte store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte store kept in a single file.
///
/// The file is locked exclusively for as long as the backend is open, so
/// two processes cannot append to the same journal.
///
/// # Durability
///
/// - `flush()` hands buffered bytes to the OS
/// - `sync()` calls `File::sync_all()`
///
/// ```no_run
/// use dboe_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.jrnl")).unwrap();
/// backend.append(b"entry").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<Option<OpenFile>>,
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path` and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the file,
    /// or an I/O error if it cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Some(OpenFile { file, size })),
        })
    }

    /// Like [`FileBackend::open`], creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut OpenFile) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = self.inner.lock();
        let open = guard.as_mut().ok_or(StorageError::Closed)?;
        f(open)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.with_file(|open| {
            let end = offset.saturating_add(len as u64);
            if end > open.size {
                return Err(StorageError::ReadPastEnd {
                    offset,
                    len,
                    size: open.size,
                });
            }
            let mut buffer = vec![0u8; len];
            if len > 0 {
                open.file.seek(SeekFrom::Start(offset))?;
                open.file.read_exact(&mut buffer)?;
            }
            Ok(buffer)
        })
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.with_file(|open| {
            let offset = open.size;
            if data.is_empty() {
                return Ok(offset);
            }
            open.file.seek(SeekFrom::Start(offset))?;
            open.file.write_all(data)?;
            open.size += data.len() as u64;
            Ok(offset)
        })
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.with_file(|open| Ok(open.file.flush()?))
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.with_file(|open| Ok(open.file.sync_all()?))
    }

    fn size(&self) -> StorageResult<u64> {
        self.with_file(|open| Ok(open.size))
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.with_file(|open| {
            if new_size > open.size {
                return Err(StorageError::TruncateBeyondEnd {
                    requested: new_size,
                    size: open.size,
                });
            }
            open.file.set_len(new_size)?;
            open.file.sync_all()?;
            open.size = new_size;
            Ok(())
        })
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(open) = self.inner.lock().take() {
            open.file.sync_all()?;
            FileExt::unlock(&open.file)?;
        }
        Ok(())
    }
}
