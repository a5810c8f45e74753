//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// Writes are positional (`seek` + `write_all`) against a single open
/// handle; the tracked size is kept in memory so `read_at` bounds checks
/// never touch the filesystem.
///
/// # Durability
///
/// - `flush()` pushes buffered data to the OS
/// - `sync()` calls `File::sync_all()` for crash durability
/// - `replace()` writes `<path>.tmp` and renames it over `<path>`, then
///   reopens the handle (the inode changed)
///
/// # Thread safety
///
/// Reads lock the handle only for the duration of the seek+read pair, so
/// concurrent readers are safe alongside a writer.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Opens or creates a file backend, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        let end = offset + data.len() as u64;
        if end > *size {
            *size = end;
        }

        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        *size = new_size;

        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        // The rename swapped inodes; the old handle still points at the
        // unlinked file.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;

        *self.file.write() = file;
        *self.size.write() = data.len() as u64;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn write_and_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();

        backend.write_at(0, b"hello world").unwrap();
        assert_eq!(backend.size().unwrap(), 11);

        let data = backend.read_at(6, 5).unwrap();
        assert_eq!(&data, b"world");
    }

    #[test]
    fn overwrite_in_place() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();

        backend.write_at(0, b"hello world").unwrap();
        backend.write_at(6, b"earth").unwrap();

        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello earth");
    }

    #[test]
    fn write_past_end_extends() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();

        backend.write_at(4, b"data").unwrap();
        assert_eq!(backend.size().unwrap(), 8);
        // The gap reads back as zeros.
        assert_eq!(backend.read_at(0, 4).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();
        backend.write_at(0, b"hello").unwrap();

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn truncate_shrinks() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();
        backend.write_at(0, b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert!(backend.read_at(5, 1).is_err());
    }

    #[test]
    fn truncate_beyond_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();
        backend.write_at(0, b"abc").unwrap();

        let result = backend.truncate(100);
        assert!(matches!(result, Err(StorageError::TruncateBeyondEnd { .. })));
    }

    #[test]
    fn replace_swaps_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.write_at(0, b"old contents here").unwrap();

        backend.replace(b"new").unwrap();

        assert_eq!(backend.size().unwrap(), 3);
        assert_eq!(backend.read_at(0, 3).unwrap(), b"new");
        assert!(!dir.path().join("test.bin.tmp").exists());

        // The new handle is live for further writes.
        backend.write_at(3, b"er").unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"newer");
    }

    #[test]
    fn persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.write_at(0, b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(0, 15).unwrap(), b"persistent data");
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("test.bin");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }
}
