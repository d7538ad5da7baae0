//! Single-file journal backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in one file.
///
/// Appends go to the end of the file. `sync` calls `File::sync_all`.
/// `replace` writes the new image to `<path>.compact`, syncs it and renames
/// it over the journal, so a crash mid-compaction leaves the old journal
/// intact.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens the journal at `path`, creating it (and its parent directories)
    /// if it does not exist.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = Self::open_file(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(path: &Path) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    fn compact_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".compact");
        PathBuf::from(name)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.size;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }

        // Writing at the logical end overwrites any bytes left by an earlier
        // failed append.
        let written = state
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| state.file.write_all(data))
            .and_then(|()| state.file.flush());
        if let Err(e) = written {
            // If this fails too, the next append still overwrites from `offset`.
            let _ = state.file.set_len(offset);
            return Err(e.into());
        }
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.inner.get_mut();
        if new_size > state.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.size,
            });
        }

        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let tmp_path = self.compact_path();
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = Self::open_file(&self.path)?;
        let state = self.inner.get_mut();
        state.file = file;
        state.size = data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file_and_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("journal.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn append_then_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j.log")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
        assert_eq!(backend.read_all().unwrap(), b"hello world");
        assert!(matches!(
            backend.read_at(8, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"durable").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"durable");
    }

    #[test]
    fn truncate_cuts_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"keepdrop").unwrap();

        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"keep");
        assert_eq!(fs::metadata(&path).unwrap().len(), 4);
        assert!(backend.truncate(40).is_err());
    }

    #[test]
    fn replace_is_visible_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"frame-a").unwrap();
            backend.append(b"frame-b").unwrap();
            backend.replace(b"checkpoint").unwrap();
            backend.append(b"+tail").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"checkpoint+tail");
        assert!(!dir.path().join("j.log.compact").exists());
    }
}
