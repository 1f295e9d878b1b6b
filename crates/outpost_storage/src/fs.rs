//! Filesystem contract.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Metadata for one filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes.
    pub len: u64,
    /// Modification time in milliseconds since the epoch.
    pub modified_ms: i64,
}

/// Access to the local file tree.
///
/// # Implementors
///
/// - [`super::LocalFileSystem`]
pub trait FileSystem: Send + Sync {
    /// Returns true if the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Returns true if the path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Metadata for the path.
    fn stat(&self, path: &Path) -> StorageResult<FileStat>;

    /// Names of the entries in a directory, sorted.
    fn ls(&self, path: &Path) -> StorageResult<Vec<String>>;

    /// Creates a directory and all missing parents.
    fn mkdirs(&self, path: &Path) -> StorageResult<()>;

    /// Creates an empty file if none exists.
    fn create_file(&self, path: &Path) -> StorageResult<()>;

    /// Reads a whole file.
    fn read_bytes(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Replaces a file's content.
    fn write_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Removes a file or an empty directory.
    fn remove(&self, path: &Path) -> StorageResult<()>;
}

/// [`FileSystem`] over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates the filesystem accessor.
    pub fn new() -> Self {
        Self
    }
}

fn not_found(path: &Path, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_path_buf())
    } else {
        StorageError::Io(err)
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn stat(&self, path: &Path) -> StorageResult<FileStat> {
        let meta = fs::metadata(path).map_err(|e| not_found(path, e))?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Ok(FileStat {
            is_dir: meta.is_dir(),
            len: meta.len(),
            modified_ms,
        })
    }

    fn ls(&self, path: &Path) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| not_found(path, e))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn mkdirs(&self, path: &Path) -> StorageResult<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn create_file(&self, path: &Path) -> StorageResult<()> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(())
    }

    fn read_bytes(&self, path: &Path) -> StorageResult<Vec<u8>> {
        fs::read(path).map_err(|e| not_found(path, e))
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        Ok(fs::write(path, data)?)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        if path.is_dir() {
            fs::remove_dir(path).map_err(|e| not_found(path, e))
        } else {
            fs::remove_file(path).map_err(|e| not_found(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_stat_and_list() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let sub = dir.path().join("a").join("b");
        fs.mkdirs(&sub).unwrap();
        fs.write_bytes(&sub.join("f.txt"), b"hello").unwrap();
        fs.create_file(&sub.join("e.txt")).unwrap();

        assert_eq!(fs.ls(&sub).unwrap(), vec!["e.txt", "f.txt"]);
        let stat = fs.stat(&sub.join("f.txt")).unwrap();
        assert_eq!(stat.len, 5);
        assert!(!stat.is_dir);
        assert!(stat.modified_ms > 0);
        assert!(fs.stat(&sub).unwrap().is_dir);
    }

    #[test]
    fn create_file_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let path = dir.path().join("keep.bin");
        fs.write_bytes(&path, &[1, 2, 3]).unwrap();
        fs.create_file(&path).unwrap();
        assert_eq!(fs.read_bytes(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_refuses_non_empty_directory() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let sub = dir.path().join("d");
        fs.mkdirs(&sub).unwrap();
        fs.write_bytes(&sub.join("x"), b"x").unwrap();
        assert!(fs.remove(&sub).is_err());
        fs.remove(&sub.join("x")).unwrap();
        fs.remove(&sub).unwrap();
        assert!(!fs.exists(&sub));
    }

    #[test]
    fn missing_paths_report_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        assert!(matches!(
            fs.stat(&dir.path().join("nope")),
            Err(StorageError::NotFound(_))
        ));
    }
}
