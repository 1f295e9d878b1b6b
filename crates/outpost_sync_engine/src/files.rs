//! Synchronized folder scanning.
//!
//! A scan walks the folder's tree with an explicit worklist, diffs it
//! against the recorded [`FileRecord`]s and persists every difference as
//! soon as it is found, so an interrupted scan loses nothing.

use crate::catalog::{Catalog, FolderState};
use crate::error::{SyncError, SyncResult};
use outpost_storage::{FileStat, FileSystem};
use outpost_sync_protocol::{ChangeType, FileRecord, FolderDef};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Path filter of a folder: a file is transmitted only if its relative
/// path starts with one of the prefixes and ends with one of the suffixes.
/// An empty list matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
}

impl FileFilter {
    /// Builds a filter from comma separated lists.
    pub fn new(prefixes: Option<&str>, suffixes: Option<&str>) -> Self {
        Self {
            prefixes: split_patterns(prefixes),
            suffixes: split_patterns(suffixes),
        }
    }

    /// The filter configured on a folder definition.
    pub fn for_folder(def: &FolderDef) -> Self {
        Self::new(
            def.file_path_starts_with.as_deref(),
            def.file_name_ends_with.as_deref(),
        )
    }

    /// Returns true if the relative path passes both lists.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.prefixes.is_empty() || self.prefixes.iter().any(|p| path.starts_with(p));
        let suffix = self.suffixes.is_empty() || self.suffixes.iter().any(|s| path.ends_with(s));
        prefix && suffix
    }
}

fn split_patterns(list: Option<&str>) -> Vec<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Joins a relative path onto `root`, refusing anything that could escape
/// it (absolute paths, `..`, drive prefixes).
pub fn resolve_relative(root: &Path, relative: &str) -> SyncResult<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => {
                return Err(SyncError::Rejected(format!(
                    "path escapes its folder: {relative}"
                )))
            }
        }
    }
    Ok(path)
}

/// Local root of a folder under `files_dir`.
pub fn folder_root(files_dir: &Path, def: &FolderDef) -> SyncResult<PathBuf> {
    let relative = if def.client_folder_path.trim().is_empty() {
        def.name.as_str()
    } else {
        def.client_folder_path.as_str()
    };
    resolve_relative(files_dir, relative)
}

fn changed(record: &FileRecord, stat: &FileStat) -> bool {
    record.length != stat.len
        || record.is_directory != stat.is_dir
        || record.last_modified.div_euclid(1000) != stat.modified_ms.div_euclid(1000)
}

/// Diffs a folder's tree against its records and persists the result.
///
/// Returns the records as they stand after the scan. Empty files and
/// directories are ignored: they create nothing, yet an existing record
/// for one is kept.
pub fn scan_folder(
    fs: &dyn FileSystem,
    catalog: &Catalog<'_>,
    folder: &FolderState,
    root: &Path,
) -> SyncResult<BTreeMap<String, FileRecord>> {
    let folder_id = folder.def.id;
    let mut records = catalog.files(folder_id)?;
    if !fs.exists(root) {
        fs.mkdirs(root)?;
    }
    if !fs.is_dir(root) {
        warn!(folder = %folder.def.name, path = %root.display(), "folder root is not a directory");
        return Ok(records);
    }

    let mut seen = BTreeSet::new();
    let mut worklist = vec![String::new()];
    while let Some(dir) = worklist.pop() {
        let dir_path = resolve_relative(root, &dir)?;
        for name in fs.ls(&dir_path)? {
            let relative = if dir.is_empty() {
                name.clone()
            } else {
                format!("{dir}/{name}")
            };
            let full = dir_path.join(&name);
            let stat = fs.stat(&full)?;

            let empty = if stat.is_dir {
                fs.ls(&full)?.is_empty()
            } else {
                stat.len == 0
            };
            if empty {
                warn!(path = %full.display(), "ignoring empty entry");
                seen.insert(relative);
                continue;
            }
            if stat.is_dir && folder.def.recursive {
                worklist.push(relative.clone());
            }
            seen.insert(relative.clone());

            match records.get_mut(&relative) {
                None => {
                    debug!(file = %relative, "new file");
                    let record = FileRecord {
                        file_name: relative.clone(),
                        is_directory: stat.is_dir,
                        length: stat.len,
                        last_modified: stat.modified_ms,
                        file_cn: -1,
                        file_ct: ChangeType::Insert,
                    };
                    catalog.put_file(folder_id, &record)?;
                    records.insert(relative, record);
                }
                Some(record) if changed(record, &stat) || record.file_ct == ChangeType::Delete => {
                    debug!(file = %relative, "file updated");
                    record.is_directory = stat.is_dir;
                    record.length = stat.len;
                    record.last_modified = stat.modified_ms;
                    if record.file_ct != ChangeType::Insert {
                        record.file_ct = ChangeType::Update;
                    }
                    catalog.put_file(folder_id, record)?;
                }
                Some(_) => {}
            }
        }
    }

    let vanished: Vec<String> = records
        .keys()
        .filter(|name| !seen.contains(*name))
        .cloned()
        .collect();
    for name in vanished {
        let Some(record) = records.get_mut(&name) else {
            continue;
        };
        if record.file_ct != ChangeType::Delete {
            debug!(file = %name, "file deleted");
            record.file_ct = ChangeType::Delete;
            catalog.put_file(folder_id, record)?;
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_storage::{LocalFileSystem, SqliteStore};
    use outpost_sync_protocol::FolderSub;
    use std::fs;
    use tempfile::TempDir;

    fn folder(recursive: bool) -> FolderState {
        let def = FolderDef {
            id: 7,
            name: "docs".into(),
            client_folder_path: "docs".into(),
            recursive,
            allow_check_in: true,
            allow_refresh: true,
            ..FolderDef::default()
        };
        FolderState {
            sub: FolderSub {
                sync_folder_id: 7,
                file_cn: 0,
                ..FolderSub::default()
            },
            def,
        }
    }

    fn setup(recursive: bool) -> (TempDir, SqliteStore, FolderState, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory("admin").unwrap();
        let folder = folder(recursive);
        {
            let catalog = Catalog::new(&store);
            catalog.provision().unwrap();
            catalog.upsert_folder(&folder.def, 0, 1).unwrap();
        }
        let root = folder_root(dir.path(), &folder.def).unwrap();
        (dir, store, folder, root)
    }

    #[test]
    fn filter_lists() {
        let filter = FileFilter::new(None, Some(".txt, .md,"));
        assert!(filter.matches("a.txt"));
        assert!(filter.matches("sub/b.md"));
        assert!(!filter.matches("b.log"));

        let filter = FileFilter::new(Some("in/"), Some(""));
        assert!(filter.matches("in/x.bin"));
        assert!(!filter.matches("out/x.bin"));
        assert!(FileFilter::default().matches("anything"));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/data/files");
        assert_eq!(
            resolve_relative(root, "a/./b.txt").unwrap(),
            PathBuf::from("/data/files/a/b.txt")
        );
        assert!(resolve_relative(root, "../etc/passwd").is_err());
        assert!(resolve_relative(root, "/etc/passwd").is_err());
    }

    #[test]
    fn scan_records_new_files_and_ignores_empty_entries() {
        let (_dir, store, folder, root) = setup(true);
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join("void")).unwrap();
        fs::write(root.join("a.txt"), b"0123456789").unwrap();
        fs::write(root.join("empty.txt"), b"").unwrap();
        fs::write(root.join("sub/b.log"), b"12345").unwrap();

        let catalog = Catalog::new(&store);
        let records = scan_folder(&LocalFileSystem::new(), &catalog, &folder, &root).unwrap();
        let names: Vec<_> = records.keys().cloned().collect();
        assert_eq!(names, ["a.txt", "sub", "sub/b.log"]);
        assert_eq!(records["a.txt"].length, 10);
        assert_eq!(records["a.txt"].file_ct, ChangeType::Insert);
        assert!(records["sub"].is_directory);
        assert_eq!(catalog.files(7).unwrap(), records);
    }

    #[test]
    fn non_recursive_scan_stays_at_the_top() {
        let (_dir, store, folder, root) = setup(false);
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/b.log"), b"12345").unwrap();

        let catalog = Catalog::new(&store);
        let records = scan_folder(&LocalFileSystem::new(), &catalog, &folder, &root).unwrap();
        assert!(records.contains_key("sub"));
        assert!(!records.contains_key("sub/b.log"));
    }

    #[test]
    fn scan_detects_updates_and_deletes() {
        let (_dir, store, folder, root) = setup(true);
        fs::create_dir_all(&root).unwrap();
        let catalog = Catalog::new(&store);
        for (name, ct) in [("keep.txt", ChangeType::Synced), ("gone.txt", ChangeType::Synced), ("new.txt", ChangeType::Insert)] {
            catalog
                .put_file(
                    7,
                    &FileRecord {
                        file_name: name.into(),
                        length: 3,
                        file_ct: ct,
                        ..FileRecord::default()
                    },
                )
                .unwrap();
        }
        fs::write(root.join("keep.txt"), b"longer now").unwrap();

        let records = scan_folder(&LocalFileSystem::new(), &catalog, &folder, &root).unwrap();
        assert_eq!(records["keep.txt"].file_ct, ChangeType::Update);
        assert_eq!(records["keep.txt"].length, 10);
        assert_eq!(records["gone.txt"].file_ct, ChangeType::Delete);
        assert_eq!(records["new.txt"].file_ct, ChangeType::Delete);
        assert_eq!(catalog.files(7).unwrap(), records);
    }

    #[test]
    fn emptied_file_is_not_deleted() {
        let (_dir, store, folder, root) = setup(true);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"").unwrap();
        let catalog = Catalog::new(&store);
        catalog
            .put_file(
                7,
                &FileRecord {
                    file_name: "a.txt".into(),
                    length: 4,
                    file_ct: ChangeType::Synced,
                    ..FileRecord::default()
                },
            )
            .unwrap();
        let records = scan_folder(&LocalFileSystem::new(), &catalog, &folder, &root).unwrap();
        assert_eq!(records["a.txt"].file_ct, ChangeType::Synced);
    }
}
