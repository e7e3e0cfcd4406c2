//! Filesystem host abstraction.
//!
//! Everything above this module talks to disk through [`FileSystem`], so the
//! orchestrator runs unchanged against [`RealFileSystem`] or the in-memory
//! [`MemoryFileSystem`] used by tests.

use rustc_hash::{FxHashMap, FxHashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::paths::normalize_path;

const BYTE_ORDER_MARK: &str = "\u{feff}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<String>;
    fn write_file(&self, path: &Path, contents: &str, write_byte_order_mark: bool)
        -> io::Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
    fn directory_exists(&self, path: &Path) -> bool;
    fn create_directory(&self, path: &Path) -> io::Result<()>;
    fn delete_file(&self, path: &Path) -> io::Result<()>;
    fn modified_time(&self, path: &Path) -> Option<SystemTime>;
    fn set_modified_time(&self, path: &Path, time: SystemTime) -> io::Result<()>;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Current time as seen by this host
    fn now(&self) -> SystemTime;
}

/// Host backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        let text = std::fs::read_to_string(path)?;
        Ok(text
            .strip_prefix(BYTE_ORDER_MARK)
            .map(str::to_string)
            .unwrap_or(text))
    }

    fn write_file(
        &self,
        path: &Path,
        contents: &str,
        write_byte_order_mark: bool,
    ) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if write_byte_order_mark {
            std::fs::write(path, format!("{}{}", BYTE_ORDER_MARK, contents))
        } else {
            std::fs::write(path, contents)
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_directory(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn modified_time(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn set_modified_time(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_modified(time)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                path: entry.path(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: FxHashMap<PathBuf, MemoryFile>,
    directories: FxHashSet<PathBuf>,
    /// Logical clock in seconds; every mutation advances it
    clock: u64,
}

impl MemoryState {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_secs(self.clock)
    }

    fn add_ancestors(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if !self.directories.insert(dir.to_path_buf()) {
                break;
            }
            current = dir.parent();
        }
    }
}

/// In-memory host with a logical clock and operation counters
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
    file_exists_calls: AtomicUsize,
    read_file_calls: AtomicUsize,
    write_file_calls: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file, stamping it with the next clock tick
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        let path = normalize_path(path.as_ref());
        let mut state = self.lock();
        let modified = state.tick();
        state.add_ancestors(&path);
        state.files.insert(
            path,
            MemoryFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    /// Bump the modified time of an existing file without changing it
    pub fn touch(&self, path: impl AsRef<Path>) {
        let path = normalize_path(path.as_ref());
        let mut state = self.lock();
        let modified = state.tick();
        if let Some(file) = state.files.get_mut(&path) {
            file.modified = modified;
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.lock().files.remove(&normalize_path(path.as_ref()));
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock()
            .files
            .get(&normalize_path(path.as_ref()))
            .map(|f| f.contents.clone())
    }

    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.lock().files.keys().cloned().collect();
        files.sort();
        files
    }

    pub fn file_exists_calls(&self) -> usize {
        self.file_exists_calls.load(Ordering::Relaxed)
    }

    pub fn read_file_calls(&self) -> usize {
        self.read_file_calls.load(Ordering::Relaxed)
    }

    pub fn write_file_calls(&self) -> usize {
        self.write_file_calls.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.file_exists_calls.store(0, Ordering::Relaxed);
        self.read_file_calls.store(0, Ordering::Relaxed);
        self.write_file_calls.store(0, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.read_file_calls.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .files
            .get(&normalize_path(path))
            .map(|f| f.contents.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write_file(
        &self,
        path: &Path,
        contents: &str,
        _write_byte_order_mark: bool,
    ) -> io::Result<()> {
        self.write_file_calls.fetch_add(1, Ordering::Relaxed);
        self.add_file(path, contents);
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.file_exists_calls.fetch_add(1, Ordering::Relaxed);
        self.lock().files.contains_key(&normalize_path(path))
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.lock().directories.contains(&normalize_path(path))
    }

    fn create_directory(&self, path: &Path) -> io::Result<()> {
        let path = normalize_path(path);
        let mut state = self.lock();
        state.add_ancestors(&path.join("_"));
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.lock()
            .files
            .remove(&normalize_path(path))
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn modified_time(&self, path: &Path) -> Option<SystemTime> {
        self.lock()
            .files
            .get(&normalize_path(path))
            .map(|f| f.modified)
    }

    fn set_modified_time(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        let path = normalize_path(path);
        let mut state = self.lock();
        match state.files.get_mut(&path) {
            Some(file) => {
                file.modified = time;
                Ok(())
            }
            None => Err(not_found(&path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let path = normalize_path(path);
        let state = self.lock();
        if !state.directories.contains(&path) {
            return Err(not_found(&path));
        }
        let mut entries: Vec<DirEntry> = state
            .directories
            .iter()
            .filter(|dir| dir.parent() == Some(path.as_path()))
            .map(|dir| DirEntry {
                path: dir.clone(),
                is_dir: true,
            })
            .chain(
                state
                    .files
                    .keys()
                    .filter(|file| file.parent() == Some(path.as_path()))
                    .map(|file| DirEntry {
                        path: file.clone(),
                        is_dir: false,
                    }),
            )
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn now(&self) -> SystemTime {
        self.lock().tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_clock_advances() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/p/a.tl", "a");
        fs.add_file("/p/b.tl", "b");

        let a = fs.modified_time(Path::new("/p/a.tl")).unwrap();
        let b = fs.modified_time(Path::new("/p/b.tl")).unwrap();
        assert!(a < b);

        fs.touch("/p/a.tl");
        assert!(fs.modified_time(Path::new("/p/a.tl")).unwrap() > b);
    }

    #[test]
    fn test_memory_read_dir() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/p/src/a.tl", "");
        fs.add_file("/p/src/nested/b.tl", "");

        let entries = fs.read_dir(Path::new("/p/src")).unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    path: PathBuf::from("/p/src/a.tl"),
                    is_dir: false
                },
                DirEntry {
                    path: PathBuf::from("/p/src/nested"),
                    is_dir: true
                },
            ]
        );
        assert!(fs.directory_exists(Path::new("/p")));
        assert!(fs.read_dir(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_memory_counters() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/p/a.tl", "");
        assert!(fs.file_exists(Path::new("/p/a.tl")));
        assert!(!fs.file_exists(Path::new("/p/b.tl")));
        assert_eq!(fs.file_exists_calls(), 2);

        fs.reset_counters();
        assert_eq!(fs.file_exists_calls(), 0);
    }

    #[test]
    fn test_real_file_system_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem::new();
        let file = temp_dir.path().join("out/nested/a.lua");

        fs.write_file(&file, "return 1", true).unwrap();
        assert!(fs.file_exists(&file));
        assert_eq!(fs.read_file(&file).unwrap(), "return 1");

        let stamp = UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs.set_modified_time(&file, stamp).unwrap();
        assert_eq!(fs.modified_time(&file), Some(stamp));

        fs.delete_file(&file).unwrap();
        assert!(!fs.file_exists(&file));
    }
}
