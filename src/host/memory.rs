//! In-memory host for tests, editors and embedders.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{CompilerHost, LanguageServiceHost, SourceFile};

#[derive(Debug, Clone)]
struct Entry {
    text: Arc<str>,
    version: u64,
}

/// A map-backed file system that is both a [`CompilerHost`] and a
/// [`LanguageServiceHost`].
///
/// Every write bumps the file's script version and the project version.
///
/// # Example
///
/// ```ignore
/// let host = MemoryHost::new()
///     .with_file("/app/main.ts", "import { x } from 'virtual:x';")
///     .with_root("/app/main.ts");
/// host.write("/app/main.ts", "export {};");
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    files: RwLock<FxHashMap<PathBuf, Entry>>,
    roots: RwLock<Vec<PathBuf>>,
    project_version: AtomicU64,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`write`](Self::write).
    pub fn with_file(self, path: impl Into<PathBuf>, text: impl AsRef<str>) -> Self {
        self.write(path, text);
        self
    }

    /// Builder form of [`add_root`](Self::add_root).
    pub fn with_root(self, path: impl Into<PathBuf>) -> Self {
        self.add_root(path);
        self
    }

    /// Create or replace a file.
    pub fn write(&self, path: impl Into<PathBuf>, text: impl AsRef<str>) {
        let mut files = self.files.write();
        let path = path.into();
        let version = files.get(&path).map_or(1, |entry| entry.version + 1);
        files.insert(
            path,
            Entry {
                text: Arc::from(text.as_ref()),
                version,
            },
        );
        self.project_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Delete a file. Returns whether it existed.
    pub fn remove(&self, path: &Path) -> bool {
        let removed = self.files.write().remove(path).is_some();
        if removed {
            self.roots.write().retain(|root| root != path);
            self.project_version.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Register a root script.
    pub fn add_root(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut roots = self.roots.write();
        if !roots.contains(&path) {
            roots.push(path);
            self.project_version.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Whether a file exists.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn entry(&self, path: &Path) -> Option<Entry> {
        self.files.read().get(path).cloned()
    }
}

impl CompilerHost for MemoryHost {
    fn file_exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.entry(path).map(|entry| entry.text.to_string())
    }

    fn get_source_file(&self, path: &Path) -> Option<SourceFile> {
        self.entry(path)
            .map(|entry| SourceFile::new(path, entry.text).with_version(entry.version.to_string()))
    }
}

impl LanguageServiceHost for MemoryHost {
    fn script_file_names(&self) -> Vec<PathBuf> {
        self.roots.read().clone()
    }

    fn script_version(&self, path: &Path) -> Option<String> {
        self.entry(path).map(|entry| entry.version.to_string())
    }

    fn script_snapshot(&self, path: &Path) -> Option<Arc<str>> {
        self.entry(path).map(|entry| entry.text)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.entry(path).map(|entry| entry.text.to_string())
    }

    fn project_version(&self) -> Option<String> {
        Some(self.project_version.load(Ordering::SeqCst).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_bump_on_write() {
        let host = MemoryHost::new().with_file("/a.ts", "1");
        let project = LanguageServiceHost::project_version(&host);
        assert_eq!(host.script_version(Path::new("/a.ts")).as_deref(), Some("1"));

        host.write("/a.ts", "2");
        assert_eq!(host.script_version(Path::new("/a.ts")).as_deref(), Some("2"));
        assert_ne!(LanguageServiceHost::project_version(&host), project);
        assert_eq!(
            CompilerHost::read_file(&host, Path::new("/a.ts")).as_deref(),
            Some("2")
        );
    }

    #[test]
    fn test_remove_drops_root() {
        let host = MemoryHost::new().with_file("/a.ts", "").with_root("/a.ts");
        assert!(host.remove(Path::new("/a.ts")));
        assert!(host.script_file_names().is_empty());
        assert!(!CompilerHost::file_exists(&host, Path::new("/a.ts")));
    }
}
