//! Host reading straight from the file system.

use std::fs;
use std::path::Path;

use super::{CompilerHost, SourceFile};

/// A [`CompilerHost`] over the real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskHost;

impl DiskHost {
    /// Create a disk host.
    pub fn new() -> Self {
        Self
    }
}

impl CompilerHost for DiskHost {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::trace!(path = %path.display(), %err, "read failed");
                None
            }
        }
    }

    fn get_source_file(&self, path: &Path) -> Option<SourceFile> {
        self.read_file(path).map(|text| SourceFile::new(path, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ts");
        fs::write(&file, "export const a = 1;").unwrap();

        let host = DiskHost::new();
        assert!(host.file_exists(&file));
        assert!(!host.file_exists(dir.path()));
        let source = host.get_source_file(&file).unwrap();
        assert_eq!(&*source.text, "export const a = 1;");
        assert!(host.read_file(&dir.path().join("missing.ts")).is_none());
    }
}
