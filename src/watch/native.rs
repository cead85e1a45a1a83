//! Watch host over the operating system's file events.

use std::ffi::OsString;
use std::path::Path;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::{WatchCallback, WatchError, WatchHandle, WatchHost};

/// A [`WatchHost`] backed by `notify`'s recommended watcher.
///
/// Each registration owns its own OS watcher. Events arrive on `notify`'s
/// thread; error events are logged and dropped. Files are watched through
/// their parent directory so a save that replaces the file by rename keeps
/// being seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatchHost;

impl NotifyWatchHost {
    /// Create a host.
    pub fn new() -> Self {
        Self
    }

    fn watch(
        &self,
        path: &Path,
        mode: RecursiveMode,
        only: Option<OsString>,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        let backend = |err: notify::Error| WatchError::Backend {
            path: path.to_path_buf(),
            message: err.to_string(),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if event.kind.is_access() => {}
                Ok(event) => {
                    for changed in &event.paths {
                        if only.as_deref().is_none_or(|name| changed.file_name() == Some(name)) {
                            callback(changed);
                        }
                    }
                }
                Err(err) => tracing::warn!(%err, "file watcher error"),
            }
        })
        .map_err(backend)?;
        watcher.watch(path, mode).map_err(backend)?;

        tracing::debug!(path = %path.display(), ?mode, "watching");
        Ok(Box::new(NotifyWatchHandle {
            watcher: Some(watcher),
        }))
    }
}

impl WatchHost for NotifyWatchHost {
    fn watch_file(
        &self,
        path: &Path,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(WatchError::Backend {
                path: path.to_path_buf(),
                message: "not a file path".into(),
            });
        };
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        self.watch(parent, RecursiveMode::NonRecursive, Some(name.to_os_string()), callback)
    }

    fn watch_directory(
        &self,
        path: &Path,
        recursive: bool,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watch(path, mode, None, callback)
    }
}

struct NotifyWatchHandle {
    watcher: Option<RecommendedWatcher>,
}

impl WatchHandle for NotifyWatchHandle {
    fn close(&mut self) {
        self.watcher = None;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_parent_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let result = NotifyWatchHost::new().watch_file(
            &dir.path().join("gone").join("missing.ts"),
            Arc::new(|_: &Path| {}),
        );
        assert!(matches!(result, Err(WatchError::Backend { .. })));
    }

    #[test]
    fn test_file_watch_survives_rename_saves() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("model.ts");
        fs::write(&target, "export const a = 1;").unwrap();

        let (tx, rx) = mpsc::channel::<PathBuf>();
        let tx = Mutex::new(tx);
        let _handle = NotifyWatchHost::new()
            .watch_file(
                &target,
                Arc::new(move |changed: &Path| {
                    let _ = tx.lock().send(changed.to_path_buf());
                }),
            )
            .unwrap();

        let save = |text: &str| {
            let tmp = dir.path().join("model.ts.tmp");
            fs::write(&tmp, text).unwrap();
            fs::rename(&tmp, &target).unwrap();
        };
        let saw_target = |rx: &mpsc::Receiver<PathBuf>| match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(path) => path.file_name() == target.file_name(),
            Err(_) => false,
        };

        fs::write(dir.path().join("other.ts"), "x").unwrap();
        save("export const a = 2;");
        assert!(saw_target(&rx));

        std::thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
        save("export const a = 3;");
        assert!(saw_target(&rx));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut handle = NotifyWatchHost::new()
            .watch_directory(dir.path(), false, Arc::new(|_: &Path| {}))
            .unwrap();
        handle.close();
        handle.close();
    }
}
