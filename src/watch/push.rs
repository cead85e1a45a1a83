//! Watch host driven by explicit change notifications.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{WatchCallback, WatchError, WatchHandle, WatchHost};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    File,
    Directory { recursive: bool },
}

struct Registration {
    path: PathBuf,
    scope: Scope,
    callback: WatchCallback,
}

impl Registration {
    fn matches(&self, changed: &Path) -> bool {
        match self.scope {
            Scope::File => changed == self.path,
            Scope::Directory { recursive: true } => changed.starts_with(&self.path),
            Scope::Directory { recursive: false } => {
                changed == self.path || changed.parent() == Some(self.path.as_path())
            }
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    registrations: FxHashMap<u64, Registration>,
}

/// A [`WatchHost`] whose events come from [`notify_changed`](Self::notify_changed).
///
/// Language-service integrations forward the editor's file events here;
/// tests use it for deterministic watcher behavior.
#[derive(Clone, Default)]
pub struct PushWatchHost {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for PushWatchHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushWatchHost")
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

impl PushWatchHost {
    /// Create a host with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that `path` changed. Returns how many callbacks ran.
    pub fn notify_changed(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let callbacks: Vec<WatchCallback> = self
            .registry
            .lock()
            .registrations
            .values()
            .filter(|registration| registration.matches(path))
            .map(|registration| registration.callback.clone())
            .collect();
        for callback in &callbacks {
            callback(path);
        }
        callbacks.len()
    }

    /// Number of open registrations.
    pub fn watcher_count(&self) -> usize {
        self.registry.lock().registrations.len()
    }

    /// Whether an open registration covers exactly `path`.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.registry
            .lock()
            .registrations
            .values()
            .any(|registration| registration.path == path)
    }

    fn register(&self, path: &Path, scope: Scope, callback: WatchCallback) -> Box<dyn WatchHandle> {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.registrations.insert(
            id,
            Registration {
                path: path.to_path_buf(),
                scope,
                callback,
            },
        );
        Box::new(PushWatchHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        })
    }
}

impl WatchHost for PushWatchHost {
    fn watch_file(
        &self,
        path: &Path,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        Ok(self.register(path, Scope::File, callback))
    }

    fn watch_directory(
        &self,
        path: &Path,
        recursive: bool,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        Ok(self.register(path, Scope::Directory { recursive }, callback))
    }
}

struct PushWatchHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl WatchHandle for PushWatchHandle {
    fn close(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().registrations.remove(&self.id);
        }
    }
}

impl Drop for PushWatchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, WatchCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            count,
            Arc::new(move |_: &Path| {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_file_and_directory_scopes() {
        let host = PushWatchHost::new();
        let (file_hits, file_cb) = counter();
        let (flat_hits, flat_cb) = counter();
        let (deep_hits, deep_cb) = counter();
        let _a = host.watch_file(Path::new("/p/a.ts"), file_cb).unwrap();
        let _b = host.watch_directory(Path::new("/p"), false, flat_cb).unwrap();
        let _c = host.watch_directory(Path::new("/p"), true, deep_cb).unwrap();

        host.notify_changed("/p/a.ts");
        host.notify_changed("/p/sub/b.ts");

        assert_eq!(file_hits.load(Ordering::SeqCst), 1);
        assert_eq!(flat_hits.load(Ordering::SeqCst), 1);
        assert_eq!(deep_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_and_drop_unregister() {
        let host = PushWatchHost::new();
        let (hits, cb) = counter();
        let mut handle = host.watch_file(Path::new("/a.ts"), cb.clone()).unwrap();
        let other = host.watch_file(Path::new("/a.ts"), cb).unwrap();
        assert_eq!(host.watcher_count(), 2);

        handle.close();
        handle.close();
        drop(other);
        assert_eq!(host.watcher_count(), 0);
        assert_eq!(host.notify_changed("/a.ts"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
