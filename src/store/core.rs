//! [`VirtualRecordStore`] implementation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use globset::{Glob, GlobMatcher};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::debounce::Debouncer;
use super::{ResolveRecordResult, StoreHooks, StoreOptions, VirtualModuleRecord};
use crate::key::{virtual_file_name, virtual_key};
use crate::plugin::{ResolveVirtualModuleOptions, VirtualModuleResolution, VirtualModuleResolver};
use crate::types::DependencyDescriptor;
use crate::watch::{WatchCallback, WatchHandle};

#[derive(Default)]
struct StoreState {
    records: FxHashMap<String, VirtualModuleRecord>,
    by_virtual_file: FxHashMap<PathBuf, String>,
    dependents: FxHashMap<DependencyDescriptor, FxHashSet<String>>,
    watchers: FxHashMap<DependencyDescriptor, Box<dyn WatchHandle>>,
    pending: FxHashSet<DependencyDescriptor>,
    building: FxHashSet<String>,
    disposed: bool,
}

impl StoreState {
    fn link(&mut self, key: &str, dependencies: &[DependencyDescriptor]) {
        for dependency in dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Drop `key` from the dependents index; returns watchers nothing needs
    /// any more.
    fn unlink(&mut self, key: &str, dependencies: &[DependencyDescriptor]) -> Vec<Box<dyn WatchHandle>> {
        let mut released = Vec::new();
        for dependency in dependencies {
            let orphaned = match self.dependents.get_mut(dependency) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => true,
            };
            if orphaned {
                self.dependents.remove(dependency);
                self.pending.remove(dependency);
                if let Some(handle) = self.watchers.remove(dependency) {
                    released.push(handle);
                }
            }
        }
        released
    }

    fn remove_record(&mut self, key: &str) -> Option<(VirtualModuleRecord, Vec<Box<dyn WatchHandle>>)> {
        let record = self.records.remove(key)?;
        self.by_virtual_file.remove(&record.virtual_file_name);
        let released = self.unlink(key, &record.dependencies);
        Some((record, released))
    }
}

struct StoreInner {
    resolver: Arc<dyn VirtualModuleResolver>,
    options: StoreOptions,
    state: Mutex<StoreState>,
    debouncer: Option<Debouncer>,
}

/// Cache of virtual-module records with watch-driven invalidation.
///
/// Cloning is cheap and clones share the same cache. All methods take
/// `&self`; the resolver and hooks are never called with the internal lock
/// held.
///
/// # Example
///
/// ```ignore
/// let store = VirtualRecordStore::new(Arc::new(manager), StoreOptions::new());
/// match store.get_or_build_record("virtual:routes", "/app/src/main.ts") {
///     ResolveRecordResult::Resolved(record) => println!("{}", record.virtual_file_name.display()),
///     ResolveRecordResult::Unresolved => {}
///     ResolveRecordResult::Error(diagnostic) => eprintln!("{diagnostic}"),
/// }
/// ```
#[derive(Clone)]
pub struct VirtualRecordStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for VirtualRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("VirtualRecordStore")
            .field("records", &state.records.len())
            .field("watchers", &state.watchers.len())
            .field("pending", &state.pending.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl VirtualRecordStore {
    /// Create a store over `resolver`.
    pub fn new(resolver: Arc<dyn VirtualModuleResolver>, options: StoreOptions) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let debouncer = (!options.debounce.is_zero()).then(|| {
                let weak = weak.clone();
                Debouncer::spawn(options.debounce, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.propagate_pending();
                    }
                })
            });
            StoreInner {
                resolver,
                options,
                state: Mutex::new(StoreState::default()),
                debouncer,
            }
        });
        Self { inner }
    }

    /// Return the cached record for `(id, importer)`, building or rebuilding
    /// it when missing or stale.
    pub fn get_or_build_record(&self, id: &str, importer: &str) -> ResolveRecordResult {
        self.inner.evict_stale_importers();

        let key = virtual_key(id, importer);
        let previous = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return ResolveRecordResult::Unresolved;
            }
            let previous = state.records.get(&key).cloned();
            if let Some(record) = &previous
                && !record.stale
            {
                return ResolveRecordResult::Resolved(record.clone());
            }
            if !state.building.insert(key.clone()) {
                tracing::debug!(id, importer, "re-entrant build request; treating as unresolved");
                return ResolveRecordResult::Unresolved;
            }
            previous
        };

        self.inner.resolve_record(id, importer, key, previous)
    }

    /// The record behind a synthetic file, rebuilt first if stale.
    ///
    /// A failed rebuild leaves the previous record (still stale) in place
    /// and returns it.
    pub fn rebuild_if_stale(&self, virtual_file: &Path) -> Option<VirtualModuleRecord> {
        let record = {
            let mut state = self.inner.state.lock();
            let key = state.by_virtual_file.get(virtual_file)?.clone();
            let record = state.records.get(&key)?.clone();
            if !record.stale || !state.building.insert(key) {
                return Some(record);
            }
            record
        };

        let (id, importer, key) = (record.id.clone(), record.importer.clone(), record.key.clone());
        match self.inner.resolve_record(&id, &importer, key, Some(record.clone())) {
            ResolveRecordResult::Resolved(rebuilt) => Some(rebuilt),
            _ => Some(record),
        }
    }

    /// The record behind a synthetic file, without rebuilding.
    pub fn record_for_virtual_file(&self, virtual_file: &Path) -> Option<VirtualModuleRecord> {
        let state = self.inner.state.lock();
        let key = state.by_virtual_file.get(virtual_file)?;
        state.records.get(key).cloned()
    }

    /// Whether `path` is a synthetic file this store knows.
    pub fn is_virtual_file(&self, path: &Path) -> bool {
        self.inner.state.lock().by_virtual_file.contains_key(path)
    }

    /// Every record, ordered by key.
    pub fn records(&self) -> Vec<VirtualModuleRecord> {
        let state = self.inner.state.lock();
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Number of open dependency watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.state.lock().watchers.len()
    }

    /// Report a dependency change directly, as a watcher would.
    pub fn mark_changed(&self, dependency: &DependencyDescriptor) {
        self.inner.mark_dirty(dependency.clone());
    }

    /// Propagate pending changes now instead of waiting for the debounce
    /// window.
    pub fn flush_pending(&self) {
        if let Some(debouncer) = &self.inner.debouncer {
            debouncer.cancel();
        }
        self.inner.propagate_pending();
    }

    /// Evict every record whose importer matches the eviction predicate.
    pub fn evict_stale_importers(&self) {
        self.inner.evict_stale_importers();
    }

    /// Release every record and watcher and cancel the debounce timer.
    /// Idempotent; lookups afterwards resolve to `Unresolved`.
    pub fn dispose(&self) {
        let released: Vec<Box<dyn WatchHandle>> = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.records.clear();
            state.by_virtual_file.clear();
            state.dependents.clear();
            state.pending.clear();
            state.watchers.drain().map(|(_, handle)| handle).collect()
        };
        if let Some(debouncer) = &self.inner.debouncer {
            debouncer.shutdown();
        }
        close_all(released);
        tracing::debug!("virtual record store disposed");
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl StoreInner {
    fn hooks(&self) -> &StoreHooks {
        &self.options.hooks
    }

    fn resolve_record(
        self: &Arc<Self>,
        id: &str,
        importer: &str,
        key: String,
        previous: Option<VirtualModuleRecord>,
    ) -> ResolveRecordResult {
        let options = ResolveVirtualModuleOptions::new(id, importer)
            .with_session_factory(self.options.session_factory.as_ref());
        let resolution = self.resolver.resolve_module(&options);

        let (plugin_name, source_text, dependencies, warnings) = match resolution {
            VirtualModuleResolution::Resolved {
                plugin_name,
                source_text,
                dependencies,
                warnings,
            } => (plugin_name, source_text, dependencies, warnings),
            VirtualModuleResolution::Unresolved => {
                self.state.lock().building.remove(&key);
                return ResolveRecordResult::Unresolved;
            }
            VirtualModuleResolution::Error(diagnostic) => {
                self.state.lock().building.remove(&key);
                tracing::debug!(id, importer, %diagnostic, "virtual module failed to build");
                return ResolveRecordResult::Error(diagnostic);
            }
        };

        let record = VirtualModuleRecord {
            virtual_file_name: previous
                .as_ref()
                .map(|p| p.virtual_file_name.clone())
                .unwrap_or_else(|| virtual_file_name(&plugin_name, &key, importer)),
            version: previous.as_ref().map_or(1, |p| p.version + 1),
            key: key.clone(),
            id: id.to_string(),
            importer: importer.to_string(),
            plugin_name,
            source_text: Arc::from(source_text),
            dependencies,
            warnings,
            stale: false,
        };

        let (released, to_watch) = {
            let mut state = self.state.lock();
            state.building.remove(&key);
            if state.disposed {
                return ResolveRecordResult::Resolved(record);
            }
            // Link before unlinking so shared dependencies keep their watcher.
            state.link(&key, &record.dependencies);
            let released = match &previous {
                Some(previous) => {
                    let dropped: Vec<_> = previous
                        .dependencies
                        .iter()
                        .filter(|d| !record.dependencies.contains(d))
                        .cloned()
                        .collect();
                    state.unlink(&key, &dropped)
                }
                None => Vec::new(),
            };
            state
                .by_virtual_file
                .insert(record.virtual_file_name.clone(), key.clone());
            state.records.insert(key.clone(), record.clone());
            let to_watch: Vec<_> = record
                .dependencies
                .iter()
                .filter(|d| !state.watchers.contains_key(*d))
                .cloned()
                .collect();
            (released, to_watch)
        };

        close_all(released);
        self.watch_all(to_watch);

        tracing::debug!(
            id,
            importer,
            version = record.version,
            file = %record.virtual_file_name.display(),
            "virtual record resolved"
        );
        StoreHooks::fire(&self.hooks().on_record_resolved, &record);
        ResolveRecordResult::Resolved(record)
    }

    fn watch_all(self: &Arc<Self>, dependencies: Vec<DependencyDescriptor>) {
        let Some(host) = &self.options.watch_host else {
            return;
        };
        for dependency in dependencies {
            let callback = watcher_callback(Arc::downgrade(self), dependency.clone());
            let registered = match &dependency {
                DependencyDescriptor::File { path } => host.watch_file(path, callback),
                DependencyDescriptor::Glob {
                    base_dir,
                    recursive,
                    ..
                } => host.watch_directory(base_dir, *recursive, callback),
            };
            let mut handle = match registered {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(%dependency, %err, "failed to watch dependency");
                    continue;
                }
            };

            let mut state = self.state.lock();
            let wanted = !state.disposed
                && state.dependents.contains_key(&dependency)
                && !state.watchers.contains_key(&dependency);
            if wanted {
                state.watchers.insert(dependency, handle);
            } else {
                drop(state);
                handle.close();
            }
        }
    }

    fn mark_dirty(&self, dependency: DependencyDescriptor) {
        match &self.debouncer {
            Some(debouncer) => {
                {
                    let mut state = self.state.lock();
                    if state.disposed || !state.dependents.contains_key(&dependency) {
                        return;
                    }
                    state.pending.insert(dependency);
                }
                debouncer.schedule();
            }
            None => self.propagate([dependency]),
        }
    }

    fn propagate_pending(&self) {
        let pending: Vec<_> = self.state.lock().pending.drain().collect();
        if !pending.is_empty() {
            self.propagate(pending);
        }
    }

    fn propagate(&self, dependencies: impl IntoIterator<Item = DependencyDescriptor>) {
        let marked: Vec<VirtualModuleRecord> = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            let mut keys: Vec<String> = Vec::new();
            for dependency in dependencies {
                if let Some(dependents) = state.dependents.get(&dependency) {
                    keys.extend(dependents.iter().cloned());
                }
            }
            keys.sort();
            keys.dedup();

            keys.iter()
                .filter_map(|key| {
                    let record = state.records.get_mut(key)?;
                    if record.stale {
                        return None;
                    }
                    record.stale = true;
                    Some(record.clone())
                })
                .collect()
        };

        for record in &marked {
            tracing::debug!(id = %record.id, importer = %record.importer, "virtual record stale");
            StoreHooks::fire(&self.hooks().on_mark_stale, record);
        }
    }

    fn evict_stale_importers(&self) {
        let Some(should_evict) = &self.options.should_evict else {
            return;
        };
        let candidates: Vec<(String, String)> = {
            let state = self.state.lock();
            state
                .records
                .values()
                .map(|record| (record.key.clone(), record.importer.clone()))
                .collect()
        };

        for (key, importer) in candidates {
            if !should_evict(&importer) {
                continue;
            }
            let removed = self.state.lock().remove_record(&key);
            if let Some((record, released)) = removed {
                close_all(released);
                tracing::debug!(id = %record.id, importer = %record.importer, "virtual record evicted");
                StoreHooks::fire(&self.hooks().on_evict_record, &record);
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.disposed = true;
        close_all(state.watchers.drain().map(|(_, handle)| handle).collect());
    }
}

fn close_all(handles: Vec<Box<dyn WatchHandle>>) {
    for mut handle in handles {
        handle.close();
    }
}

/// Callback for one descriptor. Holds the store weakly; a panic inside is
/// logged and swallowed so it never reaches the watch backend.
fn watcher_callback(store: Weak<StoreInner>, dependency: DependencyDescriptor) -> WatchCallback {
    let filter = glob_filter(&dependency);
    Arc::new(move |changed: &Path| {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Some((base, matcher)) = &filter {
                let Ok(relative) = changed.strip_prefix(base) else {
                    return;
                };
                if !matcher.is_match(relative) {
                    return;
                }
            }
            if let Some(inner) = store.upgrade() {
                inner.mark_dirty(dependency.clone());
            }
        }));
        if outcome.is_err() {
            tracing::error!(%dependency, path = %changed.display(), "watcher callback panicked");
        }
    })
}

fn glob_filter(dependency: &DependencyDescriptor) -> Option<(PathBuf, GlobMatcher)> {
    let DependencyDescriptor::Glob {
        base_dir, pattern, ..
    } = dependency
    else {
        return None;
    };
    match Glob::new(pattern) {
        Ok(glob) => Some((base_dir.clone(), glob.compile_matcher())),
        Err(err) => {
            tracing::warn!(%pattern, %err, "invalid glob dependency; any change under its base counts");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::plugin::{FnPlugin, PluginManager, VirtualModuleDiagnosticCode};
    use crate::type_info::SessionFactory;
    use crate::watch::PushWatchHost;

    /// Resolver whose output embeds a build counter.
    struct Counting {
        builds: AtomicUsize,
        dependencies: Vec<DependencyDescriptor>,
    }

    impl Counting {
        fn new(dependencies: Vec<DependencyDescriptor>) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                dependencies,
            })
        }
    }

    impl VirtualModuleResolver for Counting {
        fn resolve_module(&self, options: &ResolveVirtualModuleOptions<'_>) -> VirtualModuleResolution {
            if !options.id.starts_with("virtual:") {
                return VirtualModuleResolution::Unresolved;
            }
            let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
            VirtualModuleResolution::Resolved {
                plugin_name: "counting".into(),
                source_text: format!("export const build = {n};"),
                dependencies: self.dependencies.clone(),
                warnings: Vec::new(),
            }
        }
    }

    fn dep() -> DependencyDescriptor {
        DependencyDescriptor::file("/p/dep.ts")
    }

    fn record(result: ResolveRecordResult) -> VirtualModuleRecord {
        result.into_record().expect("resolved")
    }

    fn eventually(check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_cache_hit_is_idempotent() {
        let resolver = Counting::new(vec![dep()]);
        let store = VirtualRecordStore::new(resolver.clone(), StoreOptions::new());

        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        let second = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(first.virtual_file_name, second.virtual_file_name);
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 1);
        assert_eq!(resolver.builds.load(Ordering::SeqCst), 1);
        assert!(store.is_virtual_file(&first.virtual_file_name));
        assert_eq!(
            store.get_or_build_record("./real", "/p/main.ts"),
            ResolveRecordResult::Unresolved
        );
    }

    #[test]
    fn test_change_marks_stale_and_rebuild_bumps_version() {
        let watch = PushWatchHost::new();
        let resolver = Counting::new(vec![dep()]);
        let store = VirtualRecordStore::new(
            resolver,
            StoreOptions::new().with_watch_host(Arc::new(watch.clone())),
        );

        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(watch.watcher_count(), 1);

        watch.notify_changed("/p/dep.ts");
        assert!(store.record_for_virtual_file(&first.virtual_file_name).unwrap().stale);

        let rebuilt = store.rebuild_if_stale(&first.virtual_file_name).unwrap();
        assert_eq!(rebuilt.version, 2);
        assert_eq!(rebuilt.virtual_file_name, first.virtual_file_name);
        assert_eq!(&*rebuilt.source_text, "export const build = 2;");
        assert!(!rebuilt.stale);
        assert_eq!(watch.watcher_count(), 1);
    }

    #[test]
    fn test_shared_dependency_has_one_watcher() {
        let watch = PushWatchHost::new();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new().with_watch_host(Arc::new(watch.clone())),
        );
        store.get_or_build_record("virtual:a", "/p/main.ts");
        store.get_or_build_record("virtual:b", "/p/main.ts");
        store.get_or_build_record("virtual:a", "/p/other.ts");
        assert_eq!(store.records().len(), 3);
        assert_eq!(watch.watcher_count(), 1);

        assert_eq!(watch.notify_changed("/p/dep.ts"), 1);
        assert!(store.records().iter().all(|r| r.stale));
    }

    #[test]
    fn test_debounced_burst_marks_once() {
        let watch = PushWatchHost::new();
        let stale_events = Arc::new(AtomicUsize::new(0));
        let counter = stale_events.clone();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .with_debounce(Duration::from_millis(200))
                .on_mark_stale(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));

        for _ in 0..10 {
            watch.notify_changed("/p/dep.ts");
        }
        assert!(!store.record_for_virtual_file(&first.virtual_file_name).unwrap().stale);
        assert!(eventually(|| stale_events.load(Ordering::SeqCst) == 1));

        let next = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(next.version, 2);
        assert_eq!(&*next.source_text, "export const build = 2;");
    }

    #[test]
    fn test_flush_pending_skips_the_window() {
        let watch = PushWatchHost::new();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .with_debounce(Duration::from_secs(60)),
        );
        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        watch.notify_changed("/p/dep.ts");
        store.flush_pending();
        assert!(store.record_for_virtual_file(&first.virtual_file_name).unwrap().stale);
        store.dispose();
    }

    #[test]
    fn test_glob_dependency_filters_by_pattern() {
        let watch = PushWatchHost::new();
        let store = VirtualRecordStore::new(
            Counting::new(vec![DependencyDescriptor::glob("/p/pages", "*.ts", false)]),
            StoreOptions::new().with_watch_host(Arc::new(watch.clone())),
        );
        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));

        watch.notify_changed("/p/pages/notes.md");
        assert!(!store.record_for_virtual_file(&first.virtual_file_name).unwrap().stale);

        watch.notify_changed("/p/pages/new.ts");
        assert!(store.record_for_virtual_file(&first.virtual_file_name).unwrap().stale);
    }

    #[test]
    fn test_eviction_releases_watchers() {
        let watch = PushWatchHost::new();
        let importer_exists = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let exists = importer_exists.clone();
        let evicted = Arc::new(AtomicUsize::new(0));
        let evictions = evicted.clone();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .with_eviction(move |_| !exists.load(Ordering::SeqCst))
                .on_evict_record(move |_| {
                    evictions.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let first = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(watch.watcher_count(), 1);

        importer_exists.store(false, Ordering::SeqCst);
        store.evict_stale_importers();
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert_eq!(watch.watcher_count(), 0);
        assert!(store.record_for_virtual_file(&first.virtual_file_name).is_none());
        assert_eq!(watch.notify_changed("/p/dep.ts"), 0);
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_build_error_creates_no_record() {
        let manager = PluginManager::new().with_plugin(FnPlugin::new(
            "broken",
            |_, _| true,
            |_, _, _| Err("boom".into()),
        ));
        let store = VirtualRecordStore::new(Arc::new(manager), StoreOptions::new());
        let ResolveRecordResult::Error(diagnostic) =
            store.get_or_build_record("virtual:a", "/p/main.ts")
        else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::PluginBuildThrew);
        assert_eq!(diagnostic.plugin_name.as_deref(), Some("broken"));
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_plugin_dependencies_flow_through_sessions() {
        let host = crate::host::MemoryHost::new().with_file("/p/x.ts", "export type X = string;");
        let program = crate::program::SourceProgram::build(
            &crate::host::CompilerProgramHost(&host),
            &[std::path::PathBuf::from("/p/x.ts")],
        );
        let factory = SessionFactory::for_program(
            Arc::new(program),
            crate::type_info::TypeInfoOptions::default(),
        );
        let manager = PluginManager::new().with_plugin(FnPlugin::new("p", |_, _| true, |_, importer, api| {
            let options = crate::type_info::FileOptions::new(crate::type_info::importer_dir(importer));
            let snapshot = api.file("./x.ts", &options)?;
            Ok(format!("export const count = {};", snapshot.exports.len()))
        }));
        let store = VirtualRecordStore::new(
            Arc::new(manager),
            StoreOptions::new().with_session_factory(Some(factory)),
        );
        let rec = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(rec.plugin_name, "p");
        assert_eq!(&*rec.source_text, "export const count = 1;");
        assert_eq!(rec.dependencies, vec![DependencyDescriptor::file("/p/x.ts")]);

        store.mark_changed(&DependencyDescriptor::file("/p/x.ts"));
        store.flush_pending();
        assert!(store.records()[0].stale);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let watch = PushWatchHost::new();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .with_debounce(Duration::from_millis(10)),
        );
        store.get_or_build_record("virtual:a", "/p/main.ts");
        watch.notify_changed("/p/dep.ts");

        store.dispose();
        store.dispose();
        assert!(store.is_disposed());
        assert_eq!(watch.watcher_count(), 0);
        assert_eq!(
            store.get_or_build_record("virtual:a", "/p/main.ts"),
            ResolveRecordResult::Unresolved
        );
    }

    #[test]
    fn test_watcher_panic_is_contained() {
        let watch = PushWatchHost::new();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .on_mark_stale(|_| panic!("hook exploded")),
        );
        store.get_or_build_record("virtual:a", "/p/main.ts");
        assert_eq!(watch.notify_changed("/p/dep.ts"), 1);
        assert!(store.records()[0].stale);
    }

    #[test]
    fn test_debounced_hook_panic_keeps_invalidating() {
        let watch = PushWatchHost::new();
        let stale_events = Arc::new(AtomicUsize::new(0));
        let counter = stale_events.clone();
        let store = VirtualRecordStore::new(
            Counting::new(vec![dep()]),
            StoreOptions::new()
                .with_watch_host(Arc::new(watch.clone()))
                .with_debounce(Duration::from_millis(10))
                .on_mark_stale(move |_| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("hook exploded");
                    }
                }),
        );
        record(store.get_or_build_record("virtual:a", "/p/main.ts"));

        watch.notify_changed("/p/dep.ts");
        assert!(eventually(|| store.records()[0].stale));
        let rebuilt = record(store.get_or_build_record("virtual:a", "/p/main.ts"));
        assert_eq!(rebuilt.version, 2);

        watch.notify_changed("/p/dep.ts");
        assert!(eventually(|| store.records()[0].stale));
        assert_eq!(stale_events.load(Ordering::SeqCst), 2);
    }
}
