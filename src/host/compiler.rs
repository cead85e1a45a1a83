//! Adapter that makes virtual modules visible to a batch compiler.
//!
//! ```text
//! resolve_module_name_literals(["./a", "virtual:x"], main.ts)
//!        │
//!        ├─ "virtual:x" ─► store.get_or_build_record ─► __virtual_<plugin>_<hash>.ts
//!        └─ "./a"       ─► wrapped host resolver, or built-in resolution
//!
//! get_source_file(__virtual_…)  ─► record text (rebuilt first if stale)
//! get_source_file(anything else) ─► wrapped host
//! ```
//!
//! After [`CompilerHostAdapter::dispose`] every call passes straight through
//! to the wrapped host.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;

use super::attach::{AdapterOptions, Attachment};
use super::{
    CompilerHost, ModuleNameLiteral, ResolvedModule, ResolvedModuleWithFailedLookups, SourceFile,
    resolve_module_names_with,
};
use crate::plugin::VirtualModuleResolver;
use crate::store::{StoreHooks, VirtualModuleRecord, VirtualRecordStore};
use crate::type_info::SessionFactory;
use crate::watch::WatchHost;

type InvalidatedSet = Arc<Mutex<FxHashSet<PathBuf>>>;

/// Builder for [`CompilerHostAdapter`].
///
/// # Example
///
/// ```ignore
/// let adapter = CompilerHostAdapter::builder(Arc::new(DiskHost::new()), resolver, "/app")
///     .with_session_factory(SessionFactory::for_program(base, TypeInfoOptions::default()))
///     .attach();
/// let program = SourceProgram::build(&CompilerProgramHost(&adapter), &roots);
/// adapter.dispose();
/// ```
pub struct CompilerHostAdapterBuilder<H> {
    host: Arc<H>,
    options: AdapterOptions,
}

impl<H: CompilerHost + 'static> CompilerHostAdapterBuilder<H> {
    /// Session factory handed to plugins.
    pub fn with_session_factory(mut self, factory: SessionFactory) -> Self {
        self.options.session_factory = Some(factory);
        self
    }

    /// Watch host for dependency changes.
    pub fn with_watch_host(mut self, watch_host: Arc<dyn WatchHost>) -> Self {
        self.options.watch_host = Some(watch_host);
        self
    }

    /// Debounce window for staleness propagation.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.options.debounce = debounce;
        self
    }

    /// Create the adapter and its record store.
    pub fn attach(self) -> CompilerHostAdapter<H> {
        let invalidated: InvalidatedSet = Arc::default();
        let hooks = StoreHooks {
            on_mark_stale: Some(Arc::new({
                let invalidated = invalidated.clone();
                move |record: &VirtualModuleRecord| {
                    invalidated.lock().insert(PathBuf::from(&record.importer));
                }
            })),
            on_record_resolved: Some(Arc::new({
                let invalidated = invalidated.clone();
                move |record: &VirtualModuleRecord| {
                    invalidated.lock().remove(Path::new(&record.importer));
                }
            })),
            on_evict_record: Some(Arc::new({
                let invalidated = invalidated.clone();
                move |record: &VirtualModuleRecord| {
                    invalidated.lock().remove(Path::new(&record.importer));
                }
            })),
        };

        let host = self.host.clone();
        let attachment = self
            .options
            .attach(move |importer| host.file_exists(importer), hooks);
        tracing::debug!(root = %attachment.project_root.display(), "compiler host adapter attached");

        CompilerHostAdapter {
            host: self.host,
            attachment: RwLock::new(Some(attachment)),
            invalidated,
        }
    }
}

/// A [`CompilerHost`] serving virtual modules on top of another host.
pub struct CompilerHostAdapter<H> {
    host: Arc<H>,
    attachment: RwLock<Option<Attachment>>,
    invalidated: InvalidatedSet,
}

impl<H: CompilerHost + 'static> CompilerHostAdapter<H> {
    /// Start building an adapter around `host`.
    pub fn builder(
        host: Arc<H>,
        resolver: Arc<dyn VirtualModuleResolver>,
        project_root: impl Into<PathBuf>,
    ) -> CompilerHostAdapterBuilder<H> {
        CompilerHostAdapterBuilder {
            host,
            options: AdapterOptions::new(resolver, project_root.into()),
        }
    }

    /// The wrapped host.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// The record store, while attached.
    pub fn store(&self) -> Option<VirtualRecordStore> {
        self.attached().map(|attachment| attachment.store)
    }

    /// Whether [`dispose`](Self::dispose) has not run yet.
    pub fn is_attached(&self) -> bool {
        self.attachment.read().is_some()
    }

    /// Release the store and its watchers. Idempotent.
    pub fn dispose(&self) {
        let attachment = self.attachment.write().take();
        if let Some(attachment) = attachment {
            attachment.store.dispose();
            self.invalidated.lock().clear();
            tracing::debug!("compiler host adapter disposed");
        }
    }

    /// Dispose and hand back the wrapped host.
    pub fn into_inner(self) -> Arc<H> {
        self.dispose();
        self.host.clone()
    }

    fn attached(&self) -> Option<Attachment> {
        self.attachment.read().clone()
    }

    fn virtual_record(&self, path: &Path) -> Option<VirtualModuleRecord> {
        self.attached()?.virtual_record(path)
    }
}

impl<H> Drop for CompilerHostAdapter<H> {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.get_mut().take() {
            attachment.store.dispose();
        }
    }
}

impl<H: CompilerHost + 'static> CompilerHost for CompilerHostAdapter<H> {
    fn file_exists(&self, path: &Path) -> bool {
        self.attached().is_some_and(|a| a.is_virtual(path)) || self.host.file_exists(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        match self.virtual_record(path) {
            Some(record) => Some(record.source_text.to_string()),
            None => self.host.read_file(path),
        }
    }

    fn get_source_file(&self, path: &Path) -> Option<SourceFile> {
        match self.virtual_record(path) {
            Some(record) => Some(virtual_source_file(path, &record)),
            None => self.host.get_source_file(path),
        }
    }

    fn get_source_file_by_path(&self, path: &Path) -> Option<SourceFile> {
        match self.virtual_record(path) {
            Some(record) => Some(virtual_source_file(path, &record)),
            None => self.host.get_source_file_by_path(path),
        }
    }

    fn resolve_module_names(
        &self,
        names: &[String],
        containing_file: &Path,
    ) -> Option<Vec<Option<ResolvedModule>>> {
        let Some(attachment) = self.attached() else {
            return self.host.resolve_module_names(names, containing_file);
        };
        Some(attachment.resolve_names(names, containing_file, |rest| {
            self.host
                .resolve_module_names(rest, containing_file)
                .unwrap_or_else(|| {
                    rest.iter()
                        .map(|name| {
                            super::resolve_module_name(name, containing_file, |p| {
                                self.host.file_exists(p)
                            })
                            .resolved_module
                        })
                        .collect()
                })
        }))
    }

    fn resolve_module_name_literals(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Option<Vec<ResolvedModuleWithFailedLookups>> {
        let Some(attachment) = self.attached() else {
            return self.host.resolve_module_name_literals(literals, containing_file);
        };
        Some(attachment.resolve_literals(
            literals,
            containing_file,
            |_, _| {},
            |rest| {
                self.host
                    .resolve_module_name_literals(rest, containing_file)
                    .unwrap_or_else(|| {
                        resolve_module_names_with(
                            rest,
                            containing_file,
                            |names| self.host.resolve_module_names(names, containing_file),
                            |p| self.host.file_exists(p),
                        )
                    })
            },
        ))
    }

    fn has_invalidated_resolutions(&self, path: &Path) -> Option<bool> {
        // Only wrapped when the host provides it.
        let original = self.host.has_invalidated_resolutions(path)?;
        if !self.is_attached() {
            return Some(original);
        }
        Some(self.invalidated.lock().contains(path) || original)
    }
}

fn virtual_source_file(path: &Path, record: &VirtualModuleRecord) -> SourceFile {
    SourceFile::new(path, record.source_text.clone()).with_version(record.version.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::host::{CompilerProgramHost, MemoryHost};
    use crate::plugin::{FnPlugin, PluginManager};
    use crate::program::SourceProgram;
    use crate::type_info::{FileOptions, TypeInfoOptions, importer_dir};
    use crate::types::DependencyDescriptor;

    fn counting_manager(builds: Arc<AtomicUsize>) -> Arc<PluginManager> {
        Arc::new(PluginManager::new().with_plugin(FnPlugin::new(
            "answer",
            |id, _| id == "virtual:answer",
            move |_, _, _| {
                let n = builds.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("export const answer: number = {n};"))
            },
        )))
    }

    /// Host reporting its own invalidation state.
    struct IncrementalHost(Arc<MemoryHost>);

    impl CompilerHost for IncrementalHost {
        fn file_exists(&self, path: &Path) -> bool {
            CompilerHost::file_exists(self.0.as_ref(), path)
        }

        fn read_file(&self, path: &Path) -> Option<String> {
            CompilerHost::read_file(self.0.as_ref(), path)
        }

        fn get_source_file(&self, path: &Path) -> Option<SourceFile> {
            self.0.get_source_file(path)
        }

        fn has_invalidated_resolutions(&self, _path: &Path) -> Option<bool> {
            Some(false)
        }
    }

    fn host() -> Arc<MemoryHost> {
        Arc::new(
            MemoryHost::new()
                .with_file(
                    "/app/src/main.ts",
                    "import { answer } from 'virtual:answer';\nimport { x } from './x';\nexport const y: number = answer + x;\n",
                )
                .with_file("/app/src/x.ts", "export const x: number = 1;\n")
                .with_file("/app/data.json", "{}"),
        )
    }

    #[test]
    fn test_program_sees_virtual_module() {
        let builds = Arc::new(AtomicUsize::new(0));
        let adapter = CompilerHostAdapter::builder(host(), counting_manager(builds.clone()), "/app").attach();

        let program = SourceProgram::build(
            &CompilerProgramHost(&adapter),
            &[PathBuf::from("/app/src/main.ts")],
        );
        assert!(program.diagnostics().is_empty(), "{:?}", program.diagnostics());
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let store = adapter.store().expect("attached");
        let record = store.records().pop().expect("record");
        assert_eq!(record.importer, "/app/src/main.ts");
        assert!(adapter.file_exists(&record.virtual_file_name));
        let file = adapter.get_source_file(&record.virtual_file_name).expect("virtual");
        assert_eq!(file.version, "1");
        assert!(file.text.contains("= 1;"));
    }

    #[test]
    fn test_stale_record_rebuilds_on_read_and_invalidates_importer() {
        let host = host();
        let base = SourceProgram::build(
            &CompilerProgramHost(host.as_ref()),
            &[PathBuf::from("/app/src/x.ts")],
        );
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let manager = PluginManager::new().with_plugin(FnPlugin::new(
            "exports",
            |id, _| id == "virtual:exports",
            move |_, importer, api| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = api.file("./x.ts", &FileOptions::new(importer_dir(importer)))?;
                Ok(format!("export const build = {n}; export const names = {};", snapshot.exports.len()))
            },
        ));
        let host = Arc::new(IncrementalHost(host));
        let adapter = CompilerHostAdapter::builder(host, Arc::new(manager), "/app")
            .with_session_factory(SessionFactory::for_program(Arc::new(base), TypeInfoOptions::default()))
            .with_debounce(Duration::ZERO)
            .attach();

        let importer = Path::new("/app/src/main.ts");
        let literals = [ModuleNameLiteral::new("virtual:exports", 20, 37)];
        let resolved = adapter
            .resolve_module_name_literals(&literals, importer)
            .expect("attached adapter resolves");
        let virtual_file = resolved[0].resolved_module.clone().expect("virtual").resolved_file_name;
        assert_eq!(adapter.has_invalidated_resolutions(importer), Some(false));

        let store = adapter.store().expect("attached");
        store.mark_changed(&DependencyDescriptor::file("/app/src/x.ts"));
        assert_eq!(adapter.has_invalidated_resolutions(importer), Some(true));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let file = adapter.get_source_file(&virtual_file).expect("virtual");
        assert_eq!(file.version, "2");
        assert!(file.text.starts_with("export const build = 2;"));
        assert_eq!(adapter.has_invalidated_resolutions(importer), Some(false));

        adapter.dispose();
        assert_eq!(adapter.has_invalidated_resolutions(importer), Some(false));
    }

    #[test]
    fn test_absent_invalidation_member_stays_absent() {
        let builds = Arc::new(AtomicUsize::new(0));
        let adapter = CompilerHostAdapter::builder(host(), counting_manager(builds), "/app")
            .with_debounce(Duration::ZERO)
            .attach();
        let importer = Path::new("/app/src/main.ts");
        adapter.resolve_module_name_literals(&[ModuleNameLiteral::new("virtual:answer", 0, 16)], importer);
        adapter
            .store()
            .expect("attached")
            .mark_changed(&DependencyDescriptor::file("/app/src/x.ts"));
        assert_eq!(adapter.has_invalidated_resolutions(importer), None);
    }

    #[test]
    fn test_non_virtual_falls_back_to_builtin_resolution() {
        let builds = Arc::new(AtomicUsize::new(0));
        let adapter = CompilerHostAdapter::builder(host(), counting_manager(builds), "/app").attach();
        let names = vec!["./x".to_string(), "./missing".to_string()];
        let resolved = adapter
            .resolve_module_names(&names, Path::new("/app/src/main.ts"))
            .expect("attached");
        assert_eq!(
            resolved[0].as_ref().map(|m| m.resolved_file_name.clone()),
            Some(PathBuf::from("/app/src/x.ts"))
        );
        assert!(resolved[1].is_none());
    }

    #[test]
    fn test_dispose_passes_through() {
        let builds = Arc::new(AtomicUsize::new(0));
        let adapter = CompilerHostAdapter::builder(host(), counting_manager(builds), "/app").attach();
        let literals = [ModuleNameLiteral::new("virtual:answer", 0, 16)];
        let resolved = adapter
            .resolve_module_name_literals(&literals, Path::new("/app/src/main.ts"))
            .expect("attached");
        let virtual_file = resolved[0].resolved_module.clone().expect("virtual").resolved_file_name;

        adapter.dispose();
        adapter.dispose();
        assert!(!adapter.is_attached());
        assert!(adapter.get_source_file(&virtual_file).is_none());
        assert!(!adapter.file_exists(&virtual_file));
        // MemoryHost has no resolver of its own.
        assert!(adapter.resolve_module_name_literals(&literals, Path::new("/app/src/main.ts")).is_none());
        assert_eq!(adapter.has_invalidated_resolutions(Path::new("/app/src/main.ts")), None);
        assert!(adapter.get_source_file(Path::new("/app/src/x.ts")).is_some());
    }

    #[test]
    fn test_missing_importer_is_evicted() {
        let builds = Arc::new(AtomicUsize::new(0));
        let host = host();
        let adapter =
            CompilerHostAdapter::builder(host.clone(), counting_manager(builds.clone()), "/app").attach();
        let literals = [ModuleNameLiteral::new("virtual:answer", 0, 16)];
        adapter.resolve_module_name_literals(&literals, Path::new("/app/src/main.ts"));
        assert_eq!(adapter.store().expect("attached").records().len(), 1);

        host.remove(Path::new("/app/src/main.ts"));
        adapter.resolve_module_name_literals(&literals, Path::new("/app/src/x.ts"));
        let records = adapter.store().expect("attached").records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].importer, "/app/src/x.ts");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}
