//! Editor integration: a language-service host adapter and a small
//! language service that builds programs through it.
//!
//! ```text
//! create_language_service_plugin(info)
//!     │
//!     ├─ SourceLanguageService<H>       plain host; plugins' TypeInfo
//!     │                                 sessions read its programs
//!     │
//!     ├─ LanguageServiceAdapter<H>      virtual files get script versions
//!     │                                 from record versions; the project
//!     │                                 version carries a store epoch
//!     │
//!     └─ SourceLanguageService<Adapter>
//!             program() ──► cached until the project version moves
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::attach::{AdapterOptions, Attachment, DEFAULT_DEBOUNCE};
use super::{
    LanguageServiceHost, LanguageServiceProgramHost, ModuleNameLiteral, ResolvedModule,
    ResolvedModuleWithFailedLookups, resolve_module_names_with,
};
use crate::diagnostic::Diagnostic;
use crate::plugin::{VirtualModuleDiagnostic, VirtualModuleResolver};
use crate::program::{Program, SourceProgram};
use crate::store::{ResolveRecordResult, StoreHooks, VirtualModuleRecord, VirtualRecordStore};
use crate::type_info::{SessionFactory, TypeInfoOptions};
use crate::watch::WatchHost;

// =============================================================================
// Adapter
// =============================================================================

type ErrorTable = FxHashMap<PathBuf, FxHashMap<String, VirtualModuleDiagnostic>>;

/// Builder for [`LanguageServiceAdapter`].
pub struct LanguageServiceAdapterBuilder<H> {
    host: Arc<H>,
    options: AdapterOptions,
}

impl<H: LanguageServiceHost + 'static> LanguageServiceAdapterBuilder<H> {
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
    pub fn attach(self) -> LanguageServiceAdapter<H> {
        let epoch = Arc::new(AtomicU64::new(0));
        let bump = {
            let epoch = epoch.clone();
            move |_: &VirtualModuleRecord| {
                epoch.fetch_add(1, Ordering::SeqCst);
            }
        };
        let hooks = StoreHooks {
            on_mark_stale: Some(Arc::new(bump.clone())),
            on_record_resolved: Some(Arc::new(bump.clone())),
            on_evict_record: Some(Arc::new(bump)),
        };

        let host = self.host.clone();
        let attachment = self
            .options
            .attach(move |importer| host.file_exists(importer), hooks);
        tracing::debug!(root = %attachment.project_root.display(), "language service adapter attached");

        LanguageServiceAdapter {
            host: self.host,
            attachment: RwLock::new(Some(attachment)),
            epoch,
            errors: Mutex::default(),
        }
    }
}

/// A [`LanguageServiceHost`] serving virtual modules on top of another host.
///
/// Resolution failures are remembered per importing file until the import
/// resolves again; see [`resolution_errors`](Self::resolution_errors).
pub struct LanguageServiceAdapter<H> {
    host: Arc<H>,
    attachment: RwLock<Option<Attachment>>,
    epoch: Arc<AtomicU64>,
    errors: Mutex<ErrorTable>,
}

impl<H: LanguageServiceHost + 'static> LanguageServiceAdapter<H> {
    /// Start building an adapter around `host`.
    pub fn builder(
        host: Arc<H>,
        resolver: Arc<dyn VirtualModuleResolver>,
        project_root: impl Into<PathBuf>,
    ) -> LanguageServiceAdapterBuilder<H> {
        LanguageServiceAdapterBuilder {
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

    /// Virtual-module failures currently reported for `importer`, ordered
    /// by specifier.
    pub fn resolution_errors(&self, importer: &Path) -> Vec<(String, VirtualModuleDiagnostic)> {
        let errors = self.errors.lock();
        let mut found: Vec<_> = errors
            .get(importer)
            .map(|by_specifier| {
                by_specifier
                    .iter()
                    .map(|(specifier, diagnostic)| (specifier.clone(), diagnostic.clone()))
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Release the store and its watchers. Idempotent.
    pub fn dispose(&self) {
        let attachment = self.attachment.write().take();
        if let Some(attachment) = attachment {
            attachment.store.dispose();
            self.errors.lock().clear();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("language service adapter disposed");
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

    /// Track the error table. A changed entry moves the epoch so the next
    /// program is rebuilt.
    fn observe(&self, importer: &Path, specifier: &str, outcome: &ResolveRecordResult) {
        let mut errors = self.errors.lock();
        let changed = match outcome {
            ResolveRecordResult::Error(diagnostic) => {
                let by_specifier = errors.entry(importer.to_path_buf()).or_default();
                by_specifier.insert(specifier.to_string(), diagnostic.clone()) != Some(diagnostic.clone())
            }
            _ => {
                let removed = errors
                    .get_mut(importer)
                    .is_some_and(|by_specifier| by_specifier.remove(specifier).is_some());
                if errors.get(importer).is_some_and(FxHashMap::is_empty) {
                    errors.remove(importer);
                }
                removed
            }
        };
        if changed {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<H> Drop for LanguageServiceAdapter<H> {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.get_mut().take() {
            attachment.store.dispose();
        }
    }
}

impl<H: LanguageServiceHost + 'static> LanguageServiceHost for LanguageServiceAdapter<H> {
    fn script_file_names(&self) -> Vec<PathBuf> {
        self.host.script_file_names()
    }

    fn script_version(&self, path: &Path) -> Option<String> {
        match self.virtual_record(path) {
            Some(record) => Some(record.version.to_string()),
            None => self.host.script_version(path),
        }
    }

    fn script_snapshot(&self, path: &Path) -> Option<Arc<str>> {
        match self.virtual_record(path) {
            Some(record) => Some(record.source_text),
            None => self.host.script_snapshot(path),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.attached().is_some_and(|a| a.is_virtual(path)) || self.host.file_exists(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        match self.virtual_record(path) {
            Some(record) => Some(record.source_text.to_string()),
            None => self.host.read_file(path),
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
        let importer = PathBuf::from(attachment.importer(containing_file));
        Some(attachment.resolve_literals(
            literals,
            containing_file,
            |specifier, outcome| self.observe(&importer, specifier, outcome),
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

    /// The wrapped host's version with the store epoch appended. Hosts
    /// without a project version keep relying on per-file versions.
    fn project_version(&self) -> Option<String> {
        let base = self.host.project_version()?;
        if !self.is_attached() {
            return Some(base);
        }
        Some(format!("{base}+vm{}", self.epoch.load(Ordering::SeqCst)))
    }
}

// =============================================================================
// Language Service
// =============================================================================

/// What editors query.
pub trait LanguageService: Send + Sync {
    /// The current program, if one can be built.
    fn program(&self) -> Option<Arc<dyn Program>>;

    /// Diagnostics reported for one file.
    fn diagnostics(&self, path: &Path) -> Vec<Diagnostic>;
}

#[derive(Default)]
struct ProgramCache {
    current: Option<(Option<String>, Arc<SourceProgram>)>,
    building: bool,
}

/// A [`LanguageService`] building [`SourceProgram`]s from a host's root
/// scripts.
///
/// Programs are reused while the host's project version is unchanged.
/// Hosts without one get a fresh program on every call. A call made while a
/// build is running (plugins asking for type information) gets the previous
/// program.
pub struct SourceLanguageService<H> {
    host: Arc<H>,
    cache: Mutex<ProgramCache>,
}

impl<H: LanguageServiceHost + 'static> SourceLanguageService<H> {
    /// Create a service over `host`.
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            cache: Mutex::default(),
        }
    }

    /// The host programs are built through.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// The current program as its concrete type.
    pub fn source_program(&self) -> Option<Arc<SourceProgram>> {
        let version = {
            let mut cache = self.cache.lock();
            let version = self.host.project_version();
            if let Some((cached, program)) = &cache.current
                && version.is_some()
                && *cached == version
            {
                return Some(program.clone());
            }
            if cache.building {
                return cache.current.as_ref().map(|(_, program)| program.clone());
            }
            cache.building = true;
            version
        };

        let roots = self.host.script_file_names();
        let program = Arc::new(SourceProgram::build(&LanguageServiceProgramHost(self.host.as_ref()), &roots));
        tracing::debug!(roots = roots.len(), "language service program rebuilt");

        // Keyed by the version read before building. If resolving virtual
        // modules moved it, the next call builds again against this program.
        let mut cache = self.cache.lock();
        cache.current = Some((version, program.clone()));
        cache.building = false;
        Some(program)
    }
}

impl<H: LanguageServiceHost + 'static> LanguageService for SourceLanguageService<H> {
    fn program(&self) -> Option<Arc<dyn Program>> {
        self.source_program().map(|program| program as Arc<dyn Program>)
    }

    fn diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        self.source_program()
            .map(|program| program.file_diagnostics(path))
            .unwrap_or_default()
    }
}

// =============================================================================
// Plugin Entry Point
// =============================================================================

/// Everything needed to attach virtual modules to an editor project.
pub struct PluginCreateInfo<H> {
    /// The editor's host.
    pub host: Arc<H>,
    /// Project root; relative importers are anchored here.
    pub project_root: PathBuf,
    /// Resolver, usually a [`PluginManager`](crate::plugin::PluginManager).
    pub resolver: Arc<dyn VirtualModuleResolver>,
    /// Watch host for dependency changes.
    pub watch_host: Option<Arc<dyn WatchHost>>,
    /// Debounce window for staleness propagation.
    pub debounce: Duration,
    /// Options for the TypeInfo API handed to plugins.
    pub type_info: TypeInfoOptions,
}

impl<H> PluginCreateInfo<H> {
    /// Info with default debounce and no watching.
    pub fn new(
        host: Arc<H>,
        resolver: Arc<dyn VirtualModuleResolver>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host,
            project_root: project_root.into(),
            resolver,
            watch_host: None,
            debounce: DEFAULT_DEBOUNCE,
            type_info: TypeInfoOptions::default(),
        }
    }

    /// Set the watch host.
    pub fn with_watch_host(mut self, watch_host: Arc<dyn WatchHost>) -> Self {
        self.watch_host = Some(watch_host);
        self
    }
}

/// Wrap an editor host with virtual-module support and return the language
/// service built on it.
///
/// Plugins get TypeInfo sessions backed by a second service over the
/// unwrapped host. Its programs see real files only and are cached by the
/// host's own project version, so a rebuild after an edit reads the edited
/// types.
///
/// # Example
///
/// ```ignore
/// let info = PluginCreateInfo::new(Arc::new(editor_host), Arc::new(manager), "/app");
/// let service = create_language_service_plugin(info);
/// let diagnostics = service.diagnostics(Path::new("/app/src/main.ts"));
/// ```
pub fn create_language_service_plugin<H: LanguageServiceHost + 'static>(
    info: PluginCreateInfo<H>,
) -> Arc<SourceLanguageService<LanguageServiceAdapter<H>>> {
    let base = Arc::new(SourceLanguageService::new(info.host.clone()));
    let provider = move || base.program();

    let mut builder = LanguageServiceAdapter::builder(info.host, info.resolver, info.project_root)
        .with_session_factory(SessionFactory::lazy(provider, info.type_info))
        .with_debounce(info.debounce);
    if let Some(watch_host) = info.watch_host {
        builder = builder.with_watch_host(watch_host);
    }

    Arc::new(SourceLanguageService::new(Arc::new(builder.attach())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::plugin::{FnPlugin, PluginManager, VirtualModuleDiagnosticCode};
    use crate::type_info::{FileOptions, importer_dir};
    use crate::types::DependencyDescriptor;

    const MAIN: &str = "/app/src/main.ts";

    fn editor_host() -> Arc<MemoryHost> {
        Arc::new(
            MemoryHost::new()
                .with_file(
                    MAIN,
                    "import { count } from 'virtual:count';\nexport const n: number = count;\n",
                )
                .with_file("/app/src/model.ts", "export interface A { a: string }\nexport type B = number;\n")
                .with_root(MAIN)
                .with_root("/app/src/model.ts"),
        )
    }

    fn counting_exports() -> Arc<PluginManager> {
        Arc::new(PluginManager::new().with_plugin(FnPlugin::new(
            "count",
            |id, _| id == "virtual:count",
            |_, importer, api| {
                let snapshot = api.file("./model.ts", &FileOptions::new(importer_dir(importer)))?;
                Ok(format!("export const count: number = {};", snapshot.exports.len()))
            },
        )))
    }

    #[test]
    fn test_virtual_script_versions_follow_records() {
        let host = editor_host();
        let adapter = LanguageServiceAdapter::builder(
            host,
            Arc::new(PluginManager::new().with_plugin(FnPlugin::new(
                "v",
                |id, _| id == "virtual:count",
                |_, _, _| Ok("export const count: number = 1;".to_string()),
            ))),
            "/app",
        )
        .with_debounce(Duration::ZERO)
        .attach();

        let before = adapter.project_version().expect("memory host is versioned");
        let resolved = adapter
            .resolve_module_name_literals(&[ModuleNameLiteral::new("virtual:count", 22, 37)], Path::new(MAIN))
            .expect("attached");
        let virtual_file = resolved[0].resolved_module.clone().expect("virtual").resolved_file_name;
        assert_ne!(adapter.project_version().as_deref(), Some(before.as_str()));
        assert_eq!(adapter.script_version(&virtual_file).as_deref(), Some("1"));
        assert!(adapter.file_exists(&virtual_file));

        adapter.dispose();
        assert_eq!(adapter.script_version(&virtual_file), None);
        assert!(adapter.script_snapshot(&virtual_file).is_none());
    }

    #[test]
    fn test_errors_tracked_per_importer_until_resolved() {
        let host = editor_host();
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = fail.clone();
        let manager = PluginManager::new().with_plugin(FnPlugin::new(
            "flaky",
            |id, _| id == "virtual:count",
            move |_, _, _| {
                if flag.load(Ordering::SeqCst) {
                    Err("not yet".into())
                } else {
                    Ok("export const count: number = 0;".to_string())
                }
            },
        ));
        let adapter = LanguageServiceAdapter::builder(host, Arc::new(manager), "/app").attach();
        let literals = [ModuleNameLiteral::new("virtual:count", 22, 37)];

        adapter.resolve_module_name_literals(&literals, Path::new(MAIN));
        let errors = adapter.resolution_errors(Path::new(MAIN));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "virtual:count");
        assert_eq!(errors[0].1.code, VirtualModuleDiagnosticCode::PluginBuildThrew);

        // The same failure again leaves the project version alone.
        let version = adapter.project_version();
        adapter.resolve_module_name_literals(&literals, Path::new(MAIN));
        assert_eq!(adapter.project_version(), version);

        fail.store(false, Ordering::SeqCst);
        adapter.resolve_module_name_literals(&literals, Path::new(MAIN));
        assert!(adapter.resolution_errors(Path::new(MAIN)).is_empty());
    }

    #[test]
    fn test_plugin_reads_plain_host_program() {
        let service = create_language_service_plugin(
            PluginCreateInfo::new(editor_host(), counting_exports(), "/app"),
        );

        let diagnostics = service.diagnostics(Path::new(MAIN));
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let adapter = service.host();
        assert!(adapter.resolution_errors(Path::new(MAIN)).is_empty());

        let record = adapter.store().expect("attached").records().pop().expect("record");
        assert_eq!(&*record.source_text, "export const count: number = 2;");
        assert_eq!(
            record.dependencies,
            vec![DependencyDescriptor::file("/app/src/model.ts")]
        );

        let program = service.source_program().expect("program");
        assert!(Arc::ptr_eq(&program, &service.source_program().expect("program")));
    }

    #[test]
    fn test_rebuild_after_edit_reads_current_types() {
        let host = editor_host();
        let service = create_language_service_plugin(PluginCreateInfo {
            debounce: Duration::ZERO,
            ..PluginCreateInfo::new(host.clone(), counting_exports(), "/app")
        });
        assert!(service.diagnostics(Path::new(MAIN)).is_empty());

        host.write(
            "/app/src/model.ts",
            "export interface A { a: string }\nexport type B = number;\nexport const c: number = 1;\n",
        );
        let adapter = service.host();
        adapter
            .store()
            .expect("attached")
            .mark_changed(&DependencyDescriptor::file("/app/src/model.ts"));

        let diagnostics = service.diagnostics(Path::new(MAIN));
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let record = adapter.store().expect("attached").records().pop().expect("record");
        assert!(!record.stale);
        assert_eq!(record.version, 2);
        assert_eq!(&*record.source_text, "export const count: number = 3;");
    }

    #[test]
    fn test_stale_dependency_moves_project_version() {
        let service = create_language_service_plugin(PluginCreateInfo {
            debounce: Duration::ZERO,
            ..PluginCreateInfo::new(editor_host(), counting_exports(), "/app")
        });
        service.diagnostics(Path::new(MAIN));
        service.diagnostics(Path::new(MAIN));
        let adapter = service.host();
        let version = adapter.project_version();

        adapter
            .store()
            .expect("attached")
            .mark_changed(&DependencyDescriptor::file("/app/src/model.ts"));
        assert_ne!(adapter.project_version(), version);

        let record = adapter.store().expect("attached").records().pop().expect("record");
        assert!(record.stale);
        assert_eq!(
            adapter.script_version(&record.virtual_file_name).as_deref(),
            Some((record.version + 1).to_string().as_str())
        );
    }
}
