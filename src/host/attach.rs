//! Behavior shared by the compiler and language-service adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{ModuleNameLiteral, ResolvedModule, ResolvedModuleWithFailedLookups};
use crate::path::lexical_join;
use crate::plugin::VirtualModuleResolver;
use crate::store::{ResolveRecordResult, StoreHooks, StoreOptions, VirtualModuleRecord, VirtualRecordStore};
use crate::type_info::SessionFactory;
use crate::watch::WatchHost;

/// Default debounce window for adapters.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Options both adapter builders collect.
#[derive(Clone)]
pub(super) struct AdapterOptions {
    pub(super) resolver: Arc<dyn VirtualModuleResolver>,
    pub(super) project_root: PathBuf,
    pub(super) session_factory: Option<SessionFactory>,
    pub(super) watch_host: Option<Arc<dyn WatchHost>>,
    pub(super) debounce: Duration,
}

impl AdapterOptions {
    pub(super) fn new(resolver: Arc<dyn VirtualModuleResolver>, project_root: PathBuf) -> Self {
        Self {
            resolver,
            project_root,
            session_factory: None,
            watch_host: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Create the store. `importer_exists` must be the wrapped host's own
    /// check, not the adapter's.
    pub(super) fn attach(
        self,
        importer_exists: impl Fn(&Path) -> bool + Send + Sync + 'static,
        hooks: StoreHooks,
    ) -> Attachment {
        let mut options = StoreOptions::new()
            .with_debounce(self.debounce)
            .with_session_factory(self.session_factory)
            .with_eviction(move |importer| !importer_exists(Path::new(importer)));
        options.hooks = hooks;
        if let Some(watch_host) = self.watch_host {
            options = options.with_watch_host(watch_host);
        }
        Attachment {
            store: VirtualRecordStore::new(self.resolver, options),
            project_root: self.project_root,
        }
    }
}

/// A live store plus the root relative importers are anchored at.
#[derive(Clone)]
pub(super) struct Attachment {
    pub(super) store: VirtualRecordStore,
    pub(super) project_root: PathBuf,
}

impl Attachment {
    pub(super) fn importer(&self, containing_file: &Path) -> String {
        if containing_file.is_absolute() {
            containing_file.to_string_lossy().into_owned()
        } else {
            lexical_join(&self.project_root, containing_file)
                .to_string_lossy()
                .into_owned()
        }
    }

    /// The current record behind a synthetic file, rebuilt if stale.
    pub(super) fn virtual_record(&self, path: &Path) -> Option<VirtualModuleRecord> {
        self.store.rebuild_if_stale(path)
    }

    pub(super) fn is_virtual(&self, path: &Path) -> bool {
        self.store.is_virtual_file(path)
    }

    /// Resolve literals through the store; the rest go to `fallback` in one
    /// batch. `observe` sees every store outcome.
    pub(super) fn resolve_literals(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
        mut observe: impl FnMut(&str, &ResolveRecordResult),
        fallback: impl FnOnce(&[ModuleNameLiteral]) -> Vec<ResolvedModuleWithFailedLookups>,
    ) -> Vec<ResolvedModuleWithFailedLookups> {
        let importer = self.importer(containing_file);
        let mut results: Vec<Option<ResolvedModuleWithFailedLookups>> = Vec::with_capacity(literals.len());
        let mut deferred = Vec::new();

        for literal in literals {
            let outcome = self.store.get_or_build_record(&literal.text, &importer);
            observe(&literal.text, &outcome);
            results.push(match outcome {
                ResolveRecordResult::Resolved(record) => Some(ResolvedModuleWithFailedLookups::from_resolved(
                    Some(ResolvedModule::local(record.virtual_file_name)),
                )),
                ResolveRecordResult::Error(diagnostic) => Some(ResolvedModuleWithFailedLookups {
                    resolution_diagnostics: vec![diagnostic],
                    ..Default::default()
                }),
                ResolveRecordResult::Unresolved => {
                    deferred.push(literal.clone());
                    None
                }
            });
        }

        let mut resolved = if deferred.is_empty() {
            Vec::new()
        } else {
            fallback(&deferred)
        }
        .into_iter();
        results
            .into_iter()
            .map(|result| result.unwrap_or_else(|| resolved.next().unwrap_or_default()))
            .collect()
    }

    /// Name-based form of [`resolve_literals`](Self::resolve_literals).
    /// Failed virtual modules resolve to `None`.
    pub(super) fn resolve_names(
        &self,
        names: &[String],
        containing_file: &Path,
        fallback: impl FnOnce(&[String]) -> Vec<Option<ResolvedModule>>,
    ) -> Vec<Option<ResolvedModule>> {
        let importer = self.importer(containing_file);
        let mut results: Vec<Option<Option<ResolvedModule>>> = Vec::with_capacity(names.len());
        let mut deferred = Vec::new();

        for name in names {
            results.push(match self.store.get_or_build_record(name, &importer) {
                ResolveRecordResult::Resolved(record) => {
                    Some(Some(ResolvedModule::local(record.virtual_file_name)))
                }
                ResolveRecordResult::Error(diagnostic) => {
                    tracing::debug!(name, %diagnostic, "virtual module failed; no diagnostic channel for name resolution");
                    Some(None)
                }
                ResolveRecordResult::Unresolved => {
                    deferred.push(name.clone());
                    None
                }
            });
        }

        let mut resolved = if deferred.is_empty() {
            Vec::new()
        } else {
            fallback(&deferred)
        }
        .into_iter();
        results
            .into_iter()
            .map(|result| result.unwrap_or_else(|| resolved.next().flatten()))
            .collect()
    }
}
