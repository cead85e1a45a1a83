//! Per-build sessions and the factories that create them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::api::ProgramTypeInfoApi;
use super::{DirectoryOptions, FileOptions, TypeInfoApi, TypeInfoError, TypeInfoOptions};
use crate::plugin::PluginError;
use crate::program::Program;
use crate::types::{DependencyDescriptor, ExportedType, FileSnapshot, TypeTargetSpec};

// =============================================================================
// DependencyTracker
// =============================================================================

#[derive(Debug, Default)]
struct TrackerState {
    dependencies: Vec<DependencyDescriptor>,
    seen: FxHashSet<DependencyDescriptor>,
    warnings: Vec<String>,
}

/// Dependencies and warnings collected while a plugin builds.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    state: Mutex<TrackerState>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dependency (duplicates are ignored).
    pub fn record(&self, dependency: DependencyDescriptor) {
        let mut state = self.state.lock();
        if state.seen.insert(dependency.clone()) {
            state.dependencies.push(dependency);
        }
    }

    /// Record a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.state.lock().warnings.push(message.into());
    }

    /// Take every dependency recorded so far.
    pub fn drain_dependencies(&self) -> Vec<DependencyDescriptor> {
        let mut state = self.state.lock();
        state.seen.clear();
        std::mem::take(&mut state.dependencies)
    }

    /// Take every warning recorded so far.
    pub fn drain_warnings(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().warnings)
    }
}

// =============================================================================
// TypeInfoApiSession
// =============================================================================

/// An API instance plus the dependency set it feeds.
///
/// One session serves exactly one plugin build.
pub struct TypeInfoApiSession {
    api: Arc<dyn TypeInfoApi>,
    tracker: Arc<DependencyTracker>,
}

impl TypeInfoApiSession {
    /// Pair an API with the tracker it records into.
    pub fn new(api: Arc<dyn TypeInfoApi>, tracker: Arc<DependencyTracker>) -> Self {
        Self { api, tracker }
    }

    /// A session for resolvers without type awareness: every lookup fails
    /// with `unavailable`.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(UnavailableApi), Arc::new(DependencyTracker::new()))
    }

    /// The API handed to `build`.
    pub fn api(&self) -> &dyn TypeInfoApi {
        self.api.as_ref()
    }

    /// Drain the dependencies recorded since the last call.
    pub fn consume_dependencies(&self) -> Vec<DependencyDescriptor> {
        self.tracker.drain_dependencies()
    }

    /// Drain the warnings recorded since the last call.
    pub fn consume_warnings(&self) -> Vec<String> {
        self.tracker.drain_warnings()
    }
}

impl fmt::Debug for TypeInfoApiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfoApiSession")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

struct UnavailableApi;

impl TypeInfoApi for UnavailableApi {
    fn file(&self, _relative_path: &str, _options: &FileOptions) -> Result<FileSnapshot, TypeInfoError> {
        Err(TypeInfoError::unavailable())
    }

    fn directory(&self, _patterns: &[&str], _options: &DirectoryOptions) -> Vec<FileSnapshot> {
        Vec::new()
    }

    fn resolve_export(
        &self,
        _relative_path: &str,
        _export_name: &str,
        _options: &FileOptions,
    ) -> Result<Option<ExportedType>, TypeInfoError> {
        Err(TypeInfoError::unavailable())
    }

    fn is_assignable_to(&self, _exported: &ExportedType, _target_id: &str) -> bool {
        false
    }
}

// =============================================================================
// SessionFactory
// =============================================================================

type CreateSession =
    dyn Fn(&[TypeTargetSpec]) -> Result<TypeInfoApiSession, PluginError> + Send + Sync;

/// Creates one [`TypeInfoApiSession`] per plugin build.
///
/// The factory receives the winning plugin's type targets.
///
/// # Example
///
/// ```ignore
/// // Batch compile: one fixed program.
/// let factory = SessionFactory::for_program(program, TypeInfoOptions::default());
///
/// // Editor: fetch the current program on first use inside each session.
/// let service = service.clone();
/// let factory = SessionFactory::lazy(move || service.program(), TypeInfoOptions::default());
/// ```
#[derive(Clone)]
pub struct SessionFactory {
    create: Arc<CreateSession>,
}

impl SessionFactory {
    /// Wrap a custom constructor.
    pub fn new(
        create: impl Fn(&[TypeTargetSpec]) -> Result<TypeInfoApiSession, PluginError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            create: Arc::new(create),
        }
    }

    /// Sessions bound to one fixed program.
    pub fn for_program(program: Arc<dyn Program>, options: TypeInfoOptions) -> Self {
        Self::new(move |targets| {
            let tracker = Arc::new(DependencyTracker::new());
            let api = ProgramTypeInfoApi::new(program.clone(), tracker.clone())
                .with_options(options)
                .with_type_targets(targets.to_vec());
            Ok(TypeInfoApiSession::new(Arc::new(api), tracker))
        })
    }

    /// Sessions that ask `provider` for the current program the first time
    /// their API is used. A provider returning `None` makes the session's
    /// lookups fail with `unavailable`.
    pub fn lazy(
        provider: impl Fn() -> Option<Arc<dyn Program>> + Send + Sync + 'static,
        options: TypeInfoOptions,
    ) -> Self {
        let provider: Arc<dyn Fn() -> Option<Arc<dyn Program>> + Send + Sync> = Arc::new(provider);
        Self::new(move |targets| {
            let tracker = Arc::new(DependencyTracker::new());
            let api = ProgramTypeInfoApi::lazy(provider.clone(), tracker.clone())
                .with_options(options)
                .with_type_targets(targets.to_vec());
            Ok(TypeInfoApiSession::new(Arc::new(api), tracker))
        })
    }

    /// Create a session.
    pub fn create(&self, type_targets: &[TypeTargetSpec]) -> Result<TypeInfoApiSession, PluginError> {
        (self.create)(type_targets)
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_info::TypeInfoErrorCode;

    #[test]
    fn test_tracker_dedups_and_drains_once() {
        let tracker = DependencyTracker::new();
        tracker.record(DependencyDescriptor::file("/a.ts"));
        tracker.record(DependencyDescriptor::file("/a.ts"));
        tracker.record(DependencyDescriptor::glob("/d", "*.ts", false));

        assert_eq!(tracker.drain_dependencies().len(), 2);
        assert!(tracker.drain_dependencies().is_empty());

        tracker.record(DependencyDescriptor::file("/a.ts"));
        assert_eq!(tracker.drain_dependencies().len(), 1);
    }

    #[test]
    fn test_unavailable_session() {
        let session = TypeInfoApiSession::unavailable();
        let err = session.api().file("a.ts", &FileOptions::new("/p")).unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::Unavailable);
        assert!(session.api().directory(&["*.ts"], &DirectoryOptions::new("/p")).is_empty());
        assert!(session.consume_dependencies().is_empty());
    }

    #[test]
    fn test_lazy_provider_runs_on_first_use() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = SessionFactory::lazy(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            },
            TypeInfoOptions::default(),
        );

        let session = factory.create(&[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = session.api().file("a.ts", &FileOptions::new("/p")).unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::Unavailable);
        let _ = session.api().file("b.ts", &FileOptions::new("/p"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
