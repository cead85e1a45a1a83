//! The virtual record store: cache, invalidation and lazy rebuild.
//!
//! ```text
//!                       get_or_build_record(id, importer)
//!                                   │
//!     evict records whose importer is gone (should_evict)
//!                                   │
//!               key = virtual_key(id, importer)
//!                 ┌─────────────────┴──────────────────┐
//!          fresh record                        missing / stale
//!          (cache hit)                 resolver.resolve_module(...)
//!                                                      │
//!                                  record v+1, index by key + file name,
//!                                  watch every new dependency once
//!
//! watcher ─► descriptor dirty ─► (debounce window) ─► dependents stale
//! ```
//!
//! Stale records are never rebuilt by the watcher itself; the next read
//! ([`VirtualRecordStore::get_or_build_record`] or
//! [`VirtualRecordStore::rebuild_if_stale`]) rebuilds them.

mod core;
mod debounce;
mod record;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use self::core::VirtualRecordStore;
pub use record::{ResolveRecordResult, VirtualModuleRecord};

use crate::type_info::SessionFactory;
use crate::watch::WatchHost;

/// Callback receiving a record at a lifecycle point.
pub type RecordHook = Arc<dyn Fn(&VirtualModuleRecord) + Send + Sync>;

/// Decides whether records imported by `importer` should be dropped.
pub type EvictPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Lifecycle callbacks. Each runs outside the store's lock.
#[derive(Clone, Default)]
pub struct StoreHooks {
    /// A record was marked stale.
    pub on_mark_stale: Option<RecordHook>,
    /// A record was built or rebuilt.
    pub on_record_resolved: Option<RecordHook>,
    /// A record was evicted.
    pub on_evict_record: Option<RecordHook>,
}

impl StoreHooks {
    fn fire(hook: &Option<RecordHook>, record: &VirtualModuleRecord) {
        if let Some(hook) = hook {
            hook(record);
        }
    }
}

/// Store configuration.
///
/// # Example
///
/// ```ignore
/// let options = StoreOptions::new()
///     .with_debounce(Duration::from_millis(50))
///     .with_watch_host(Arc::new(NotifyWatchHost::new()))
///     .with_eviction(|importer| !Path::new(importer).exists());
/// let store = VirtualRecordStore::new(Arc::new(manager), options);
/// ```
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Window over which watcher events are batched. Zero propagates
    /// staleness synchronously inside the watcher callback.
    pub debounce: Duration,
    /// Where dependency watches are registered. Without one, records only
    /// go stale through [`VirtualRecordStore::mark_changed`].
    pub watch_host: Option<Arc<dyn WatchHost>>,
    /// Session factory passed to the resolver.
    pub session_factory: Option<SessionFactory>,
    /// Eviction predicate checked before every lookup.
    pub should_evict: Option<EvictPredicate>,
    /// Lifecycle callbacks.
    pub hooks: StoreHooks,
}

impl StoreOptions {
    /// Default options: no debounce, no watching, no eviction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the watch host.
    pub fn with_watch_host(mut self, host: Arc<dyn WatchHost>) -> Self {
        self.watch_host = Some(host);
        self
    }

    /// Set the session factory.
    pub fn with_session_factory(mut self, factory: Option<SessionFactory>) -> Self {
        self.session_factory = factory;
        self
    }

    /// Set the eviction predicate.
    pub fn with_eviction(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.should_evict = Some(Arc::new(predicate));
        self
    }

    /// Set the stale hook.
    pub fn on_mark_stale(mut self, hook: impl Fn(&VirtualModuleRecord) + Send + Sync + 'static) -> Self {
        self.hooks.on_mark_stale = Some(Arc::new(hook));
        self
    }

    /// Set the resolved hook.
    pub fn on_record_resolved(
        mut self,
        hook: impl Fn(&VirtualModuleRecord) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_record_resolved = Some(Arc::new(hook));
        self
    }

    /// Set the eviction hook.
    pub fn on_evict_record(
        mut self,
        hook: impl Fn(&VirtualModuleRecord) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_evict_record = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("debounce", &self.debounce)
            .field("watch_host", &self.watch_host.is_some())
            .field("session_factory", &self.session_factory.is_some())
            .field("should_evict", &self.should_evict.is_some())
            .finish_non_exhaustive()
    }
}
