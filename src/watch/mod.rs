//! File watching seam.
//!
//! The store never polls: it registers callbacks through a [`WatchHost`] and
//! expects push notifications. Editors forward their own file events through
//! [`PushWatchHost`]; standalone tools can use the `notify`-backed
//! `NotifyWatchHost` (feature `notify-watch`).

mod push;
#[cfg(feature = "notify-watch")]
mod native;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

#[cfg(feature = "notify-watch")]
pub use native::NotifyWatchHost;
pub use push::PushWatchHost;

/// Invoked with the path that changed.
pub type WatchCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Why a watch could not be registered.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The backend refused the path.
    #[error("cannot watch `{}`: {message}", .path.display())]
    Backend {
        /// Path that was to be watched.
        path: PathBuf,
        /// Backend message.
        message: String,
    },

    /// The host has been shut down.
    #[error("watch host is closed")]
    Closed,
}

/// A live registration. Dropping the handle also closes it.
pub trait WatchHandle: Send {
    /// Stop delivering events. Idempotent.
    fn close(&mut self);
}

/// Registers file and directory watches.
pub trait WatchHost: Send + Sync {
    /// Watch one file.
    fn watch_file(
        &self,
        path: &Path,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError>;

    /// Watch a directory's entries, optionally recursively.
    fn watch_directory(
        &self,
        path: &Path,
        recursive: bool,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError>;
}

impl<W: WatchHost + ?Sized> WatchHost for Arc<W> {
    fn watch_file(
        &self,
        path: &Path,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        (**self).watch_file(path, callback)
    }

    fn watch_directory(
        &self,
        path: &Path,
        recursive: bool,
        callback: WatchCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        (**self).watch_directory(path, recursive, callback)
    }
}
