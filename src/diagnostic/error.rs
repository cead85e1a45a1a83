//! Compilation error type.

use std::path::PathBuf;

use thiserror::Error;

use super::info::Diagnostics;
use crate::config::ConfigError;

/// Error type for batch compilation failures.
///
/// Diagnostics in user code are *not* errors at this level: they are
/// reported through [`CompileOutput`](crate::compile::CompileOutput). This
/// type covers failures that prevent a compilation from producing output.
///
/// # Example
///
/// ```ignore
/// match compile(&options) {
///     Ok(output) if output.diagnostics.has_errors() => { /* report */ }
///     Ok(_) => { /* success */ }
///     Err(CompileError::NoRootFiles) => eprintln!("nothing to compile"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum CompileError {
    /// No root files were given.
    #[error("no root files to compile")]
    NoRootFiles,

    /// A root file is missing.
    #[error("root file not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Compilation produced errors and the caller asked for them as `Err`.
    #[error("{diagnostics}")]
    Diagnostics {
        /// The collected diagnostics.
        diagnostics: Diagnostics,
    },
}

impl CompileError {
    /// Get the diagnostics if this is a diagnostics error.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Diagnostics { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}
