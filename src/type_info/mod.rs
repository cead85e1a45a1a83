//! Structural type introspection handed to plugins.
//!
//! A plugin's `build` receives a [`TypeInfoApi`] bound to the program the
//! importer is being compiled in. It can read the exports of project files
//! as serialized [`TypeNode`](crate::types::TypeNode)s and classify them
//! against named type targets without matching on text.
//!
//! ```text
//! plugin.build(id, importer, api)
//!     │
//!     ├─ api.file("./routes/home.ts", base)      ─► FileSnapshot   + File dep
//!     ├─ api.directory(["*.ts"], base, watch)    ─► [FileSnapshot] + Glob dep
//!     └─ api.is_assignable_to(export, "Route")   ─► bool
//!
//! session.consume_dependencies()  ─► drained once per build
//! ```
//!
//! Every path is resolved against an explicit base directory and must stay
//! inside it (see [`crate::path::resolve_within`]).

mod api;
mod serialize;
mod session;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub use api::ProgramTypeInfoApi;
pub use session::{DependencyTracker, SessionFactory, TypeInfoApiSession};

use crate::path::PathError;
use crate::types::{ExportedType, FileSnapshot};

/// Default for [`TypeInfoOptions::max_type_depth`].
pub const DEFAULT_MAX_TYPE_DEPTH: usize = 8;

// =============================================================================
// Errors
// =============================================================================

/// Closed set of TypeInfo failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeInfoErrorCode {
    /// Empty path, NUL byte, or unusable base directory.
    InvalidInput,
    /// The path resolves outside its base directory.
    PathEscapesBase,
    /// The file exists but is not part of the bound program.
    FileNotInProgram,
    /// No program is bound to this session.
    Unavailable,
}

impl TypeInfoErrorCode {
    /// Wire form of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid-input",
            Self::PathEscapesBase => "path-escapes-base",
            Self::FileNotInProgram => "file-not-in-program",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for TypeInfoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed TypeInfo call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct TypeInfoError {
    /// Failure code.
    pub code: TypeInfoErrorCode,
    /// Details.
    pub message: String,
}

impl TypeInfoError {
    /// Create an error.
    pub fn new(code: TypeInfoErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self::new(
            TypeInfoErrorCode::Unavailable,
            "type information is not available to this resolver",
        )
    }
}

impl From<PathError> for TypeInfoError {
    fn from(err: PathError) -> Self {
        let code = match err {
            PathError::InvalidInput(_) => TypeInfoErrorCode::InvalidInput,
            PathError::EscapesBase { .. } => TypeInfoErrorCode::PathEscapesBase,
        };
        Self::new(code, err.to_string())
    }
}

// =============================================================================
// Options
// =============================================================================

/// Options for [`TypeInfoApi::file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    /// Directory `relative_path` is resolved against.
    pub base_dir: PathBuf,
}

impl FileOptions {
    /// Resolve against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

/// Options for [`TypeInfoApi::directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryOptions {
    /// Directory patterns are matched beneath.
    pub base_dir: PathBuf,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Record a glob dependency per pattern, so new and removed files
    /// invalidate the record.
    pub watch: bool,
}

impl DirectoryOptions {
    /// Non-recursive, unwatched scan of `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            recursive: false,
            watch: false,
        }
    }

    /// Set recursion.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set watching.
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }
}

/// Tuning for program-backed APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfoOptions {
    /// Nesting depth beyond which structural types become `reference` nodes.
    /// `0` keeps only the exported type itself expanded.
    pub max_type_depth: usize,
}

impl Default for TypeInfoOptions {
    fn default() -> Self {
        Self {
            max_type_depth: DEFAULT_MAX_TYPE_DEPTH,
        }
    }
}

impl TypeInfoOptions {
    /// Set the serialization depth bound.
    pub fn with_max_type_depth(mut self, depth: usize) -> Self {
        self.max_type_depth = depth;
        self
    }
}

// =============================================================================
// TypeInfoApi
// =============================================================================

/// What a plugin may ask about the program it is building for.
pub trait TypeInfoApi: Send + Sync {
    /// Snapshot the exports of one file.
    fn file(&self, relative_path: &str, options: &FileOptions) -> Result<FileSnapshot, TypeInfoError>;

    /// Snapshot every file matching `patterns` beneath `options.base_dir`,
    /// sorted by path. Files that fail are skipped with a session warning.
    /// Returns `[]` when the base directory is empty or unusable.
    fn directory(&self, patterns: &[&str], options: &DirectoryOptions) -> Vec<FileSnapshot>;

    /// Look up a single export. `Ok(None)` when the file has no such export.
    fn resolve_export(
        &self,
        relative_path: &str,
        export_name: &str,
        options: &FileOptions,
    ) -> Result<Option<ExportedType>, TypeInfoError>;

    /// Whether `exported` is assignable to the type target registered as
    /// `target_id`. `false` when either side is unknown.
    fn is_assignable_to(&self, exported: &ExportedType, target_id: &str) -> bool;
}

/// Convenience: base directory of an importer path.
pub fn importer_dir(importer: &str) -> PathBuf {
    Path::new(importer)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_errors_map_to_codes() {
        let err: TypeInfoError = PathError::InvalidInput("x".into()).into();
        assert_eq!(err.code, TypeInfoErrorCode::InvalidInput);

        let err: TypeInfoError = PathError::EscapesBase {
            path: "/x".into(),
            base: "/b".into(),
        }
        .into();
        assert_eq!(err.code, TypeInfoErrorCode::PathEscapesBase);
        assert!(err.to_string().starts_with("path-escapes-base: "));
    }

    #[test]
    fn test_code_serializes_kebab_case() {
        let json = serde_json::to_string(&TypeInfoErrorCode::FileNotInProgram).unwrap();
        assert_eq!(json, "\"file-not-in-program\"");
    }

    #[test]
    fn test_importer_dir() {
        assert_eq!(importer_dir("/app/src/main.ts"), PathBuf::from("/app/src"));
        assert_eq!(importer_dir(""), PathBuf::new());
    }
}
