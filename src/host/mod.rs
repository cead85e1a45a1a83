//! Compiler and language-service host seams.
//!
//! A compiler drives everything through its host: which files exist, what
//! they contain, and where an import points. Virtual modules are made visible
//! by wrapping a host in an adapter that answers those questions for
//! synthetic files and delegates everything else.
//!
//! ```text
//! ┌──────────────┐   resolve / read    ┌────────────────────────┐
//! │ SourceProgram│ ──────────────────► │ CompilerHostAdapter<H> │
//! └──────────────┘                     │   virtual? ─► store    │
//!                                      │   else     ─► H        │
//!                                      └────────────────────────┘
//! ```
//!
//! Optional host members are modelled as methods returning `Option`, where
//! `None` means the member is absent and the caller falls back to built-in
//! behavior.

mod attach;
mod compiler;
mod disk;
mod language;
mod memory;
mod resolve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use attach::DEFAULT_DEBOUNCE;
pub use compiler::{CompilerHostAdapter, CompilerHostAdapterBuilder};
pub use disk::DiskHost;
pub use language::{
    LanguageService, LanguageServiceAdapter, LanguageServiceAdapterBuilder, PluginCreateInfo,
    SourceLanguageService, create_language_service_plugin,
};
pub use memory::MemoryHost;
pub use resolve::{resolve_module_name, resolve_module_names_with};

use crate::plugin::VirtualModuleDiagnostic;
use crate::program::ProgramHost;

// =============================================================================
// Shared Types
// =============================================================================

/// A loaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path of the file.
    pub file_name: PathBuf,
    /// Full text.
    pub text: Arc<str>,
    /// Version string as reported by the host (`"0"` when unversioned).
    pub version: String,
}

impl SourceFile {
    /// Create an unversioned source file.
    pub fn new(file_name: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        Self {
            file_name: file_name.into(),
            text: text.into(),
            version: "0".to_string(),
        }
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Extension of a resolved module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `.ts`
    Ts,
    /// `.tsx`
    Tsx,
    /// `.d.ts`
    Dts,
    /// `.js` and friends.
    Js,
}

impl Extension {
    /// Classify a path.
    pub fn from_path(path: &Path) -> Self {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".d.ts") {
            Self::Dts
        } else if name.ends_with(".tsx") {
            Self::Tsx
        } else if name.ends_with(".ts") {
            Self::Ts
        } else {
            Self::Js
        }
    }

    /// Extension text including the dot.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ts => ".ts",
            Self::Tsx => ".tsx",
            Self::Dts => ".d.ts",
            Self::Js => ".js",
        }
    }
}

/// Where an import resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    /// Resolved file.
    pub resolved_file_name: PathBuf,
    /// Its extension.
    pub extension: Extension,
    /// Whether it came from `node_modules`.
    pub is_external_library_import: bool,
}

impl ResolvedModule {
    /// A project-local module.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            extension: Extension::from_path(&path),
            resolved_file_name: path,
            is_external_library_import: false,
        }
    }
}

/// Full result of resolving one import literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedModuleWithFailedLookups {
    /// The resolution, if any.
    pub resolved_module: Option<ResolvedModule>,
    /// Paths probed without success.
    pub failed_lookup_locations: Vec<PathBuf>,
    /// Virtual-module failures to report on the importing file.
    pub resolution_diagnostics: Vec<VirtualModuleDiagnostic>,
}

impl ResolvedModuleWithFailedLookups {
    /// Wrap a plain resolution.
    pub fn from_resolved(resolved_module: Option<ResolvedModule>) -> Self {
        Self {
            resolved_module,
            ..Self::default()
        }
    }
}

/// An import specifier as written, with its byte range in the importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNameLiteral {
    /// Specifier text.
    pub text: String,
    /// Start offset (inclusive).
    pub start: u32,
    /// End offset (exclusive).
    pub end: u32,
}

impl ModuleNameLiteral {
    /// Create a literal.
    pub fn new(text: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

// =============================================================================
// Host Traits
// =============================================================================

/// The file-system and resolution surface a batch compiler talks to.
pub trait CompilerHost: Send + Sync {
    /// Whether a file exists.
    fn file_exists(&self, path: &Path) -> bool;

    /// Read a file's text.
    fn read_file(&self, path: &Path) -> Option<String>;

    /// Load a source file.
    fn get_source_file(&self, path: &Path) -> Option<SourceFile>;

    /// Load a source file by its normalized path.
    fn get_source_file_by_path(&self, path: &Path) -> Option<SourceFile> {
        self.get_source_file(path)
    }

    /// Optional: resolve plain module names.
    fn resolve_module_names(
        &self,
        _names: &[String],
        _containing_file: &Path,
    ) -> Option<Vec<Option<ResolvedModule>>> {
        None
    }

    /// Optional: resolve import literals.
    fn resolve_module_name_literals(
        &self,
        _literals: &[ModuleNameLiteral],
        _containing_file: &Path,
    ) -> Option<Vec<ResolvedModuleWithFailedLookups>> {
        None
    }

    /// Optional: whether cached resolutions for `path` must be discarded.
    fn has_invalidated_resolutions(&self, _path: &Path) -> Option<bool> {
        None
    }
}

impl<H: CompilerHost + ?Sized> CompilerHost for Arc<H> {
    fn file_exists(&self, path: &Path) -> bool {
        (**self).file_exists(path)
    }
    fn read_file(&self, path: &Path) -> Option<String> {
        (**self).read_file(path)
    }
    fn get_source_file(&self, path: &Path) -> Option<SourceFile> {
        (**self).get_source_file(path)
    }
    fn get_source_file_by_path(&self, path: &Path) -> Option<SourceFile> {
        (**self).get_source_file_by_path(path)
    }
    fn resolve_module_names(
        &self,
        names: &[String],
        containing_file: &Path,
    ) -> Option<Vec<Option<ResolvedModule>>> {
        (**self).resolve_module_names(names, containing_file)
    }
    fn resolve_module_name_literals(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Option<Vec<ResolvedModuleWithFailedLookups>> {
        (**self).resolve_module_name_literals(literals, containing_file)
    }
    fn has_invalidated_resolutions(&self, path: &Path) -> Option<bool> {
        (**self).has_invalidated_resolutions(path)
    }
}

/// The surface an editor's language service talks to.
pub trait LanguageServiceHost: Send + Sync {
    /// Root script files of the project.
    fn script_file_names(&self) -> Vec<PathBuf>;

    /// Version of a script, changing whenever its text changes.
    fn script_version(&self, path: &Path) -> Option<String>;

    /// Current text of a script.
    fn script_snapshot(&self, path: &Path) -> Option<Arc<str>>;

    /// Whether a file exists.
    fn file_exists(&self, path: &Path) -> bool;

    /// Read a file's text.
    fn read_file(&self, path: &Path) -> Option<String>;

    /// Optional: resolve plain module names.
    fn resolve_module_names(
        &self,
        _names: &[String],
        _containing_file: &Path,
    ) -> Option<Vec<Option<ResolvedModule>>> {
        None
    }

    /// Optional: resolve import literals.
    fn resolve_module_name_literals(
        &self,
        _literals: &[ModuleNameLiteral],
        _containing_file: &Path,
    ) -> Option<Vec<ResolvedModuleWithFailedLookups>> {
        None
    }

    /// Optional: a version for the whole project.
    fn project_version(&self) -> Option<String> {
        None
    }
}

impl<H: LanguageServiceHost + ?Sized> LanguageServiceHost for Arc<H> {
    fn script_file_names(&self) -> Vec<PathBuf> {
        (**self).script_file_names()
    }
    fn script_version(&self, path: &Path) -> Option<String> {
        (**self).script_version(path)
    }
    fn script_snapshot(&self, path: &Path) -> Option<Arc<str>> {
        (**self).script_snapshot(path)
    }
    fn file_exists(&self, path: &Path) -> bool {
        (**self).file_exists(path)
    }
    fn read_file(&self, path: &Path) -> Option<String> {
        (**self).read_file(path)
    }
    fn resolve_module_names(
        &self,
        names: &[String],
        containing_file: &Path,
    ) -> Option<Vec<Option<ResolvedModule>>> {
        (**self).resolve_module_names(names, containing_file)
    }
    fn resolve_module_name_literals(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Option<Vec<ResolvedModuleWithFailedLookups>> {
        (**self).resolve_module_name_literals(literals, containing_file)
    }
    fn project_version(&self) -> Option<String> {
        (**self).project_version()
    }
}

// =============================================================================
// Program Construction Bridges
// =============================================================================

/// Builds programs through a [`CompilerHost`].
pub struct CompilerProgramHost<'a, H: ?Sized>(pub &'a H);

impl<H: CompilerHost + ?Sized> ProgramHost for CompilerProgramHost<'_, H> {
    fn source_text(&self, path: &Path) -> Option<Arc<str>> {
        self.0.get_source_file(path).map(|file| file.text)
    }

    fn resolve_modules(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Vec<ResolvedModuleWithFailedLookups> {
        if let Some(results) = self.0.resolve_module_name_literals(literals, containing_file) {
            return results;
        }
        resolve_module_names_with(
            literals,
            containing_file,
            |names| self.0.resolve_module_names(names, containing_file),
            |path| self.0.file_exists(path),
        )
    }
}

/// Builds programs through a [`LanguageServiceHost`].
pub struct LanguageServiceProgramHost<'a, H: ?Sized>(pub &'a H);

impl<H: LanguageServiceHost + ?Sized> ProgramHost for LanguageServiceProgramHost<'_, H> {
    fn source_text(&self, path: &Path) -> Option<Arc<str>> {
        self.0
            .script_snapshot(path)
            .or_else(|| self.0.read_file(path).map(Arc::from))
    }

    fn resolve_modules(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Vec<ResolvedModuleWithFailedLookups> {
        if let Some(results) = self.0.resolve_module_name_literals(literals, containing_file) {
            return results;
        }
        resolve_module_names_with(
            literals,
            containing_file,
            |names| self.0.resolve_module_names(names, containing_file),
            |path| self.0.file_exists(path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_path() {
        assert_eq!(Extension::from_path(Path::new("/a/b.d.ts")), Extension::Dts);
        assert_eq!(Extension::from_path(Path::new("/a/b.tsx")), Extension::Tsx);
        assert_eq!(Extension::from_path(Path::new("/a/b.ts")), Extension::Ts);
        assert_eq!(Extension::from_path(Path::new("/a/b.mjs")), Extension::Js);
        assert_eq!(Extension::Dts.as_str(), ".d.ts");
    }
}
