//! Virtual-module plugins and the manager that dispatches to them.
//!
//! ```text
//! resolve_module(id, importer)
//!     │
//!     ├─ validate id / importer                       ─► invalid-options
//!     ├─ for plugin in registration order:
//!     │     validate name                             ─► invalid-options
//!     │     should_resolve(id, importer)?             ─► plugin-should-resolve-threw
//!     │     first `true` wins ───────────────┐
//!     │                                      ▼
//!     │     session = factory.create(targets)         ─► session-creation-failed
//!     │     source = build(id, importer, api)         ─► plugin-build-threw
//!     │     validate source                           ─► invalid-build-output
//!     │     Resolved { source, dependencies }
//!     └─ no match                                     ─► Unresolved
//! ```
//!
//! Plugin callbacks run behind a panic guard: an `Err` and a panic map to
//! the same diagnostic, so one broken plugin never takes the compiler down.

mod loader;
mod manager;

use std::fmt;

use serde::Serialize;

pub use loader::{LoaderError, PluginContext, PluginFactory, PluginRegistry};
pub use manager::PluginManager;

use crate::type_info::{SessionFactory, TypeInfoApi};
use crate::types::{DependencyDescriptor, TypeTargetSpec};

/// Error type plugins return from their callbacks.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Plugin Contract
// =============================================================================

/// A source of synthetic modules.
///
/// # Example
///
/// ```ignore
/// struct Routes;
///
/// impl VirtualModulePlugin for Routes {
///     fn name(&self) -> &str { "routes" }
///
///     fn should_resolve(&self, id: &str, _importer: &str) -> Result<bool, PluginError> {
///         Ok(id == "virtual:routes")
///     }
///
///     fn build(&self, _id: &str, importer: &str, api: &dyn TypeInfoApi) -> Result<String, PluginError> {
///         let pages = api.directory(&["*.ts"], &DirectoryOptions::new(importer_dir(importer)).watch(true));
///         Ok(format!("export const count = {};", pages.len()))
///     }
/// }
/// ```
pub trait VirtualModulePlugin: Send + Sync {
    /// Unique, non-empty name used in diagnostics and file names.
    fn name(&self) -> &str;

    /// Whether this plugin handles `id` imported from `importer`.
    fn should_resolve(&self, id: &str, importer: &str) -> Result<bool, PluginError>;

    /// Produce TypeScript source for the module.
    fn build(&self, id: &str, importer: &str, api: &dyn TypeInfoApi) -> Result<String, PluginError>;

    /// Named types `api.is_assignable_to` can classify against.
    fn type_target_specs(&self) -> &[TypeTargetSpec] {
        &[]
    }
}

type ShouldResolveFn = dyn Fn(&str, &str) -> bool + Send + Sync;
type BuildFn = dyn Fn(&str, &str, &dyn TypeInfoApi) -> Result<String, PluginError> + Send + Sync;

/// A plugin assembled from closures.
pub struct FnPlugin {
    name: String,
    should_resolve: Box<ShouldResolveFn>,
    build: Box<BuildFn>,
    type_targets: Vec<TypeTargetSpec>,
}

impl FnPlugin {
    /// Create a plugin.
    pub fn new(
        name: impl Into<String>,
        should_resolve: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
        build: impl Fn(&str, &str, &dyn TypeInfoApi) -> Result<String, PluginError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            should_resolve: Box::new(should_resolve),
            build: Box::new(build),
            type_targets: Vec::new(),
        }
    }

    /// Declare type targets.
    pub fn with_type_targets(mut self, targets: Vec<TypeTargetSpec>) -> Self {
        self.type_targets = targets;
        self
    }
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .field("type_targets", &self.type_targets)
            .finish_non_exhaustive()
    }
}

impl VirtualModulePlugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_resolve(&self, id: &str, importer: &str) -> Result<bool, PluginError> {
        Ok((self.should_resolve)(id, importer))
    }

    fn build(&self, id: &str, importer: &str, api: &dyn TypeInfoApi) -> Result<String, PluginError> {
        (self.build)(id, importer, api)
    }

    fn type_target_specs(&self) -> &[TypeTargetSpec] {
        &self.type_targets
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Input to [`VirtualModuleResolver::resolve_module`].
#[derive(Debug, Clone, Copy)]
pub struct ResolveVirtualModuleOptions<'a> {
    /// Module specifier as written.
    pub id: &'a str,
    /// Absolute path of the importing file.
    pub importer: &'a str,
    /// Session factory; without one, plugins get an API whose lookups fail.
    pub create_type_info_api_session: Option<&'a SessionFactory>,
}

impl<'a> ResolveVirtualModuleOptions<'a> {
    /// Options without type information.
    pub fn new(id: &'a str, importer: &'a str) -> Self {
        Self {
            id,
            importer,
            create_type_info_api_session: None,
        }
    }

    /// Attach a session factory.
    pub fn with_session_factory(mut self, factory: Option<&'a SessionFactory>) -> Self {
        self.create_type_info_api_session = factory;
        self
    }
}

/// Outcome of resolving one `(id, importer)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualModuleResolution {
    /// A plugin produced source.
    Resolved {
        /// Winning plugin.
        plugin_name: String,
        /// Generated TypeScript.
        source_text: String,
        /// Inputs the build consulted.
        dependencies: Vec<DependencyDescriptor>,
        /// Non-fatal notes from the build.
        warnings: Vec<String>,
    },
    /// No plugin claimed the module.
    Unresolved,
    /// A plugin claimed the module but failed.
    Error(VirtualModuleDiagnostic),
}

impl VirtualModuleResolution {
    /// Status tag: `resolved`, `unresolved` or `error`.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::Unresolved => "unresolved",
            Self::Error(_) => "error",
        }
    }
}

/// Anything that can turn `(id, importer)` into a resolution.
pub trait VirtualModuleResolver: Send + Sync {
    /// Resolve a module. Never panics for plugin failures.
    fn resolve_module(&self, options: &ResolveVirtualModuleOptions<'_>) -> VirtualModuleResolution;
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Closed set of virtual-module failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VirtualModuleDiagnosticCode {
    /// Empty id, importer or plugin name.
    InvalidOptions,
    /// `should_resolve` failed.
    PluginShouldResolveThrew,
    /// The session factory failed.
    SessionCreationFailed,
    /// `build` failed.
    PluginBuildThrew,
    /// `build` returned text that cannot be compiled.
    InvalidBuildOutput,
}

impl VirtualModuleDiagnosticCode {
    /// Wire form of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOptions => "invalid-options",
            Self::PluginShouldResolveThrew => "plugin-should-resolve-threw",
            Self::SessionCreationFailed => "session-creation-failed",
            Self::PluginBuildThrew => "plugin-build-threw",
            Self::InvalidBuildOutput => "invalid-build-output",
        }
    }
}

impl fmt::Display for VirtualModuleDiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure blamed on a specific plugin (when one is known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualModuleDiagnostic {
    /// Failure code.
    pub code: VirtualModuleDiagnosticCode,
    /// Plugin at fault.
    pub plugin_name: Option<String>,
    /// Details.
    pub message: String,
}

impl VirtualModuleDiagnostic {
    /// Create a diagnostic.
    pub fn new(
        code: VirtualModuleDiagnosticCode,
        plugin_name: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            plugin_name: plugin_name.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for VirtualModuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plugin_name {
            Some(name) => write!(f, "[{}] {}: {}", self.code, name, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_json_shape() {
        let diagnostic = VirtualModuleDiagnostic::new(
            VirtualModuleDiagnosticCode::PluginBuildThrew,
            Some("routes"),
            "boom",
        );
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["code"], "plugin-build-threw");
        assert_eq!(json["pluginName"], "routes");
        assert_eq!(diagnostic.to_string(), "[plugin-build-threw] routes: boom");
    }

    #[test]
    fn test_resolution_status() {
        assert_eq!(VirtualModuleResolution::Unresolved.status(), "unresolved");
        let error = VirtualModuleResolution::Error(VirtualModuleDiagnostic::new(
            VirtualModuleDiagnosticCode::InvalidOptions,
            None,
            "x",
        ));
        assert_eq!(error.status(), "error");
    }
}
