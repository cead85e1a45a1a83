//! Batch compilation with virtual modules.
//!
//! ```text
//! compile(options)
//!     │
//!     ├─ resolver: options.resolver, else vmc.config.* in project_root
//!     │
//!     ├─ base program      built through the plain host; plugins query it
//!     │                    through their TypeInfo sessions
//!     │
//!     └─ program           built through CompilerHostAdapter, so virtual
//!                          imports resolve and failures land on importers
//! ```
//!
//! [`Compiler`] keeps the adapter (and its record cache) alive across
//! compilations, the way a watch-mode build would.
//!
//! # Example
//!
//! ```ignore
//! let output = compile(
//!     &CompileOptions::new("/app")
//!         .with_root("/app/src/main.ts")
//!         .with_config_loader(VmcConfigLoader::new(registry)),
//! )?;
//! eprint!("{}", output.diagnostics.format(&DiagnosticOptions::default()));
//! std::process::exit(output.exit_code());
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::VmcConfigLoader;
use crate::diagnostic::{CompileError, Diagnostics};
use crate::host::{CompilerHost, CompilerHostAdapter, CompilerProgramHost, DiskHost};
use crate::path::lexical_join;
use crate::plugin::{PluginManager, VirtualModuleResolver};
use crate::program::{Program, SourceProgram};
use crate::type_info::{SessionFactory, TypeInfoOptions};
use crate::watch::WatchHost;

// =============================================================================
// Options and Output
// =============================================================================

/// What to compile and how.
#[derive(Clone)]
pub struct CompileOptions {
    /// Project root. Relative root files resolve against it, and it is
    /// searched for a config file when no resolver is given.
    pub project_root: PathBuf,
    /// Entry files.
    pub root_files: Vec<PathBuf>,
    /// Resolver to use instead of the project's config.
    pub resolver: Option<Arc<dyn VirtualModuleResolver>>,
    /// Loader for the project's config.
    pub config_loader: Option<VmcConfigLoader>,
    /// TypeInfo API tuning.
    pub type_info: TypeInfoOptions,
    /// Watch host for dependency changes (for long-lived [`Compiler`]s).
    pub watch_host: Option<Arc<dyn WatchHost>>,
    /// Debounce window for staleness propagation.
    pub debounce: Duration,
}

impl CompileOptions {
    /// Options for a project, with no roots yet.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            root_files: Vec::new(),
            resolver: None,
            config_loader: None,
            type_info: TypeInfoOptions::default(),
            watch_host: None,
            debounce: Duration::ZERO,
        }
    }

    /// Add an entry file.
    pub fn with_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_files.push(path.into());
        self
    }

    /// Use this resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn VirtualModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Load the resolver from the project's config with this loader.
    pub fn with_config_loader(mut self, loader: VmcConfigLoader) -> Self {
        self.config_loader = Some(loader);
        self
    }

    /// Set TypeInfo API options.
    pub fn with_type_info(mut self, options: TypeInfoOptions) -> Self {
        self.type_info = options;
        self
    }

    /// Watch dependencies through this host.
    pub fn with_watch_host(mut self, watch_host: Arc<dyn WatchHost>) -> Self {
        self.watch_host = Some(watch_host);
        self
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.root_files
            .iter()
            .map(|root| {
                if root.is_absolute() {
                    root.clone()
                } else {
                    lexical_join(&self.project_root, root)
                }
            })
            .collect()
    }

    fn load_resolver(&self) -> Result<Arc<dyn VirtualModuleResolver>, CompileError> {
        if let Some(resolver) = &self.resolver {
            return Ok(resolver.clone());
        }
        let loader = self.config_loader.clone().unwrap_or_default();
        Ok(loader
            .resolve_project(&self.project_root)?
            .unwrap_or_else(|| Arc::new(PluginManager::new())))
    }
}

/// Result of one compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// All diagnostics, user code and virtual modules alike.
    pub diagnostics: Diagnostics,
    /// The program that was checked.
    pub program: Arc<SourceProgram>,
}

impl CompileOutput {
    /// `0` without errors, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.diagnostics.has_errors())
    }

    /// Turn error diagnostics into `Err`.
    pub fn into_result(self) -> Result<Self, CompileError> {
        if self.diagnostics.has_errors() {
            return Err(CompileError::Diagnostics {
                diagnostics: self.diagnostics,
            });
        }
        Ok(self)
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// A long-lived compiler over one host.
///
/// Records built for one [`compile`](Self::compile) are reused by the next
/// until a dependency changes.
pub struct Compiler<H: CompilerHost + 'static> {
    adapter: CompilerHostAdapter<H>,
    roots: Vec<PathBuf>,
    base: Arc<RwLock<Option<Arc<dyn Program>>>>,
}

impl<H: CompilerHost + 'static> Compiler<H> {
    /// Resolve the project's resolver and attach to `host`.
    pub fn new(host: Arc<H>, options: &CompileOptions) -> Result<Self, CompileError> {
        let roots = options.roots();
        if roots.is_empty() {
            return Err(CompileError::NoRootFiles);
        }
        let resolver = options.load_resolver()?;

        let base: Arc<RwLock<Option<Arc<dyn Program>>>> = Arc::default();
        let provider = {
            let base = base.clone();
            move || base.read().clone()
        };
        let mut builder = CompilerHostAdapter::builder(host, resolver, options.project_root.clone())
            .with_session_factory(SessionFactory::lazy(provider, options.type_info))
            .with_debounce(options.debounce);
        if let Some(watch_host) = &options.watch_host {
            builder = builder.with_watch_host(watch_host.clone());
        }

        Ok(Self {
            adapter: builder.attach(),
            roots,
            base,
        })
    }

    /// The adapter, for inspecting records.
    pub fn adapter(&self) -> &CompilerHostAdapter<H> {
        &self.adapter
    }

    /// Build and check the program.
    pub fn compile(&self) -> Result<CompileOutput, CompileError> {
        let host = self.adapter.host();
        if let Some(missing) = self.roots.iter().find(|root| !host.file_exists(root)) {
            return Err(CompileError::RootNotFound(missing.clone()));
        }

        let base = SourceProgram::build(&CompilerProgramHost(host.as_ref()), &self.roots);
        *self.base.write() = Some(Arc::new(base));

        let program = Arc::new(SourceProgram::build(&CompilerProgramHost(&self.adapter), &self.roots));
        let diagnostics = program.diagnostics().clone();
        tracing::debug!(
            roots = self.roots.len(),
            diagnostics = diagnostics.len(),
            "compiled"
        );
        Ok(CompileOutput { diagnostics, program })
    }

    /// Release the adapter's records and watchers.
    pub fn dispose(&self) {
        self.adapter.dispose();
        *self.base.write() = None;
    }
}

/// Compile once from disk.
pub fn compile(options: &CompileOptions) -> Result<CompileOutput, CompileError> {
    compile_with_host(Arc::new(DiskHost::new()), options)
}

/// Compile once through `host`.
pub fn compile_with_host<H: CompilerHost + 'static>(
    host: Arc<H>,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let compiler = Compiler::new(host, options)?;
    let output = compiler.compile();
    compiler.dispose();
    output
}
