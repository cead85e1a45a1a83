//! # typed-virtual-modules
//!
//! Virtual modules for TypeScript-style compiler and language-service hosts.
//!
//! Plugins synthesize source text for module specifiers that do not exist on
//! disk (`import { routes } from "virtual:routes"`). The generated modules
//! join the program like any other file, stay cached until something they
//! read changes, and can inspect the project's real types while building so
//! the code they emit type-checks against it.
//!
//! ```text
//! compiler ──resolve "virtual:x" from main.ts──► host adapter
//!                                                    │
//!                                     VirtualRecordStore (cache, watchers)
//!                                                    │
//!                                   PluginManager ──► plugin.build(api)
//!                                                         │
//!                                           TypeInfo API over the program
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use typed_virtual_modules::prelude::*;
//!
//! let manager = PluginManager::new().with_plugin(FnPlugin::new(
//!     "answer",
//!     |id, _| id == "virtual:answer",
//!     |_, _, _| Ok("export const answer: number = 42;".to_string()),
//! ));
//! let output = compile(
//!     &CompileOptions::new("/app")
//!         .with_root("src/main.ts")
//!         .with_resolver(Arc::new(manager)),
//! )?;
//! std::process::exit(output.exit_code());
//! ```
//!
//! ## Modules
//!
//! - [`path`]: containment checks for paths crossing the plugin boundary
//! - [`key`]: cache keys and synthetic file names
//! - [`plugin`]: the plugin contract, [`PluginManager`] and plugin loading
//! - [`types`]: serialized type trees handed to plugins
//! - [`program`]: the program seam and the built-in [`SourceProgram`]
//! - [`type_info`]: the TypeInfo API and its sessions
//! - [`watch`]: file and directory watching
//! - [`store`]: the virtual record store
//! - [`host`]: compiler and language-service adapters
//! - [`config`]: `vmc.config.*` loading
//! - [`compile`]: batch compilation
//! - [`diagnostic`]: diagnostics and error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compile;
pub mod config;
pub mod diagnostic;
pub mod host;
pub mod key;
pub mod path;
pub mod plugin;
pub mod prelude;
pub mod program;
pub mod store;
pub mod type_info;
pub mod types;
pub mod watch;

// =============================================================================
// Entry Points
// =============================================================================

pub use compile::{CompileOptions, CompileOutput, Compiler, compile, compile_with_host};
pub use host::{
    CompilerHostAdapter, LanguageServiceAdapter, PluginCreateInfo, create_language_service_plugin,
};

// =============================================================================
// Plugins and Resolution
// =============================================================================

pub use plugin::{
    FnPlugin, PluginError, PluginManager, VirtualModuleDiagnostic, VirtualModuleDiagnosticCode,
    VirtualModulePlugin, VirtualModuleResolution, VirtualModuleResolver,
};
pub use store::{ResolveRecordResult, VirtualModuleRecord, VirtualRecordStore};
pub use type_info::{TypeInfoApi, TypeInfoError};

// =============================================================================
// Diagnostics
// =============================================================================

pub use diagnostic::{CompileError, Diagnostic, DiagnosticOptions, Diagnostics, DisplayStyle};
pub use program::SourceProgram;
