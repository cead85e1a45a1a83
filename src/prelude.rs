//! Prelude module for convenient imports.
//!
//! ```ignore
//! use typed_virtual_modules::prelude::*;
//! ```

pub use std::sync::Arc;

// Compilation
pub use crate::compile::{CompileOptions, CompileOutput, Compiler, compile, compile_with_host};
pub use crate::config::{VmcConfig, VmcConfigLoader};

// Plugins
pub use crate::plugin::{
    FnPlugin, PluginContext, PluginError, PluginManager, PluginRegistry, VirtualModulePlugin,
    VirtualModuleResolver,
};

// TypeInfo
pub use crate::type_info::{
    DirectoryOptions, FileOptions, SessionFactory, TypeInfoApi, TypeInfoError, TypeInfoOptions,
    importer_dir,
};
pub use crate::types::{
    DependencyDescriptor, ExportedType, FileSnapshot, TypeNode, TypeTargetSpec,
};

// Hosts
pub use crate::host::{
    CompilerHost, CompilerHostAdapter, CompilerProgramHost, DiskHost, LanguageService,
    LanguageServiceAdapter, LanguageServiceHost, MemoryHost, PluginCreateInfo,
    SourceLanguageService, create_language_service_plugin,
};

// Store and watching
pub use crate::store::{StoreOptions, VirtualRecordStore};
#[cfg(feature = "notify-watch")]
pub use crate::watch::NotifyWatchHost;
pub use crate::watch::{PushWatchHost, WatchHost};

// Diagnostics
pub use crate::diagnostic::{
    CompileError, Diagnostic, DiagnosticOptions, Diagnostics, DisplayStyle,
};
