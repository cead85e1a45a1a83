//! Cached virtual modules.

use std::path::PathBuf;
use std::sync::Arc;

use crate::plugin::VirtualModuleDiagnostic;
use crate::types::DependencyDescriptor;

/// The cached result of resolving one virtual module for one importer.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualModuleRecord {
    /// Cache key derived from `(id, importer)`.
    pub key: String,
    /// Module specifier.
    pub id: String,
    /// Importing file.
    pub importer: String,
    /// Plugin that built the module.
    pub plugin_name: String,
    /// Synthetic file the compiler sees. Stable across rebuilds.
    pub virtual_file_name: PathBuf,
    /// Generated source.
    pub source_text: Arc<str>,
    /// Inputs the last build consulted.
    pub dependencies: Vec<DependencyDescriptor>,
    /// Warnings from the last build.
    pub warnings: Vec<String>,
    /// Starts at 1 and increases with every rebuild.
    pub version: u64,
    /// Set when a dependency changed since the last build.
    pub stale: bool,
}

/// Outcome of [`VirtualRecordStore::get_or_build_record`](super::VirtualRecordStore::get_or_build_record).
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveRecordResult {
    /// The module resolved (or came from cache).
    Resolved(VirtualModuleRecord),
    /// No plugin claims the module.
    Unresolved,
    /// A plugin claimed the module but failed to build it.
    Error(VirtualModuleDiagnostic),
}

impl ResolveRecordResult {
    /// Status tag: `resolved`, `unresolved` or `error`.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Unresolved => "unresolved",
            Self::Error(_) => "error",
        }
    }

    /// The record, when resolved.
    pub fn record(&self) -> Option<&VirtualModuleRecord> {
        match self {
            Self::Resolved(record) => Some(record),
            _ => None,
        }
    }

    /// Consume into the record, when resolved.
    pub fn into_record(self) -> Option<VirtualModuleRecord> {
        match self {
            Self::Resolved(record) => Some(record),
            _ => None,
        }
    }
}
