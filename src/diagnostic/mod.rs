//! Diagnostics for compilation and virtual-module resolution.

mod error;
mod format;
mod info;

pub use error::CompileError;
pub use format::{format_diagnostic, format_diagnostics, DiagnosticOptions, DisplayStyle};
pub use info::{
    codes, Diagnostic, DiagnosticCode, DiagnosticSummary, Diagnostics, Severity, SourceLocation,
};
