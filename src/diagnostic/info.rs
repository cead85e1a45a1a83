//! Structured diagnostic information.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::format::{format_diagnostic, DiagnosticOptions};
use crate::plugin::{VirtualModuleDiagnostic, VirtualModuleDiagnosticCode};

// ============================================================================
// Severity / Code
// ============================================================================

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the compilation unit.
    Error,
    /// Reported but not fatal.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Where a diagnostic's code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    /// A compiler diagnostic number (`TS2322`).
    Ts(u32),
    /// A virtual-module resolution failure.
    VirtualModule(VirtualModuleDiagnosticCode),
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ts(code) => write!(f, "TS{code}"),
            Self::VirtualModule(code) => write!(f, "VM({code})"),
        }
    }
}

/// Well-known compiler diagnostic numbers produced by this crate.
pub mod codes {
    /// Generic syntax error.
    pub const SYNTAX: u32 = 1005;
    /// Module '{0}' has no exported member '{1}'.
    pub const NO_EXPORTED_MEMBER: u32 = 2305;
    /// Cannot find module '{0}'.
    pub const CANNOT_FIND_MODULE: u32 = 2307;
    /// Type '{0}' is not assignable to type '{1}'.
    pub const NOT_ASSIGNABLE: u32 = 2322;
    /// Object literal may only specify known properties.
    pub const EXCESS_PROPERTY: u32 = 2353;
    /// Property '{0}' is missing in type '{1}' but required in type '{2}'.
    pub const MISSING_PROPERTY: u32 = 2741;
    /// File '{0}' not found.
    pub const FILE_NOT_FOUND: u32 = 6053;
}

// ============================================================================
// Diagnostic
// ============================================================================

/// 1-based line, 0-based column position inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column (0-indexed, in chars).
    pub column: usize,
    /// Length of the highlighted range on that line (in chars).
    pub length: usize,
    /// The full text of the line.
    pub line_text: String,
}

impl SourceLocation {
    /// Resolve a byte range of `text` to a location.
    pub fn resolve(text: &str, start: u32, end: u32) -> Self {
        let start = (start as usize).min(text.len());
        let end = (end as usize).clamp(start, text.len());
        let start = floor_char_boundary(text, start);
        let end = floor_char_boundary(text, end);

        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[start..].find('\n').map_or(text.len(), |i| start + i);
        let line = text[..start].matches('\n').count() + 1;
        let column = text[line_start..start].chars().count();
        let length = text[start..end.min(line_end)].chars().count();

        Self {
            line,
            column,
            length,
            line_text: text[line_start..line_end].trim_end_matches('\r').to_string(),
        }
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// A resolved diagnostic ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Code.
    pub code: DiagnosticCode,
    /// Human-readable message.
    pub message: String,
    /// File the diagnostic is attached to.
    pub file: Option<PathBuf>,
    /// Position inside `file`.
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            file: None,
            location: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Attach the diagnostic to a file.
    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a byte range of the file's text.
    pub fn at(mut self, text: &str, start: u32, end: u32) -> Self {
        self.location = Some(SourceLocation::resolve(text, start, end));
        self
    }

    /// Build the diagnostic reported on an importing file for a failed
    /// virtual-module resolution.
    pub fn from_virtual_module(diagnostic: &VirtualModuleDiagnostic, specifier: &str) -> Self {
        let blame = diagnostic
            .plugin_name
            .as_deref()
            .map(|name| format!(" (plugin `{name}`)"))
            .unwrap_or_default();
        Self::error(
            DiagnosticCode::VirtualModule(diagnostic.code),
            format!(
                "Virtual module '{specifier}' failed to resolve{blame}: {}",
                diagnostic.message
            ),
        )
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether the diagnostic is attached to `path`.
    pub fn is_in(&self, path: &Path) -> bool {
        self.file.as_deref() == Some(path)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_diagnostic(self, &DiagnosticOptions::short().with_colored(false)))
    }
}

// ============================================================================
// DiagnosticSummary
// ============================================================================

/// Summary of diagnostic counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticSummary {
    /// Number of errors.
    pub errors: usize,
    /// Number of warnings.
    pub warnings: usize,
}

impl DiagnosticSummary {
    /// Create summary from diagnostics.
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        Self {
            errors,
            warnings: diagnostics.len() - errors,
        }
    }

    /// Total number of diagnostics.
    pub fn total(&self) -> usize {
        self.errors + self.warnings
    }

    /// Whether there are any errors.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

impl fmt::Display for DiagnosticSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.errors, self.warnings) {
            (0, 0) => write!(f, "no diagnostics"),
            (e, 0) => write!(f, "{e} error{}", plural(e)),
            (0, w) => write!(f, "{w} warning{}", plural(w)),
            (e, w) => write!(f, "{e} error{}, {w} warning{}", plural(e), plural(w)),
        }
    }
}

// ============================================================================
// Diagnostics (Collection)
// ============================================================================

/// A collection of diagnostics.
///
/// # Example
///
/// ```ignore
/// let output = compile(&options)?;
/// if output.diagnostics.has_errors() {
///     eprintln!("{}", output.diagnostics);
///     std::process::exit(output.exit_code());
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Create from a list.
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self(diagnostics)
    }

    /// Append one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Append many diagnostics.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.0.extend(diagnostics);
    }

    /// Iterate.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Only errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    /// Diagnostics attached to one file.
    pub fn for_file<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a Diagnostic> {
        self.0.iter().filter(move |d| d.is_in(path))
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are none.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any is an error.
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Counts.
    pub fn summary(&self) -> DiagnosticSummary {
        DiagnosticSummary::from_diagnostics(&self.0)
    }

    /// Format with options.
    pub fn format(&self, options: &DiagnosticOptions) -> String {
        super::format::format_diagnostics(&self.0, options)
    }

    /// Underlying slice.
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }

    /// Consume into the list.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(&DiagnosticOptions::plain()))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_resolve() {
        let text = "import x from 'a';\nconst v: Foo = { n: 1 };\n";
        let start = text.find("v:").unwrap() as u32;
        let loc = SourceLocation::resolve(text, start, start + 1);
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 6);
        assert_eq!(loc.length, 1);
        assert_eq!(loc.line_text, "const v: Foo = { n: 1 };");
    }

    #[test]
    fn test_summary_display() {
        let diags = vec![
            Diagnostic::error(DiagnosticCode::Ts(codes::NOT_ASSIGNABLE), "a"),
            Diagnostic::warning(DiagnosticCode::Ts(codes::SYNTAX), "b"),
            Diagnostic::error(DiagnosticCode::Ts(codes::NOT_ASSIGNABLE), "c"),
        ];
        let summary = DiagnosticSummary::from_diagnostics(&diags);
        assert_eq!(summary.to_string(), "2 errors, 1 warning");
        assert!(summary.has_errors());
        assert_eq!(summary.total(), 3);
    }
}
