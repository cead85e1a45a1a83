//! Diagnostic formatting utilities.

use std::fmt::Write;

use super::info::{Diagnostic, Severity, SourceLocation};

// ============================================================================
// Options
// ============================================================================

/// Display style for diagnostic output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayStyle {
    /// Rich output with source snippets and highlighting.
    #[default]
    Rich,
    /// Short output in `tsc --pretty false` form: `file:line:col - error TSxxxx: message`.
    Short,
}

/// Options for controlling diagnostic formatting.
///
/// # Example
///
/// ```ignore
/// use typed_virtual_modules::diagnostic::{DiagnosticOptions, DisplayStyle};
///
/// // Default: colored rich output
/// let opts = DiagnosticOptions::default();
///
/// // Plain text (no ANSI colors) for logging
/// let opts = DiagnosticOptions::plain();
///
/// // Short format for CI/IDE integration
/// let opts = DiagnosticOptions::short();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticOptions {
    /// Whether to use ANSI colors in output.
    pub colored: bool,
    /// Display style (rich with snippets or short).
    pub style: DisplayStyle,
    /// Whether to include source code snippets.
    pub snippets: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self {
            colored: true,
            style: DisplayStyle::Rich,
            snippets: true,
        }
    }
}

impl DiagnosticOptions {
    /// Create options for plain text output (no ANSI colors).
    pub fn plain() -> Self {
        Self {
            colored: false,
            ..Self::default()
        }
    }

    /// Create options for short format.
    pub fn short() -> Self {
        Self {
            style: DisplayStyle::Short,
            snippets: false,
            ..Self::default()
        }
    }

    /// Set whether to use colors.
    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Set display style.
    pub fn with_style(mut self, style: DisplayStyle) -> Self {
        self.style = style;
        self
    }

    /// Set whether to include source snippets.
    pub fn with_snippets(mut self, snippets: bool) -> Self {
        self.snippets = snippets;
        self
    }
}

// ============================================================================
// Gutter Characters
// ============================================================================

/// Box-drawing characters for source code display.
mod gutter {
    pub const HEADER: &str = "┌─";
    pub const BAR: &str = "│";
    pub const MARKER: &str = "~";
}

// ============================================================================
// Coloring
// ============================================================================

#[cfg(feature = "colored-diagnostics")]
fn colorize(text: &str, severity: Severity) -> String {
    use owo_colors::OwoColorize;
    match severity {
        Severity::Error => text.red().to_string(),
        Severity::Warning => text.yellow().to_string(),
    }
}

#[cfg(feature = "colored-diagnostics")]
fn colorize_location(text: &str) -> String {
    use owo_colors::OwoColorize;
    text.cyan().to_string()
}

#[cfg(not(feature = "colored-diagnostics"))]
fn colorize(text: &str, _severity: Severity) -> String {
    text.to_owned()
}

#[cfg(not(feature = "colored-diagnostics"))]
fn colorize_location(text: &str) -> String {
    text.to_owned()
}

fn paint(options: &DiagnosticOptions, severity: Severity) -> impl Fn(&str) -> String {
    let colored = options.colored;
    move |s: &str| {
        if colored {
            colorize(s, severity)
        } else {
            s.to_owned()
        }
    }
}

fn paint_location(options: &DiagnosticOptions, text: &str) -> String {
    if options.colored {
        colorize_location(text)
    } else {
        text.to_owned()
    }
}

// ============================================================================
// Public Formatting API
// ============================================================================

/// Format a list of diagnostics, errors first.
pub fn format_diagnostics(diagnostics: &[Diagnostic], options: &DiagnosticOptions) -> String {
    let (errors, warnings): (Vec<_>, Vec<_>) =
        diagnostics.iter().partition(|d| d.severity == Severity::Error);

    let separator = match options.style {
        DisplayStyle::Rich => "\n",
        DisplayStyle::Short => "",
    };

    errors
        .iter()
        .chain(warnings.iter())
        .map(|d| format_diagnostic(d, options))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Format a single diagnostic.
pub fn format_diagnostic(diagnostic: &Diagnostic, options: &DiagnosticOptions) -> String {
    let mut output = String::new();
    let paint = paint(options, diagnostic.severity);

    let location = location_prefix(diagnostic);
    match options.style {
        DisplayStyle::Short => {
            if let Some(location) = location {
                _ = write!(output, "{} - ", paint_location(options, &location));
            }
            _ = writeln!(
                output,
                "{} {}: {}",
                paint(&diagnostic.severity.to_string()),
                diagnostic.code,
                diagnostic.message
            );
        }
        DisplayStyle::Rich => {
            _ = writeln!(
                output,
                "{}: {}",
                paint(&format!("{}[{}]", diagnostic.severity, diagnostic.code)),
                diagnostic.message
            );
            if let Some(location) = location {
                _ = writeln!(output, "  {} {}", paint(gutter::HEADER), location);
            }
            if options.snippets
                && let Some(loc) = &diagnostic.location
            {
                write_snippet(&mut output, loc, &paint);
            }
        }
    }

    output
}

fn location_prefix(diagnostic: &Diagnostic) -> Option<String> {
    let file = diagnostic.file.as_ref()?;
    Some(match &diagnostic.location {
        Some(loc) => format!("{}:{}:{}", file.display(), loc.line, loc.column + 1),
        None => file.display().to_string(),
    })
}

fn write_snippet(output: &mut String, loc: &SourceLocation, paint: &impl Fn(&str) -> String) {
    let line_num = loc.line.to_string();
    let width = line_num.len();

    _ = writeln!(output, "{:>width$} {}", "", paint(gutter::BAR));
    _ = writeln!(
        output,
        "{} {} {}",
        paint(&line_num),
        paint(gutter::BAR),
        loc.line_text
    );
    _ = writeln!(
        output,
        "{:>width$} {} {}{}",
        "",
        paint(gutter::BAR),
        " ".repeat(loc.column),
        paint(&gutter::MARKER.repeat(loc.length.max(1)))
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::info::{codes, DiagnosticCode};

    fn sample() -> Diagnostic {
        let text = "const v: Foo = { n: 1 };";
        Diagnostic::error(
            DiagnosticCode::Ts(codes::NOT_ASSIGNABLE),
            "Type 'number' is not assignable to type 'string'.",
        )
        .in_file("/app/main.ts")
        .at(text, 17, 18)
    }

    #[test]
    fn test_short_format() {
        let out = format_diagnostic(&sample(), &DiagnosticOptions::short().with_colored(false));
        assert_eq!(
            out,
            "/app/main.ts:1:18 - error TS2322: Type 'number' is not assignable to type 'string'.\n"
        );
    }

    #[test]
    fn test_rich_format_has_snippet() {
        let out = format_diagnostic(&sample(), &DiagnosticOptions::plain());
        assert!(out.starts_with("error[TS2322]: Type 'number'"));
        assert!(out.contains("┌─ /app/main.ts:1:18"));
        assert!(out.contains("1 │ const v: Foo = { n: 1 };"));
        assert!(out.contains(&format!("│ {}~", " ".repeat(17))));
    }

    #[test]
    fn test_errors_sorted_first() {
        let warning = Diagnostic::warning(DiagnosticCode::Ts(codes::SYNTAX), "w");
        let out = format_diagnostics(
            &[warning, sample()],
            &DiagnosticOptions::short().with_colored(false),
        );
        assert!(out.find("TS2322").unwrap() < out.find("TS1005").unwrap());
    }
}
