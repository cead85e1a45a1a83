//! Path utilities and containment checks.
//!
//! Every path a plugin hands to the type-info layer is resolved against a
//! declared base directory and must stay inside it, both lexically and after
//! symlinks are followed:
//!
//! ```text
//! base = /project/src
//!
//! "routes/home.ts"        ─► /project/src/routes/home.ts   ok
//! "../../secret.ts"       ─► /secret.ts                    PathEscapesBase
//! "link/x.ts" (link ─► /) ─► /x.ts after canonicalize      PathEscapesBase
//! "a\0b.ts"               ─►                               InvalidInput
//! ```

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use thiserror::Error;

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The input is empty, contains a NUL byte, or the base is unusable.
    #[error("invalid path input: {0}")]
    InvalidInput(String),

    /// The resolved path lies outside the base directory.
    #[error("path `{path}` escapes base directory `{base}`")]
    EscapesBase {
        /// The offending resolved path.
        path: PathBuf,
        /// The base it had to stay within.
        base: PathBuf,
    },
}

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Lexical cleaning if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.clean()
        } else {
            std::env::current_dir()
                .map_or_else(|_| path.clean(), |cwd| cwd.join(path).clean())
        }
    })
}

/// Lexically join and clean without touching the file system.
pub fn lexical_join(base: &Path, relative: &Path) -> PathBuf {
    base.join(relative).clean()
}

/// Check that `input` is usable as a plugin-supplied path fragment.
pub fn validate_path_input(input: &str) -> Result<(), PathError> {
    if input.is_empty() {
        return Err(PathError::InvalidInput("path is empty".into()));
    }
    if input.contains('\0') {
        return Err(PathError::InvalidInput(format!(
            "path contains a NUL byte: {:?}",
            input
        )));
    }
    Ok(())
}

/// Whether `path` is `base` or lies beneath it (purely lexical).
pub fn is_within(base: &Path, path: &Path) -> bool {
    let base = base.clean();
    let path = path.clean();
    path.starts_with(&base)
}

/// Resolve `relative` against `base`, refusing anything outside `base`.
///
/// The check runs twice: once on the cleaned lexical path, then again on the
/// canonical path when the target exists, so symlinks pointing out of `base`
/// are caught as well. Returns the canonical path when available.
pub fn resolve_within(base: &Path, relative: &str) -> Result<PathBuf, PathError> {
    validate_path_input(relative)?;
    let base_str = base.as_os_str();
    if base_str.is_empty() {
        return Err(PathError::InvalidInput("base directory is empty".into()));
    }
    if base_str.to_string_lossy().contains('\0') {
        return Err(PathError::InvalidInput(
            "base directory contains a NUL byte".into(),
        ));
    }

    let base = normalize_path(base);
    let lexical = lexical_join(&base, Path::new(relative));
    if !lexical.starts_with(&base) {
        return Err(PathError::EscapesBase {
            path: lexical,
            base,
        });
    }

    match lexical.canonicalize() {
        Ok(real) => {
            if real.starts_with(&base) {
                Ok(real)
            } else {
                Err(PathError::EscapesBase { path: real, base })
            }
        }
        // Missing files are left to the caller; the lexical check already held.
        Err(_) => Ok(lexical),
    }
}

/// Resolve a module-style specifier (`./x`, `../y`) against a directory.
///
/// Returns `None` for bare specifiers.
pub fn resolve_relative_specifier(dir: &Path, specifier: &str) -> Option<PathBuf> {
    if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
        Some(lexical_join(dir, Path::new(specifier)))
    } else if Path::new(specifier).is_absolute() {
        Some(PathBuf::from(specifier).clean())
    } else {
        None
    }
}
