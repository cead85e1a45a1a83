//! Built-in module resolution, used when a host brings no resolver.
//!
//! Relative and absolute specifiers probe TypeScript extensions, then the
//! path itself, then directory indexes. Bare specifiers walk up through
//! `node_modules` and `node_modules/@types`.

use std::path::{Path, PathBuf};

use super::{Extension, ModuleNameLiteral, ResolvedModule, ResolvedModuleWithFailedLookups};
use crate::path::resolve_relative_specifier;

const EXTENSIONS: [&str; 3] = ["ts", "tsx", "d.ts"];
const INDEX_FILES: [&str; 3] = ["index.ts", "index.tsx", "index.d.ts"];

/// Resolve one specifier written in `containing_file`.
pub fn resolve_module_name(
    specifier: &str,
    containing_file: &Path,
    file_exists: impl Fn(&Path) -> bool,
) -> ResolvedModuleWithFailedLookups {
    let dir = containing_file.parent().unwrap_or(Path::new(""));
    let mut failed = Vec::new();

    if let Some(base) = resolve_relative_specifier(dir, specifier) {
        let resolved = probe(&base, &file_exists, &mut failed).map(ResolvedModule::local);
        return ResolvedModuleWithFailedLookups {
            resolved_module: resolved,
            failed_lookup_locations: failed,
            resolution_diagnostics: Vec::new(),
        };
    }

    for ancestor in dir.ancestors() {
        let modules = ancestor.join("node_modules");
        let candidates = [modules.join(specifier), modules.join("@types").join(specifier)];
        for candidate in candidates {
            if let Some(found) = probe(&candidate, &file_exists, &mut failed) {
                return ResolvedModuleWithFailedLookups {
                    resolved_module: Some(ResolvedModule {
                        extension: Extension::from_path(&found),
                        resolved_file_name: found,
                        is_external_library_import: true,
                    }),
                    failed_lookup_locations: failed,
                    resolution_diagnostics: Vec::new(),
                };
            }
        }
    }

    ResolvedModuleWithFailedLookups {
        resolved_module: None,
        failed_lookup_locations: failed,
        resolution_diagnostics: Vec::new(),
    }
}

fn probe(
    base: &Path,
    file_exists: &impl Fn(&Path) -> bool,
    failed: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let text = base.to_string_lossy();
    // `./a.js` in TypeScript source refers to `./a.ts`.
    if let Some(stem) = text.strip_suffix(".js") {
        candidates.push(PathBuf::from(format!("{stem}.ts")));
        candidates.push(PathBuf::from(format!("{stem}.tsx")));
    }
    for extension in EXTENSIONS {
        candidates.push(PathBuf::from(format!("{text}.{extension}")));
    }
    if Extension::from_path(base) != Extension::Js {
        candidates.push(base.to_path_buf());
    }
    for index in INDEX_FILES {
        candidates.push(base.join(index));
    }

    for candidate in candidates {
        if file_exists(&candidate) {
            return Some(candidate);
        }
        failed.push(candidate);
    }
    None
}

/// Resolve literals through an optional name-based resolver, falling back
/// to [`resolve_module_name`] when the resolver is absent.
pub fn resolve_module_names_with(
    literals: &[ModuleNameLiteral],
    containing_file: &Path,
    resolve_names: impl FnOnce(&[String]) -> Option<Vec<Option<ResolvedModule>>>,
    file_exists: impl Fn(&Path) -> bool,
) -> Vec<ResolvedModuleWithFailedLookups> {
    let names: Vec<String> = literals.iter().map(|l| l.text.clone()).collect();
    match resolve_names(&names) {
        Some(mut resolved) => {
            resolved.resize(names.len(), None);
            resolved
                .into_iter()
                .map(ResolvedModuleWithFailedLookups::from_resolved)
                .collect()
        }
        None => names
            .iter()
            .map(|name| resolve_module_name(name, containing_file, &file_exists))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exists_in(files: &'static [&'static str]) -> impl Fn(&Path) -> bool {
        move |path| files.iter().any(|f| Path::new(f) == path)
    }

    #[test]
    fn test_relative_extension_probe() {
        let result = resolve_module_name(
            "./route",
            Path::new("/p/src/main.ts"),
            exists_in(&["/p/src/route.ts"]),
        );
        let module = result.resolved_module.expect("resolved");
        assert_eq!(module.resolved_file_name, PathBuf::from("/p/src/route.ts"));
        assert!(!module.is_external_library_import);
    }

    #[test]
    fn test_js_suffix_maps_to_ts() {
        let result = resolve_module_name(
            "../lib/util.js",
            Path::new("/p/src/main.ts"),
            exists_in(&["/p/lib/util.ts"]),
        );
        assert_eq!(
            result.resolved_module.map(|m| m.resolved_file_name),
            Some(PathBuf::from("/p/lib/util.ts"))
        );
    }

    #[test]
    fn test_directory_index() {
        let result = resolve_module_name(
            "./routes",
            Path::new("/p/main.ts"),
            exists_in(&["/p/routes/index.ts"]),
        );
        assert_eq!(
            result.resolved_module.map(|m| m.resolved_file_name),
            Some(PathBuf::from("/p/routes/index.ts"))
        );
    }

    #[test]
    fn test_bare_specifier_walks_node_modules() {
        let result = resolve_module_name(
            "schema",
            Path::new("/p/src/deep/main.ts"),
            exists_in(&["/p/node_modules/@types/schema/index.d.ts"]),
        );
        let module = result.resolved_module.expect("resolved");
        assert!(module.is_external_library_import);
        assert_eq!(module.extension, Extension::Dts);
    }

    #[test]
    fn test_unresolved_lists_failed_lookups() {
        let result = resolve_module_name("./nope", Path::new("/p/main.ts"), exists_in(&[]));
        assert!(result.resolved_module.is_none());
        assert!(result.failed_lookup_locations.contains(&PathBuf::from("/p/nope.ts")));
    }
}
