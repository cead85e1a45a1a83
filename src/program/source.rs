//! `SourceProgram`: a declaration-level program built from TypeScript text.
//!
//! # Construction
//!
//! ```text
//! roots ──► queue ──► host.source_text(file) ──► parse ──► specifiers
//!             ▲                                               │
//!             └──── resolved files ◄── host.resolve_modules ◄─┘
//!
//! then: lower exports, check imports + annotated declarators
//! ```
//!
//! The host decides what exists and where imports point, so wrapping it in
//! a virtual-module adapter is all it takes to make synthetic files part of
//! the graph.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::arena::TypeArena;
use super::check::{check_declarator, is_assignable};
use super::lower::{Lowerer, Meaning, ModuleGraph};
use super::parse::{ImportedName, ParsedModule, parse_module};
use super::{ExportKind, ExportSymbol, IndexInfo, Program, TypeId, TypeKind};
use crate::diagnostic::{Diagnostic, DiagnosticCode, Diagnostics, codes};
use crate::host::{ModuleNameLiteral, ResolvedModuleWithFailedLookups};

/// What a [`SourceProgram`] needs from its environment.
pub trait ProgramHost {
    /// Text of a source file, or `None` if it does not exist.
    fn source_text(&self, path: &Path) -> Option<Arc<str>>;

    /// Resolve the import specifiers of `containing_file`, one result per literal.
    fn resolve_modules(
        &self,
        literals: &[ModuleNameLiteral],
        containing_file: &Path,
    ) -> Vec<ResolvedModuleWithFailedLookups>;
}

#[derive(Debug)]
struct FileEntry {
    text: Arc<str>,
    exports: Vec<ExportSymbol>,
    resolutions: FxHashMap<String, Option<PathBuf>>,
}

/// An immutable program over a set of TypeScript files.
#[derive(Debug)]
pub struct SourceProgram {
    order: Vec<PathBuf>,
    files: FxHashMap<PathBuf, FileEntry>,
    arena: TypeArena,
    diagnostics: Diagnostics,
}

impl SourceProgram {
    /// Build a program from `root_files` and everything they import.
    pub fn build(host: &dyn ProgramHost, root_files: &[PathBuf]) -> Self {
        let mut diagnostics = Diagnostics::default();
        let mut order = Vec::new();
        let mut texts: FxHashMap<PathBuf, Arc<str>> = FxHashMap::default();
        let mut modules: FxHashMap<PathBuf, ParsedModule> = FxHashMap::default();
        let mut resolutions: FxHashMap<PathBuf, FxHashMap<String, Option<PathBuf>>> =
            FxHashMap::default();

        let roots: FxHashSet<PathBuf> = root_files.iter().cloned().collect();
        let mut seen = roots.clone();
        let mut queue: VecDeque<PathBuf> = root_files.iter().cloned().collect();

        while let Some(path) = queue.pop_front() {
            let Some(text) = host.source_text(&path) else {
                if roots.contains(&path) {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::Ts(codes::FILE_NOT_FOUND),
                        format!("File '{}' not found.", path.display()),
                    ));
                }
                continue;
            };

            let module = parse_module(&path, &text);
            for error in &module.errors {
                let (start, end) = error.span;
                diagnostics.push(
                    Diagnostic::error(DiagnosticCode::Ts(codes::SYNTAX), error.message.clone())
                        .in_file(&path)
                        .at(&text, start, end),
                );
            }

            let literals: Vec<ModuleNameLiteral> = module
                .module_specifiers()
                .into_iter()
                .map(|(specifier, (start, end))| ModuleNameLiteral::new(specifier, start, end))
                .collect();
            let results = if literals.is_empty() {
                Vec::new()
            } else {
                host.resolve_modules(&literals, &path)
            };

            let mut resolved = FxHashMap::default();
            for (index, literal) in literals.iter().enumerate() {
                let result = results.get(index);
                let target = result
                    .and_then(|r| r.resolved_module.as_ref())
                    .map(|m| m.resolved_file_name.clone());
                match (&target, result) {
                    (Some(target), _) => {
                        if seen.insert(target.clone()) {
                            queue.push_back(target.clone());
                        }
                    }
                    (None, Some(r)) if !r.resolution_diagnostics.is_empty() => {
                        for diagnostic in &r.resolution_diagnostics {
                            diagnostics.push(
                                Diagnostic::from_virtual_module(diagnostic, &literal.text)
                                    .in_file(&path)
                                    .at(&text, literal.start, literal.end),
                            );
                        }
                    }
                    (None, _) => diagnostics.push(
                        Diagnostic::error(
                            DiagnosticCode::Ts(codes::CANNOT_FIND_MODULE),
                            format!(
                                "Cannot find module '{}' or its corresponding type declarations.",
                                literal.text
                            ),
                        )
                        .in_file(&path)
                        .at(&text, literal.start, literal.end),
                    ),
                }
                resolved.insert(literal.text.clone(), target);
            }

            tracing::trace!(file = %path.display(), imports = literals.len(), "parsed source file");
            order.push(path.clone());
            texts.insert(path.clone(), text);
            modules.insert(path.clone(), module);
            resolutions.insert(path, resolved);
        }

        let mut lowerer = Lowerer::new(ModuleGraph {
            modules: &modules,
            resolutions: &resolutions,
        });
        let mut exports: FxHashMap<PathBuf, Vec<ExportSymbol>> = FxHashMap::default();
        for path in &order {
            let module = &modules[path];
            let text = &texts[path];

            for import in &module.imports {
                let Some(target) = lowerer.resolve_specifier(path, &import.specifier) else {
                    continue;
                };
                if !modules.contains_key(&target) {
                    continue;
                }
                for binding in &import.bindings {
                    let ImportedName::Named(name) = &binding.imported else {
                        continue;
                    };
                    let found = lowerer.resolve_export(&target, name, Meaning::Type).is_some()
                        || lowerer.resolve_export(&target, name, Meaning::Value).is_some();
                    if !found {
                        let (start, end) = binding.span;
                        diagnostics.push(
                            Diagnostic::error(
                                DiagnosticCode::Ts(codes::NO_EXPORTED_MEMBER),
                                format!(
                                    "Module '\"{}\"' has no exported member '{name}'.",
                                    import.specifier
                                ),
                            )
                            .in_file(path)
                            .at(text, start, end),
                        );
                    }
                }
            }

            for declarator in &module.checked {
                if let Some(mismatch) = check_declarator(&mut lowerer, path, declarator) {
                    let (start, end) = mismatch.span;
                    diagnostics.push(
                        Diagnostic::error(DiagnosticCode::Ts(mismatch.code), mismatch.message)
                            .in_file(path)
                            .at(text, start, end),
                    );
                }
            }

            let mut symbols = Vec::new();
            for name in lowerer.export_names(path) {
                if let Some(ty) = lowerer.resolve_export(path, &name, Meaning::Value) {
                    symbols.push(ExportSymbol {
                        name: name.clone(),
                        kind: ExportKind::Value,
                        ty,
                    });
                }
                if let Some(ty) = lowerer.resolve_export(path, &name, Meaning::Type) {
                    symbols.push(ExportSymbol {
                        name,
                        kind: ExportKind::Type,
                        ty,
                    });
                }
            }
            exports.insert(path.clone(), symbols);
        }
        let arena = lowerer.arena;

        let files = order
            .iter()
            .map(|path| {
                let entry = FileEntry {
                    text: texts.remove(path).unwrap_or_else(|| Arc::from("")),
                    exports: exports.remove(path).unwrap_or_default(),
                    resolutions: resolutions.remove(path).unwrap_or_default(),
                };
                (path.clone(), entry)
            })
            .collect();

        tracing::debug!(
            files = order.len(),
            diagnostics = diagnostics.len(),
            "built source program"
        );
        Self {
            order,
            files,
            arena,
            diagnostics,
        }
    }

    /// Diagnostics found while building.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Diagnostics attached to one file.
    pub fn file_diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        self.diagnostics.for_file(path).cloned().collect()
    }

    /// Text a file was built from.
    pub fn source_text(&self, path: &Path) -> Option<&Arc<str>> {
        self.files.get(path).map(|entry| &entry.text)
    }

    /// Look up one export by name, preferring values.
    pub fn export(&self, path: &Path, name: &str) -> Option<&ExportSymbol> {
        let exports = &self.files.get(path)?.exports;
        exports
            .iter()
            .find(|e| e.name == name && e.kind == ExportKind::Value)
            .or_else(|| exports.iter().find(|e| e.name == name))
    }
}

impl Program for SourceProgram {
    fn source_files(&self) -> Vec<PathBuf> {
        self.order.clone()
    }

    fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn exports(&self, path: &Path) -> Option<Vec<ExportSymbol>> {
        self.files.get(path).map(|entry| entry.exports.clone())
    }

    fn type_kind(&self, ty: TypeId) -> Option<TypeKind> {
        self.arena.kind(ty).cloned()
    }

    fn type_to_string(&self, ty: TypeId) -> String {
        self.arena.display(ty)
    }

    fn is_type_assignable_to(&self, source: TypeId, target: TypeId) -> bool {
        is_assignable(&self.arena, source, target)
    }

    fn resolve_module(&self, specifier: &str, containing_file: &Path) -> Option<PathBuf> {
        self.files
            .get(containing_file)?
            .resolutions
            .get(specifier)?
            .clone()
    }

    fn index_infos(&self, ty: TypeId) -> Option<Vec<IndexInfo>> {
        Some(self.arena.all_index_infos(ty))
    }

    fn resolve_alias(&self, ty: TypeId) -> Option<TypeId> {
        self.arena.alias_target(ty)
    }

    fn base_types(&self, ty: TypeId) -> Option<Vec<TypeId>> {
        Some(self.arena.bases(ty).to_vec())
    }
}
