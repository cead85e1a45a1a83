//! [`TypeInfoApi`] backed by a [`Program`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use globset::{Glob, GlobSetBuilder};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use super::serialize::Serializer;
use super::session::DependencyTracker;
use super::{
    DirectoryOptions, FileOptions, TypeInfoApi, TypeInfoError, TypeInfoErrorCode, TypeInfoOptions,
};
use crate::path::{normalize_path, resolve_within};
use crate::program::{ExportKind, ExportSymbol, Program, TypeId};
use crate::types::{DependencyDescriptor, ExportedType, FileSnapshot, TypeTargetSpec};

type ProgramProvider = dyn Fn() -> Option<Arc<dyn Program>> + Send + Sync;

enum ProgramSource {
    Fixed(Arc<dyn Program>),
    Lazy {
        provider: Arc<ProgramProvider>,
        program: OnceLock<Option<Arc<dyn Program>>>,
    },
}

impl ProgramSource {
    fn get(&self) -> Option<&Arc<dyn Program>> {
        match self {
            Self::Fixed(program) => Some(program),
            Self::Lazy { provider, program } => program.get_or_init(|| provider()).as_ref(),
        }
    }
}

/// The TypeInfo API over one program.
///
/// Lookups of type targets are cached for the lifetime of the API, which is
/// one plugin build.
pub struct ProgramTypeInfoApi {
    program: ProgramSource,
    options: TypeInfoOptions,
    type_targets: Vec<TypeTargetSpec>,
    resolved_targets: Mutex<FxHashMap<String, Option<TypeId>>>,
    tracker: Arc<DependencyTracker>,
}

impl ProgramTypeInfoApi {
    /// Bind to `program`, recording dependencies into `tracker`.
    pub fn new(program: Arc<dyn Program>, tracker: Arc<DependencyTracker>) -> Self {
        Self::with_source(ProgramSource::Fixed(program), tracker)
    }

    pub(crate) fn lazy(provider: Arc<ProgramProvider>, tracker: Arc<DependencyTracker>) -> Self {
        Self::with_source(
            ProgramSource::Lazy {
                provider,
                program: OnceLock::new(),
            },
            tracker,
        )
    }

    fn with_source(program: ProgramSource, tracker: Arc<DependencyTracker>) -> Self {
        Self {
            program,
            options: TypeInfoOptions::default(),
            type_targets: Vec::new(),
            resolved_targets: Mutex::new(FxHashMap::default()),
            tracker,
        }
    }

    /// Set serialization options.
    pub fn with_options(mut self, options: TypeInfoOptions) -> Self {
        self.options = options;
        self
    }

    /// Register the targets `is_assignable_to` can classify against.
    pub fn with_type_targets(mut self, targets: Vec<TypeTargetSpec>) -> Self {
        self.type_targets = targets;
        self
    }

    fn program(&self) -> Result<&Arc<dyn Program>, TypeInfoError> {
        self.program.get().ok_or_else(TypeInfoError::unavailable)
    }

    fn snapshot(&self, program: &dyn Program, path: &Path) -> FileSnapshot {
        let symbols = program.exports(path).unwrap_or_default();
        let exports = preferred_exports(&symbols)
            .into_iter()
            .map(|symbol| ExportedType {
                name: symbol.name.clone(),
                type_node: Serializer::new(program, self.options.max_type_depth)
                    .serialize(symbol.ty),
                type_id: Some(symbol.ty),
            })
            .collect();
        FileSnapshot {
            file_path: path.to_path_buf(),
            exports,
        }
    }

    fn target(&self, program: &dyn Program, target_id: &str) -> Option<TypeId> {
        if let Some(cached) = self.resolved_targets.lock().get(target_id) {
            return *cached;
        }
        let resolved = self
            .type_targets
            .iter()
            .find(|spec| spec.id == target_id)
            .and_then(|spec| locate_target(program, spec));
        if resolved.is_none() {
            tracing::debug!(target_id, "type target not found in program");
        }
        self.resolved_targets
            .lock()
            .insert(target_id.to_string(), resolved);
        resolved
    }
}

impl fmt::Debug for ProgramTypeInfoApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramTypeInfoApi")
            .field("options", &self.options)
            .field("type_targets", &self.type_targets)
            .finish_non_exhaustive()
    }
}

impl TypeInfoApi for ProgramTypeInfoApi {
    fn file(&self, relative_path: &str, options: &FileOptions) -> Result<FileSnapshot, TypeInfoError> {
        let path = resolve_within(&options.base_dir, relative_path)?;
        let program = self.program()?;
        let Some(program_path) = program_file(program.as_ref(), &path) else {
            return Err(TypeInfoError::new(
                TypeInfoErrorCode::FileNotInProgram,
                format!("`{}` is not part of the program", path.display()),
            ));
        };

        let snapshot = self.snapshot(program.as_ref(), &program_path);
        self.tracker.record(DependencyDescriptor::file(path));
        Ok(snapshot)
    }

    fn directory(&self, patterns: &[&str], options: &DirectoryOptions) -> Vec<FileSnapshot> {
        let base_text = options.base_dir.as_os_str();
        if base_text.is_empty() || base_text.to_string_lossy().contains('\0') {
            return Vec::new();
        }
        let base = normalize_path(&options.base_dir);
        if !base.is_dir() {
            return Vec::new();
        }

        let mut builder = GlobSetBuilder::new();
        let mut valid = Vec::new();
        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                    valid.push(*pattern);
                }
                Err(err) => self
                    .tracker
                    .warn(format!("ignored invalid glob pattern `{pattern}`: {err}")),
            }
        }
        let Ok(set) = builder.build() else {
            return Vec::new();
        };

        if options.watch {
            for pattern in &valid {
                self.tracker.record(DependencyDescriptor::glob(
                    base.clone(),
                    *pattern,
                    options.recursive,
                ));
            }
        }

        let max_depth = if options.recursive { usize::MAX } else { 1 };
        let mut matches: Vec<String> = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&base).ok()?;
                let relative = relative.to_string_lossy().replace('\\', "/");
                set.is_match(&relative).then_some(relative)
            })
            .collect();
        matches.sort();

        let file_options = FileOptions::new(base.clone());
        let mut snapshots: Vec<FileSnapshot> = matches
            .into_iter()
            .filter_map(|relative| match self.file(&relative, &file_options) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    tracing::debug!(file = %relative, %err, "directory scan skipped file");
                    self.tracker.warn(format!("skipped `{relative}`: {err}"));
                    None
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        snapshots
    }

    fn resolve_export(
        &self,
        relative_path: &str,
        export_name: &str,
        options: &FileOptions,
    ) -> Result<Option<ExportedType>, TypeInfoError> {
        let snapshot = self.file(relative_path, options)?;
        Ok(snapshot
            .exports
            .into_iter()
            .find(|export| export.name == export_name))
    }

    fn is_assignable_to(&self, exported: &ExportedType, target_id: &str) -> bool {
        let Some(source) = exported.type_id else {
            return false;
        };
        let Ok(program) = self.program() else {
            return false;
        };
        match self.target(program.as_ref(), target_id) {
            Some(target) => program.is_type_assignable_to(source, target),
            None => false,
        }
    }
}

/// One symbol per exported name: the value meaning when both exist.
fn preferred_exports(symbols: &[ExportSymbol]) -> Vec<&ExportSymbol> {
    let mut out: Vec<&ExportSymbol> = Vec::new();
    for symbol in symbols {
        match out.iter_mut().find(|existing| existing.name == symbol.name) {
            Some(existing) => {
                if symbol.kind == ExportKind::Value {
                    *existing = symbol;
                }
            }
            None => out.push(symbol),
        }
    }
    out
}

/// The program's own spelling of `path`, which may differ from the
/// canonical form (symlinked temp dirs, for instance).
fn program_file(program: &dyn Program, path: &Path) -> Option<PathBuf> {
    if program.contains_file(path) {
        return Some(path.to_path_buf());
    }
    program
        .source_files()
        .into_iter()
        .find(|file| normalize_path(file) == path)
}

/// Resolve a target's module the way an import of it would resolve from
/// any file of the program, then pick its exported type.
fn locate_target(program: &dyn Program, spec: &TypeTargetSpec) -> Option<TypeId> {
    let direct = Path::new(&spec.module);
    let module = if direct.is_absolute() {
        program_file(program, &normalize_path(direct))
    } else {
        program
            .source_files()
            .iter()
            .find_map(|file| program.resolve_module(&spec.module, file))
    }?;

    let exports = program.exports(&module)?;
    exports
        .iter()
        .find(|e| e.name == spec.export_name && e.kind == ExportKind::Type)
        .or_else(|| exports.iter().find(|e| e.name == spec.export_name))
        .map(|e| e.ty)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::host::{CompilerProgramHost, DiskHost};
    use crate::program::SourceProgram;

    struct Fixture {
        dir: TempDir,
        base: PathBuf,
        api: ProgramTypeInfoApi,
        tracker: Arc<DependencyTracker>,
    }

    fn fixture(files: &[(&str, &str)], roots: &[&str], targets: Vec<TypeTargetSpec>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let base = normalize_path(dir.path());
        for (name, text) in files {
            let path = base.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let roots: Vec<PathBuf> = roots.iter().map(|r| base.join(r)).collect();
        let program = SourceProgram::build(&CompilerProgramHost(&DiskHost::new()), &roots);
        let tracker = Arc::new(DependencyTracker::new());
        let api = ProgramTypeInfoApi::new(Arc::new(program), tracker.clone())
            .with_type_targets(targets);
        Fixture {
            dir,
            base,
            api,
            tracker,
        }
    }

    #[test]
    fn test_file_snapshot_records_dependency() {
        let fx = fixture(
            &[("routes/home.ts", "export const path: string = \"/\";")],
            &["routes/home.ts"],
            Vec::new(),
        );
        let snapshot = fx
            .api
            .file("routes/home.ts", &FileOptions::new(&fx.base))
            .unwrap();
        assert_eq!(snapshot.exports.len(), 1);
        assert_eq!(snapshot.exports[0].type_node, crate::types::TypeNode::primitive("string"));
        assert_eq!(
            fx.tracker.drain_dependencies(),
            vec![DependencyDescriptor::file(fx.base.join("routes/home.ts"))]
        );
    }

    #[test]
    fn test_file_errors() {
        let fx = fixture(
            &[("a.ts", "export {};"), ("outside.ts", "export {};")],
            &["a.ts"],
            Vec::new(),
        );
        let options = FileOptions::new(fx.base.join("sub"));
        fs::create_dir_all(fx.base.join("sub")).unwrap();

        let err = fx.api.file("../../secret.ts", &options).unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::PathEscapesBase);

        let err = fx.api.file("a\0.ts", &options).unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::InvalidInput);

        let err = fx
            .api
            .file("outside.ts", &FileOptions::new(&fx.base))
            .unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::FileNotInProgram);
        assert!(fx.tracker.drain_dependencies().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.ts"), "export const s = 1;").unwrap();
        let fx = fixture(&[("a.ts", "export {};")], &["a.ts"], Vec::new());
        std::os::unix::fs::symlink(outside.path(), fx.base.join("link")).unwrap();

        let err = fx
            .api
            .file("link/secret.ts", &FileOptions::new(&fx.base))
            .unwrap_err();
        assert_eq!(err.code, TypeInfoErrorCode::PathEscapesBase);
    }

    #[test]
    fn test_directory_scan() {
        let fx = fixture(
            &[
                ("pages/b.ts", "export const b = 2;"),
                ("pages/a.ts", "export const a = 1;"),
                ("pages/nested/c.ts", "export const c = 3;"),
                ("pages/notes.md", "# notes"),
                ("pages/stray.ts", "export const s = 0;"),
            ],
            &["pages/a.ts", "pages/b.ts", "pages/nested/c.ts"],
            Vec::new(),
        );
        let pages = fx.base.join("pages");

        let flat = fx
            .api
            .directory(&["*.ts"], &DirectoryOptions::new(&pages).watch(true));
        let names: Vec<_> = flat
            .iter()
            .map(|s| s.file_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.ts", "b.ts"]);
        assert!(
            fx.tracker
                .drain_dependencies()
                .contains(&DependencyDescriptor::glob(pages.clone(), "*.ts", false))
        );
        assert!(fx.tracker.drain_warnings().iter().any(|w| w.contains("stray.ts")));

        let deep = fx
            .api
            .directory(&["**/*.ts"], &DirectoryOptions::new(&pages).recursive(true));
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_directory_with_empty_base_is_empty() {
        let fx = fixture(&[("a.ts", "export {};")], &["a.ts"], Vec::new());
        assert!(fx.api.directory(&["*.ts"], &DirectoryOptions::new("")).is_empty());
        assert!(
            fx.api
                .directory(&["*.ts"], &DirectoryOptions::new(fx.dir.path().join("missing")))
                .is_empty()
        );
    }

    #[test]
    fn test_is_assignable_to_type_target() {
        let fx = fixture(
            &[
                ("router.ts", "export interface Route { path: string }"),
                (
                    "routes.ts",
                    "import type { Route } from \"./router\";\n\
                     type R = Route;\n\
                     export const home: R = { path: \"/\" };\n\
                     export const count: number = 1;",
                ),
            ],
            &["routes.ts"],
            vec![TypeTargetSpec::new("Route", "./router", "Route")],
        );
        let options = FileOptions::new(&fx.base);
        let home = fx.api.resolve_export("routes.ts", "home", &options).unwrap().unwrap();
        let count = fx.api.resolve_export("routes.ts", "count", &options).unwrap().unwrap();

        assert!(fx.api.is_assignable_to(&home, "Route"));
        assert!(!fx.api.is_assignable_to(&count, "Route"));
        assert!(!fx.api.is_assignable_to(&home, "Unknown"));
        assert!(fx.api.resolve_export("routes.ts", "missing", &options).unwrap().is_none());
    }
}
