//! Guarded access to the unstable members of [`Program`].
//!
//! Index infos, alias targets, base types and mapped-type modifiers are
//! compiler internals that may be missing or change shape between checker
//! versions. Every access in the crate goes through this module: a missing
//! member yields the documented fallback, and a panicking implementation is
//! caught and logged at `debug` level.

use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{IndexInfo, MappedTypeModifiers, Program, TypeId};

fn guarded<T>(member: &'static str, f: impl FnOnce() -> Option<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(member, "unstable program member panicked; using fallback");
            None
        }
    }
}

/// Index signatures of `ty`. Fallback: none.
pub fn index_infos(program: &dyn Program, ty: TypeId) -> Vec<IndexInfo> {
    guarded("index_infos", || program.index_infos(ty)).unwrap_or_default()
}

/// Target of a reference type. Fallback: `None` (reference stays opaque).
pub fn resolve_alias(program: &dyn Program, ty: TypeId) -> Option<TypeId> {
    guarded("resolve_alias", || program.resolve_alias(ty))
}

/// Follow reference targets until a non-reference type, with a hop limit.
pub fn resolve_alias_chain(program: &dyn Program, mut ty: TypeId) -> TypeId {
    for _ in 0..32 {
        match resolve_alias(program, ty) {
            Some(next) if next != ty => ty = next,
            _ => break,
        }
    }
    ty
}

/// `extends` bases of `ty`. Fallback: none.
pub fn base_types(program: &dyn Program, ty: TypeId) -> Vec<TypeId> {
    guarded("base_types", || program.base_types(ty)).unwrap_or_default()
}

/// Mapped-type modifiers of `ty`. Fallback: `None` (not a mapped type).
pub fn mapped_type_modifiers(program: &dyn Program, ty: TypeId) -> Option<MappedTypeModifiers> {
    guarded("mapped_type_modifiers", || program.mapped_type_modifiers(ty))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::program::{ExportSymbol, TypeKind};

    struct Panicky;

    impl Program for Panicky {
        fn source_files(&self) -> Vec<PathBuf> {
            Vec::new()
        }
        fn contains_file(&self, _path: &Path) -> bool {
            false
        }
        fn exports(&self, _path: &Path) -> Option<Vec<ExportSymbol>> {
            None
        }
        fn type_kind(&self, _ty: TypeId) -> Option<TypeKind> {
            None
        }
        fn type_to_string(&self, _ty: TypeId) -> String {
            String::new()
        }
        fn is_type_assignable_to(&self, _source: TypeId, _target: TypeId) -> bool {
            false
        }
        fn resolve_module(&self, _specifier: &str, _containing_file: &Path) -> Option<PathBuf> {
            None
        }
        fn index_infos(&self, _ty: TypeId) -> Option<Vec<IndexInfo>> {
            panic!("internal layout changed")
        }
        fn resolve_alias(&self, ty: TypeId) -> Option<TypeId> {
            (ty.index() < 3).then(|| TypeId::from_raw(ty.index() as u32 + 1))
        }
    }

    #[test]
    fn test_panicking_member_falls_back() {
        assert!(index_infos(&Panicky, TypeId::from_raw(0)).is_empty());
    }

    #[test]
    fn test_missing_member_falls_back() {
        assert!(base_types(&Panicky, TypeId::from_raw(0)).is_empty());
        assert_eq!(mapped_type_modifiers(&Panicky, TypeId::from_raw(0)), None);
    }

    #[test]
    fn test_alias_chain_follows_targets() {
        assert_eq!(resolve_alias_chain(&Panicky, TypeId::from_raw(0)), TypeId::from_raw(3));
    }
}
