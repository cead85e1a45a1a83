//! Structural assignability and initializer checking.

use std::path::Path;

use rustc_hash::FxHashSet;

use super::arena::TypeArena;
use super::lower::Lowerer;
use super::parse::{CheckedDeclarator, TextSpan, ValueExpr, ValueKind};
use super::{PrimitiveKind, TypeId, TypeKind};
use crate::diagnostic::codes;

// =============================================================================
// Assignability
// =============================================================================

/// Whether a value of type `source` may be assigned to `target`.
///
/// Unresolved references and type parameters relate to everything, so
/// the relation only rejects what it can prove incompatible.
pub(crate) fn is_assignable(arena: &TypeArena, source: TypeId, target: TypeId) -> bool {
    Relation {
        arena,
        assumed: FxHashSet::default(),
    }
    .relate(source, target)
}

struct Relation<'a> {
    arena: &'a TypeArena,
    assumed: FxHashSet<(TypeId, TypeId)>,
}

impl Relation<'_> {
    fn relate(&mut self, source: TypeId, target: TypeId) -> bool {
        if source == target || !self.assumed.insert((source, target)) {
            return true;
        }
        let related = self.relate_resolved(source, target);
        self.assumed.remove(&(source, target));
        related
    }

    fn relate_resolved(&mut self, source: TypeId, target: TypeId) -> bool {
        let arena = self.arena;
        let (source, target) = (arena.resolve(source), arena.resolve(target));
        if source == target || self.is_wildcard(source) || self.is_wildcard(target) {
            return true;
        }
        let (Some(s), Some(t)) = (arena.kind(source), arena.kind(target)) else {
            return true;
        };

        match (s, t) {
            (_, TypeKind::Primitive(PrimitiveKind::Any | PrimitiveKind::Unknown)) => return true,
            (TypeKind::Primitive(PrimitiveKind::Any | PrimitiveKind::Never), _) => return true,
            _ => {}
        }

        if let TypeKind::Union(members) = s {
            return members.clone().into_iter().all(|m| self.relate(m, target));
        }
        if let TypeKind::Union(members) = t {
            return members.clone().into_iter().any(|m| self.relate(source, m));
        }
        if let TypeKind::Intersection(members) = t {
            return members.clone().into_iter().all(|m| self.relate(source, m));
        }
        if let TypeKind::Intersection(members) = s
            && members.clone().into_iter().any(|m| self.relate(m, target))
        {
            return true;
        }

        match (s, t) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => {
                a == b || (*a == PrimitiveKind::Undefined && *b == PrimitiveKind::Void)
            }
            (TypeKind::Literal(value), TypeKind::Primitive(b)) => value.base() == *b,
            (TypeKind::Literal(a), TypeKind::Literal(b)) => a == b,
            (
                TypeKind::Object(_)
                | TypeKind::Array(_)
                | TypeKind::Tuple(_)
                | TypeKind::Function(_)
                | TypeKind::Intersection(_),
                TypeKind::Primitive(PrimitiveKind::Object),
            ) => true,
            (TypeKind::Array(a), TypeKind::Array(b)) => self.relate(*a, *b),
            (TypeKind::Tuple(elements), TypeKind::Array(b)) => {
                elements.clone().into_iter().all(|e| self.relate(e.ty, *b))
            }
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => {
                let required = b.iter().filter(|e| !e.optional && !e.rest).count();
                a.len() >= required
                    && (a.len() <= b.len() || b.iter().any(|e| e.rest))
                    && a.clone()
                        .into_iter()
                        .zip(b.clone())
                        .all(|(x, y)| self.relate(x.ty, y.ty))
            }
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                let (a, b) = (a.clone(), b.clone());
                let required = a.parameters.iter().filter(|p| !p.optional && !p.rest).count();
                let void_return = matches!(
                    arena.kind(arena.resolve(b.return_type)),
                    Some(TypeKind::Primitive(PrimitiveKind::Void))
                );
                let arity_ok = required <= b.parameters.len() || b.parameters.iter().any(|p| p.rest);
                arity_ok
                    && a.parameters.iter().zip(&b.parameters).all(|(x, y)| {
                        self.relate(y.ty, x.ty) || self.relate(x.ty, y.ty)
                    })
                    && (void_return || self.relate(a.return_type, b.return_type))
            }
            (_, TypeKind::Object(_)) => self.relate_structurally(source, target),
            _ => false,
        }
    }

    fn is_wildcard(&self, id: TypeId) -> bool {
        self.arena.is_opaque_reference(id)
            || matches!(self.arena.kind(id), Some(TypeKind::TypeParameter(_)))
    }

    fn relate_structurally(&mut self, source: TypeId, target: TypeId) -> bool {
        let arena = self.arena;
        let source_is_object = arena.is_object_like(source)
            || matches!(arena.kind(source), Some(TypeKind::Function(_) | TypeKind::Array(_)));
        if !source_is_object {
            return false;
        }
        let source_props = arena.all_properties(source);
        for property in arena.all_properties(target) {
            match source_props.iter().find(|p| p.name == property.name) {
                Some(found) => {
                    if !self.relate(found.ty, property.ty) {
                        return false;
                    }
                }
                None if property.optional => {}
                None => return false,
            }
        }
        for info in arena.all_index_infos(target) {
            for property in &source_props {
                if !self.relate(property.ty, info.value) {
                    return false;
                }
            }
        }
        true
    }
}

// =============================================================================
// Initializer Checking
// =============================================================================

/// A failed initializer check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mismatch {
    pub code: u32,
    pub message: String,
    pub span: TextSpan,
}

/// Check an annotated declarator's initializer against its annotation.
pub(crate) fn check_declarator(
    lowerer: &mut Lowerer<'_>,
    file: &Path,
    declarator: &CheckedDeclarator,
) -> Option<Mismatch> {
    let target = lowerer.lower_type(file, &declarator.annotation, &[]);
    check_value(lowerer, file, &declarator.init, target, declarator.name_span).err()
}

fn check_value(
    lowerer: &mut Lowerer<'_>,
    file: &Path,
    value: &ValueExpr,
    target: TypeId,
    at: TextSpan,
) -> Result<(), Mismatch> {
    let resolved = lowerer.arena.resolve(target);
    match (&value.kind, lowerer.arena.kind(resolved).cloned()) {
        (ValueKind::Object { properties, spread: false }, _) if lowerer.arena.is_object_like(resolved) => {
            let expected = lowerer.arena.all_properties(resolved);
            let index_value = lowerer
                .arena
                .all_index_infos(resolved)
                .into_iter()
                .find(|info| {
                    matches!(
                        lowerer.arena.kind(lowerer.arena.resolve(info.key)),
                        Some(TypeKind::Primitive(PrimitiveKind::String))
                    )
                })
                .map(|info| info.value);

            for entry in properties {
                match expected.iter().find(|p| p.name == entry.name) {
                    Some(property) => {
                        check_value(lowerer, file, &entry.value, property.ty, entry.key_span)?
                    }
                    None => match index_value {
                        Some(value_type) => {
                            check_value(lowerer, file, &entry.value, value_type, entry.key_span)?
                        }
                        None => {
                            return Err(Mismatch {
                                code: codes::EXCESS_PROPERTY,
                                message: format!(
                                    "Object literal may only specify known properties, and '{}' does not exist in type '{}'.",
                                    entry.name,
                                    lowerer.arena.display(target)
                                ),
                                span: entry.key_span,
                            });
                        }
                    },
                }
            }

            if let Some(missing) = expected
                .iter()
                .find(|p| !p.optional && !properties.iter().any(|e| e.name == p.name))
            {
                let source = lowerer.type_of_value(file, value, false);
                return Err(Mismatch {
                    code: codes::MISSING_PROPERTY,
                    message: format!(
                        "Property '{}' is missing in type '{}' but required in type '{}'.",
                        missing.name,
                        lowerer.arena.display(source),
                        lowerer.arena.display(target)
                    ),
                    span: at,
                });
            }
            Ok(())
        }
        (ValueKind::Object { .. } | ValueKind::Array { .. }, Some(TypeKind::Union(members))) => {
            let passes = members
                .iter()
                .any(|&member| check_value(lowerer, file, value, member, at).is_ok());
            if passes {
                Ok(())
            } else {
                Err(not_assignable(lowerer, file, value, target, at))
            }
        }
        (ValueKind::Array { elements, spread: false }, Some(TypeKind::Array(element_type))) => {
            for element in elements {
                check_value(lowerer, file, element, element_type, element.span)?;
            }
            Ok(())
        }
        _ => {
            let source = lowerer.type_of_value(file, value, true);
            if is_assignable(&lowerer.arena, source, target) {
                Ok(())
            } else {
                Err(not_assignable(lowerer, file, value, target, at))
            }
        }
    }
}

fn not_assignable(
    lowerer: &mut Lowerer<'_>,
    file: &Path,
    value: &ValueExpr,
    target: TypeId,
    at: TextSpan,
) -> Mismatch {
    let source = lowerer.type_of_value(file, value, true);
    let shown = if lowerer.contains_literals(target) {
        source
    } else {
        lowerer.widened(source)
    };
    Mismatch {
        code: codes::NOT_ASSIGNABLE,
        message: format!(
            "Type '{}' is not assignable to type '{}'.",
            lowerer.arena.display(shown),
            lowerer.arena.display(target)
        ),
        span: at,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rustc_hash::FxHashMap;

    use super::*;
    use crate::program::lower::ModuleGraph;
    use crate::program::parse::{ParsedModule, parse_module};

    fn check(text: &str) -> Vec<Mismatch> {
        let path = PathBuf::from("/p/main.ts");
        let module = parse_module(&path, text);
        let checked = module.checked.clone();
        let mut modules: FxHashMap<PathBuf, ParsedModule> = FxHashMap::default();
        modules.insert(path.clone(), module);
        let resolutions = FxHashMap::default();
        let mut lowerer = Lowerer::new(ModuleGraph {
            modules: &modules,
            resolutions: &resolutions,
        });
        checked
            .iter()
            .filter_map(|d| check_declarator(&mut lowerer, &path, d))
            .collect()
    }

    #[test]
    fn test_matching_literal_passes() {
        assert!(check("interface Foo { n: number }\nconst v: Foo = { n: 1 };").is_empty());
    }

    #[test]
    fn test_property_type_mismatch() {
        let text = "interface Foo { n: string }\nconst v: Foo = { n: 1 };";
        let found = check(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, codes::NOT_ASSIGNABLE);
        assert_eq!(found[0].message, "Type 'number' is not assignable to type 'string'.");
        let (start, end) = found[0].span;
        assert_eq!(&text[start as usize..end as usize], "n");
    }

    #[test]
    fn test_excess_and_missing_properties() {
        let found = check("interface Foo { n: number }\nconst a: Foo = { n: 1, m: 2 };\nconst b: Foo = {};");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code, codes::EXCESS_PROPERTY);
        assert_eq!(found[1].code, codes::MISSING_PROPERTY);
        assert!(found[1].message.starts_with("Property 'n' is missing"));
    }

    #[test]
    fn test_literal_union_and_inheritance() {
        let text = "type Mode = 'a' | 'b';\n\
                    interface Base { mode: Mode }\n\
                    interface Derived extends Base { id: number }\n\
                    const ok: Derived = { mode: 'a', id: 1 };\n\
                    const bad: Derived = { mode: 'c', id: 1 };";
        let found = check(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Type '\"c\"' is not assignable to type 'Mode'.");
    }

    #[test]
    fn test_unresolved_reference_is_lenient() {
        assert!(check("const p: Promise<string> = load();").is_empty());
    }
}
