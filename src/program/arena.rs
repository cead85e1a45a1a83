//! Type storage for [`SourceProgram`](super::SourceProgram).
//!
//! Keyword types are interned at fixed ids; every other type is appended.
//! Side tables hold what the stable [`TypeKind`] deliberately leaves out:
//! declaration names, reference targets, `extends` bases and index infos.

use std::fmt::Write;

use rustc_hash::FxHashMap;

use super::{IndexInfo, PrimitiveKind, Property, TypeId, TypeKind};

/// Display recursion limit; deeper structure prints as `...`.
const DISPLAY_DEPTH: usize = 6;

/// Hop limit when following reference targets.
const ALIAS_HOPS: usize = 32;

#[derive(Debug, Clone)]
pub(crate) struct TypeArena {
    kinds: Vec<TypeKind>,
    names: FxHashMap<TypeId, String>,
    alias_targets: FxHashMap<TypeId, TypeId>,
    bases: FxHashMap<TypeId, Vec<TypeId>>,
    index_infos: FxHashMap<TypeId, Vec<IndexInfo>>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    pub fn new() -> Self {
        Self {
            kinds: PrimitiveKind::ALL.iter().map(|&p| TypeKind::Primitive(p)).collect(),
            names: FxHashMap::default(),
            alias_targets: FxHashMap::default(),
            bases: FxHashMap::default(),
            index_infos: FxHashMap::default(),
        }
    }

    // =========================================================================
    // Storage
    // =========================================================================

    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        let index = PrimitiveKind::ALL.iter().position(|&p| p == kind).unwrap_or(0);
        TypeId::from_raw(index as u32)
    }

    pub fn any(&self) -> TypeId {
        self.primitive(PrimitiveKind::Any)
    }

    pub fn alloc(&mut self, kind: TypeKind) -> TypeId {
        if let TypeKind::Primitive(p) = kind {
            return self.primitive(p);
        }
        let id = TypeId::from_raw(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    /// Reserve an id whose kind is filled in later (recursive declarations).
    pub fn placeholder(&mut self) -> TypeId {
        let id = TypeId::from_raw(self.kinds.len() as u32);
        self.kinds.push(TypeKind::Primitive(PrimitiveKind::Any));
        id
    }

    pub fn set(&mut self, id: TypeId, kind: TypeKind) {
        if let Some(slot) = self.kinds.get_mut(id.index()) {
            *slot = kind;
        }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn kind(&self, id: TypeId) -> Option<&TypeKind> {
        self.kinds.get(id.index())
    }

    pub fn set_name(&mut self, id: TypeId, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn set_alias_target(&mut self, id: TypeId, target: TypeId) {
        self.alias_targets.insert(id, target);
    }

    pub fn alias_target(&self, id: TypeId) -> Option<TypeId> {
        self.alias_targets.get(&id).copied()
    }

    pub fn set_bases(&mut self, id: TypeId, bases: Vec<TypeId>) {
        if !bases.is_empty() {
            self.bases.insert(id, bases);
        }
    }

    pub fn bases(&self, id: TypeId) -> &[TypeId] {
        self.bases.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn set_index_infos(&mut self, id: TypeId, infos: Vec<IndexInfo>) {
        if !infos.is_empty() {
            self.index_infos.insert(id, infos);
        }
    }

    pub fn index_infos(&self, id: TypeId) -> &[IndexInfo] {
        self.index_infos.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Copy `from`'s kind and side tables onto `to`.
    pub fn copy_into(&mut self, from: TypeId, to: TypeId) {
        if let Some(kind) = self.kind(from).cloned() {
            self.set(to, kind);
        }
        if let Some(bases) = self.bases.get(&from).cloned() {
            self.bases.insert(to, bases);
        }
        if let Some(infos) = self.index_infos.get(&from).cloned() {
            self.index_infos.insert(to, infos);
        }
        if let Some(target) = self.alias_target(from) {
            self.alias_targets.insert(to, target);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Follow reference targets to the underlying type.
    pub fn resolve(&self, mut id: TypeId) -> TypeId {
        for _ in 0..ALIAS_HOPS {
            match self.alias_target(id) {
                Some(next) if next != id => id = next,
                _ => break,
            }
        }
        id
    }

    /// Whether `id` is a reference with no known target.
    pub fn is_opaque_reference(&self, id: TypeId) -> bool {
        matches!(self.kind(id), Some(TypeKind::Reference(_))) && self.alias_target(id).is_none()
    }

    /// Own plus inherited properties; own members shadow inherited ones.
    pub fn all_properties(&self, id: TypeId) -> Vec<Property> {
        let mut out = Vec::new();
        self.collect_properties(self.resolve(id), &mut out, 0);
        out
    }

    fn collect_properties(&self, id: TypeId, out: &mut Vec<Property>, depth: usize) {
        if depth > ALIAS_HOPS {
            return;
        }
        match self.kind(id) {
            Some(TypeKind::Object(object)) => {
                for property in &object.properties {
                    if !out.iter().any(|p| p.name == property.name) {
                        out.push(property.clone());
                    }
                }
            }
            Some(TypeKind::Intersection(members)) => {
                for &member in members {
                    self.collect_properties(self.resolve(member), out, depth + 1);
                }
            }
            _ => {}
        }
        for &base in self.bases(id) {
            self.collect_properties(self.resolve(base), out, depth + 1);
        }
    }

    /// Own plus inherited index infos.
    pub fn all_index_infos(&self, id: TypeId) -> Vec<IndexInfo> {
        let id = self.resolve(id);
        let mut out = self.index_infos(id).to_vec();
        if let Some(TypeKind::Intersection(members)) = self.kind(id) {
            for &member in members {
                out.extend(self.all_index_infos(member));
            }
        }
        for &base in self.bases(id) {
            out.extend(self.all_index_infos(base));
        }
        out
    }

    /// Whether the resolved type has object shape.
    pub fn is_object_like(&self, id: TypeId) -> bool {
        match self.kind(self.resolve(id)) {
            Some(TypeKind::Object(_)) => true,
            Some(TypeKind::Intersection(members)) => {
                members.iter().all(|&member| self.is_object_like(member))
            }
            _ => false,
        }
    }

    // =========================================================================
    // Display
    // =========================================================================

    pub fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, id, 0);
        out
    }

    fn write_type(&self, out: &mut String, id: TypeId, depth: usize) {
        if let Some(name) = self.name(id) {
            out.push_str(name);
            return;
        }
        if depth > DISPLAY_DEPTH {
            out.push_str("...");
            return;
        }
        let Some(kind) = self.kind(id) else {
            out.push_str("unknown");
            return;
        };
        match kind {
            TypeKind::Primitive(p) => out.push_str(p.keyword()),
            TypeKind::Literal(value) => _ = write!(out, "{value}"),
            TypeKind::Union(members) => self.write_joined(out, members, " | ", depth),
            TypeKind::Intersection(members) => self.write_joined(out, members, " & ", depth),
            TypeKind::Array(element) => {
                let wrap = matches!(
                    self.kind(*element),
                    Some(TypeKind::Union(_) | TypeKind::Intersection(_) | TypeKind::Function(_))
                ) && self.name(*element).is_none();
                if wrap {
                    out.push('(');
                }
                self.write_type(out, *element, depth + 1);
                if wrap {
                    out.push(')');
                }
                out.push_str("[]");
            }
            TypeKind::Tuple(elements) => {
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if element.rest {
                        out.push_str("...");
                    }
                    self.write_type(out, element.ty, depth + 1);
                    if element.optional {
                        out.push('?');
                    }
                }
                out.push(']');
            }
            TypeKind::Object(object) => {
                let infos = self.index_infos(id);
                if object.properties.is_empty() && infos.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{ ");
                for property in &object.properties {
                    if property.readonly {
                        out.push_str("readonly ");
                    }
                    out.push_str(&property.name);
                    if property.optional {
                        out.push('?');
                    }
                    out.push_str(": ");
                    self.write_type(out, property.ty, depth + 1);
                    out.push_str("; ");
                }
                for info in infos {
                    if info.readonly {
                        out.push_str("readonly ");
                    }
                    out.push_str("[key: ");
                    self.write_type(out, info.key, depth + 1);
                    out.push_str("]: ");
                    self.write_type(out, info.value, depth + 1);
                    out.push_str("; ");
                }
                out.push('}');
            }
            TypeKind::Function(signature) => {
                out.push('(');
                for (i, parameter) in signature.parameters.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if parameter.rest {
                        out.push_str("...");
                    }
                    out.push_str(&parameter.name);
                    if parameter.optional {
                        out.push('?');
                    }
                    out.push_str(": ");
                    self.write_type(out, parameter.ty, depth + 1);
                }
                out.push_str(") => ");
                self.write_type(out, signature.return_type, depth + 1);
            }
            TypeKind::Reference(reference) => {
                out.push_str(&reference.name);
                if !reference.type_arguments.is_empty() {
                    out.push('<');
                    self.write_joined(out, &reference.type_arguments, ", ", depth);
                    out.push('>');
                }
            }
            TypeKind::TypeParameter(name) => out.push_str(name),
        }
    }

    fn write_joined(&self, out: &mut String, ids: &[TypeId], separator: &str, depth: usize) {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            self.write_type(out, id, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{LiteralValue, ObjectType, TypeReference};

    fn property(name: &str, ty: TypeId) -> Property {
        Property {
            name: name.into(),
            ty,
            optional: false,
            readonly: false,
        }
    }

    #[test]
    fn test_primitives_are_interned() {
        let mut arena = TypeArena::new();
        let a = arena.alloc(TypeKind::Primitive(PrimitiveKind::String));
        assert_eq!(a, arena.primitive(PrimitiveKind::String));
        assert_eq!(arena.len(), PrimitiveKind::ALL.len());
    }

    #[test]
    fn test_display_object_and_union() {
        let mut arena = TypeArena::new();
        let number = arena.primitive(PrimitiveKind::Number);
        let home = arena.alloc(TypeKind::Literal(LiteralValue::String("home".into())));
        let union = arena.alloc(TypeKind::Union(vec![home, number]));
        let object = arena.alloc(TypeKind::Object(ObjectType {
            properties: vec![property("n", number), property("u", union)],
        }));
        assert_eq!(arena.display(object), "{ n: number; u: \"home\" | number; }");

        arena.set_name(object, "Foo");
        let list = arena.alloc(TypeKind::Array(object));
        assert_eq!(arena.display(list), "Foo[]");
    }

    #[test]
    fn test_inherited_properties() {
        let mut arena = TypeArena::new();
        let string = arena.primitive(PrimitiveKind::String);
        let number = arena.primitive(PrimitiveKind::Number);
        let base = arena.alloc(TypeKind::Object(ObjectType {
            properties: vec![property("id", string), property("n", string)],
        }));
        let reference = arena.alloc(TypeKind::Reference(TypeReference {
            name: "Base".into(),
            type_arguments: Vec::new(),
        }));
        arena.set_alias_target(reference, base);
        let derived = arena.alloc(TypeKind::Object(ObjectType {
            properties: vec![property("n", number)],
        }));
        arena.set_bases(derived, vec![reference]);

        let props = arena.all_properties(derived);
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].name, "n");
        assert_eq!(props[0].ty, number);
        assert_eq!(props[1].name, "id");
    }
}
