//! Cross-file lowering of parsed declarations into the type arena.
//!
//! Names resolve the way a module-aware checker resolves them: local
//! declarations first, then import bindings, following named re-exports and
//! `export *` through the module graph. Declarations are lowered on demand
//! and memoized; a reserved id breaks cycles between recursive declarations.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use super::arena::TypeArena;
use super::parse::{
    ExportDecl, FunctionExpr, ImportedName, MemberExpr, ParsedModule, TypeDecl, TypeExpr,
    ValueDecl, ValueExpr, ValueKind,
};
use super::{
    IndexInfo, ObjectType, Parameter, PrimitiveKind, Property, Signature,
    TupleElement, TypeId, TypeKind, TypeReference,
};

/// Namespace a name is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Meaning {
    Type,
    Value,
}

type SymbolKey = (PathBuf, String, Meaning);

/// Parsed modules plus the resolution of every specifier they mention.
pub(crate) struct ModuleGraph<'a> {
    pub modules: &'a FxHashMap<PathBuf, ParsedModule>,
    pub resolutions: &'a FxHashMap<PathBuf, FxHashMap<String, Option<PathBuf>>>,
}

impl ModuleGraph<'_> {
    fn resolve(&self, file: &Path, specifier: &str) -> Option<PathBuf> {
        self.resolutions.get(file)?.get(specifier)?.clone()
    }
}

pub(crate) struct Lowerer<'a> {
    graph: ModuleGraph<'a>,
    pub arena: TypeArena,
    memo: FxHashMap<SymbolKey, TypeId>,
    in_progress: FxHashSet<SymbolKey>,
    export_stack: FxHashSet<SymbolKey>,
}

impl<'a> Lowerer<'a> {
    pub fn new(graph: ModuleGraph<'a>) -> Self {
        Self {
            graph,
            arena: TypeArena::new(),
            memo: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            export_stack: FxHashSet::default(),
        }
    }

    pub fn module(&self, file: &Path) -> Option<&'a ParsedModule> {
        self.graph.modules.get(file)
    }

    pub fn resolve_specifier(&self, file: &Path, specifier: &str) -> Option<PathBuf> {
        self.graph.resolve(file, specifier)
    }

    // =========================================================================
    // Name Resolution
    // =========================================================================

    /// Resolve a name visible in `file`.
    pub fn resolve_local(&mut self, file: &Path, name: &str, meaning: Meaning) -> Option<TypeId> {
        if let Some((namespace, member)) = name.split_once('.') {
            return self.resolve_qualified(file, namespace, member, meaning);
        }
        let module = self.module(file)?;
        let declared = match meaning {
            Meaning::Type => module.types.contains_key(name),
            Meaning::Value => module.values.contains_key(name),
        };
        if declared {
            return Some(self.lower_declaration(file, name, meaning));
        }

        for import in &module.imports {
            for binding in &import.bindings {
                if binding.local != name {
                    continue;
                }
                let target = self.graph.resolve(file, &import.specifier)?;
                return match &binding.imported {
                    ImportedName::Named(imported) => self.resolve_export(&target, imported, meaning),
                    ImportedName::Default => self.resolve_export(&target, "default", meaning),
                    ImportedName::Namespace => None,
                };
            }
        }
        None
    }

    fn resolve_qualified(
        &mut self,
        file: &Path,
        namespace: &str,
        member: &str,
        meaning: Meaning,
    ) -> Option<TypeId> {
        let module = self.module(file)?;
        let specifier = module.imports.iter().find_map(|import| {
            import
                .bindings
                .iter()
                .any(|b| b.local == namespace && b.imported == ImportedName::Namespace)
                .then_some(import.specifier.as_str())
        })?;
        let target = self.graph.resolve(file, specifier)?;
        self.resolve_export(&target, member, meaning)
    }

    /// Resolve an export of `file`, following re-exports.
    pub fn resolve_export(&mut self, file: &Path, name: &str, meaning: Meaning) -> Option<TypeId> {
        let key = (file.to_path_buf(), name.to_string(), meaning);
        if !self.export_stack.insert(key.clone()) {
            return None;
        }
        let result = self.resolve_export_inner(file, name, meaning);
        self.export_stack.remove(&key);
        result
    }

    fn resolve_export_inner(&mut self, file: &Path, name: &str, meaning: Meaning) -> Option<TypeId> {
        let module = self.module(file)?;
        for export in &module.exports {
            match export {
                ExportDecl::Local { exported, local } if exported == name => {
                    if let Some(ty) = self.resolve_local(file, local, meaning) {
                        return Some(ty);
                    }
                }
                ExportDecl::ReExport {
                    exported,
                    imported,
                    specifier,
                    ..
                } if exported == name => {
                    let target = self.graph.resolve(file, specifier)?;
                    if let Some(ty) = self.resolve_export(&target, imported, meaning) {
                        return Some(ty);
                    }
                }
                _ => {}
            }
        }
        if name == "default" {
            return None;
        }
        for export in &module.exports {
            if let ExportDecl::Star { specifier, .. } = export
                && let Some(target) = self.graph.resolve(file, specifier)
                && let Some(ty) = self.resolve_export(&target, name, meaning)
            {
                return Some(ty);
            }
        }
        None
    }

    /// Every exported name of `file`, including names reached through `export *`.
    pub fn export_names(&self, file: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_export_names(file, &mut names, &mut visited, true);
        names
    }

    fn collect_export_names(
        &self,
        file: &Path,
        names: &mut Vec<String>,
        visited: &mut FxHashSet<PathBuf>,
        top: bool,
    ) {
        if !visited.insert(file.to_path_buf()) {
            return;
        }
        let Some(module) = self.module(file) else {
            return;
        };
        let push = |name: &str, names: &mut Vec<String>| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for export in &module.exports {
            match export {
                ExportDecl::Local { exported, .. } | ExportDecl::ReExport { exported, .. } => {
                    if top || exported != "default" {
                        push(exported, names);
                    }
                }
                ExportDecl::Star { .. } => {}
            }
        }
        for export in &module.exports {
            if let ExportDecl::Star { specifier, .. } = export
                && let Some(target) = self.graph.resolve(file, specifier)
            {
                self.collect_export_names(&target, names, visited, false);
            }
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn lower_declaration(&mut self, file: &Path, name: &str, meaning: Meaning) -> TypeId {
        let key = (file.to_path_buf(), name.to_string(), meaning);
        if let Some(&id) = self.memo.get(&key) {
            return id;
        }
        let Some(module) = self.module(file) else {
            return self.arena.any();
        };
        match meaning {
            Meaning::Type => match module.types.get(name) {
                Some(decl) => self.lower_type_decl(key, file, name, decl),
                None => self.arena.any(),
            },
            Meaning::Value => match module.values.get(name) {
                Some(decl) => self.lower_value_decl(key, file, decl),
                None => self.arena.any(),
            },
        }
    }

    fn lower_type_decl(&mut self, key: SymbolKey, file: &Path, name: &str, decl: &TypeDecl) -> TypeId {
        let id = self.arena.placeholder();
        self.memo.insert(key, id);

        match decl {
            TypeDecl::Interface {
                type_params,
                extends,
                members,
            } => {
                let (object, infos) = self.lower_members(file, members, type_params);
                self.arena.set(id, TypeKind::Object(object));
                self.arena.set_index_infos(id, infos);
                let bases = extends
                    .iter()
                    .map(|base| self.lower_type(file, base, type_params))
                    .collect();
                self.arena.set_bases(id, bases);
                self.arena.set_name(id, name);
            }
            TypeDecl::Alias { type_params, ty } => {
                let before = self.arena.len();
                let lowered = self.lower_type(file, ty, type_params);
                if lowered.index() >= before {
                    self.arena.copy_into(lowered, id);
                    if !matches!(self.arena.kind(id), Some(TypeKind::Reference(_))) {
                        self.arena.set_name(id, name);
                    }
                } else {
                    self.arena.set(
                        id,
                        TypeKind::Reference(TypeReference {
                            name: name.to_string(),
                            type_arguments: Vec::new(),
                        }),
                    );
                    self.arena.set_alias_target(id, lowered);
                }
            }
        }
        id
    }

    fn lower_value_decl(&mut self, key: SymbolKey, file: &Path, decl: &ValueDecl) -> TypeId {
        if !self.in_progress.insert(key.clone()) {
            return self.arena.any();
        }
        let id = match decl {
            ValueDecl::Annotated(ty) => self.lower_type(file, ty, &[]),
            ValueDecl::Inferred { init, constant } => self.type_of_value(file, init, *constant),
            ValueDecl::Function(function) => self.lower_function(file, function, &[]),
            ValueDecl::Opaque => self.arena.any(),
        };
        self.in_progress.remove(&key);
        self.memo.insert(key, id);
        id
    }

    // =========================================================================
    // Type Expressions
    // =========================================================================

    pub fn lower_type(&mut self, file: &Path, expr: &TypeExpr, scope: &[String]) -> TypeId {
        match expr {
            TypeExpr::Keyword(kind) => self.arena.primitive(*kind),
            TypeExpr::Literal(value) => self.arena.alloc(TypeKind::Literal(value.clone())),
            TypeExpr::Reference { name, args } => self.lower_reference(file, name, args, scope),
            TypeExpr::Union(members) => {
                let ids = self.lower_flattened(file, members, scope, true);
                self.composite(ids, TypeKind::Union)
            }
            TypeExpr::Intersection(members) => {
                let ids = self.lower_flattened(file, members, scope, false);
                self.composite(ids, TypeKind::Intersection)
            }
            TypeExpr::Array(element) => {
                let element = self.lower_type(file, element, scope);
                self.arena.alloc(TypeKind::Array(element))
            }
            TypeExpr::Tuple(elements) => {
                let elements = elements
                    .iter()
                    .map(|element| TupleElement {
                        ty: self.lower_type(file, &element.ty, scope),
                        optional: element.optional,
                        rest: element.rest,
                    })
                    .collect();
                self.arena.alloc(TypeKind::Tuple(elements))
            }
            TypeExpr::Object(members) => {
                let (object, infos) = self.lower_members(file, members, scope);
                let id = self.arena.alloc(TypeKind::Object(object));
                self.arena.set_index_infos(id, infos);
                id
            }
            TypeExpr::Function(function) => self.lower_function(file, function, scope),
            TypeExpr::Opaque => self.arena.any(),
        }
    }

    fn lower_flattened(
        &mut self,
        file: &Path,
        members: &[TypeExpr],
        scope: &[String],
        union: bool,
    ) -> Vec<TypeId> {
        let mut ids: Vec<TypeId> = Vec::new();
        for member in members {
            let id = self.lower_type(file, member, scope);
            let nested = match self.arena.kind(id) {
                Some(TypeKind::Union(inner)) if union && self.arena.name(id).is_none() => {
                    Some(inner.clone())
                }
                Some(TypeKind::Intersection(inner)) if !union && self.arena.name(id).is_none() => {
                    Some(inner.clone())
                }
                _ => None,
            };
            for id in nested.unwrap_or_else(|| vec![id]) {
                let duplicate = ids
                    .iter()
                    .any(|&existing| existing == id || self.same_literal(existing, id));
                if !duplicate {
                    ids.push(id);
                }
            }
        }
        ids
    }

    fn same_literal(&self, a: TypeId, b: TypeId) -> bool {
        matches!(
            (self.arena.kind(a), self.arena.kind(b)),
            (Some(TypeKind::Literal(x)), Some(TypeKind::Literal(y))) if x == y
        )
    }

    fn composite(&mut self, ids: Vec<TypeId>, make: fn(Vec<TypeId>) -> TypeKind) -> TypeId {
        match ids.as_slice() {
            [] => self.arena.primitive(PrimitiveKind::Never),
            [single] => *single,
            _ => self.arena.alloc(make(ids)),
        }
    }

    fn lower_reference(
        &mut self,
        file: &Path,
        name: &str,
        args: &[TypeExpr],
        scope: &[String],
    ) -> TypeId {
        if args.is_empty() && scope.iter().any(|param| param == name) {
            return self.arena.alloc(TypeKind::TypeParameter(name.to_string()));
        }
        let type_arguments: Vec<TypeId> =
            args.iter().map(|arg| self.lower_type(file, arg, scope)).collect();
        let target = self.resolve_local(file, name, Meaning::Type);

        if target.is_none() {
            match (name, type_arguments.as_slice()) {
                ("Array" | "ReadonlyArray", [element]) => {
                    return self.arena.alloc(TypeKind::Array(*element));
                }
                ("Record", [key, value]) => {
                    let id = self.arena.alloc(TypeKind::Object(ObjectType::default()));
                    self.arena.set_index_infos(
                        id,
                        vec![IndexInfo {
                            key: *key,
                            value: *value,
                            readonly: false,
                        }],
                    );
                    return id;
                }
                _ => {}
            }
        }

        let id = self.arena.alloc(TypeKind::Reference(TypeReference {
            name: name.to_string(),
            type_arguments,
        }));
        if let Some(target) = target {
            self.arena.set_alias_target(id, target);
        }
        id
    }

    fn lower_members(
        &mut self,
        file: &Path,
        members: &[MemberExpr],
        scope: &[String],
    ) -> (ObjectType, Vec<IndexInfo>) {
        let mut object = ObjectType::default();
        let mut infos = Vec::new();
        for member in members {
            match member {
                MemberExpr::Property {
                    name,
                    optional,
                    readonly,
                    ty,
                } => {
                    let ty = self.lower_type(file, ty, scope);
                    object.properties.push(Property {
                        name: name.clone(),
                        ty,
                        optional: *optional,
                        readonly: *readonly,
                    });
                }
                MemberExpr::Index {
                    key,
                    value,
                    readonly,
                } => infos.push(IndexInfo {
                    key: self.lower_type(file, key, scope),
                    value: self.lower_type(file, value, scope),
                    readonly: *readonly,
                }),
            }
        }
        (object, infos)
    }

    fn lower_function(&mut self, file: &Path, function: &FunctionExpr, scope: &[String]) -> TypeId {
        let parameters = function
            .params
            .iter()
            .map(|param| Parameter {
                name: param.name.clone(),
                ty: match &param.ty {
                    Some(ty) => self.lower_type(file, ty, scope),
                    None => self.arena.any(),
                },
                optional: param.optional,
                rest: param.rest,
            })
            .collect();
        let return_type = match &function.ret {
            Some(ret) => self.lower_type(file, ret, scope),
            None => self.arena.any(),
        };
        self.arena.alloc(TypeKind::Function(Signature {
            parameters,
            return_type,
        }))
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Type of a value expression. `fresh` keeps literal types at the top level.
    pub fn type_of_value(&mut self, file: &Path, value: &ValueExpr, fresh: bool) -> TypeId {
        match &value.kind {
            ValueKind::Literal(literal) if fresh => self.arena.alloc(TypeKind::Literal(literal.clone())),
            ValueKind::Literal(literal) => self.arena.primitive(literal.base()),
            ValueKind::Null => self.arena.primitive(PrimitiveKind::Null),
            ValueKind::String => self.arena.primitive(PrimitiveKind::String),
            ValueKind::Object { properties, .. } => {
                let properties = properties
                    .iter()
                    .map(|entry| Property {
                        name: entry.name.clone(),
                        ty: self.type_of_value(file, &entry.value, false),
                        optional: false,
                        readonly: false,
                    })
                    .collect();
                self.arena.alloc(TypeKind::Object(ObjectType { properties }))
            }
            ValueKind::Array { elements, .. } => {
                let mut ids: Vec<TypeId> = Vec::new();
                for element in elements {
                    let id = self.type_of_value(file, element, false);
                    let duplicate = ids.iter().any(|&existing| {
                        existing == id || self.arena.kind(existing) == self.arena.kind(id)
                    });
                    if !duplicate {
                        ids.push(id);
                    }
                }
                let element = match ids.as_slice() {
                    [] => self.arena.any(),
                    [single] => *single,
                    _ => self.arena.alloc(TypeKind::Union(ids)),
                };
                self.arena.alloc(TypeKind::Array(element))
            }
            ValueKind::Identifier(name) if name == "undefined" => {
                self.arena.primitive(PrimitiveKind::Undefined)
            }
            ValueKind::Identifier(name) => self
                .resolve_local(file, name, Meaning::Value)
                .unwrap_or_else(|| self.arena.any()),
            ValueKind::Function(function) => self.lower_function(file, function, &[]),
            ValueKind::Asserted(ty) => self.lower_type(file, ty, &[]),
            ValueKind::Opaque => self.arena.any(),
        }
    }

    /// Literal widening used in messages (`1` reads as `number`).
    pub fn widened(&self, id: TypeId) -> TypeId {
        match self.arena.kind(id) {
            Some(TypeKind::Literal(value)) => self.arena.primitive(value.base()),
            _ => id,
        }
    }

    pub fn contains_literals(&self, id: TypeId) -> bool {
        match self.arena.kind(self.arena.resolve(id)) {
            Some(TypeKind::Literal(_)) => true,
            Some(TypeKind::Union(members)) => members.iter().any(|&m| self.contains_literals(m)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parse::parse_module;

    fn graph_of(files: &[(&str, &str)]) -> (
        FxHashMap<PathBuf, ParsedModule>,
        FxHashMap<PathBuf, FxHashMap<String, Option<PathBuf>>>,
    ) {
        let mut modules = FxHashMap::default();
        let mut resolutions: FxHashMap<PathBuf, FxHashMap<String, Option<PathBuf>>> =
            FxHashMap::default();
        for (path, text) in files {
            let path = PathBuf::from(path);
            let module = parse_module(&path, text);
            let mut resolved = FxHashMap::default();
            for (specifier, _) in module.module_specifiers() {
                let target = specifier
                    .strip_prefix("./")
                    .map(|rest| PathBuf::from(format!("/p/{rest}.ts")));
                resolved.insert(specifier, target);
            }
            resolutions.insert(path.clone(), resolved);
            modules.insert(path, module);
        }
        (modules, resolutions)
    }

    #[test]
    fn test_resolves_through_re_exports() {
        let (modules, resolutions) = graph_of(&[
            ("/p/a.ts", "export interface Route { path: string }"),
            ("/p/b.ts", "export { Route as R } from './a';"),
            ("/p/c.ts", "export * from './b';"),
        ]);
        let mut lowerer = Lowerer::new(ModuleGraph {
            modules: &modules,
            resolutions: &resolutions,
        });
        let id = lowerer
            .resolve_export(Path::new("/p/c.ts"), "R", Meaning::Type)
            .expect("re-exported type");
        assert_eq!(lowerer.arena.display(id), "Route");
        assert_eq!(lowerer.export_names(Path::new("/p/c.ts")), vec!["R".to_string()]);
    }

    #[test]
    fn test_recursive_alias_terminates() {
        let (modules, resolutions) = graph_of(&[(
            "/p/a.ts",
            "export type Tree = { value: number; children: Tree[] };",
        )]);
        let mut lowerer = Lowerer::new(ModuleGraph {
            modules: &modules,
            resolutions: &resolutions,
        });
        let id = lowerer
            .resolve_export(Path::new("/p/a.ts"), "Tree", Meaning::Type)
            .expect("alias");
        assert_eq!(lowerer.arena.display(id), "Tree");
        let props = lowerer.arena.all_properties(id);
        assert_eq!(props.len(), 2);
        assert_eq!(lowerer.arena.display(props[1].ty), "Tree[]");
    }

    #[test]
    fn test_value_inference_widens_object_members() {
        let (modules, resolutions) =
            graph_of(&[("/p/a.ts", "export const home = { path: '/', depth: 1 };")]);
        let mut lowerer = Lowerer::new(ModuleGraph {
            modules: &modules,
            resolutions: &resolutions,
        });
        let id = lowerer
            .resolve_export(Path::new("/p/a.ts"), "home", Meaning::Value)
            .expect("value");
        assert_eq!(lowerer.arena.display(id), "{ path: string; depth: number; }");
    }
}
