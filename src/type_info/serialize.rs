//! Program types to [`TypeNode`]s.
//!
//! Structural nodes (objects, arrays, tuples, functions) count towards the
//! depth bound; unions, intersections and alias hops do not. A structural
//! node nested deeper than `max_depth`, or a type already being expanded
//! further up, becomes a `reference` node carrying its display text.

use crate::program::{Program, Property, TypeId, TypeKind, TypeReference, compat};
use crate::types::{
    IndexSignatureNode, ParameterNode, PropertyNode, TupleElementNode, TypeNode,
};

pub(crate) struct Serializer<'a> {
    program: &'a dyn Program,
    max_depth: usize,
    stack: Vec<TypeId>,
}

impl<'a> Serializer<'a> {
    pub(crate) fn new(program: &'a dyn Program, max_depth: usize) -> Self {
        Self {
            program,
            max_depth,
            stack: Vec::new(),
        }
    }

    pub(crate) fn serialize(&mut self, ty: TypeId) -> TypeNode {
        self.node(ty, 0)
    }

    fn node(&mut self, ty: TypeId, depth: usize) -> TypeNode {
        let Some(kind) = self.program.type_kind(ty) else {
            return self.opaque(ty);
        };
        match kind {
            TypeKind::Primitive(primitive) => TypeNode::primitive(primitive.keyword()),
            TypeKind::Literal(value) => TypeNode::Literal {
                text: value.to_string(),
            },
            TypeKind::TypeParameter(name) => TypeNode::TypeParameter { name },
            TypeKind::Union(members) => TypeNode::Union {
                types: self.nodes(&members, depth),
            },
            TypeKind::Intersection(members) => TypeNode::Intersection {
                types: self.nodes(&members, depth),
            },
            TypeKind::Reference(reference) => self.reference(ty, reference, depth),
            structural => {
                if depth > self.max_depth || self.stack.contains(&ty) {
                    return self.opaque(ty);
                }
                self.stack.push(ty);
                let node = self.structural(ty, structural, depth + 1);
                self.stack.pop();
                node
            }
        }
    }

    fn nodes(&mut self, members: &[TypeId], depth: usize) -> Vec<TypeNode> {
        members.iter().map(|member| self.node(*member, depth)).collect()
    }

    fn opaque(&self, ty: TypeId) -> TypeNode {
        TypeNode::reference(self.program.type_to_string(ty))
    }

    fn reference(&mut self, ty: TypeId, reference: TypeReference, depth: usize) -> TypeNode {
        match compat::resolve_alias(self.program, ty) {
            Some(target) if target != ty && !self.stack.contains(&target) => {
                self.stack.push(ty);
                let node = self.node(target, depth);
                self.stack.pop();
                node
            }
            _ => TypeNode::Reference {
                name: reference.name,
                type_arguments: self.nodes(&reference.type_arguments, depth + 1),
            },
        }
    }

    fn structural(&mut self, ty: TypeId, kind: TypeKind, child_depth: usize) -> TypeNode {
        match kind {
            TypeKind::Object(_) => self.object(ty, child_depth),
            TypeKind::Array(element) => TypeNode::Array {
                element: Box::new(self.node(element, child_depth)),
            },
            TypeKind::Tuple(elements) => TypeNode::Tuple {
                elements: elements
                    .into_iter()
                    .map(|element| TupleElementNode {
                        type_node: self.node(element.ty, child_depth),
                        optional: element.optional,
                        rest: element.rest,
                    })
                    .collect(),
            },
            TypeKind::Function(signature) => TypeNode::Function {
                parameters: signature
                    .parameters
                    .into_iter()
                    .map(|parameter| ParameterNode {
                        type_node: self.node(parameter.ty, child_depth),
                        name: parameter.name,
                        optional: parameter.optional,
                        rest: parameter.rest,
                    })
                    .collect(),
                return_type: Box::new(self.node(signature.return_type, child_depth)),
            },
            _ => self.opaque(ty),
        }
    }

    fn object(&mut self, ty: TypeId, child_depth: usize) -> TypeNode {
        let modifiers = compat::mapped_type_modifiers(self.program, ty).unwrap_or_default();

        let mut members = Vec::new();
        self.collect_members(ty, &mut members, 0);

        let properties = members
            .into_iter()
            .map(|property| PropertyNode {
                type_node: self.node(property.ty, child_depth),
                optional: modifiers.optional.unwrap_or(property.optional),
                readonly: modifiers.readonly.unwrap_or(property.readonly),
                name: property.name,
            })
            .collect();

        let index_signatures = compat::index_infos(self.program, ty)
            .into_iter()
            .map(|info| IndexSignatureNode {
                key_type: self.node(info.key, child_depth),
                value_type: self.node(info.value, child_depth),
                readonly: info.readonly,
            })
            .collect();

        TypeNode::Object {
            properties,
            index_signatures,
        }
    }

    /// Own properties first, then inherited ones not shadowed by them.
    fn collect_members(&self, ty: TypeId, out: &mut Vec<Property>, hops: usize) {
        if hops > 16 {
            return;
        }
        let ty = compat::resolve_alias_chain(self.program, ty);
        if let Some(TypeKind::Object(object)) = self.program.type_kind(ty) {
            for property in object.properties {
                if !out.iter().any(|p| p.name == property.name) {
                    out.push(property);
                }
            }
        }
        for base in compat::base_types(self.program, ty) {
            self.collect_members(base, out, hops + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rustc_hash::FxHashMap;

    use super::*;
    use crate::host::{CompilerProgramHost, MemoryHost};
    use crate::program::SourceProgram;

    fn program(text: &str) -> (SourceProgram, PathBuf) {
        let host = MemoryHost::new().with_file("/p/a.ts", text);
        let root = PathBuf::from("/p/a.ts");
        let program = SourceProgram::build(&CompilerProgramHost(&host), &[root.clone()]);
        (program, root)
    }

    fn exported(text: &str, max_depth: usize) -> FxHashMap<String, TypeNode> {
        let (program, root) = program(text);
        let exports = program.exports(&root).unwrap();
        let mut out = FxHashMap::default();
        for export in exports {
            let node = Serializer::new(&program, max_depth).serialize(export.ty);
            out.entry(export.name).or_insert(node);
        }
        out
    }

    #[test]
    fn test_object_with_inherited_members() {
        let nodes = exported(
            "interface Base { id: string }\n\
             export interface Page extends Base { readonly title?: string; tags: string[] }",
            8,
        );
        let page = &nodes["Page"];
        assert_eq!(page.kind(), "object");
        let title = page.property("title").unwrap();
        assert!(title.optional && title.readonly);
        assert_eq!(page.property("id").unwrap().type_node, TypeNode::primitive("string"));
        assert_eq!(
            page.property("tags").unwrap().type_node,
            TypeNode::Array {
                element: Box::new(TypeNode::primitive("string"))
            }
        );
    }

    #[test]
    fn test_depth_zero_cuts_nested_structure() {
        let nodes = exported("export interface Outer { inner: { n: number } }", 0);
        let inner = &nodes["Outer"].property("inner").unwrap().type_node;
        assert_eq!(inner.kind(), "reference");
    }

    #[test]
    fn test_self_reference_becomes_reference() {
        let nodes = exported("export interface List { next: List | null; value: number }", 8);
        let next = &nodes["List"].property("next").unwrap().type_node;
        let TypeNode::Union { types } = next else {
            panic!("expected union, got {next:?}");
        };
        assert!(types.contains(&TypeNode::reference("List")));
        assert!(types.contains(&TypeNode::primitive("null")));
    }

    #[test]
    fn test_alias_and_index_signature() {
        let nodes = exported(
            "type Name = string;\n\
             export type Bag = Record<string, Name>;\n\
             export const kind: \"a\" | \"b\" = \"a\";",
            8,
        );
        let TypeNode::Object {
            index_signatures, ..
        } = &nodes["Bag"]
        else {
            panic!("expected object");
        };
        assert_eq!(index_signatures.len(), 1);
        assert_eq!(index_signatures[0].value_type, TypeNode::primitive("string"));
        assert_eq!(nodes["kind"].kind(), "union");
    }
}
