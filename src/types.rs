//! Data model shared between plugins, the type-info layer and the store.
//!
//! [`TypeNode`] is the JSON-serializable structural view of a type that
//! plugins receive from [`TypeInfoApi`](crate::type_info::TypeInfoApi).
//! [`DependencyDescriptor`] records which real-world inputs a build consulted.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::program::TypeId;

// =============================================================================
// TypeNode
// =============================================================================

/// Structural description of a type, bounded by `max_type_depth`.
///
/// Anything past the depth bound (or a cycle through a named type) is
/// represented as [`TypeNode::Reference`] carrying the type's display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TypeNode {
    /// `string`, `number`, `any`, `never`, ...
    Primitive {
        /// Keyword name.
        name: String,
    },
    /// A literal type such as `"home"`, `42` or `true`.
    Literal {
        /// Source text of the literal.
        text: String,
    },
    /// A named type that was not expanded.
    Reference {
        /// Display name (or full display text when truncated by depth).
        name: String,
        /// Type arguments, if any.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        type_arguments: Vec<TypeNode>,
    },
    /// `A | B`
    Union {
        /// Members.
        types: Vec<TypeNode>,
    },
    /// `A & B`
    Intersection {
        /// Members.
        types: Vec<TypeNode>,
    },
    /// Object-like type with properties and index signatures.
    Object {
        /// Declared (and inherited) properties.
        properties: Vec<PropertyNode>,
        /// Index signatures such as `[key: string]: number`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        index_signatures: Vec<IndexSignatureNode>,
    },
    /// `[A, B?, ...C[]]`
    Tuple {
        /// Elements in order.
        elements: Vec<TupleElementNode>,
    },
    /// `T[]`
    Array {
        /// Element type.
        element: Box<TypeNode>,
    },
    /// `(a: A) => R`
    Function {
        /// Parameters in order.
        parameters: Vec<ParameterNode>,
        /// Return type.
        return_type: Box<TypeNode>,
    },
    /// An uninstantiated type parameter (`T`).
    TypeParameter {
        /// Parameter name.
        name: String,
    },
}

impl TypeNode {
    /// Shorthand for a primitive node.
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::Primitive { name: name.into() }
    }

    /// Shorthand for an unexpanded reference.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference {
            name: name.into(),
            type_arguments: Vec::new(),
        }
    }

    /// The node's `kind` tag as it appears in JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive { .. } => "primitive",
            Self::Literal { .. } => "literal",
            Self::Reference { .. } => "reference",
            Self::Union { .. } => "union",
            Self::Intersection { .. } => "intersection",
            Self::Object { .. } => "object",
            Self::Tuple { .. } => "tuple",
            Self::Array { .. } => "array",
            Self::Function { .. } => "function",
            Self::TypeParameter { .. } => "typeParameter",
        }
    }

    /// Find a property on an object node.
    pub fn property(&self, name: &str) -> Option<&PropertyNode> {
        match self {
            Self::Object { properties, .. } => properties.iter().find(|p| p.name == name),
            _ => None,
        }
    }
}

/// A property of an object node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyNode {
    /// Property name.
    pub name: String,
    /// Whether declared with `?`.
    #[serde(default)]
    pub optional: bool,
    /// Whether declared `readonly`.
    #[serde(default)]
    pub readonly: bool,
    /// Property type.
    #[serde(rename = "type")]
    pub type_node: TypeNode,
}

/// An index signature of an object node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSignatureNode {
    /// Key type (`string`, `number`, ...).
    pub key_type: TypeNode,
    /// Value type.
    pub value_type: TypeNode,
    /// Whether declared `readonly`.
    #[serde(default)]
    pub readonly: bool,
}

/// One element of a tuple node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleElementNode {
    /// Element type.
    #[serde(rename = "type")]
    pub type_node: TypeNode,
    /// `T?`
    #[serde(default)]
    pub optional: bool,
    /// `...T[]`
    #[serde(default)]
    pub rest: bool,
}

/// One parameter of a function node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterNode {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub type_node: TypeNode,
    /// `a?: T`
    #[serde(default)]
    pub optional: bool,
    /// `...rest: T[]`
    #[serde(default)]
    pub rest: bool,
}

// =============================================================================
// Snapshots
// =============================================================================

/// An exported symbol with its serialized type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedType {
    /// Export name (`default` for default exports).
    pub name: String,
    /// Serialized type.
    #[serde(rename = "type")]
    pub type_node: TypeNode,
    /// Handle into the bound program, usable with `is_assignable_to`.
    #[serde(skip)]
    pub type_id: Option<TypeId>,
}

/// Structural view of one source file's exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    /// Absolute path of the file.
    pub file_path: PathBuf,
    /// Exports in declaration order.
    pub exports: Vec<ExportedType>,
}

impl FileSnapshot {
    /// Look up an export by name.
    pub fn export(&self, name: &str) -> Option<&ExportedType> {
        self.exports.iter().find(|e| e.name == name)
    }
}

/// A named type that exports can be classified against.
///
/// `module` is resolved the way an import written in the importer would be.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTargetSpec {
    /// Identifier plugins pass to `is_assignable_to`.
    pub id: String,
    /// Module specifier that declares the target.
    pub module: String,
    /// Exported type name inside that module.
    pub export_name: String,
}

impl TypeTargetSpec {
    /// Create a target spec.
    pub fn new(
        id: impl Into<String>,
        module: impl Into<String>,
        export_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            export_name: export_name.into(),
        }
    }
}

// =============================================================================
// DependencyDescriptor
// =============================================================================

/// A real-world input a build consulted; drives invalidation watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DependencyDescriptor {
    /// A single file.
    File {
        /// Absolute path.
        path: PathBuf,
    },
    /// Files matching a glob beneath a directory.
    Glob {
        /// Directory the pattern is relative to.
        base_dir: PathBuf,
        /// Glob pattern.
        pattern: String,
        /// Whether subdirectories are included.
        recursive: bool,
    },
}

impl DependencyDescriptor {
    /// A file dependency.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// A glob dependency.
    pub fn glob(base_dir: impl Into<PathBuf>, pattern: impl Into<String>, recursive: bool) -> Self {
        Self::Glob {
            base_dir: base_dir.into(),
            pattern: pattern.into(),
            recursive,
        }
    }
}

impl fmt::Display for DependencyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "file:{}", path.display()),
            Self::Glob {
                base_dir,
                pattern,
                recursive,
            } => write!(
                f,
                "glob:{}/{}{}",
                base_dir.display(),
                pattern,
                if *recursive { " (recursive)" } else { "" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_node_json_shape() {
        let node = TypeNode::Object {
            properties: vec![PropertyNode {
                name: "n".into(),
                optional: false,
                readonly: false,
                type_node: TypeNode::primitive("number"),
            }],
            index_signatures: Vec::new(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "object");
        assert_eq!(json["properties"][0]["name"], "n");
        assert_eq!(json["properties"][0]["type"]["kind"], "primitive");
        assert!(json.get("indexSignatures").is_none());
    }

    #[test]
    fn test_dependency_descriptor_json_shape() {
        let glob = DependencyDescriptor::glob("/app/routes", "**/*.ts", true);
        let json = serde_json::to_value(&glob).unwrap();
        assert_eq!(json["type"], "glob");
        assert_eq!(json["baseDir"], "/app/routes");
        assert_eq!(json["recursive"], true);
    }
}
