//! The program seam the type-info layer binds to.
//!
//! A [`Program`] is an immutable snapshot of a compiled project: its source
//! files, their exports, and a type graph addressed by [`TypeId`]. The
//! type-info API only ever talks to this trait, so any checker can back it.
//!
//! ```text
//! ┌──────────────────────┐     stable members      ┌──────────────┐
//! │ type_info::Api       │ ──────────────────────► │ dyn Program  │
//! │   serialize / file   │                         │              │
//! │                      │ ── compat::* (guarded) ►│ unstable     │
//! └──────────────────────┘                         └──────────────┘
//! ```
//!
//! Members documented as *unstable* mirror compiler internals (index infos,
//! alias resolution, base types, mapped-type modifiers). They default to
//! `None` and must only be reached through [`compat`], which degrades to a
//! fallback instead of propagating a failure.
//!
//! [`SourceProgram`] is the in-crate implementation, built from TypeScript
//! sources with `oxc_parser`.

pub mod compat;

mod arena;
mod check;
mod lower;
mod parse;
mod source;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use source::{ProgramHost, SourceProgram};

// =============================================================================
// Type Model
// =============================================================================

/// Handle of a type inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Build from a raw index.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Keyword types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `string`
    String,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `bigint`
    BigInt,
    /// `symbol`
    Symbol,
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// `void`
    Void,
    /// `any`
    Any,
    /// `unknown`
    Unknown,
    /// `never`
    Never,
    /// `object`
    Object,
}

impl PrimitiveKind {
    /// All keywords, in interning order.
    pub const ALL: [PrimitiveKind; 12] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::BigInt,
        Self::Symbol,
        Self::Null,
        Self::Undefined,
        Self::Void,
        Self::Any,
        Self::Unknown,
        Self::Never,
        Self::Object,
    ];

    /// Keyword spelling.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::BigInt => "bigint",
            Self::Symbol => "symbol",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Void => "void",
            Self::Any => "any",
            Self::Unknown => "unknown",
            Self::Never => "never",
            Self::Object => "object",
        }
    }
}

/// Value of a literal type.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// `"text"`
    String(String),
    /// `42`
    Number(f64),
    /// `true` / `false`
    Boolean(bool),
}

impl LiteralValue {
    /// The primitive this literal widens to.
    pub fn base(&self) -> PrimitiveKind {
        match self {
            Self::String(_) => PrimitiveKind::String,
            Self::Number(_) => PrimitiveKind::Number,
            Self::Boolean(_) => PrimitiveKind::Boolean,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A named property of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Name.
    pub name: String,
    /// Type.
    pub ty: TypeId,
    /// `?`
    pub optional: bool,
    /// `readonly`
    pub readonly: bool,
}

/// Index signature (`[key: K]: V`).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Key type.
    pub key: TypeId,
    /// Value type.
    pub value: TypeId,
    /// `readonly`
    pub readonly: bool,
}

/// Own members of an object type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectType {
    /// Own properties in declaration order.
    pub properties: Vec<Property>,
}

/// A call parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name.
    pub name: String,
    /// Type.
    pub ty: TypeId,
    /// `?`
    pub optional: bool,
    /// `...`
    pub rest: bool,
}

/// A call signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Parameters.
    pub parameters: Vec<Parameter>,
    /// Return type.
    pub return_type: TypeId,
}

/// A tuple element.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleElement {
    /// Type.
    pub ty: TypeId,
    /// `T?`
    pub optional: bool,
    /// `...T`
    pub rest: bool,
}

/// A reference to a named type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeReference {
    /// Name as written.
    pub name: String,
    /// Type arguments.
    pub type_arguments: Vec<TypeId>,
}

/// The stable shape of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Keyword type.
    Primitive(PrimitiveKind),
    /// Literal type.
    Literal(LiteralValue),
    /// `A | B`
    Union(Vec<TypeId>),
    /// `A & B`
    Intersection(Vec<TypeId>),
    /// Object type (own members).
    Object(ObjectType),
    /// `T[]`
    Array(TypeId),
    /// Tuple.
    Tuple(Vec<TupleElement>),
    /// Function type.
    Function(Signature),
    /// Named reference; see [`Program::resolve_alias`].
    Reference(TypeReference),
    /// Type parameter.
    TypeParameter(String),
}

/// `readonly`/`?` modifiers of a mapped type (`+`/`-` become `Some`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappedTypeModifiers {
    /// `readonly` modifier.
    pub readonly: Option<bool>,
    /// `?` modifier.
    pub optional: Option<bool>,
}

/// Whether an export names a type or a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    /// `interface`, `type`.
    Type,
    /// `const`, `let`, `function`.
    Value,
}

/// One exported symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSymbol {
    /// Export name.
    pub name: String,
    /// Meaning.
    pub kind: ExportKind,
    /// Declared or inferred type.
    pub ty: TypeId,
}

// =============================================================================
// Program Trait
// =============================================================================

/// An immutable compiled project.
pub trait Program: Send + Sync {
    /// Every source file in the program.
    fn source_files(&self) -> Vec<PathBuf>;

    /// Whether `path` is one of the program's source files.
    fn contains_file(&self, path: &Path) -> bool;

    /// Exports of a source file, or `None` if the file is not in the program.
    fn exports(&self, path: &Path) -> Option<Vec<ExportSymbol>>;

    /// Stable shape of a type.
    fn type_kind(&self, ty: TypeId) -> Option<TypeKind>;

    /// Display text of a type.
    fn type_to_string(&self, ty: TypeId) -> String;

    /// Structural assignability.
    fn is_type_assignable_to(&self, source: TypeId, target: TypeId) -> bool;

    /// Resolve an import written in `containing_file`.
    fn resolve_module(&self, specifier: &str, containing_file: &Path) -> Option<PathBuf>;

    /// Unstable: index signatures of an object-like type.
    fn index_infos(&self, _ty: TypeId) -> Option<Vec<IndexInfo>> {
        None
    }

    /// Unstable: what a [`TypeKind::Reference`] points at.
    fn resolve_alias(&self, _ty: TypeId) -> Option<TypeId> {
        None
    }

    /// Unstable: `extends` bases of an interface type.
    fn base_types(&self, _ty: TypeId) -> Option<Vec<TypeId>> {
        None
    }

    /// Unstable: modifiers when the type is a mapped type.
    fn mapped_type_modifiers(&self, _ty: TypeId) -> Option<MappedTypeModifiers> {
        None
    }
}

impl<P: Program + ?Sized> Program for Arc<P> {
    fn source_files(&self) -> Vec<PathBuf> {
        (**self).source_files()
    }
    fn contains_file(&self, path: &Path) -> bool {
        (**self).contains_file(path)
    }
    fn exports(&self, path: &Path) -> Option<Vec<ExportSymbol>> {
        (**self).exports(path)
    }
    fn type_kind(&self, ty: TypeId) -> Option<TypeKind> {
        (**self).type_kind(ty)
    }
    fn type_to_string(&self, ty: TypeId) -> String {
        (**self).type_to_string(ty)
    }
    fn is_type_assignable_to(&self, source: TypeId, target: TypeId) -> bool {
        (**self).is_type_assignable_to(source, target)
    }
    fn resolve_module(&self, specifier: &str, containing_file: &Path) -> Option<PathBuf> {
        (**self).resolve_module(specifier, containing_file)
    }
    fn index_infos(&self, ty: TypeId) -> Option<Vec<IndexInfo>> {
        (**self).index_infos(ty)
    }
    fn resolve_alias(&self, ty: TypeId) -> Option<TypeId> {
        (**self).resolve_alias(ty)
    }
    fn base_types(&self, ty: TypeId) -> Option<Vec<TypeId>> {
        (**self).base_types(ty)
    }
    fn mapped_type_modifiers(&self, ty: TypeId) -> Option<MappedTypeModifiers> {
        (**self).mapped_type_modifiers(ty)
    }
}
