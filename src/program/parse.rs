//! Declaration extraction from TypeScript sources.
//!
//! The arena-allocated oxc AST is lowered right away into an owned,
//! declaration-level model ([`ParsedModule`]) so the parse allocator can be
//! dropped before any cross-file work starts.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_allocator::Box as ArenaBox;
use oxc_ast::ast::{
    ArrayExpressionElement, BindingPatternKind, Declaration, ExportDefaultDeclarationKind,
    Expression, FormalParameters, ImportDeclarationSpecifier, ObjectPropertyKind, PropertyKey,
    Statement, TSInterfaceDeclaration, TSLiteral, TSSignature, TSTupleElement, TSType,
    TSTypeAnnotation, TSTypeName, TSTypeOperatorOperator, TSTypeParameterDeclaration,
    VariableDeclarationKind,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use rustc_hash::FxHashMap;

use super::{LiteralValue, PrimitiveKind};

// =============================================================================
// Owned Model
// =============================================================================

/// Byte range in the file text.
pub(crate) type TextSpan = (u32, u32);

fn span_of(span: Span) -> TextSpan {
    (span.start, span.end)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypeExpr {
    Keyword(PrimitiveKind),
    Literal(LiteralValue),
    Reference { name: String, args: Vec<TypeExpr> },
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Array(Box<TypeExpr>),
    Tuple(Vec<TupleElementExpr>),
    Object(Vec<MemberExpr>),
    Function(FunctionExpr),
    /// Anything the declaration model does not track.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TupleElementExpr {
    pub ty: TypeExpr,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParamExpr {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionExpr {
    pub params: Vec<ParamExpr>,
    pub ret: Option<Box<TypeExpr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MemberExpr {
    Property {
        name: String,
        optional: bool,
        readonly: bool,
        ty: TypeExpr,
    },
    Index {
        key: TypeExpr,
        value: TypeExpr,
        readonly: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValueExpr {
    pub kind: ValueKind,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueKind {
    Literal(LiteralValue),
    Null,
    /// A string built at runtime (template literal).
    String,
    Object {
        properties: Vec<ObjectEntry>,
        spread: bool,
    },
    Array {
        elements: Vec<ValueExpr>,
        spread: bool,
    },
    Identifier(String),
    Function(FunctionExpr),
    /// `expr as T`
    Asserted(TypeExpr),
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectEntry {
    pub name: String,
    pub key_span: TextSpan,
    pub value: ValueExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypeDecl {
    Interface {
        type_params: Vec<String>,
        extends: Vec<TypeExpr>,
        members: Vec<MemberExpr>,
    },
    Alias {
        type_params: Vec<String>,
        ty: TypeExpr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueDecl {
    Annotated(TypeExpr),
    Inferred { init: ValueExpr, constant: bool },
    Function(FunctionExpr),
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ImportedName {
    Named(String),
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImportBinding {
    pub local: String,
    pub imported: ImportedName,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImportDecl {
    pub specifier: String,
    pub span: TextSpan,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExportDecl {
    Local {
        exported: String,
        local: String,
    },
    ReExport {
        exported: String,
        imported: String,
        specifier: String,
        span: TextSpan,
    },
    Star {
        specifier: String,
        span: TextSpan,
    },
}

/// An annotated declarator whose initializer must conform to its type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CheckedDeclarator {
    pub name_span: TextSpan,
    pub annotation: TypeExpr,
    pub init: ValueExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParseError {
    pub message: String,
    pub span: TextSpan,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ParsedModule {
    pub imports: Vec<ImportDecl>,
    pub types: FxHashMap<String, TypeDecl>,
    pub values: FxHashMap<String, ValueDecl>,
    pub exports: Vec<ExportDecl>,
    pub checked: Vec<CheckedDeclarator>,
    pub errors: Vec<ParseError>,
}

impl ParsedModule {
    /// Every specifier the module imports or re-exports from, in order.
    pub fn module_specifiers(&self) -> Vec<(String, TextSpan)> {
        let mut out: Vec<(String, TextSpan)> = Vec::new();
        let mut push = |specifier: &str, span: TextSpan| {
            if !out.iter().any(|(s, _)| s == specifier) {
                out.push((specifier.to_string(), span));
            }
        };
        for import in &self.imports {
            push(&import.specifier, import.span);
        }
        for export in &self.exports {
            match export {
                ExportDecl::ReExport {
                    specifier, span, ..
                } => push(specifier, *span),
                ExportDecl::Star { specifier, span } => push(specifier, *span),
                ExportDecl::Local { .. } => {}
            }
        }
        out
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse `text` and extract its declarations.
pub(crate) fn parse_module(path: &Path, text: &str) -> ParsedModule {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::ts());
    let ret = Parser::new(&allocator, text, source_type).parse();

    let mut module = ParsedModule::default();
    for error in &ret.errors {
        module.errors.push(ParseError {
            message: error.to_string(),
            span: (0, 0),
        });
    }
    if ret.panicked {
        return module;
    }

    for statement in &ret.program.body {
        collect_statement(&mut module, statement);
    }
    module
}

fn collect_statement(module: &mut ParsedModule, statement: &Statement<'_>) {
    match statement {
        Statement::ImportDeclaration(import) => {
            let mut bindings = Vec::new();
            if let Some(specifiers) = &import.specifiers {
                for specifier in specifiers {
                    let (local, imported, span) = match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => (
                            s.local.name.to_string(),
                            ImportedName::Named(s.imported.name().to_string()),
                            s.span,
                        ),
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            (s.local.name.to_string(), ImportedName::Default, s.span)
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            (s.local.name.to_string(), ImportedName::Namespace, s.span)
                        }
                    };
                    bindings.push(ImportBinding {
                        local,
                        imported,
                        span: span_of(span),
                    });
                }
            }
            module.imports.push(ImportDecl {
                specifier: import.source.value.to_string(),
                span: span_of(import.source.span),
                bindings,
            });
        }
        Statement::ExportNamedDeclaration(export) => {
            if let Some(declaration) = &export.declaration {
                for name in collect_declaration(module, declaration) {
                    module.exports.push(ExportDecl::Local {
                        exported: name.clone(),
                        local: name,
                    });
                }
            }
            for specifier in &export.specifiers {
                let local = specifier.local.name().to_string();
                let exported = specifier.exported.name().to_string();
                match &export.source {
                    Some(source) => module.exports.push(ExportDecl::ReExport {
                        exported,
                        imported: local,
                        specifier: source.value.to_string(),
                        span: span_of(source.span),
                    }),
                    None => module.exports.push(ExportDecl::Local { exported, local }),
                }
            }
        }
        Statement::ExportAllDeclaration(export) => {
            if export.exported.is_none() {
                module.exports.push(ExportDecl::Star {
                    specifier: export.source.value.to_string(),
                    span: span_of(export.source.span),
                });
            }
        }
        Statement::ExportDefaultDeclaration(export) => {
            let value = match &export.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(function) => ValueDecl::Function(
                    lower_function(&function.params, return_annotation(&function.return_type)),
                ),
                ExportDefaultDeclarationKind::TSInterfaceDeclaration(interface) => {
                    let local = collect_interface(module, interface);
                    module.exports.push(ExportDecl::Local {
                        exported: "default".to_string(),
                        local,
                    });
                    return;
                }
                other => match other.as_expression() {
                    Some(expr) => ValueDecl::Inferred {
                        init: lower_value(expr),
                        constant: true,
                    },
                    None => ValueDecl::Opaque,
                },
            };
            module.values.insert("default".to_string(), value);
            module.exports.push(ExportDecl::Local {
                exported: "default".to_string(),
                local: "default".to_string(),
            });
        }
        _ => {
            if let Some(declaration) = statement.as_declaration() {
                collect_declaration(module, declaration);
            }
        }
    }
}

fn collect_declaration(module: &mut ParsedModule, declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            let constant = var.kind == VariableDeclarationKind::Const;
            let mut names = Vec::new();
            for declarator in &var.declarations {
                let BindingPatternKind::BindingIdentifier(id) = &declarator.id.kind else {
                    continue;
                };
                let annotation = declarator
                    .id
                    .type_annotation
                    .as_ref()
                    .map(|a| lower_type(&a.type_annotation));
                let init = declarator.init.as_ref().map(lower_value);
                let decl = match (annotation, init) {
                    (Some(annotation), Some(init)) => {
                        module.checked.push(CheckedDeclarator {
                            name_span: span_of(id.span),
                            annotation: annotation.clone(),
                            init,
                        });
                        ValueDecl::Annotated(annotation)
                    }
                    (Some(annotation), None) => ValueDecl::Annotated(annotation),
                    (None, Some(init)) => ValueDecl::Inferred { init, constant },
                    (None, None) => ValueDecl::Opaque,
                };
                let name = id.name.to_string();
                module.values.insert(name.clone(), decl);
                names.push(name);
            }
            names
        }
        Declaration::FunctionDeclaration(function) => {
            let Some(id) = &function.id else {
                return Vec::new();
            };
            let name = id.name.to_string();
            let signature = lower_function(&function.params, return_annotation(&function.return_type));
            module.values.insert(name.clone(), ValueDecl::Function(signature));
            vec![name]
        }
        Declaration::ClassDeclaration(class) => {
            let Some(id) = &class.id else {
                return Vec::new();
            };
            let name = id.name.to_string();
            module.values.insert(name.clone(), ValueDecl::Opaque);
            vec![name]
        }
        Declaration::TSTypeAliasDeclaration(alias) => {
            let name = alias.id.name.to_string();
            module.types.insert(
                name.clone(),
                TypeDecl::Alias {
                    type_params: type_param_names(&alias.type_parameters),
                    ty: lower_type(&alias.type_annotation),
                },
            );
            vec![name]
        }
        Declaration::TSInterfaceDeclaration(interface) => vec![collect_interface(module, interface)],
        _ => Vec::new(),
    }
}

fn collect_interface(module: &mut ParsedModule, interface: &TSInterfaceDeclaration<'_>) -> String {
    let name = interface.id.name.to_string();
    let extends = interface
        .extends
        .iter()
        .filter_map(|heritage| {
            let name = expression_path(&heritage.expression)?;
            let args = heritage
                .type_arguments
                .as_ref()
                .map(|args| args.params.iter().map(lower_type).collect())
                .unwrap_or_default();
            Some(TypeExpr::Reference { name, args })
        })
        .collect();
    let members = interface.body.body.iter().filter_map(lower_member).collect();
    module.types.insert(
        name.clone(),
        TypeDecl::Interface {
            type_params: type_param_names(&interface.type_parameters),
            extends,
            members,
        },
    );
    name
}

fn type_param_names(params: &Option<ArenaBox<'_, TSTypeParameterDeclaration<'_>>>) -> Vec<String> {
    params
        .as_ref()
        .map(|decl| decl.params.iter().map(|p| p.name.name.to_string()).collect())
        .unwrap_or_default()
}

fn return_annotation<'b, 'a>(
    annotation: &'b Option<ArenaBox<'a, TSTypeAnnotation<'a>>>,
) -> Option<&'b TSType<'a>> {
    annotation.as_ref().map(|a| &a.type_annotation)
}

fn expression_path(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::StaticMemberExpression(member) => Some(format!(
            "{}.{}",
            expression_path(&member.object)?,
            member.property.name
        )),
        _ => None,
    }
}

// =============================================================================
// Types
// =============================================================================

fn type_name_path(name: &TSTypeName<'_>) -> String {
    match name {
        TSTypeName::IdentifierReference(id) => id.name.to_string(),
        TSTypeName::QualifiedName(qualified) => {
            format!("{}.{}", type_name_path(&qualified.left), qualified.right.name)
        }
        _ => "this".to_string(),
    }
}

pub(crate) fn lower_type(ty: &TSType<'_>) -> TypeExpr {
    use PrimitiveKind as P;
    match ty {
        TSType::TSStringKeyword(_) => TypeExpr::Keyword(P::String),
        TSType::TSNumberKeyword(_) => TypeExpr::Keyword(P::Number),
        TSType::TSBooleanKeyword(_) => TypeExpr::Keyword(P::Boolean),
        TSType::TSBigIntKeyword(_) => TypeExpr::Keyword(P::BigInt),
        TSType::TSSymbolKeyword(_) => TypeExpr::Keyword(P::Symbol),
        TSType::TSNullKeyword(_) => TypeExpr::Keyword(P::Null),
        TSType::TSUndefinedKeyword(_) => TypeExpr::Keyword(P::Undefined),
        TSType::TSVoidKeyword(_) => TypeExpr::Keyword(P::Void),
        TSType::TSAnyKeyword(_) => TypeExpr::Keyword(P::Any),
        TSType::TSUnknownKeyword(_) => TypeExpr::Keyword(P::Unknown),
        TSType::TSNeverKeyword(_) => TypeExpr::Keyword(P::Never),
        TSType::TSObjectKeyword(_) => TypeExpr::Keyword(P::Object),
        TSType::TSLiteralType(literal) => match &literal.literal {
            TSLiteral::StringLiteral(s) => TypeExpr::Literal(LiteralValue::String(s.value.to_string())),
            TSLiteral::NumericLiteral(n) => TypeExpr::Literal(LiteralValue::Number(n.value)),
            TSLiteral::BooleanLiteral(b) => TypeExpr::Literal(LiteralValue::Boolean(b.value)),
            TSLiteral::TemplateLiteral(_) => TypeExpr::Keyword(P::String),
            TSLiteral::BigIntLiteral(_) => TypeExpr::Keyword(P::BigInt),
            _ => TypeExpr::Keyword(P::Number),
        },
        TSType::TSTypeReference(reference) => TypeExpr::Reference {
            name: type_name_path(&reference.type_name),
            args: reference
                .type_arguments
                .as_ref()
                .map(|args| args.params.iter().map(lower_type).collect())
                .unwrap_or_default(),
        },
        TSType::TSUnionType(union) => TypeExpr::Union(union.types.iter().map(lower_type).collect()),
        TSType::TSIntersectionType(intersection) => {
            TypeExpr::Intersection(intersection.types.iter().map(lower_type).collect())
        }
        TSType::TSArrayType(array) => TypeExpr::Array(Box::new(lower_type(&array.element_type))),
        TSType::TSTupleType(tuple) => TypeExpr::Tuple(
            tuple
                .element_types
                .iter()
                .map(|element| match element {
                    TSTupleElement::TSOptionalType(o) => TupleElementExpr {
                        ty: lower_type(&o.type_annotation),
                        optional: true,
                        rest: false,
                    },
                    TSTupleElement::TSRestType(r) => TupleElementExpr {
                        ty: lower_type(&r.type_annotation),
                        optional: false,
                        rest: true,
                    },
                    other => TupleElementExpr {
                        ty: other.as_ts_type().map_or(TypeExpr::Opaque, lower_type),
                        optional: false,
                        rest: false,
                    },
                })
                .collect(),
        ),
        TSType::TSTypeLiteral(literal) => {
            TypeExpr::Object(literal.members.iter().filter_map(lower_member).collect())
        }
        TSType::TSFunctionType(function) => TypeExpr::Function(lower_function(
            &function.params,
            Some(&function.return_type.type_annotation),
        )),
        TSType::TSParenthesizedType(inner) => lower_type(&inner.type_annotation),
        TSType::TSTypeOperatorType(op) if op.operator == TSTypeOperatorOperator::Readonly => {
            lower_type(&op.type_annotation)
        }
        _ => TypeExpr::Opaque,
    }
}

fn lower_member(signature: &TSSignature<'_>) -> Option<MemberExpr> {
    match signature {
        TSSignature::TSPropertySignature(property) => Some(MemberExpr::Property {
            name: property_key_name(&property.key)?,
            optional: property.optional,
            readonly: property.readonly,
            ty: property
                .type_annotation
                .as_ref()
                .map_or(TypeExpr::Keyword(PrimitiveKind::Any), |a| lower_type(&a.type_annotation)),
        }),
        TSSignature::TSIndexSignature(index) => Some(MemberExpr::Index {
            key: index
                .parameters
                .first()
                .map_or(TypeExpr::Keyword(PrimitiveKind::String), |p| {
                    lower_type(&p.type_annotation.type_annotation)
                }),
            value: lower_type(&index.type_annotation.type_annotation),
            readonly: index.readonly,
        }),
        TSSignature::TSMethodSignature(method) => Some(MemberExpr::Property {
            name: property_key_name(&method.key)?,
            optional: method.optional,
            readonly: false,
            ty: TypeExpr::Function(lower_function(
                &method.params,
                return_annotation(&method.return_type),
            )),
        }),
        _ => None,
    }
}

fn lower_function(params: &FormalParameters<'_>, ret: Option<&TSType<'_>>) -> FunctionExpr {
    let mut out: Vec<ParamExpr> = params
        .items
        .iter()
        .enumerate()
        .map(|(index, param)| ParamExpr {
            name: match &param.pattern.kind {
                BindingPatternKind::BindingIdentifier(id) => id.name.to_string(),
                _ => format!("arg{index}"),
            },
            ty: param
                .pattern
                .type_annotation
                .as_ref()
                .map(|a| lower_type(&a.type_annotation)),
            optional: param.pattern.optional,
            rest: false,
        })
        .collect();
    if let Some(rest) = &params.rest {
        out.push(ParamExpr {
            name: match &rest.argument.kind {
                BindingPatternKind::BindingIdentifier(id) => id.name.to_string(),
                _ => "rest".to_string(),
            },
            ty: rest
                .argument
                .type_annotation
                .as_ref()
                .map(|a| lower_type(&a.type_annotation)),
            optional: false,
            rest: true,
        });
    }
    FunctionExpr {
        params: out,
        ret: ret.map(|ty| Box::new(lower_type(ty))),
    }
}

fn property_key_name(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        PropertyKey::NumericLiteral(n) => Some(n.value.to_string()),
        _ => None,
    }
}

// =============================================================================
// Values
// =============================================================================

pub(crate) fn lower_value(expr: &Expression<'_>) -> ValueExpr {
    let kind = match expr {
        Expression::StringLiteral(s) => ValueKind::Literal(LiteralValue::String(s.value.to_string())),
        Expression::NumericLiteral(n) => ValueKind::Literal(LiteralValue::Number(n.value)),
        Expression::BooleanLiteral(b) => ValueKind::Literal(LiteralValue::Boolean(b.value)),
        Expression::NullLiteral(_) => ValueKind::Null,
        Expression::TemplateLiteral(_) => ValueKind::String,
        Expression::Identifier(id) => ValueKind::Identifier(id.name.to_string()),
        Expression::ObjectExpression(object) => {
            let mut properties = Vec::new();
            let mut spread = false;
            for property in &object.properties {
                match property {
                    ObjectPropertyKind::ObjectProperty(p) => {
                        if let Some(name) = property_key_name(&p.key) {
                            properties.push(ObjectEntry {
                                name,
                                key_span: span_of(p.key.span()),
                                value: lower_value(&p.value),
                            });
                        } else {
                            spread = true;
                        }
                    }
                    ObjectPropertyKind::SpreadProperty(_) => spread = true,
                }
            }
            ValueKind::Object { properties, spread }
        }
        Expression::ArrayExpression(array) => {
            let mut elements = Vec::new();
            let mut spread = false;
            for element in &array.elements {
                match element {
                    ArrayExpressionElement::SpreadElement(_) => spread = true,
                    ArrayExpressionElement::Elision(_) => {}
                    other => {
                        if let Some(expr) = other.as_expression() {
                            elements.push(lower_value(expr));
                        }
                    }
                }
            }
            ValueKind::Array { elements, spread }
        }
        Expression::ArrowFunctionExpression(function) => ValueKind::Function(lower_function(
            &function.params,
            return_annotation(&function.return_type),
        )),
        Expression::FunctionExpression(function) => ValueKind::Function(lower_function(
            &function.params,
            return_annotation(&function.return_type),
        )),
        Expression::TSAsExpression(assertion) => {
            ValueKind::Asserted(lower_type(&assertion.type_annotation))
        }
        Expression::TSSatisfiesExpression(satisfies) => return lower_value(&satisfies.expression),
        Expression::ParenthesizedExpression(inner) => return lower_value(&inner.expression),
        _ => ValueKind::Opaque,
    };
    ValueExpr {
        kind,
        span: span_of(expr.span()),
    }
}
