//! The type model carried by expression-tree nodes.
//!
//! Types are plain structural values: equality and hashing are recursive,
//! which the interpolation engine relies on for memoization keys. Keys that
//! must ignore nullability canonicalize through [`Ty::without_nullability`].

use crate::ast::ident::{Ident, Path};
use derive_more::From;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub type BType = Box<Ty>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, From)]
pub enum Ty {
    Primitive(TypePrimitive),
    Named(TypeNamed),
    Array(TypeArray),
    Nullable(TypeNullable),
    Tuple(TypeTuple),
    Function(TypeFunction),
    Param(TypeParamRef),
    Anonymous(TypeAnonymous),
    Unit(TypeUnit),
    Unknown(TypeUnknown),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypePrimitive {
    Int(TypeInt),
    Decimal(TypeDecimal),
    Bool,
    Char,
    String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeInt {
    I64,
    I32,
    U64,
    U32,
    I16,
    U16,
    I8,
    U8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDecimal {
    F64,
    F32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeNamed {
    pub path: Path,
    pub args: Vec<Ty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeArray {
    pub elem: BType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeNullable {
    pub inner: BType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTuple {
    pub types: Vec<Ty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeFunction {
    pub params: Vec<Ty>,
    pub ret: BType,
}

/// Reference to a type parameter by name. Whether the reference is legal
/// depends on the substitution table in force at the reference site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeParamRef {
    pub name: Ident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnonymousField {
    pub name: Ident,
    pub ty: Ty,
}

/// A structural (anonymous) type: a field list with no source-level name.
/// Never nameable; referenced indirectly through type witnesses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeAnonymous {
    pub fields: Vec<AnonymousField>,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct TypeUnit;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct TypeUnknown;

impl Ty {
    pub const fn unit() -> Ty {
        Ty::Unit(TypeUnit)
    }

    pub const fn unknown() -> Ty {
        Ty::Unknown(TypeUnknown)
    }

    pub fn bool() -> Ty {
        Ty::Primitive(TypePrimitive::Bool)
    }

    pub fn i64() -> Ty {
        Ty::Primitive(TypePrimitive::Int(TypeInt::I64))
    }

    pub fn i32() -> Ty {
        Ty::Primitive(TypePrimitive::Int(TypeInt::I32))
    }

    pub fn f64() -> Ty {
        Ty::Primitive(TypePrimitive::Decimal(TypeDecimal::F64))
    }

    pub fn char_ty() -> Ty {
        Ty::Primitive(TypePrimitive::Char)
    }

    pub fn string() -> Ty {
        Ty::Primitive(TypePrimitive::String)
    }

    /// Primitive type by its display name, for data-driven construction.
    /// Unrecognized names fall back to `Unknown`.
    pub fn primitive(name: &str) -> Ty {
        match name {
            "i64" => Ty::i64(),
            "i32" => Ty::i32(),
            "u64" => Ty::Primitive(TypePrimitive::Int(TypeInt::U64)),
            "u32" => Ty::Primitive(TypePrimitive::Int(TypeInt::U32)),
            "i16" => Ty::Primitive(TypePrimitive::Int(TypeInt::I16)),
            "u16" => Ty::Primitive(TypePrimitive::Int(TypeInt::U16)),
            "i8" => Ty::Primitive(TypePrimitive::Int(TypeInt::I8)),
            "u8" => Ty::Primitive(TypePrimitive::Int(TypeInt::U8)),
            "f64" => Ty::f64(),
            "f32" => Ty::Primitive(TypePrimitive::Decimal(TypeDecimal::F32)),
            "bool" => Ty::bool(),
            "char" => Ty::char_ty(),
            "String" => Ty::string(),
            _ => Ty::unknown(),
        }
    }

    pub fn named(path: impl Into<Path>) -> Ty {
        Ty::Named(TypeNamed {
            path: path.into(),
            args: Vec::new(),
        })
    }

    pub fn generic(path: impl Into<Path>, args: Vec<Ty>) -> Ty {
        Ty::Named(TypeNamed {
            path: path.into(),
            args,
        })
    }

    pub fn array(elem: Ty) -> Ty {
        Ty::Array(TypeArray {
            elem: Box::new(elem),
        })
    }

    pub fn nullable(inner: Ty) -> Ty {
        Ty::Nullable(TypeNullable {
            inner: Box::new(inner),
        })
    }

    pub fn tuple(types: Vec<Ty>) -> Ty {
        Ty::Tuple(TypeTuple { types })
    }

    pub fn function(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Function(TypeFunction {
            params,
            ret: Box::new(ret),
        })
    }

    pub fn param(name: impl Into<Ident>) -> Ty {
        Ty::Param(TypeParamRef { name: name.into() })
    }

    pub fn anonymous(fields: Vec<(Ident, Ty)>) -> Ty {
        Ty::Anonymous(TypeAnonymous {
            fields: fields
                .into_iter()
                .map(|(name, ty)| AnonymousField { name, ty })
                .collect(),
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown(_))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    pub fn as_named(&self) -> Option<&TypeNamed> {
        match self {
            Ty::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&TypeFunction> {
        match self {
            Ty::Function(f) => Some(f),
            _ => None,
        }
    }

    /// A type is nameable when it can be written down as source text: no
    /// anonymous type may occur anywhere inside it.
    pub fn is_nameable(&self) -> bool {
        match self {
            Ty::Anonymous(_) => false,
            Ty::Named(named) => named.args.iter().all(Ty::is_nameable),
            Ty::Array(array) => array.elem.is_nameable(),
            Ty::Nullable(nullable) => nullable.inner.is_nameable(),
            Ty::Tuple(tuple) => tuple.types.iter().all(Ty::is_nameable),
            Ty::Function(function) => {
                function.params.iter().all(Ty::is_nameable) && function.ret.is_nameable()
            }
            _ => true,
        }
    }

    pub fn contains_param(&self) -> bool {
        match self {
            Ty::Param(_) => true,
            Ty::Named(named) => named.args.iter().any(Ty::contains_param),
            Ty::Array(array) => array.elem.contains_param(),
            Ty::Nullable(nullable) => nullable.inner.contains_param(),
            Ty::Tuple(tuple) => tuple.types.iter().any(Ty::contains_param),
            Ty::Function(function) => {
                function.params.iter().any(Ty::contains_param) || function.ret.contains_param()
            }
            _ => false,
        }
    }

    pub fn contains_anonymous(&self) -> bool {
        !self.is_nameable()
    }

    /// Canonical form with every nullability wrapper stripped, recursively.
    /// Memo keys documented as nullability-insensitive compare through this.
    pub fn without_nullability(&self) -> Ty {
        match self {
            Ty::Nullable(nullable) => nullable.inner.without_nullability(),
            Ty::Named(named) => Ty::Named(TypeNamed {
                path: named.path.clone(),
                args: named.args.iter().map(Ty::without_nullability).collect(),
            }),
            Ty::Array(array) => Ty::array(array.elem.without_nullability()),
            Ty::Tuple(tuple) => Ty::tuple(tuple.types.iter().map(Ty::without_nullability).collect()),
            Ty::Function(function) => Ty::function(
                function.params.iter().map(Ty::without_nullability).collect(),
                function.ret.without_nullability(),
            ),
            other => other.clone(),
        }
    }
}

impl Display for TypeInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeInt::I64 => write!(f, "i64"),
            TypeInt::I32 => write!(f, "i32"),
            TypeInt::U64 => write!(f, "u64"),
            TypeInt::U32 => write!(f, "u32"),
            TypeInt::I16 => write!(f, "i16"),
            TypeInt::U16 => write!(f, "u16"),
            TypeInt::I8 => write!(f, "i8"),
            TypeInt::U8 => write!(f, "u8"),
        }
    }
}

impl Display for TypeDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDecimal::F64 => write!(f, "f64"),
            TypeDecimal::F32 => write!(f, "f32"),
        }
    }
}

impl Display for TypePrimitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypePrimitive::Int(int) => write!(f, "{}", int),
            TypePrimitive::Decimal(decimal) => write!(f, "{}", decimal),
            TypePrimitive::Bool => write!(f, "bool"),
            TypePrimitive::Char => write!(f, "char"),
            TypePrimitive::String => write!(f, "String"),
        }
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Primitive(p) => write!(f, "{}", p),
            Ty::Named(named) => {
                write!(f, "{}", named.path)?;
                if !named.args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in named.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::Array(array) => write!(f, "[{}]", array.elem),
            Ty::Nullable(nullable) => write!(f, "{}?", nullable.inner),
            Ty::Tuple(tuple) => {
                write!(f, "(")?;
                for (i, ty) in tuple.types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            Ty::Function(function) => {
                write!(f, "fn(")?;
                for (i, ty) in function.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ") -> {}", function.ret)
            }
            Ty::Param(param) => write!(f, "{}", param.name),
            Ty::Anonymous(anonymous) => {
                write!(f, "{{ ")?;
                for (i, field) in anonymous.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, " }}")
            }
            Ty::Unit(_) => write!(f, "()"),
            Ty::Unknown(_) => write!(f, "?unknown"),
        }
    }
}
