//! Runtime values produced by evaluating the "evaluated" side of an
//! interpolation, and embedded into trees as constants.

use crate::ast::expr::{BExpr, Expr, ExprLambda};
use crate::ast::ident::Ident;
use crate::ast::ty::{Ty, TypeDecimal, TypeInt, TypePrimitive};
use derive_more::From;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub type BValue = Box<Value>;

/// wrap struct declare with derive Debug, Clone, Serialize, Deserialize,
/// PartialEq, Eq, Hash
macro_rules! plain_value {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
        pub struct $name;
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", stringify!($name))
            }
        }
    };
    ($(#[$attr:meta])* $name:ident: $ty:ty) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub struct $name {
            pub value: $ty,
        }
        impl $name {
            pub fn new(v: $ty) -> Self {
                Self { value: v }
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.value)
            }
        }
    };
}

plain_value! {
    ValueUnit
}
plain_value! {
    ValueNull
}
plain_value! {
    ValueBool: bool
}
plain_value! {
    ValueInt: i64
}
plain_value! {
    ValueChar: char
}
plain_value! {
    ValueString: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueDecimal {
    pub value: f64,
}

impl PartialEq for ValueDecimal {
    fn eq(&self, other: &Self) -> bool {
        self.value.total_cmp(&other.value) == std::cmp::Ordering::Equal
    }
}
impl Eq for ValueDecimal {}
impl PartialOrd for ValueDecimal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.value.total_cmp(&other.value))
    }
}
impl Ord for ValueDecimal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.total_cmp(&other.value)
    }
}
impl Hash for ValueDecimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.to_bits().hash(state);
    }
}
impl ValueDecimal {
    pub fn new(v: f64) -> Self {
        Self { value: v }
    }
}
impl Display for ValueDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ValueList {
    pub values: Vec<Value>,
}

impl ValueList {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ValueField {
    pub name: Ident,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ValueStruct {
    pub ty: Ty,
    pub fields: Vec<ValueField>,
}

/// Field bag produced by anonymous-object construction; its runtime type is
/// the structural type of its fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ValueAnonymous {
    pub fields: Vec<ValueField>,
}

/// A lambda captured as a value. Free identifiers resolve against the
/// evaluation scope current at application time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ValueLambda {
    pub lambda: ExprLambda,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, From)]
pub enum Value {
    Unit(ValueUnit),
    Null(ValueNull),
    Bool(ValueBool),
    Int(ValueInt),
    Decimal(ValueDecimal),
    Char(ValueChar),
    String(ValueString),
    List(ValueList),
    Struct(ValueStruct),
    Anonymous(ValueAnonymous),
    Lambda(ValueLambda),
    /// An expression as data: the result of splice arguments that produce
    /// subtrees rather than plain values.
    Expr(BExpr),
}

impl Value {
    pub fn unit() -> Value {
        Value::Unit(ValueUnit)
    }

    pub fn null() -> Value {
        Value::Null(ValueNull)
    }

    pub fn bool(v: bool) -> Value {
        Value::Bool(ValueBool::new(v))
    }

    pub fn int(v: i64) -> Value {
        Value::Int(ValueInt::new(v))
    }

    pub fn decimal(v: f64) -> Value {
        Value::Decimal(ValueDecimal::new(v))
    }

    pub fn char_value(v: char) -> Value {
        Value::Char(ValueChar::new(v))
    }

    pub fn string(v: impl Into<String>) -> Value {
        Value::String(ValueString::new(v.into()))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(ValueList::new(values))
    }

    pub fn expr(expr: Expr) -> Value {
        Value::Expr(Box::new(expr))
    }

    pub fn lambda(lambda: ExprLambda) -> Value {
        Value::Lambda(ValueLambda { lambda })
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b.value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i.value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.value.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(&l.values),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Value::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn field(&self, name: &Ident) -> Option<&Value> {
        let fields = match self {
            Value::Struct(s) => &s.fields,
            Value::Anonymous(a) => &a.fields,
            _ => return None,
        };
        fields.iter().find(|f| &f.name == name).map(|f| &f.value)
    }

    /// The concrete runtime type of this value, as far as it can be told
    /// apart from its static type at a splice site.
    pub fn runtime_ty(&self) -> Ty {
        match self {
            Value::Unit(_) => Ty::unit(),
            Value::Null(_) => Ty::unknown(),
            Value::Bool(_) => Ty::bool(),
            Value::Int(_) => Ty::Primitive(TypePrimitive::Int(TypeInt::I64)),
            Value::Decimal(_) => Ty::Primitive(TypePrimitive::Decimal(TypeDecimal::F64)),
            Value::Char(_) => Ty::char_ty(),
            Value::String(_) => Ty::string(),
            Value::List(l) => {
                let elem = l
                    .values
                    .first()
                    .map(Value::runtime_ty)
                    .unwrap_or(Ty::unknown());
                Ty::array(elem)
            }
            Value::Struct(s) => s.ty.clone(),
            Value::Anonymous(a) => Ty::Anonymous(crate::ast::ty::TypeAnonymous {
                fields: a
                    .fields
                    .iter()
                    .map(|f| crate::ast::ty::AnonymousField {
                        name: f.name.clone(),
                        ty: f.value.runtime_ty(),
                    })
                    .collect(),
            }),
            Value::Lambda(l) => l.lambda.fn_ty(),
            Value::Expr(_) => Ty::named("Expr"),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unit(_) => write!(f, "()"),
            Value::Null(_) => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v.value),
            Value::Int(v) => write!(f, "{}", v.value),
            Value::Decimal(v) => write!(f, "{}", v.value),
            Value::Char(v) => write!(f, "'{}'", v.value),
            Value::String(v) => write!(f, "{:?}", v.value),
            Value::List(v) => {
                write!(f, "[{}]", v.values.iter().join(", "))
            }
            Value::Struct(v) => {
                write!(f, "{} {{ ", v.ty)?;
                for (i, field) in v.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value)?;
                }
                write!(f, " }}")
            }
            Value::Anonymous(v) => {
                write!(f, "{{ ")?;
                for (i, field) in v.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value)?;
                }
                write!(f, " }}")
            }
            Value::Lambda(v) => write!(f, "fn/{}", v.lambda.params.len()),
            Value::Expr(_) => write!(f, "<expr>"),
        }
    }
}
