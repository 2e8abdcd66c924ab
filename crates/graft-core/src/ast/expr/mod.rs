use crate::ast::ident::{Ident, Path};
use crate::ast::ops::{BinOpKind, UnOpKind};
use crate::ast::ty::Ty;
use crate::ast::value::{BValue, Value};
use derive_more::From;
use serde::{Deserialize, Serialize};

mod query;

pub use query::*;

pub type BExpr = Box<Expr>;

/// Expr is an expression-tree node: code as data. Nodes are never mutated
/// in place; rewrites always build new trees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Expr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<Ty>,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, From)]
pub enum ExprKind {
    /// A literal or captured constant.
    Value(BValue),
    /// The default value of a type.
    Default(ExprDefault),
    /// Reference to a named binding: lambda parameter, query range
    /// variable, or captured local.
    Ident(ExprIdent),
    /// `target.member`
    Member(ExprMember),
    Invoke(ExprInvoke),
    BinOp(ExprBinOp),
    UnOp(ExprUnOp),
    Conditional(ExprConditional),
    Lambda(ExprLambda),
    /// A lambda embedded as a tree rather than compiled to a callable.
    Quote(ExprQuote),
    Convert(ExprConvert),
    /// Checked/unchecked region marker.
    Checked(ExprChecked),
    New(ExprNew),
    AnonymousNew(ExprAnonymousNew),
    Array(ExprArray),
    Index(ExprIndex),
    Query(ExprQuery),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprDefault {
    pub ty: Ty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprIdent {
    pub name: Ident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprMember {
    pub target: BExpr,
    pub member: Ident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InvokeMethod {
    pub receiver: BExpr,
    pub name: Ident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, From)]
pub enum InvokeTarget {
    /// A static function or associated item named by path.
    Path(Path),
    /// An instance (or extension) method on a receiver expression.
    Method(InvokeMethod),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprInvoke {
    pub target: InvokeTarget,
    /// Explicit type arguments as written at the call site; empty means the
    /// call relied on inference.
    pub type_args: Vec<Ty>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprBinOp {
    pub op: BinOpKind,
    pub lhs: BExpr,
    pub rhs: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprUnOp {
    pub op: UnOpKind,
    pub operand: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprConditional {
    pub cond: BExpr,
    pub then: BExpr,
    pub otherwise: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LambdaParam {
    pub name: Ident,
    pub ty: Ty,
}

impl LambdaParam {
    pub fn new(name: impl Into<Ident>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprLambda {
    pub params: Vec<LambdaParam>,
    pub body: BExpr,
}

impl ExprLambda {
    pub fn new(params: Vec<LambdaParam>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    pub fn param_names(&self) -> impl Iterator<Item = &Ident> {
        self.params.iter().map(|p| &p.name)
    }

    /// The function type of this lambda, as far as its slots are filled in.
    pub fn fn_ty(&self) -> Ty {
        let params = self.params.iter().map(|p| p.ty.clone()).collect();
        let ret = self.body.ty.clone().unwrap_or(Ty::unknown());
        Ty::function(params, ret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprQuote {
    pub lambda: BExpr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConvertKind {
    Convert,
    ConvertChecked,
    As,
    Is,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprConvert {
    pub kind: ConvertKind,
    pub expr: BExpr,
    pub ty: Ty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprChecked {
    pub checked: bool,
    pub expr: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldInit {
    pub name: Ident,
    pub value: Expr,
}

impl FieldInit {
    pub fn new(name: impl Into<Ident>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprNew {
    pub ty: Ty,
    pub args: Vec<Expr>,
    pub initializers: Vec<FieldInit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprAnonymousNew {
    pub fields: Vec<FieldInit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprArray {
    pub elem_ty: Option<Ty>,
    pub items: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprIndex {
    pub target: BExpr,
    pub index: BExpr,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { ty: None, kind }
    }

    pub fn with_ty(mut self, ty: Ty) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn ty(&self) -> Option<&Ty> {
        self.ty.as_ref()
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn into_parts(self) -> (Option<Ty>, ExprKind) {
        (self.ty, self.kind)
    }

    pub fn from_parts(ty: Option<Ty>, kind: ExprKind) -> Self {
        Self { ty, kind }
    }

    pub fn value(v: Value) -> Expr {
        match v {
            Value::Expr(expr) => *expr,
            other => ExprKind::Value(Box::new(other)).into(),
        }
    }

    pub fn unit() -> Expr {
        Expr::value(Value::unit()).with_ty(Ty::unit())
    }

    pub fn bool(v: bool) -> Expr {
        Expr::value(Value::bool(v)).with_ty(Ty::bool())
    }

    pub fn int(v: i64) -> Expr {
        Expr::value(Value::int(v)).with_ty(Ty::i64())
    }

    pub fn decimal(v: f64) -> Expr {
        Expr::value(Value::decimal(v)).with_ty(Ty::f64())
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::value(Value::string(v)).with_ty(Ty::string())
    }

    pub fn ident(name: impl Into<Ident>) -> Expr {
        ExprKind::Ident(ExprIdent { name: name.into() }).into()
    }

    pub fn default_of(ty: Ty) -> Expr {
        let kind = ExprKind::Default(ExprDefault { ty: ty.clone() });
        Expr::from_parts(Some(ty), kind)
    }

    pub fn member(target: Expr, member: impl Into<Ident>) -> Expr {
        ExprKind::Member(ExprMember {
            target: Box::new(target),
            member: member.into(),
        })
        .into()
    }

    pub fn invoke_path(path: impl Into<Path>, type_args: Vec<Ty>, args: Vec<Expr>) -> Expr {
        ExprKind::Invoke(ExprInvoke {
            target: InvokeTarget::Path(path.into()),
            type_args,
            args,
        })
        .into()
    }

    pub fn invoke_method(receiver: Expr, name: impl Into<Ident>, args: Vec<Expr>) -> Expr {
        ExprKind::Invoke(ExprInvoke {
            target: InvokeTarget::Method(InvokeMethod {
                receiver: Box::new(receiver),
                name: name.into(),
            }),
            type_args: Vec::new(),
            args,
        })
        .into()
    }

    pub fn binary(op: BinOpKind, lhs: Expr, rhs: Expr) -> Expr {
        ExprKind::BinOp(ExprBinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
        .into()
    }

    pub fn unary(op: UnOpKind, operand: Expr) -> Expr {
        ExprKind::UnOp(ExprUnOp {
            op,
            operand: Box::new(operand),
        })
        .into()
    }

    pub fn conditional(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        ExprKind::Conditional(ExprConditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
        .into()
    }

    pub fn lambda(params: Vec<LambdaParam>, body: Expr) -> Expr {
        ExprKind::Lambda(ExprLambda::new(params, body)).into()
    }

    pub fn quote(lambda: Expr) -> Expr {
        ExprKind::Quote(ExprQuote {
            lambda: Box::new(lambda),
        })
        .into()
    }

    pub fn convert(kind: ConvertKind, expr: Expr, ty: Ty) -> Expr {
        let node = ExprKind::Convert(ExprConvert {
            kind,
            expr: Box::new(expr),
            ty: ty.clone(),
        });
        match kind {
            ConvertKind::Is => Expr::from_parts(Some(Ty::bool()), node),
            _ => Expr::from_parts(Some(ty), node),
        }
    }

    pub fn checked(checked: bool, expr: Expr) -> Expr {
        ExprKind::Checked(ExprChecked {
            checked,
            expr: Box::new(expr),
        })
        .into()
    }

    pub fn new_object(ty: Ty, args: Vec<Expr>, initializers: Vec<FieldInit>) -> Expr {
        let kind = ExprKind::New(ExprNew {
            ty: ty.clone(),
            args,
            initializers,
        });
        Expr::from_parts(Some(ty), kind)
    }

    pub fn anonymous_new(fields: Vec<FieldInit>) -> Expr {
        ExprKind::AnonymousNew(ExprAnonymousNew { fields }).into()
    }

    pub fn array(elem_ty: Option<Ty>, items: Vec<Expr>) -> Expr {
        ExprKind::Array(ExprArray { elem_ty, items }).into()
    }

    pub fn index(target: Expr, index: Expr) -> Expr {
        ExprKind::Index(ExprIndex {
            target: Box::new(target),
            index: Box::new(index),
        })
        .into()
    }

    pub fn query(clauses: Vec<QueryClause>) -> Expr {
        ExprKind::Query(ExprQuery { clauses }).into()
    }

    pub fn as_lambda(&self) -> Option<&ExprLambda> {
        match &self.kind {
            ExprKind::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(ident) => Some(&ident.name),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, ExprKind::Value(_))
    }
}

impl<T> From<T> for Expr
where
    ExprKind: From<T>,
{
    fn from(value: T) -> Self {
        Expr::new(ExprKind::from(value))
    }
}

impl From<BExpr> for Expr {
    fn from(expr: BExpr) -> Self {
        *expr
    }
}
