//! Query-expression clause chains.
//!
//! Query syntax has no native expression-tree node: the interpolation
//! engine desugars a clause chain into the equivalent operator-method call
//! chain before reconstruction or evaluation.

use super::BExpr;
use crate::ast::ident::Ident;
use crate::ast::ty::Ty;
use derive_more::From;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExprQuery {
    /// The first clause is always `From`; later `Into` clauses restart the
    /// range-variable scope (query continuation).
    pub clauses: Vec<QueryClause>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, From)]
pub enum QueryClause {
    From(QueryFrom),
    Where(QueryWhere),
    Select(QuerySelect),
    Let(QueryLet),
    Join(QueryJoin),
    OrderBy(QueryOrderBy),
    GroupBy(QueryGroupBy),
    Into(QueryInto),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryFrom {
    pub var: Ident,
    /// A typed `from` clause inserts an element cast before enumeration.
    pub cast_ty: Option<Ty>,
    pub source: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryWhere {
    pub predicate: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QuerySelect {
    pub projection: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryLet {
    pub var: Ident,
    pub value: BExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryJoin {
    pub var: Ident,
    pub source: BExpr,
    pub outer_key: BExpr,
    pub inner_key: BExpr,
    /// `join .. into g` makes this a group join introducing `g` instead of
    /// the join variable.
    pub group: Option<Ident>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryOrdering {
    pub key: BExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryOrderBy {
    pub orderings: Vec<QueryOrdering>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryGroupBy {
    pub element: BExpr,
    pub key: BExpr,
}

/// Query continuation: the clauses after `into` see only the continuation
/// variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryInto {
    pub var: Ident,
}

impl ExprQuery {
    pub fn new(clauses: Vec<QueryClause>) -> Self {
        Self { clauses }
    }
}
