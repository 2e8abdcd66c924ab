//! Capture-aware identifier substitution over expression trees.
//!
//! Used by query desugaring (range variables become projections off a
//! transparent identifier) and by `splice_body` beta-reduction (lambda
//! parameters are replaced positionally by argument trees).

use graft_core::ast::{
    Expr, ExprKind, ExprQuery, FieldInit, Ident, InvokeTarget, QueryClause,
};
use std::collections::HashMap;

pub fn substitute(expr: &Expr, map: &HashMap<Ident, Expr>) -> Expr {
    if map.is_empty() {
        return expr.clone();
    }
    let ty = expr.ty.clone();
    let kind = match &expr.kind {
        ExprKind::Ident(ident) => {
            if let Some(replacement) = map.get(&ident.name) {
                return replacement.clone();
            }
            expr.kind.clone()
        }
        ExprKind::Value(_) | ExprKind::Default(_) => expr.kind.clone(),
        ExprKind::Member(member) => ExprKind::Member(graft_core::ast::ExprMember {
            target: Box::new(substitute(&member.target, map)),
            member: member.member.clone(),
        }),
        ExprKind::Invoke(invoke) => {
            let target = match &invoke.target {
                InvokeTarget::Path(path) => InvokeTarget::Path(path.clone()),
                InvokeTarget::Method(method) => {
                    InvokeTarget::Method(graft_core::ast::InvokeMethod {
                        receiver: Box::new(substitute(&method.receiver, map)),
                        name: method.name.clone(),
                    })
                }
            };
            ExprKind::Invoke(graft_core::ast::ExprInvoke {
                target,
                type_args: invoke.type_args.clone(),
                args: invoke.args.iter().map(|a| substitute(a, map)).collect(),
            })
        }
        ExprKind::BinOp(op) => ExprKind::BinOp(graft_core::ast::ExprBinOp {
            op: op.op,
            lhs: Box::new(substitute(&op.lhs, map)),
            rhs: Box::new(substitute(&op.rhs, map)),
        }),
        ExprKind::UnOp(op) => ExprKind::UnOp(graft_core::ast::ExprUnOp {
            op: op.op,
            operand: Box::new(substitute(&op.operand, map)),
        }),
        ExprKind::Conditional(cond) => ExprKind::Conditional(graft_core::ast::ExprConditional {
            cond: Box::new(substitute(&cond.cond, map)),
            then: Box::new(substitute(&cond.then, map)),
            otherwise: Box::new(substitute(&cond.otherwise, map)),
        }),
        ExprKind::Lambda(lambda) => {
            // Parameters shadow substitutions inside the body.
            let mut inner = map.clone();
            for param in &lambda.params {
                inner.remove(&param.name);
            }
            ExprKind::Lambda(graft_core::ast::ExprLambda {
                params: lambda.params.clone(),
                body: Box::new(substitute(&lambda.body, &inner)),
            })
        }
        ExprKind::Quote(quote) => ExprKind::Quote(graft_core::ast::ExprQuote {
            lambda: Box::new(substitute(&quote.lambda, map)),
        }),
        ExprKind::Convert(convert) => ExprKind::Convert(graft_core::ast::ExprConvert {
            kind: convert.kind,
            expr: Box::new(substitute(&convert.expr, map)),
            ty: convert.ty.clone(),
        }),
        ExprKind::Checked(checked) => ExprKind::Checked(graft_core::ast::ExprChecked {
            checked: checked.checked,
            expr: Box::new(substitute(&checked.expr, map)),
        }),
        ExprKind::New(new) => ExprKind::New(graft_core::ast::ExprNew {
            ty: new.ty.clone(),
            args: new.args.iter().map(|a| substitute(a, map)).collect(),
            initializers: substitute_fields(&new.initializers, map),
        }),
        ExprKind::AnonymousNew(anon) => ExprKind::AnonymousNew(graft_core::ast::ExprAnonymousNew {
            fields: substitute_fields(&anon.fields, map),
        }),
        ExprKind::Array(array) => ExprKind::Array(graft_core::ast::ExprArray {
            elem_ty: array.elem_ty.clone(),
            items: array.items.iter().map(|a| substitute(a, map)).collect(),
        }),
        ExprKind::Index(index) => ExprKind::Index(graft_core::ast::ExprIndex {
            target: Box::new(substitute(&index.target, map)),
            index: Box::new(substitute(&index.index, map)),
        }),
        ExprKind::Query(query) => ExprKind::Query(substitute_query(query, map)),
    };
    Expr::from_parts(ty, kind)
}

fn substitute_fields(fields: &[FieldInit], map: &HashMap<Ident, Expr>) -> Vec<FieldInit> {
    fields
        .iter()
        .map(|f| FieldInit {
            name: f.name.clone(),
            value: substitute(&f.value, map),
        })
        .collect()
}

/// Range variables introduced by earlier clauses shadow substitutions in
/// later clauses.
fn substitute_query(query: &ExprQuery, map: &HashMap<Ident, Expr>) -> ExprQuery {
    let mut map = map.clone();
    let clauses = query
        .clauses
        .iter()
        .map(|clause| match clause {
            QueryClause::From(from) => {
                let rewritten = graft_core::ast::QueryFrom {
                    var: from.var.clone(),
                    cast_ty: from.cast_ty.clone(),
                    source: Box::new(substitute(&from.source, &map)),
                };
                map.remove(&from.var);
                QueryClause::From(rewritten)
            }
            QueryClause::Where(w) => QueryClause::Where(graft_core::ast::QueryWhere {
                predicate: Box::new(substitute(&w.predicate, &map)),
            }),
            QueryClause::Select(s) => QueryClause::Select(graft_core::ast::QuerySelect {
                projection: Box::new(substitute(&s.projection, &map)),
            }),
            QueryClause::Let(l) => {
                let rewritten = graft_core::ast::QueryLet {
                    var: l.var.clone(),
                    value: Box::new(substitute(&l.value, &map)),
                };
                map.remove(&l.var);
                QueryClause::Let(rewritten)
            }
            QueryClause::Join(j) => {
                let mut inner = map.clone();
                inner.remove(&j.var);
                let rewritten = graft_core::ast::QueryJoin {
                    var: j.var.clone(),
                    source: Box::new(substitute(&j.source, &map)),
                    outer_key: Box::new(substitute(&j.outer_key, &map)),
                    inner_key: Box::new(substitute(&j.inner_key, &inner)),
                    group: j.group.clone(),
                };
                map.remove(j.group.as_ref().unwrap_or(&j.var));
                QueryClause::Join(rewritten)
            }
            QueryClause::OrderBy(o) => QueryClause::OrderBy(graft_core::ast::QueryOrderBy {
                orderings: o
                    .orderings
                    .iter()
                    .map(|ord| graft_core::ast::QueryOrdering {
                        key: Box::new(substitute(&ord.key, &map)),
                        descending: ord.descending,
                    })
                    .collect(),
            }),
            QueryClause::GroupBy(g) => QueryClause::GroupBy(graft_core::ast::QueryGroupBy {
                element: Box::new(substitute(&g.element, &map)),
                key: Box::new(substitute(&g.key, &map)),
            }),
            QueryClause::Into(into) => {
                map.remove(&into.var);
                QueryClause::Into(into.clone())
            }
        })
        .collect();
    ExprQuery { clauses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::ast::{BinOpKind, LambdaParam, Ty};

    fn map_of(name: &str, expr: Expr) -> HashMap<Ident, Expr> {
        let mut map = HashMap::new();
        map.insert(Ident::new(name), expr);
        map
    }

    #[test]
    fn replaces_free_identifiers() {
        let body = Expr::binary(BinOpKind::Add, Expr::ident("x"), Expr::int(1));
        let result = substitute(&body, &map_of("x", Expr::member(Expr::ident("cat"), "age")));
        assert_eq!(
            result,
            Expr::binary(
                BinOpKind::Add,
                Expr::member(Expr::ident("cat"), "age"),
                Expr::int(1)
            )
        );
    }

    #[test]
    fn lambda_parameters_shadow() {
        let inner = Expr::lambda(
            vec![LambdaParam::new("x", Ty::i64())],
            Expr::ident("x"),
        );
        let result = substitute(&inner, &map_of("x", Expr::int(9)));
        assert_eq!(result, inner);
    }
}
