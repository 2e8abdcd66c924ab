//! The substitution pass: given values for every evaluated subtree, build
//! the rewritten tree.
//!
//! Structure is preserved exactly for everything that is not a splice site;
//! conversions are introduced only at splice boundaries, which keeps
//! no-splice interpolation an identity (mod the context parameter).

use crate::capability::SpliceKind;
use crate::error::interpolation_error;
use crate::subst::substitute;
use graft_core::ast::{
    ConvertKind, Expr, ExprInvoke, ExprKind, ExprLambda, Ident, InvokeTarget, QueryClause, Value,
};
use graft_core::error::Result;
use itertools::Itertools;
use std::collections::{HashMap, VecDeque};

pub struct SplicingVisitor<'a> {
    context_param: &'a Ident,
    /// Evaluated results, in the analyzing visitor's visitation order. Both
    /// passes traverse left-to-right, so indices line up by construction.
    values: VecDeque<Value>,
}

impl<'a> SplicingVisitor<'a> {
    pub fn new(context_param: &'a Ident, values: Vec<Value>) -> Self {
        Self {
            context_param,
            values: values.into(),
        }
    }

    pub fn splice(&mut self, expr: &Expr) -> Result<Expr> {
        let ty = expr.ty.clone();
        let kind = match &expr.kind {
            ExprKind::Value(_) | ExprKind::Default(_) | ExprKind::Ident(_) => expr.kind.clone(),
            ExprKind::Member(member) => ExprKind::Member(graft_core::ast::ExprMember {
                target: Box::new(self.splice(&member.target)?),
                member: member.member.clone(),
            }),
            ExprKind::Invoke(invoke) => {
                if let InvokeTarget::Method(method) = &invoke.target {
                    if method.receiver.as_ident() == Some(self.context_param) {
                        return self.splice_site(expr, invoke);
                    }
                }
                let target = match &invoke.target {
                    InvokeTarget::Path(path) => InvokeTarget::Path(path.clone()),
                    InvokeTarget::Method(method) => {
                        InvokeTarget::Method(graft_core::ast::InvokeMethod {
                            receiver: Box::new(self.splice(&method.receiver)?),
                            name: method.name.clone(),
                        })
                    }
                };
                ExprKind::Invoke(ExprInvoke {
                    target,
                    type_args: invoke.type_args.clone(),
                    args: self.splice_all(&invoke.args)?,
                })
            }
            ExprKind::BinOp(op) => ExprKind::BinOp(graft_core::ast::ExprBinOp {
                op: op.op,
                lhs: Box::new(self.splice(&op.lhs)?),
                rhs: Box::new(self.splice(&op.rhs)?),
            }),
            ExprKind::UnOp(op) => ExprKind::UnOp(graft_core::ast::ExprUnOp {
                op: op.op,
                operand: Box::new(self.splice(&op.operand)?),
            }),
            ExprKind::Conditional(cond) => {
                ExprKind::Conditional(graft_core::ast::ExprConditional {
                    cond: Box::new(self.splice(&cond.cond)?),
                    then: Box::new(self.splice(&cond.then)?),
                    otherwise: Box::new(self.splice(&cond.otherwise)?),
                })
            }
            ExprKind::Lambda(lambda) => {
                if lambda.param_names().any(|p| p == self.context_param) {
                    // Shadowed context: nothing inside is a splice.
                    expr.kind.clone()
                } else {
                    ExprKind::Lambda(ExprLambda {
                        params: lambda.params.clone(),
                        body: Box::new(self.splice(&lambda.body)?),
                    })
                }
            }
            ExprKind::Quote(quote) => ExprKind::Quote(graft_core::ast::ExprQuote {
                lambda: Box::new(self.splice(&quote.lambda)?),
            }),
            ExprKind::Convert(convert) => ExprKind::Convert(graft_core::ast::ExprConvert {
                kind: convert.kind,
                expr: Box::new(self.splice(&convert.expr)?),
                ty: convert.ty.clone(),
            }),
            ExprKind::Checked(checked) => ExprKind::Checked(graft_core::ast::ExprChecked {
                checked: checked.checked,
                expr: Box::new(self.splice(&checked.expr)?),
            }),
            ExprKind::New(new) => ExprKind::New(graft_core::ast::ExprNew {
                ty: new.ty.clone(),
                args: self.splice_all(&new.args)?,
                initializers: self.splice_fields(&new.initializers)?,
            }),
            ExprKind::AnonymousNew(anon) => {
                ExprKind::AnonymousNew(graft_core::ast::ExprAnonymousNew {
                    fields: self.splice_fields(&anon.fields)?,
                })
            }
            ExprKind::Array(array) => ExprKind::Array(graft_core::ast::ExprArray {
                elem_ty: array.elem_ty.clone(),
                items: self.splice_all(&array.items)?,
            }),
            ExprKind::Index(index) => ExprKind::Index(graft_core::ast::ExprIndex {
                target: Box::new(self.splice(&index.target)?),
                index: Box::new(self.splice(&index.index)?),
            }),
            ExprKind::Query(query) => ExprKind::Query(self.splice_query(query)?),
        };
        Ok(Expr::from_parts(ty, kind))
    }

    fn splice_all(&mut self, exprs: &[Expr]) -> Result<Vec<Expr>> {
        exprs.iter().map(|e| self.splice(e)).try_collect()
    }

    fn splice_fields(
        &mut self,
        fields: &[graft_core::ast::FieldInit],
    ) -> Result<Vec<graft_core::ast::FieldInit>> {
        fields
            .iter()
            .map(|f| {
                Ok(graft_core::ast::FieldInit {
                    name: f.name.clone(),
                    value: self.splice(&f.value)?,
                })
            })
            .collect()
    }

    fn splice_query(
        &mut self,
        query: &graft_core::ast::ExprQuery,
    ) -> Result<graft_core::ast::ExprQuery> {
        let clauses = query
            .clauses
            .iter()
            .map(|clause| {
                Ok(match clause {
                    QueryClause::From(from) => QueryClause::From(graft_core::ast::QueryFrom {
                        var: from.var.clone(),
                        cast_ty: from.cast_ty.clone(),
                        source: Box::new(self.splice(&from.source)?),
                    }),
                    QueryClause::Where(w) => QueryClause::Where(graft_core::ast::QueryWhere {
                        predicate: Box::new(self.splice(&w.predicate)?),
                    }),
                    QueryClause::Select(s) => QueryClause::Select(graft_core::ast::QuerySelect {
                        projection: Box::new(self.splice(&s.projection)?),
                    }),
                    QueryClause::Let(l) => QueryClause::Let(graft_core::ast::QueryLet {
                        var: l.var.clone(),
                        value: Box::new(self.splice(&l.value)?),
                    }),
                    QueryClause::Join(join) => QueryClause::Join(graft_core::ast::QueryJoin {
                        var: join.var.clone(),
                        source: Box::new(self.splice(&join.source)?),
                        outer_key: Box::new(self.splice(&join.outer_key)?),
                        inner_key: Box::new(self.splice(&join.inner_key)?),
                        group: join.group.clone(),
                    }),
                    QueryClause::OrderBy(order) => {
                        QueryClause::OrderBy(graft_core::ast::QueryOrderBy {
                            orderings: order
                                .orderings
                                .iter()
                                .map(|o| {
                                    Ok(graft_core::ast::QueryOrdering {
                                        key: Box::new(self.splice(&o.key)?),
                                        descending: o.descending,
                                    })
                                })
                                .collect::<Result<Vec<_>>>()?,
                        })
                    }
                    QueryClause::GroupBy(group) => {
                        QueryClause::GroupBy(graft_core::ast::QueryGroupBy {
                            element: Box::new(self.splice(&group.element)?),
                            key: Box::new(self.splice(&group.key)?),
                        })
                    }
                    QueryClause::Into(into) => QueryClause::Into(into.clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(graft_core::ast::ExprQuery { clauses })
    }

    fn splice_site(&mut self, expr: &Expr, invoke: &ExprInvoke) -> Result<Expr> {
        let InvokeTarget::Method(method) = &invoke.target else {
            unreachable!("splice site requires a method target");
        };
        let kind = SpliceKind::classify(&method.name, invoke.args.len()).ok_or_else(|| {
            interpolation_error(format!(
                "`{}` survived analysis but is not a splice",
                method.name
            ))
        })?;
        match kind {
            SpliceKind::Splice => {
                let value = self.take_value(&invoke.args[0])?;
                let subtree = expr_of_value(value)?;
                Ok(self.coerce(subtree, expr))
            }
            SpliceKind::Value => {
                let value = self.take_value(&invoke.args[0])?;
                let ty = expr.ty.clone().unwrap_or_else(|| value.runtime_ty());
                Ok(Expr::from_parts(
                    Some(ty),
                    ExprKind::Value(Box::new(value)),
                ))
            }
            SpliceKind::Quoted => {
                let value = self.take_value(&invoke.args[0])?;
                let lambda = expr_of_value(value)?;
                Ok(Expr::quote(lambda))
            }
            SpliceKind::Body { arity } => {
                let value = self.take_value(&invoke.args[arity])?;
                let lambda = lambda_of_value(value)?;
                crate::interp_ensure!(
                    lambda.params.len() == arity,
                    format!(
                        "splice_body lambda expects {} arguments, got {}",
                        lambda.params.len(),
                        arity
                    )
                );
                let mut map: HashMap<Ident, Expr> = HashMap::new();
                for (param, arg) in lambda.params.iter().zip(&invoke.args[..arity]) {
                    map.insert(param.name.clone(), self.splice(arg)?);
                }
                Ok(substitute(&lambda.body, &map))
            }
        }
    }

    /// A constant argument carries its value directly; anything else was
    /// evaluated ahead of time and is consumed from the queue.
    fn take_value(&mut self, arg: &Expr) -> Result<Value> {
        if let Some(value) = arg.as_value() {
            return Ok(value.clone());
        }
        self.values.pop_front().ok_or_else(|| {
            interpolation_error(
                "splice value queue exhausted; analysis and splicing diverged".to_string(),
            )
        })
    }

    /// Coerce a spliced subtree to the site's expected static type.
    fn coerce(&self, subtree: Expr, site: &Expr) -> Expr {
        let Some(expected) = site.ty() else {
            return subtree;
        };
        if subtree.ty() == Some(expected) {
            return subtree;
        }
        Expr::convert(ConvertKind::Convert, subtree, expected.clone())
    }
}

fn expr_of_value(value: Value) -> Result<Expr> {
    match value {
        Value::Expr(expr) => Ok(*expr),
        Value::Lambda(lambda) => Ok(ExprKind::Lambda(lambda.lambda).into()),
        other => Err(interpolation_error(format!(
            "splice expects an expression value, got {}",
            other
        ))),
    }
}

fn lambda_of_value(value: Value) -> Result<ExprLambda> {
    match value {
        Value::Lambda(lambda) => Ok(lambda.lambda),
        Value::Expr(expr) => match expr.kind {
            ExprKind::Lambda(lambda) => Ok(lambda),
            _ => Err(interpolation_error(
                "splice_body expects a lambda expression".to_string(),
            )),
        },
        other => Err(interpolation_error(format!(
            "splice_body expects a lambda expression, got {}",
            other
        ))),
    }
}
