//! Classification pass over a built tree: find splice sites, collect the
//! evaluated subtrees, and enforce the scope rules before any rewriting
//! happens.

use crate::capability::SpliceKind;
use graft_core::ast::{Expr, ExprKind, ExprLambda, Ident, InvokeTarget, QueryClause};
use graft_core::cancel::CancellationFlag;
use graft_core::context::SharedScopedContext;
use graft_core::diagnostics::{codes, Diagnostic, DiagnosticCollector};
use graft_core::error::Result;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct RuntimeAnalysis {
    pub splice_count: usize,
    /// Evaluated subtrees that are not already constants, in left-to-right
    /// visitation order. The splicing pass consumes values in this order.
    pub evaluations: Vec<Expr>,
}

pub struct AnalyzingVisitor<'a> {
    context_param: &'a Ident,
    /// Names evaluated code may use without being closures (the data
    /// binding).
    evaluable: HashSet<Ident>,
    env: &'a SharedScopedContext,
    cancel: CancellationFlag,
}

impl<'a> AnalyzingVisitor<'a> {
    pub fn new(
        context_param: &'a Ident,
        evaluable: HashSet<Ident>,
        env: &'a SharedScopedContext,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            context_param,
            evaluable,
            env,
            cancel,
        }
    }

    pub fn analyze(
        &self,
        lambda: &ExprLambda,
        diagnostics: &mut DiagnosticCollector,
    ) -> Result<RuntimeAnalysis> {
        let mut analysis = RuntimeAnalysis::default();
        let mut interpolated: HashSet<Ident> =
            lambda.params.iter().skip(1).map(|p| p.name.clone()).collect();
        self.walk(&lambda.body, &mut interpolated, &mut analysis, diagnostics)?;
        tracing::debug!(
            splices = analysis.splice_count,
            evaluations = analysis.evaluations.len(),
            "classified interpolated lambda"
        );
        Ok(analysis)
    }

    fn walk(
        &self,
        expr: &Expr,
        interpolated: &mut HashSet<Ident>,
        analysis: &mut RuntimeAnalysis,
        diagnostics: &mut DiagnosticCollector,
    ) -> Result<()> {
        self.cancel.check()?;
        match &expr.kind {
            ExprKind::Ident(ident) => {
                if &ident.name == self.context_param {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "the interpolation context `{}` may only appear as a splice receiver",
                            ident.name
                        ))
                        .with_code(codes::CONTEXT_REFERENCE),
                    );
                }
                Ok(())
            }
            ExprKind::Invoke(invoke) => {
                if let InvokeTarget::Method(method) = &invoke.target {
                    if method.receiver.as_ident() == Some(self.context_param) {
                        return self.walk_splice(invoke, interpolated, analysis, diagnostics);
                    }
                    self.walk(&method.receiver, interpolated, analysis, diagnostics)?;
                }
                for arg in &invoke.args {
                    self.walk(arg, interpolated, analysis, diagnostics)?;
                }
                Ok(())
            }
            ExprKind::Lambda(lambda) => {
                if lambda.param_names().any(|p| p == self.context_param) {
                    // The context name is shadowed; nothing inside can refer
                    // to it.
                    return Ok(());
                }
                let added: Vec<Ident> = lambda
                    .param_names()
                    .filter(|p| !interpolated.contains(*p))
                    .cloned()
                    .collect();
                for name in &added {
                    interpolated.insert(name.clone());
                }
                self.walk(&lambda.body, interpolated, analysis, diagnostics)?;
                for name in &added {
                    interpolated.remove(name);
                }
                Ok(())
            }
            ExprKind::Query(query) => {
                let mut introduced: Vec<Ident> = Vec::new();
                for clause in &query.clauses {
                    match clause {
                        QueryClause::From(from) => {
                            self.walk(&from.source, interpolated, analysis, diagnostics)?;
                            introduced.push(from.var.clone());
                            interpolated.insert(from.var.clone());
                        }
                        QueryClause::Where(w) => {
                            self.walk(&w.predicate, interpolated, analysis, diagnostics)?;
                        }
                        QueryClause::Select(s) => {
                            self.walk(&s.projection, interpolated, analysis, diagnostics)?;
                        }
                        QueryClause::Let(l) => {
                            self.walk(&l.value, interpolated, analysis, diagnostics)?;
                            introduced.push(l.var.clone());
                            interpolated.insert(l.var.clone());
                        }
                        QueryClause::Join(join) => {
                            self.walk(&join.source, interpolated, analysis, diagnostics)?;
                            self.walk(&join.outer_key, interpolated, analysis, diagnostics)?;
                            interpolated.insert(join.var.clone());
                            self.walk(&join.inner_key, interpolated, analysis, diagnostics)?;
                            let kept = join.group.clone().unwrap_or_else(|| join.var.clone());
                            if kept != join.var {
                                interpolated.remove(&join.var);
                            }
                            introduced.push(kept.clone());
                            interpolated.insert(kept);
                        }
                        QueryClause::OrderBy(order) => {
                            for ordering in &order.orderings {
                                self.walk(&ordering.key, interpolated, analysis, diagnostics)?;
                            }
                        }
                        QueryClause::GroupBy(group) => {
                            self.walk(&group.element, interpolated, analysis, diagnostics)?;
                            self.walk(&group.key, interpolated, analysis, diagnostics)?;
                        }
                        QueryClause::Into(into) => {
                            for name in introduced.drain(..) {
                                interpolated.remove(&name);
                            }
                            introduced.push(into.var.clone());
                            interpolated.insert(into.var.clone());
                        }
                    }
                }
                for name in introduced {
                    interpolated.remove(&name);
                }
                Ok(())
            }
            _ => {
                for child in children_of(expr) {
                    self.walk(child, interpolated, analysis, diagnostics)?;
                }
                Ok(())
            }
        }
    }

    fn walk_splice(
        &self,
        invoke: &graft_core::ast::ExprInvoke,
        interpolated: &mut HashSet<Ident>,
        analysis: &mut RuntimeAnalysis,
        diagnostics: &mut DiagnosticCollector,
    ) -> Result<()> {
        let InvokeTarget::Method(method) = &invoke.target else {
            unreachable!("splice walk requires a method target");
        };
        let Some(kind) = SpliceKind::classify(&method.name, invoke.args.len()) else {
            let (code, message) = if SpliceKind::is_surface_name(&method.name) {
                (
                    codes::UNSUPPORTED_SYNTAX,
                    format!("`{}` does not match a recognized splice shape", method.name),
                )
            } else {
                (
                    codes::CONTEXT_REFERENCE,
                    format!(
                        "the interpolation context `{}` may only appear as a splice receiver",
                        self.context_param
                    ),
                )
            };
            diagnostics.report(Diagnostic::error(message).with_code(code));
            return Ok(());
        };
        analysis.splice_count += 1;
        let (interpolated_args, evaluated_arg) = match kind {
            SpliceKind::Body { arity } => (&invoke.args[..arity], &invoke.args[arity]),
            _ => (&invoke.args[..0], &invoke.args[0]),
        };
        for arg in interpolated_args {
            self.walk(arg, interpolated, analysis, diagnostics)?;
        }
        let mut local = self.evaluable.clone();
        self.check_evaluated(evaluated_arg, interpolated, &mut local, diagnostics)?;
        if !evaluated_arg.is_value() {
            analysis.evaluations.push(evaluated_arg.clone());
        }
        Ok(())
    }

    /// Scope rules for evaluated code: its own locals are fine, enclosing
    /// captures are advisories, interpolated bindings are errors, the
    /// context is an error.
    fn check_evaluated(
        &self,
        expr: &Expr,
        interpolated: &HashSet<Ident>,
        evaluable: &mut HashSet<Ident>,
        diagnostics: &mut DiagnosticCollector,
    ) -> Result<()> {
        self.cancel.check()?;
        match &expr.kind {
            ExprKind::Ident(ident) => {
                let name = &ident.name;
                if name == self.context_param {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "the interpolation context `{}` cannot be referenced from evaluated code",
                            name
                        ))
                        .with_code(codes::CONTEXT_REFERENCE),
                    );
                } else if evaluable.contains(name) {
                    // locally bound, nothing to report
                } else if interpolated.contains(name) {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "`{}` is bound by the interpolated expression and cannot be evaluated",
                            name
                        ))
                        .with_code(codes::EVALUATED_INTERPOLATED_IDENTIFIER),
                    );
                } else if self.env.has_value_recursive(name) {
                    diagnostics.report(
                        Diagnostic::warning(format!(
                            "evaluated code captures enclosing local `{}`",
                            name
                        ))
                        .with_code(codes::CLOSURE_CAPTURE),
                    );
                } else {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "unbound identifier `{}` in evaluated code",
                            name
                        ))
                        .with_code(codes::UNSUPPORTED_SYNTAX),
                    );
                }
                Ok(())
            }
            ExprKind::Lambda(lambda) => {
                let added: Vec<Ident> = lambda
                    .param_names()
                    .filter(|p| !evaluable.contains(*p))
                    .cloned()
                    .collect();
                for name in &added {
                    evaluable.insert(name.clone());
                }
                self.check_evaluated(&lambda.body, interpolated, evaluable, diagnostics)?;
                for name in &added {
                    evaluable.remove(name);
                }
                Ok(())
            }
            ExprKind::Query(query) => {
                let mut introduced: Vec<Ident> = Vec::new();
                for clause in &query.clauses {
                    match clause {
                        QueryClause::From(from) => {
                            self.check_evaluated(&from.source, interpolated, evaluable, diagnostics)?;
                            introduced.push(from.var.clone());
                            evaluable.insert(from.var.clone());
                        }
                        QueryClause::Where(w) => {
                            self.check_evaluated(&w.predicate, interpolated, evaluable, diagnostics)?;
                        }
                        QueryClause::Select(s) => {
                            self.check_evaluated(&s.projection, interpolated, evaluable, diagnostics)?;
                        }
                        QueryClause::Let(l) => {
                            self.check_evaluated(&l.value, interpolated, evaluable, diagnostics)?;
                            introduced.push(l.var.clone());
                            evaluable.insert(l.var.clone());
                        }
                        QueryClause::Join(join) => {
                            self.check_evaluated(&join.source, interpolated, evaluable, diagnostics)?;
                            self.check_evaluated(&join.outer_key, interpolated, evaluable, diagnostics)?;
                            evaluable.insert(join.var.clone());
                            self.check_evaluated(&join.inner_key, interpolated, evaluable, diagnostics)?;
                            let kept = join.group.clone().unwrap_or_else(|| join.var.clone());
                            if kept != join.var {
                                evaluable.remove(&join.var);
                            }
                            introduced.push(kept.clone());
                            evaluable.insert(kept);
                        }
                        QueryClause::OrderBy(order) => {
                            for ordering in &order.orderings {
                                self.check_evaluated(&ordering.key, interpolated, evaluable, diagnostics)?;
                            }
                        }
                        QueryClause::GroupBy(group) => {
                            self.check_evaluated(&group.element, interpolated, evaluable, diagnostics)?;
                            self.check_evaluated(&group.key, interpolated, evaluable, diagnostics)?;
                        }
                        QueryClause::Into(into) => {
                            for name in introduced.drain(..) {
                                evaluable.remove(&name);
                            }
                            introduced.push(into.var.clone());
                            evaluable.insert(into.var.clone());
                        }
                    }
                }
                for name in introduced {
                    evaluable.remove(&name);
                }
                Ok(())
            }
            _ => {
                for child in children_of(expr) {
                    self.check_evaluated(child, interpolated, evaluable, diagnostics)?;
                }
                Ok(())
            }
        }
    }
}

/// Immediate children of every node kind that has no binding structure of
/// its own. Kinds with binders (lambdas, queries) are handled by the
/// callers; listing them here would skip their scope bookkeeping.
pub(crate) fn children_of(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Value(_) | ExprKind::Default(_) | ExprKind::Ident(_) => Vec::new(),
        ExprKind::Member(member) => vec![member.target.as_ref()],
        ExprKind::Invoke(invoke) => {
            let mut children = Vec::new();
            if let InvokeTarget::Method(method) = &invoke.target {
                children.push(method.receiver.as_ref());
            }
            children.extend(invoke.args.iter());
            children
        }
        ExprKind::BinOp(op) => vec![op.lhs.as_ref(), op.rhs.as_ref()],
        ExprKind::UnOp(op) => vec![op.operand.as_ref()],
        ExprKind::Conditional(cond) => {
            vec![cond.cond.as_ref(), cond.then.as_ref(), cond.otherwise.as_ref()]
        }
        ExprKind::Lambda(lambda) => vec![lambda.body.as_ref()],
        ExprKind::Quote(quote) => vec![quote.lambda.as_ref()],
        ExprKind::Convert(convert) => vec![convert.expr.as_ref()],
        ExprKind::Checked(checked) => vec![checked.expr.as_ref()],
        ExprKind::New(new) => {
            let mut children: Vec<&Expr> = new.args.iter().collect();
            children.extend(new.initializers.iter().map(|i| &i.value));
            children
        }
        ExprKind::AnonymousNew(anon) => anon.fields.iter().map(|f| &f.value).collect(),
        ExprKind::Array(array) => array.items.iter().collect(),
        ExprKind::Index(index) => vec![index.target.as_ref(), index.index.as_ref()],
        ExprKind::Query(_) => Vec::new(),
    }
}
