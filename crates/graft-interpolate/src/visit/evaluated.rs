//! The evaluated-side walker: syntax that must execute as ordinary code.
//!
//! Splice arguments (and anything else outside the interpolation boundary)
//! are re-emitted as ordinary code whose evaluation yields a plain value or
//! an already-built subtree. The walker enforces the scope rules: evaluated
//! code may use its own locals and enclosing-method captures, but never an
//! identifier bound only by the interpolated lambda.

use crate::builder::value_literal;
use crate::desugar::QueryDesugarer;
use crate::fragment::Fragment;
use crate::visit::AnalysisContext;
use graft_core::ast::{ConvertKind, Expr, ExprInvoke, ExprKind, Ident, InvokeTarget};
use graft_core::diagnostics::codes;
use graft_core::error::Result;
use itertools::Itertools;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    /// The interpolation context parameter; referencing it from evaluated
    /// code is a scope error.
    pub context_param: Option<Ident>,
    /// Names bound inside the evaluated code itself (closure parameters,
    /// query range variables).
    pub evaluable: HashSet<Ident>,
    /// Names bound by the enclosing interpolated lambda; off-limits here.
    pub interpolated: HashSet<Ident>,
    /// Enclosing-method locals; usable, but flagged as closures.
    pub enclosing: HashSet<Ident>,
    /// Innermost checked/unchecked marker, if any.
    pub checked: Option<bool>,
}

impl EvalScope {
    fn with_evaluable(&self, names: impl IntoIterator<Item = Ident>) -> EvalScope {
        let mut scope = self.clone();
        for name in names {
            // A local rebinding shadows every outer meaning of the name.
            scope.interpolated.remove(&name);
            scope.enclosing.remove(&name);
            scope.evaluable.insert(name);
        }
        scope
    }

    fn with_checked(&self, checked: bool) -> EvalScope {
        let mut scope = self.clone();
        scope.checked = Some(checked);
        scope
    }
}

pub struct EvaluatedVisitor;

impl EvaluatedVisitor {
    pub fn visit(
        &self,
        expr: &Expr,
        scope: &EvalScope,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        ctx.cancel.check()?;
        match &expr.kind {
            ExprKind::Value(value) => Ok(match value_literal(value) {
                Some(text) => Fragment::verbatim(text),
                None => embedded_value(value),
            }),
            ExprKind::Default(default) => match ctx.builder.type_name(&default.ty) {
                Ok(name) => Ok(Fragment::verbatim(format!("default::<{}>()", name))),
                Err(failure) => Ok(ctx.report_type_failure(&failure)),
            },
            ExprKind::Ident(ident) => Ok(self.visit_ident(&ident.name, scope, ctx)),
            ExprKind::Member(member) => {
                if let Some(target_ty) = member.target.ty() {
                    if let Err(failure) = ctx.model.resolve_member(target_ty, &member.member) {
                        if matches!(failure, graft_core::sema::ResolveFailure::Inaccessible(_)) {
                            return Ok(ctx.report_resolve_failure(&failure));
                        }
                    }
                }
                let target = self.visit(&member.target, scope, ctx)?;
                Ok(Fragment::concat(vec![
                    target,
                    Fragment::verbatim(format!(".{}", member.member)),
                ]))
            }
            ExprKind::Invoke(invoke) => self.visit_invoke(invoke, scope, ctx),
            ExprKind::BinOp(op) => {
                let lhs = self.visit(&op.lhs, scope, ctx)?;
                let rhs = self.visit(&op.rhs, scope, ctx)?;
                let effective_checked =
                    scope.checked.unwrap_or_else(|| ctx.model.default_checked());
                if op.op.is_arithmetic() && effective_checked {
                    Ok(Fragment::call(
                        format!("checked_{}", op.op.factory_name()),
                        vec![lhs, rhs],
                    ))
                } else {
                    Ok(Fragment::binary(op.op.symbol(), lhs, rhs))
                }
            }
            ExprKind::UnOp(op) => {
                let operand = self.visit(&op.operand, scope, ctx)?;
                Ok(Fragment::concat(vec![
                    Fragment::verbatim(format!("({}", op.op.symbol())),
                    operand,
                    Fragment::verbatim(")"),
                ]))
            }
            ExprKind::Conditional(cond) => {
                let test = self.visit(&cond.cond, scope, ctx)?;
                let then = self.visit(&cond.then, scope, ctx)?;
                let otherwise = self.visit(&cond.otherwise, scope, ctx)?;
                Ok(Fragment::ternary(test, then, otherwise))
            }
            ExprKind::Lambda(lambda) => {
                let inner = scope.with_evaluable(lambda.param_names().cloned());
                let body = self.visit(&lambda.body, &inner, ctx)?;
                Ok(Fragment::lambda(
                    lambda.params.iter().map(|p| p.name.name.clone()).collect(),
                    body,
                ))
            }
            // A quoted lambda in evaluated position is already a tree
            // literal; embed it as data.
            ExprKind::Quote(_) => Ok(embedded_expr(expr)),
            ExprKind::Convert(convert) => {
                let operand = self.visit(&convert.expr, scope, ctx)?;
                let name = match ctx.builder.type_name(&convert.ty) {
                    Ok(name) => name,
                    Err(failure) => return Ok(ctx.report_type_failure(&failure)),
                };
                let callee = match convert.kind {
                    ConvertKind::Convert => format!("convert::<{}>", name),
                    ConvertKind::ConvertChecked => format!("convert_checked::<{}>", name),
                    ConvertKind::As => format!("try_convert::<{}>", name),
                    ConvertKind::Is => format!("is_type::<{}>", name),
                };
                Ok(Fragment::call(callee, vec![operand]))
            }
            ExprKind::Checked(checked) => {
                let inner = scope.with_checked(checked.checked);
                self.visit(&checked.expr, &inner, ctx)
            }
            ExprKind::New(new) => {
                let name = match ctx.builder.type_name(&new.ty) {
                    Ok(name) => name,
                    Err(failure) => return Ok(ctx.report_type_failure(&failure)),
                };
                let args: Vec<Fragment> = new
                    .args
                    .iter()
                    .map(|a| self.visit(a, scope, ctx))
                    .try_collect()?;
                if new.args.is_empty() && !new.initializers.is_empty() {
                    let mut parts = vec![Fragment::verbatim(format!("{} {{ ", name))];
                    for (i, init) in new.initializers.iter().enumerate() {
                        if i > 0 {
                            parts.push(Fragment::verbatim(", "));
                        }
                        parts.push(Fragment::verbatim(format!("{}: ", init.name)));
                        parts.push(self.visit(&init.value, scope, ctx)?);
                    }
                    parts.push(Fragment::verbatim(" }"));
                    Ok(Fragment::concat(parts))
                } else if new.initializers.is_empty() {
                    Ok(Fragment::call(format!("{}::new", name), args))
                } else {
                    // Constructor arguments plus initializers: build, then
                    // assign each field.
                    let mut parts = vec![
                        Fragment::verbatim("{ let mut __o = "),
                        Fragment::call(format!("{}::new", name), args),
                        Fragment::verbatim("; "),
                    ];
                    for init in &new.initializers {
                        parts.push(Fragment::verbatim(format!("__o.{} = ", init.name)));
                        parts.push(self.visit(&init.value, scope, ctx)?);
                        parts.push(Fragment::verbatim("; "));
                    }
                    parts.push(Fragment::verbatim("__o }"));
                    Ok(Fragment::concat(parts))
                }
            }
            ExprKind::AnonymousNew(anon) => {
                let mut args = Vec::new();
                for field in &anon.fields {
                    let value = self.visit(&field.value, scope, ctx)?;
                    args.push(Fragment::concat(vec![
                        Fragment::verbatim(format!("(\"{}\", ", field.name)),
                        value,
                        Fragment::verbatim(")"),
                    ]));
                }
                Ok(Fragment::call("anonymous", args))
            }
            ExprKind::Array(array) => {
                let items: Vec<Fragment> = array
                    .items
                    .iter()
                    .map(|a| self.visit(a, scope, ctx))
                    .try_collect()?;
                Ok(Fragment::concat(vec![
                    Fragment::verbatim("vec!"),
                    Fragment::initializer(items),
                ]))
            }
            ExprKind::Index(index) => {
                let target = self.visit(&index.target, scope, ctx)?;
                let idx = self.visit(&index.index, scope, ctx)?;
                Ok(Fragment::concat(vec![
                    target,
                    Fragment::verbatim("["),
                    idx,
                    Fragment::verbatim("]"),
                ]))
            }
            ExprKind::Query(query) => {
                let mut desugarer = QueryDesugarer::new(ctx.model);
                match desugarer.desugar(query) {
                    Ok(chain) => self.visit(&chain, scope, ctx),
                    Err(error) => Ok(ctx.unsupported(codes::UNSUPPORTED_SYNTAX, error.message())),
                }
            }
        }
    }

    fn visit_ident(
        &self,
        name: &Ident,
        scope: &EvalScope,
        ctx: &mut AnalysisContext<'_>,
    ) -> Fragment {
        if scope.context_param.as_ref() == Some(name) {
            return ctx.unsupported(
                codes::CONTEXT_REFERENCE,
                format!(
                    "the interpolation context `{}` cannot be referenced from evaluated code",
                    name
                ),
            );
        }
        if scope.evaluable.contains(name) {
            return Fragment::verbatim(name.name.clone());
        }
        if scope.interpolated.contains(name) {
            return ctx.unsupported(
                codes::EVALUATED_INTERPOLATED_IDENTIFIER,
                format!(
                    "`{}` is bound by the interpolated expression and cannot be evaluated",
                    name
                ),
            );
        }
        if scope.enclosing.contains(name) {
            // Evaluated code cannot close over the original method's locals
            // directly; it fetches them through the captured representation.
            tracing::debug!(local = %name, "evaluated code captures an enclosing local");
            ctx.advise(
                codes::CLOSURE_CAPTURE,
                format!("evaluated code captures enclosing local `{}`", name),
            );
            return Fragment::call(
                "captured_local",
                vec![Fragment::verbatim(format!("\"{}\"", name))],
            );
        }
        ctx.unsupported(
            codes::UNSUPPORTED_SYNTAX,
            format!("unbound identifier `{}` in evaluated code", name),
        )
    }

    fn visit_invoke(
        &self,
        invoke: &ExprInvoke,
        scope: &EvalScope,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        // Resolution is advisory here: evaluated code is recompiled by the
        // host, so only accessibility failures block.
        if let Err(failure) = ctx.model.resolve_invoke(invoke) {
            if matches!(failure, graft_core::sema::ResolveFailure::Inaccessible(_)) {
                return Ok(ctx.report_resolve_failure(&failure));
            }
        }
        // Explicit type arguments are reproduced only when the original
        // call carried them. The element-cast operator synthesized from a
        // typed `from` clause always carries them (see desugar.rs).
        let type_args = if invoke.type_args.is_empty() {
            String::new()
        } else {
            let mut names = Vec::new();
            for ty in &invoke.type_args {
                match ctx.builder.type_name(ty) {
                    Ok(name) => names.push(name),
                    Err(failure) => return Ok(ctx.report_type_failure(&failure)),
                }
            }
            format!("::<{}>", names.join(", "))
        };
        let args: Vec<Fragment> = invoke
            .args
            .iter()
            .map(|a| self.visit(a, scope, ctx))
            .try_collect()?;
        match &invoke.target {
            InvokeTarget::Path(path) => {
                Ok(Fragment::call(format!("{}{}", path, type_args), args))
            }
            InvokeTarget::Method(method) => {
                let receiver = self.visit(&method.receiver, scope, ctx)?;
                let mut parts = vec![
                    receiver,
                    Fragment::verbatim(format!(".{}{}(", method.name, type_args)),
                ];
                for (i, arg) in args.into_iter().enumerate() {
                    if i > 0 {
                        parts.push(Fragment::verbatim(", "));
                    }
                    parts.push(arg);
                }
                parts.push(Fragment::verbatim(")"));
                Ok(Fragment::concat(parts))
            }
        }
    }
}

/// Embed a non-literal constant as serialized data.
fn embedded_value(value: &graft_core::ast::Value) -> Fragment {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    Fragment::call(
        "value_from_json",
        vec![Fragment::verbatim(format!("r#\"{}\"#", json))],
    )
}

/// Embed an expression subtree as serialized data; used for tree literals
/// appearing in evaluated positions.
pub(crate) fn embedded_expr(expr: &Expr) -> Fragment {
    let json = serde_json::to_string(expr).unwrap_or_else(|_| "null".to_string());
    Fragment::call(
        "expr_from_json",
        vec![Fragment::verbatim(format!("r#\"{}\"#", json))],
    )
}
