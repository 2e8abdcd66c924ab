//! The interpolated-side walker: syntax reconstructed as tree-factory code.
//!
//! Every node becomes a fragment that, rendered, constructs the equivalent
//! expression-tree node, except at splice calls, where the reconstruction
//! is replaced by the spliced content. Each child position is bound to a
//! scope entry so an unmodified subtree is passed through by reference
//! instead of being rebuilt.

use crate::builder::{ty_literal, ValueDefinition};
use crate::capability::SpliceKind;
use crate::desugar::QueryDesugarer;
use crate::fragment::Fragment;
use crate::scope::BindingStack;
use crate::visit::evaluated::{embedded_expr, EvalScope, EvaluatedVisitor};
use crate::visit::AnalysisContext;
use graft_core::ast::{
    Expr, ExprInvoke, ExprKind, ExprLambda, Ident, InvokeTarget, Ty, Value,
};
use graft_core::diagnostics::codes;
use graft_core::error::Result;
use std::collections::HashSet;

pub struct InterpState {
    pub context_param: Ident,
    /// Names bound by the interpolated lambda itself and by nested lambdas.
    pub interpolated: HashSet<Ident>,
    /// Enclosing-method locals visible at the call site.
    pub enclosing: HashSet<Ident>,
    /// Locally evaluable names handed to splice arguments (the data
    /// binding, when the entry point carries one).
    pub eval_locals: HashSet<Ident>,
    pub checked: Option<bool>,
    pub bindings: BindingStack,
    /// Subtree reuse requires positions that exist in the original tree;
    /// desugared query chains have none, so reuse turns off inside them.
    pub reuse_enabled: bool,
}

impl InterpState {
    pub fn new(context_param: Ident, lambda: &ExprLambda) -> Self {
        let interpolated = lambda
            .params
            .iter()
            .skip(1)
            .map(|p| p.name.clone())
            .collect();
        Self {
            context_param,
            interpolated,
            enclosing: HashSet::new(),
            eval_locals: HashSet::new(),
            checked: None,
            bindings: BindingStack::new("__e0", lambda.fn_ty()),
            reuse_enabled: true,
        }
    }

    fn eval_scope(&self) -> EvalScope {
        EvalScope {
            context_param: Some(self.context_param.clone()),
            evaluable: self.eval_locals.clone(),
            interpolated: self.interpolated.clone(),
            enclosing: self.enclosing.clone(),
            checked: self.checked,
        }
    }
}

pub struct InterpolatedVisitor;

impl InterpolatedVisitor {
    /// Visit a child position. When reuse is enabled the position is bound,
    /// and an unmodified result collapses to a reference to the original
    /// node.
    pub fn visit_child(
        &self,
        expr: &Expr,
        accessor: impl Into<String>,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        if !st.reuse_enabled {
            return self.visit(expr, st, ctx);
        }
        let ty = expr.ty.clone().unwrap_or(Ty::unknown());
        let id = st.bindings.bind(accessor, ty);
        let fragment = self.visit(expr, st, ctx)?;
        Ok(st.bindings.with_value(id, fragment))
    }

    pub fn visit(
        &self,
        expr: &Expr,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        ctx.cancel.check()?;
        match &expr.kind {
            ExprKind::Value(value) => Ok(self.reconstruct_value(value)),
            ExprKind::Default(default) => Ok(match self.reference_ty(&default.ty, ctx) {
                Some(lit) => Fragment::call("Expr::default_of", vec![Fragment::verbatim(lit)]),
                None => Fragment::unsupported(),
            }),
            ExprKind::Ident(ident) => Ok(self.visit_ident(&ident.name, st, ctx)),
            ExprKind::Member(member) => {
                if let Some(target_ty) = member.target.ty() {
                    if let Err(failure) = ctx.model.resolve_member(target_ty, &member.member) {
                        if matches!(failure, graft_core::sema::ResolveFailure::Inaccessible(_)) {
                            return Ok(ctx.report_resolve_failure(&failure));
                        }
                    }
                }
                let target =
                    self.visit_child(&member.target, "member_target({})", st, ctx)?;
                Ok(Fragment::call(
                    "Expr::member",
                    vec![target, Fragment::verbatim(format!("\"{}\"", member.member))],
                ))
            }
            ExprKind::Invoke(invoke) => self.visit_invoke(expr, invoke, st, ctx),
            ExprKind::BinOp(op) => {
                let lhs = self.visit_child(&op.lhs, "bin_lhs({})", st, ctx)?;
                let rhs = self.visit_child(&op.rhs, "bin_rhs({})", st, ctx)?;
                let node = Fragment::call(
                    "Expr::binary",
                    vec![
                        Fragment::verbatim(format!("BinOpKind::{:?}", op.op)),
                        lhs,
                        rhs,
                    ],
                );
                let effective = st.checked.unwrap_or_else(|| ctx.model.default_checked());
                if op.op.is_arithmetic() && effective {
                    Ok(Fragment::call(
                        "Expr::checked",
                        vec![Fragment::verbatim("true"), node],
                    ))
                } else {
                    Ok(node)
                }
            }
            ExprKind::UnOp(op) => {
                let operand = self.visit_child(&op.operand, "un_operand({})", st, ctx)?;
                Ok(Fragment::call(
                    "Expr::unary",
                    vec![
                        Fragment::verbatim(format!("UnOpKind::{:?}", op.op)),
                        operand,
                    ],
                ))
            }
            ExprKind::Conditional(cond) => {
                let test = self.visit_child(&cond.cond, "cond_test({})", st, ctx)?;
                let then = self.visit_branch(&cond.then, "cond_then({})", expr.ty(), st, ctx)?;
                let otherwise =
                    self.visit_branch(&cond.otherwise, "cond_else({})", expr.ty(), st, ctx)?;
                Ok(Fragment::call(
                    "Expr::conditional",
                    vec![test, then, otherwise],
                ))
            }
            ExprKind::Lambda(lambda) => self.visit_lambda(lambda, st, ctx),
            ExprKind::Quote(quote) => {
                let inner = self.visit_child(&quote.lambda, "quote_lambda({})", st, ctx)?;
                Ok(Fragment::call("Expr::quote", vec![inner]))
            }
            ExprKind::Convert(convert) => {
                let operand =
                    self.visit_child(&convert.expr, "convert_operand({})", st, ctx)?;
                Ok(match self.reference_ty(&convert.ty, ctx) {
                    Some(lit) => Fragment::call(
                        "Expr::convert",
                        vec![
                            Fragment::verbatim(format!("ConvertKind::{:?}", convert.kind)),
                            operand,
                            Fragment::verbatim(lit),
                        ],
                    ),
                    None => Fragment::unsupported(),
                })
            }
            ExprKind::Checked(checked) => {
                let saved = st.checked;
                st.checked = Some(checked.checked);
                let inner = self.visit_child(&checked.expr, "checked_operand({})", st, ctx);
                st.checked = saved;
                let inner = inner?;
                Ok(Fragment::call(
                    "Expr::checked",
                    vec![
                        Fragment::verbatim(format!("{}", checked.checked)),
                        inner,
                    ],
                ))
            }
            ExprKind::New(new) => {
                let Some(lit) = self.reference_ty(&new.ty, ctx) else {
                    return Ok(Fragment::unsupported());
                };
                let mut args = Vec::new();
                for (i, arg) in new.args.iter().enumerate() {
                    args.push(self.visit_child(arg, format!("new_arg({{}}, {})", i), st, ctx)?);
                }
                let mut inits = Vec::new();
                for (i, init) in new.initializers.iter().enumerate() {
                    let value =
                        self.visit_child(&init.value, format!("new_init({{}}, {})", i), st, ctx)?;
                    inits.push(Fragment::call(
                        "FieldInit::new",
                        vec![Fragment::verbatim(format!("\"{}\"", init.name)), value],
                    ));
                }
                Ok(Fragment::call(
                    "Expr::new_object",
                    vec![
                        Fragment::verbatim(lit),
                        vec_of(args),
                        vec_of(inits),
                    ],
                ))
            }
            ExprKind::AnonymousNew(anon) => {
                let mut inits = Vec::new();
                for (i, init) in anon.fields.iter().enumerate() {
                    let value =
                        self.visit_child(&init.value, format!("anon_field({{}}, {})", i), st, ctx)?;
                    inits.push(Fragment::call(
                        "FieldInit::new",
                        vec![Fragment::verbatim(format!("\"{}\"", init.name)), value],
                    ));
                }
                Ok(Fragment::call("Expr::anonymous_new", vec![vec_of(inits)]))
            }
            ExprKind::Array(array) => {
                let elem = match &array.elem_ty {
                    Some(ty) => match self.reference_ty(ty, ctx) {
                        Some(lit) => Fragment::verbatim(format!("Some({})", lit)),
                        None => return Ok(Fragment::unsupported()),
                    },
                    None => Fragment::verbatim("None"),
                };
                let mut items = Vec::new();
                for (i, item) in array.items.iter().enumerate() {
                    items.push(self.visit_child(item, format!("array_item({{}}, {})", i), st, ctx)?);
                }
                Ok(Fragment::call("Expr::array", vec![elem, vec_of(items)]))
            }
            ExprKind::Index(index) => {
                let target = self.visit_child(&index.target, "index_target({})", st, ctx)?;
                let idx = self.visit_child(&index.index, "index_value({})", st, ctx)?;
                Ok(Fragment::call("Expr::index", vec![target, idx]))
            }
            ExprKind::Query(query) => {
                let mut desugarer = QueryDesugarer::new(ctx.model);
                match desugarer.desugar(query) {
                    Ok(chain) => {
                        let saved = st.reuse_enabled;
                        st.reuse_enabled = false;
                        let result = self.visit(&chain, st, ctx);
                        st.reuse_enabled = saved;
                        result
                    }
                    Err(error) => Ok(ctx.unsupported(codes::UNSUPPORTED_SYNTAX, error.message())),
                }
            }
        }
    }

    fn reconstruct_value(&self, value: &Value) -> Fragment {
        match value {
            Value::Unit(_) => Fragment::verbatim("Expr::unit()"),
            Value::Bool(b) => Fragment::call(
                "Expr::bool",
                vec![Fragment::verbatim(format!("{}", b.value))],
            ),
            Value::Int(i) => Fragment::call(
                "Expr::int",
                vec![Fragment::verbatim(format!("{}", i.value))],
            ),
            Value::Decimal(d) => Fragment::call(
                "Expr::decimal",
                vec![Fragment::verbatim(format!("{:?}", d.value))],
            ),
            Value::String(s) => Fragment::call(
                "Expr::string",
                vec![Fragment::verbatim(format!("{:?}", s.value))],
            ),
            other => {
                let json = serde_json::to_string(other).unwrap_or_else(|_| "null".to_string());
                Fragment::call(
                    "Expr::value",
                    vec![Fragment::call(
                        "value_from_json",
                        vec![Fragment::verbatim(format!("r#\"{}\"#", json))],
                    )],
                )
            }
        }
    }

    fn visit_ident(
        &self,
        name: &Ident,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Fragment {
        if name == &st.context_param {
            return ctx.unsupported(
                codes::CONTEXT_REFERENCE,
                format!(
                    "the interpolation context `{}` may only appear as a splice receiver",
                    name
                ),
            );
        }
        if st.interpolated.contains(name) {
            return Fragment::call(
                "Expr::ident",
                vec![Fragment::verbatim(format!("\"{}\"", name))],
            );
        }
        if st.enclosing.contains(name) {
            // A captured local in interpolated position embeds as a constant
            // fetched through the captured representation.
            return Fragment::call(
                "Expr::value",
                vec![Fragment::call(
                    "to_value",
                    vec![Fragment::call(
                        "captured_local",
                        vec![Fragment::verbatim(format!("\"{}\"", name))],
                    )],
                )],
            );
        }
        ctx.unsupported(
            codes::UNSUPPORTED_SYNTAX,
            format!("unbound identifier `{}` in interpolated code", name),
        )
    }

    fn visit_lambda(
        &self,
        lambda: &ExprLambda,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        let mut params = Vec::new();
        for param in &lambda.params {
            let fragment = ctx.builder.parameter(&param.name, &param.ty);
            params.push(Fragment::concat(vec![
                fragment,
                Fragment::verbatim(".clone()"),
            ]));
        }
        let saved_interpolated = st.interpolated.clone();
        let saved_enclosing = st.enclosing.clone();
        let saved_eval = st.eval_locals.clone();
        for param in &lambda.params {
            st.enclosing.remove(&param.name);
            st.eval_locals.remove(&param.name);
            st.interpolated.insert(param.name.clone());
        }
        let body = self.visit_child(&lambda.body, "lambda_body({})", st, ctx);
        st.interpolated = saved_interpolated;
        st.enclosing = saved_enclosing;
        st.eval_locals = saved_eval;
        Ok(Fragment::call(
            "Expr::lambda",
            vec![vec_of(params), body?],
        ))
    }

    fn visit_branch(
        &self,
        expr: &Expr,
        accessor: &str,
        target_ty: Option<&Ty>,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        let fragment = self.visit_child(expr, accessor, st, ctx)?;
        Ok(self.apply_conversion(fragment, expr.ty(), target_ty, st, ctx))
    }

    /// Realize an implicit conversion reported by the model as an explicit
    /// Convert/ConvertChecked reconstruction.
    fn apply_conversion(
        &self,
        fragment: Fragment,
        from: Option<&Ty>,
        to: Option<&Ty>,
        st: &InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Fragment {
        let (Some(from), Some(to)) = (from, to) else {
            return fragment;
        };
        let Some(conversion) = ctx.model.implicit_conversion(from, to) else {
            return fragment;
        };
        let effective = conversion
            .checked
            .unwrap_or_else(|| st.checked.unwrap_or_else(|| ctx.model.default_checked()));
        let kind = if effective {
            "ConvertKind::ConvertChecked"
        } else {
            "ConvertKind::Convert"
        };
        Fragment::call(
            "Expr::convert",
            vec![
                Fragment::verbatim(kind),
                fragment,
                Fragment::verbatim(ty_literal(&conversion.to)),
            ],
        )
    }

    fn visit_invoke(
        &self,
        expr: &Expr,
        invoke: &ExprInvoke,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        if let InvokeTarget::Method(method) = &invoke.target {
            if method.receiver.as_ident() == Some(&st.context_param) {
                return match SpliceKind::classify(&method.name, invoke.args.len()) {
                    Some(kind) => self.visit_splice(expr, invoke, kind, st, ctx),
                    None => Ok(ctx.unsupported(
                        codes::UNSUPPORTED_SYNTAX,
                        format!(
                            "`{}` is not a recognized splice operation",
                            method.name
                        ),
                    )),
                };
            }
        }

        let symbol = match ctx.model.resolve_invoke(invoke) {
            Ok(symbol) => symbol,
            Err(failure) => return Ok(ctx.report_resolve_failure(&failure)),
        };
        let method_ref = match ctx.builder.method_info(&symbol, &invoke.type_args) {
            Ok(fragment) => fragment,
            Err(failure) => return Ok(ctx.report_type_failure(&failure)),
        };
        let receiver = match &invoke.target {
            InvokeTarget::Method(method) => {
                let fragment =
                    self.visit_child(&method.receiver, "invoke_receiver({})", st, ctx)?;
                Fragment::concat(vec![
                    Fragment::verbatim("Some("),
                    fragment,
                    Fragment::verbatim(")"),
                ])
            }
            InvokeTarget::Path(_) => Fragment::verbatim("None"),
        };
        let mut args = Vec::new();
        for (i, arg) in invoke.args.iter().enumerate() {
            let is_lambda = arg.as_lambda().is_some();
            let mut fragment =
                self.visit_child(arg, format!("invoke_arg({{}}, {})", i), st, ctx)?;
            let param_ty = symbol.params.get(i);
            // A lambda argument is wrapped in a quote when the target
            // parameter wants a tree rather than a callable.
            if is_lambda && param_ty.map(is_quoted_lambda_ty).unwrap_or(false) {
                fragment = Fragment::call("Expr::quote", vec![fragment]);
            }
            fragment = self.apply_conversion(fragment, arg.ty(), param_ty, st, ctx);
            args.push(fragment);
        }
        Ok(Fragment::call(
            "invoke_resolved",
            vec![method_ref, receiver, vec_of(args)],
        ))
    }

    fn visit_splice(
        &self,
        expr: &Expr,
        invoke: &ExprInvoke,
        kind: SpliceKind,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        ctx.splices_found = true;
        tracing::trace!(?kind, "resolving splice call");
        let expected = expr.ty.clone().unwrap_or(Ty::unknown());
        match kind {
            SpliceKind::Splice => {
                let value = self.hoist_evaluated(&invoke.args[0], st, ctx)?;
                Ok(self.coerce_spliced(value, &expected, ctx).modified())
            }
            SpliceKind::Value => {
                let value = self.hoist_evaluated(&invoke.args[0], st, ctx)?;
                let Some(lit) = self.reference_ty(&expected, ctx) else {
                    return Ok(Fragment::unsupported());
                };
                Ok(
                    Fragment::call("constant_of", vec![value, Fragment::verbatim(lit)])
                        .modified(),
                )
            }
            SpliceKind::Quoted => {
                let value = self.hoist_evaluated(&invoke.args[0], st, ctx)?;
                Ok(Fragment::call("quote_spliced", vec![value]).modified())
            }
            SpliceKind::Body { arity } => {
                let lambda_arg = &invoke.args[arity];
                let value = self.hoist_evaluated(lambda_arg, st, ctx)?;
                let mut args = Vec::new();
                for (i, arg) in invoke.args[..arity].iter().enumerate() {
                    args.push(self.visit_child(
                        arg,
                        format!("invoke_arg({{}}, {})", i),
                        st,
                        ctx,
                    )?);
                }
                Ok(Fragment::call("splice_body", vec![value, vec_of(args)]).modified())
            }
        }
    }

    /// Run the evaluated-side walker over a splice argument and hoist the
    /// result to a once-evaluated definition.
    fn hoist_evaluated(
        &self,
        arg: &Expr,
        st: &mut InterpState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Fragment> {
        let initializer = if arg.as_lambda().is_some() {
            // An inline lambda literal in a tree-typed position is already
            // a tree; embed it as data rather than compiling a callable.
            embedded_expr(arg)
        } else {
            let scope = st.eval_scope();
            EvaluatedVisitor.visit(arg, &scope, ctx)?
        };
        if !initializer.is_supported() {
            return Ok(initializer);
        }
        let identifier = ctx.builder.fresh("v");
        st.bindings.hoist(ValueDefinition {
            identifier: identifier.clone(),
            initializer,
        });
        Ok(Fragment::verbatim(identifier))
    }

    /// Coerce a spliced subtree to its expected static type: a direct cast
    /// when the type is nameable, a witness cast otherwise.
    fn coerce_spliced(
        &self,
        value: Fragment,
        expected: &Ty,
        ctx: &mut AnalysisContext<'_>,
    ) -> Fragment {
        if expected.is_unknown() {
            return value;
        }
        match ctx.builder.type_name(expected) {
            Ok(name) => Fragment::call(format!("coerce_expr::<{}>", name), vec![value]),
            Err(crate::builder::TypeNameFailure::Anonymous) => {
                match ctx.builder.type_ref(expected) {
                    Ok(witness) => Fragment::call("coerce_expr_with", vec![value, witness]),
                    Err(failure) => ctx.report_type_failure(&failure),
                }
            }
            Err(failure) => ctx.report_type_failure(&failure),
        }
    }

    /// Validate that a type can be referenced from reconstruction code and
    /// produce its value-level spelling.
    fn reference_ty(&self, ty: &Ty, ctx: &mut AnalysisContext<'_>) -> Option<String> {
        if ty.contains_param() {
            ctx.unsupported(
                codes::UNBOUND_TYPE_PARAMETER,
                format!("type `{}` mentions a call-site-only type parameter", ty),
            );
            return None;
        }
        if let Some(path) = first_inaccessible(ty, ctx) {
            ctx.unsupported(
                codes::INACCESSIBLE_SYMBOL,
                format!("type `{}` is not accessible from generated code", path),
            );
            return None;
        }
        Some(ty_literal(ty))
    }
}

fn vec_of(items: Vec<Fragment>) -> Fragment {
    Fragment::concat(vec![
        Fragment::verbatim("vec!"),
        Fragment::initializer(items),
    ])
}

/// Whether a parameter type wants a quoted lambda (an expression of a
/// function) rather than a compiled callable.
fn is_quoted_lambda_ty(ty: &Ty) -> bool {
    match ty {
        Ty::Named(named) => {
            named.path.to_string() == "Expr"
                && named.args.len() == 1
                && matches!(named.args[0], Ty::Function(_))
        }
        _ => false,
    }
}

fn first_inaccessible(ty: &Ty, ctx: &AnalysisContext<'_>) -> Option<graft_core::ast::Path> {
    match ty {
        Ty::Named(named) => {
            if !ctx.model.type_accessibility(&named.path).is_visible() {
                return Some(named.path.clone());
            }
            named.args.iter().find_map(|a| first_inaccessible(a, ctx))
        }
        Ty::Array(array) => first_inaccessible(&array.elem, ctx),
        Ty::Nullable(nullable) => first_inaccessible(&nullable.inner, ctx),
        Ty::Tuple(tuple) => tuple.types.iter().find_map(|t| first_inaccessible(t, ctx)),
        Ty::Function(function) => function
            .params
            .iter()
            .chain(std::iter::once(function.ret.as_ref()))
            .find_map(|t| first_inaccessible(t, ctx)),
        Ty::Anonymous(anonymous) => anonymous
            .fields
            .iter()
            .find_map(|f| first_inaccessible(&f.ty, ctx)),
        _ => None,
    }
}
