//! Interpretation of evaluated subtrees.
//!
//! Splice arguments are ordinary code; here they actually execute, against
//! a scoped context holding the captured locals. The subset interpreted is
//! exactly what the evaluated-side walker admits. Reaching a splice
//! operation here means the interpolation step was skipped; that is a hard
//! error by contract, not a recoverable condition.

use crate::capability::SpliceKind;
use crate::error::interpolation_error;
use graft_core::ast::{
    BinOpKind, ConvertKind, Expr, ExprKind, ExprLambda, ExprQuery, Ident, InvokeTarget,
    QueryClause, Ty, UnOpKind, Value, ValueField,
};
use graft_core::cancel::CancellationFlag;
use graft_core::context::SharedScopedContext;
use graft_core::error::Result;
use graft_core::sema::SemanticModel;
use std::cmp::Ordering;

pub struct Evaluator<'m> {
    model: &'m dyn SemanticModel,
    cancel: CancellationFlag,
}

impl<'m> Evaluator<'m> {
    pub fn new(model: &'m dyn SemanticModel) -> Self {
        Self {
            model,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn evaluate(&self, expr: &Expr, env: &SharedScopedContext) -> Result<Value> {
        tracing::trace!("evaluating spliced subtree");
        self.eval(expr, env, self.model.default_checked())
    }

    fn eval(&self, expr: &Expr, env: &SharedScopedContext, checked: bool) -> Result<Value> {
        self.cancel.check()?;
        match &expr.kind {
            ExprKind::Value(value) => Ok(value.as_ref().clone()),
            ExprKind::Default(default) => Ok(default_value(&default.ty)),
            ExprKind::Ident(ident) => env.get_value_recursive(&ident.name).ok_or_else(|| {
                interpolation_error(format!("could not find `{}` in context", ident.name))
            }),
            ExprKind::Member(member) => {
                let target = self.eval(&member.target, env, checked)?;
                target.field(&member.member).cloned().ok_or_else(|| {
                    interpolation_error(format!("value has no member `{}`", member.member))
                })
            }
            ExprKind::Invoke(invoke) => self.eval_invoke(invoke, env, checked),
            ExprKind::BinOp(op) => self.eval_binop(op.op, &op.lhs, &op.rhs, env, checked),
            ExprKind::UnOp(op) => {
                let operand = self.eval(&op.operand, env, checked)?;
                match (op.op, operand) {
                    (UnOpKind::Not, Value::Bool(b)) => Ok(Value::bool(!b.value)),
                    (UnOpKind::Neg, Value::Int(i)) => Ok(Value::int(-i.value)),
                    (UnOpKind::Neg, Value::Decimal(d)) => Ok(Value::decimal(-d.value)),
                    (op, value) => Err(interpolation_error(format!(
                        "cannot apply `{}` to {}",
                        op, value
                    ))),
                }
            }
            ExprKind::Conditional(cond) => {
                let test = self.eval(&cond.cond, env, checked)?;
                match test.as_bool() {
                    Some(true) => self.eval(&cond.then, env, checked),
                    Some(false) => self.eval(&cond.otherwise, env, checked),
                    None => Err(interpolation_error(
                        "conditional test did not evaluate to a bool".to_string(),
                    )),
                }
            }
            ExprKind::Lambda(lambda) => Ok(Value::lambda(lambda.clone())),
            ExprKind::Quote(quote) => Ok(Value::expr((*quote.lambda).clone())),
            ExprKind::Convert(convert) => {
                let value = self.eval(&convert.expr, env, checked)?;
                self.eval_convert(convert.kind, value, &convert.ty, checked)
            }
            ExprKind::Checked(marker) => self.eval(&marker.expr, env, marker.checked),
            ExprKind::New(new) => {
                if !new.args.is_empty() {
                    return Err(interpolation_error(
                        "constructor arguments are not evaluable without a registered constructor"
                            .to_string(),
                    ));
                }
                let mut fields = Vec::new();
                for init in &new.initializers {
                    fields.push(ValueField {
                        name: init.name.clone(),
                        value: self.eval(&init.value, env, checked)?,
                    });
                }
                Ok(Value::Struct(graft_core::ast::ValueStruct {
                    ty: new.ty.clone(),
                    fields,
                }))
            }
            ExprKind::AnonymousNew(anon) => {
                let mut fields = Vec::new();
                for init in &anon.fields {
                    fields.push(ValueField {
                        name: init.name.clone(),
                        value: self.eval(&init.value, env, checked)?,
                    });
                }
                Ok(Value::Anonymous(graft_core::ast::ValueAnonymous { fields }))
            }
            ExprKind::Array(array) => {
                let mut items = Vec::new();
                for item in &array.items {
                    items.push(self.eval(item, env, checked)?);
                }
                Ok(Value::list(items))
            }
            ExprKind::Index(index) => {
                let target = self.eval(&index.target, env, checked)?;
                let idx = self.eval(&index.index, env, checked)?;
                let (Some(list), Some(i)) = (target.as_list(), idx.as_int()) else {
                    return Err(interpolation_error(
                        "indexing requires a list and an integer".to_string(),
                    ));
                };
                list.get(i as usize).cloned().ok_or_else(|| {
                    interpolation_error(format!("index {} out of bounds", i))
                })
            }
            ExprKind::Query(query) => self.eval_query(query, env, checked),
        }
    }

    fn eval_invoke(
        &self,
        invoke: &graft_core::ast::ExprInvoke,
        env: &SharedScopedContext,
        checked: bool,
    ) -> Result<Value> {
        match &invoke.target {
            InvokeTarget::Method(method) => {
                if SpliceKind::is_surface_name(&method.name) {
                    crate::interp_bail!(format!(
                        "`{}` reached the evaluator: the interpolation step was skipped",
                        method.name
                    ));
                }
                let receiver = self.eval(&method.receiver, env, checked)?;
                let mut args = Vec::new();
                for arg in &invoke.args {
                    args.push(self.eval(arg, env, checked)?);
                }
                self.eval_builtin_method(&receiver, &method.name, &args, env, checked)
            }
            InvokeTarget::Path(path) => {
                let callee = if path.is_single() {
                    env.get_value_recursive(&path.segments[0])
                } else {
                    None
                };
                let Some(Value::Lambda(lambda)) = callee else {
                    return Err(interpolation_error(format!(
                        "`{}` does not resolve to an evaluable function",
                        path
                    )));
                };
                let mut args = Vec::new();
                for arg in &invoke.args {
                    args.push(self.eval(arg, env, checked)?);
                }
                self.apply_lambda(&lambda.lambda, &args, env, checked)
            }
        }
    }

    fn eval_builtin_method(
        &self,
        receiver: &Value,
        name: &Ident,
        args: &[Value],
        env: &SharedScopedContext,
        checked: bool,
    ) -> Result<Value> {
        match (receiver, name.as_str()) {
            (Value::String(s), "len") => Ok(Value::int(s.value.chars().count() as i64)),
            (Value::String(s), "contains") => match args {
                [Value::String(needle)] => Ok(Value::bool(s.value.contains(&needle.value))),
                _ => Err(interpolation_error(
                    "String::contains expects one string argument".to_string(),
                )),
            },
            (Value::String(s), "starts_with") => match args {
                [Value::String(prefix)] => Ok(Value::bool(s.value.starts_with(&prefix.value))),
                _ => Err(interpolation_error(
                    "String::starts_with expects one string argument".to_string(),
                )),
            },
            (Value::List(l), "len") => Ok(Value::int(l.values.len() as i64)),
            (Value::List(l), "contains") => match args {
                [needle] => Ok(Value::bool(l.values.contains(needle))),
                _ => Err(interpolation_error(
                    "List::contains expects one argument".to_string(),
                )),
            },
            (Value::Lambda(lambda), "call") => {
                self.apply_lambda(&lambda.lambda, args, env, checked)
            }
            _ => Err(interpolation_error(format!(
                "no evaluable method `{}` on {}",
                name, receiver
            ))),
        }
    }

    fn apply_lambda(
        &self,
        lambda: &ExprLambda,
        args: &[Value],
        env: &SharedScopedContext,
        checked: bool,
    ) -> Result<Value> {
        crate::interp_ensure!(
            lambda.params.len() == args.len(),
            format!(
                "lambda expects {} arguments, got {}",
                lambda.params.len(),
                args.len()
            )
        );
        let scope = env.child();
        for (param, arg) in lambda.params.iter().zip(args) {
            scope.insert_value(param.name.clone(), arg.clone());
        }
        self.eval(&lambda.body, &scope, checked)
    }

    fn eval_binop(
        &self,
        op: BinOpKind,
        lhs: &Expr,
        rhs: &Expr,
        env: &SharedScopedContext,
        checked: bool,
    ) -> Result<Value> {
        // Logical operators keep short-circuit semantics.
        if op.is_logical() {
            let left = self.eval(lhs, env, checked)?;
            let Some(left) = left.as_bool() else {
                return Err(interpolation_error(format!(
                    "`{}` requires boolean operands",
                    op
                )));
            };
            return match (op, left) {
                (BinOpKind::And, false) => Ok(Value::bool(false)),
                (BinOpKind::Or, true) => Ok(Value::bool(true)),
                _ => {
                    let right = self.eval(rhs, env, checked)?;
                    right.as_bool().map(Value::bool).ok_or_else(|| {
                        interpolation_error(format!("`{}` requires boolean operands", op))
                    })
                }
            };
        }
        let left = self.eval(lhs, env, checked)?;
        let right = self.eval(rhs, env, checked)?;
        if op == BinOpKind::Eq {
            return Ok(Value::bool(left == right));
        }
        if op == BinOpKind::Ne {
            return Ok(Value::bool(left != right));
        }
        if op.is_comparison() {
            let ordering = compare_values(&left, &right).ok_or_else(|| {
                interpolation_error(format!("cannot compare {} and {}", left, right))
            })?;
            return Ok(Value::bool(match op {
                BinOpKind::Lt => ordering == Ordering::Less,
                BinOpKind::Le => ordering != Ordering::Greater,
                BinOpKind::Gt => ordering == Ordering::Greater,
                BinOpKind::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            }));
        }
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a.value, b.value, checked),
            (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
                let (a, b) = (as_decimal(&left)?, as_decimal(&right)?);
                decimal_arithmetic(op, a, b)
            }
            (Value::String(a), Value::String(b)) if op == BinOpKind::Add => {
                Ok(Value::string(format!("{}{}", a.value, b.value)))
            }
            _ => Err(interpolation_error(format!(
                "cannot apply `{}` to {} and {}",
                op, left, right
            ))),
        }
    }

    fn eval_convert(
        &self,
        kind: ConvertKind,
        value: Value,
        ty: &Ty,
        checked: bool,
    ) -> Result<Value> {
        match kind {
            ConvertKind::Is => Ok(Value::bool(matches_ty(&value, ty))),
            ConvertKind::As => {
                if matches_ty(&value, ty) {
                    Ok(value)
                } else {
                    Ok(Value::null())
                }
            }
            ConvertKind::Convert | ConvertKind::ConvertChecked => {
                let checked = checked || kind == ConvertKind::ConvertChecked;
                convert_value(value, ty, checked)
            }
        }
    }

    /// Direct interpretation of a query clause chain over list values. Each
    /// row carries the bindings of every range variable in scope.
    fn eval_query(
        &self,
        query: &ExprQuery,
        env: &SharedScopedContext,
        checked: bool,
    ) -> Result<Value> {
        let mut clauses = query.clauses.iter();
        let Some(QueryClause::From(first)) = clauses.next() else {
            return Err(interpolation_error(
                "query must start with a from clause".to_string(),
            ));
        };
        let source = self.eval(&first.source, env, checked)?;
        let mut rows: Vec<Vec<(Ident, Value)>> = source
            .as_list()
            .ok_or_else(|| {
                interpolation_error("query source did not evaluate to a list".to_string())
            })?
            .iter()
            .map(|item| vec![(first.var.clone(), item.clone())])
            .collect();
        if let Some(cast_ty) = &first.cast_ty {
            for row in &rows {
                if !matches_ty(&row[0].1, cast_ty) {
                    return Err(interpolation_error(format!(
                        "query cast failed: element is not `{}`",
                        cast_ty
                    )));
                }
            }
        }
        let mut result: Option<Vec<Value>> = None;

        for clause in clauses {
            match clause {
                QueryClause::From(from) => {
                    let mut next = Vec::new();
                    for row in &rows {
                        let scope = self.row_scope(env, row);
                        let source = self.eval(&from.source, &scope, checked)?;
                        let items = source.as_list().ok_or_else(|| {
                            interpolation_error(
                                "query source did not evaluate to a list".to_string(),
                            )
                        })?;
                        for item in items {
                            let mut extended = row.clone();
                            extended.push((from.var.clone(), item.clone()));
                            next.push(extended);
                        }
                    }
                    rows = next;
                }
                QueryClause::Where(w) => {
                    let mut kept = Vec::new();
                    for row in rows {
                        let scope = self.row_scope(env, &row);
                        match self.eval(&w.predicate, &scope, checked)?.as_bool() {
                            Some(true) => kept.push(row),
                            Some(false) => {}
                            None => {
                                return Err(interpolation_error(
                                    "where predicate did not evaluate to a bool".to_string(),
                                ))
                            }
                        }
                    }
                    rows = kept;
                }
                QueryClause::Let(l) => {
                    let mut next = Vec::new();
                    for row in rows {
                        let scope = self.row_scope(env, &row);
                        let value = self.eval(&l.value, &scope, checked)?;
                        let mut extended = row;
                        extended.push((l.var.clone(), value));
                        next.push(extended);
                    }
                    rows = next;
                }
                QueryClause::Join(join) => {
                    let inner = self.eval(&join.source, env, checked)?;
                    let inner = inner.as_list().ok_or_else(|| {
                        interpolation_error("join source did not evaluate to a list".to_string())
                    })?;
                    let mut next = Vec::new();
                    for row in rows {
                        let scope = self.row_scope(env, &row);
                        let outer_key = self.eval(&join.outer_key, &scope, checked)?;
                        let mut matches = Vec::new();
                        for item in inner {
                            let inner_scope = env.child();
                            inner_scope.insert_value(join.var.clone(), item.clone());
                            let inner_key = self.eval(&join.inner_key, &inner_scope, checked)?;
                            if inner_key == outer_key {
                                matches.push(item.clone());
                            }
                        }
                        match &join.group {
                            Some(group) => {
                                let mut extended = row.clone();
                                extended.push((group.clone(), Value::list(matches)));
                                next.push(extended);
                            }
                            None => {
                                for item in matches {
                                    let mut extended = row.clone();
                                    extended.push((join.var.clone(), item));
                                    next.push(extended);
                                }
                            }
                        }
                    }
                    rows = next;
                }
                QueryClause::OrderBy(order) => {
                    let mut keyed: Vec<(Vec<Value>, Vec<(Ident, Value)>)> = Vec::new();
                    for row in rows {
                        let scope = self.row_scope(env, &row);
                        let mut keys = Vec::new();
                        for ordering in &order.orderings {
                            keys.push(self.eval(&ordering.key, &scope, checked)?);
                        }
                        keyed.push((keys, row));
                    }
                    keyed.sort_by(|(a, _), (b, _)| {
                        for (i, ordering) in order.orderings.iter().enumerate() {
                            let cmp = compare_values(&a[i], &b[i]).unwrap_or(Ordering::Equal);
                            let cmp = if ordering.descending { cmp.reverse() } else { cmp };
                            if cmp != Ordering::Equal {
                                return cmp;
                            }
                        }
                        Ordering::Equal
                    });
                    rows = keyed.into_iter().map(|(_, row)| row).collect();
                }
                QueryClause::GroupBy(group) => {
                    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
                    for row in &rows {
                        let scope = self.row_scope(env, row);
                        let key = self.eval(&group.key, &scope, checked)?;
                        let element = self.eval(&group.element, &scope, checked)?;
                        match groups.iter_mut().find(|(k, _)| k == &key) {
                            Some((_, items)) => items.push(element),
                            None => groups.push((key, vec![element])),
                        }
                    }
                    result = Some(
                        groups
                            .into_iter()
                            .map(|(key, items)| {
                                Value::Anonymous(graft_core::ast::ValueAnonymous {
                                    fields: vec![
                                        ValueField {
                                            name: Ident::new("key"),
                                            value: key,
                                        },
                                        ValueField {
                                            name: Ident::new("items"),
                                            value: Value::list(items),
                                        },
                                    ],
                                })
                            })
                            .collect(),
                    );
                }
                QueryClause::Select(select) => {
                    let mut projected = Vec::new();
                    for row in &rows {
                        let scope = self.row_scope(env, row);
                        projected.push(self.eval(&select.projection, &scope, checked)?);
                    }
                    result = Some(projected);
                }
                QueryClause::Into(into) => {
                    let items = result.take().ok_or_else(|| {
                        interpolation_error(
                            "query continuation must follow a select or group clause".to_string(),
                        )
                    })?;
                    rows = items
                        .into_iter()
                        .map(|item| vec![(into.var.clone(), item)])
                        .collect();
                }
            }
        }

        match result {
            Some(items) => Ok(Value::list(items)),
            None => Err(interpolation_error(
                "query must end in a select or group clause".to_string(),
            )),
        }
    }

    fn row_scope(
        &self,
        env: &SharedScopedContext,
        row: &[(Ident, Value)],
    ) -> SharedScopedContext {
        let scope = env.child();
        for (name, value) in row {
            scope.insert_value(name.clone(), value.clone());
        }
        scope
    }
}

fn int_arithmetic(op: BinOpKind, a: i64, b: i64, checked: bool) -> Result<Value> {
    let overflow = || interpolation_error(format!("checked `{}` overflowed", op));
    let result = match op {
        BinOpKind::Add => {
            if checked {
                a.checked_add(b).ok_or_else(overflow)?
            } else {
                a.wrapping_add(b)
            }
        }
        BinOpKind::Sub => {
            if checked {
                a.checked_sub(b).ok_or_else(overflow)?
            } else {
                a.wrapping_sub(b)
            }
        }
        BinOpKind::Mul => {
            if checked {
                a.checked_mul(b).ok_or_else(overflow)?
            } else {
                a.wrapping_mul(b)
            }
        }
        BinOpKind::Div => a
            .checked_div(b)
            .ok_or_else(|| interpolation_error("division by zero".to_string()))?,
        BinOpKind::Rem => a
            .checked_rem(b)
            .ok_or_else(|| interpolation_error("division by zero".to_string()))?,
        _ => unreachable!("arithmetic operator expected"),
    };
    Ok(Value::int(result))
}

fn decimal_arithmetic(op: BinOpKind, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinOpKind::Add => a + b,
        BinOpKind::Sub => a - b,
        BinOpKind::Mul => a * b,
        BinOpKind::Div => a / b,
        BinOpKind::Rem => a % b,
        _ => unreachable!("arithmetic operator expected"),
    };
    Ok(Value::decimal(result))
}

fn as_decimal(value: &Value) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(i.value as f64),
        Value::Decimal(d) => Ok(d.value),
        other => Err(interpolation_error(format!(
            "{} is not numeric",
            other
        ))),
    }
}

pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.value.cmp(&y.value)),
        (Value::Decimal(x), Value::Decimal(y)) => Some(x.value.total_cmp(&y.value)),
        (Value::Int(x), Value::Decimal(y)) => Some((x.value as f64).total_cmp(&y.value)),
        (Value::Decimal(x), Value::Int(y)) => Some(x.value.total_cmp(&(y.value as f64))),
        (Value::String(x), Value::String(y)) => Some(x.value.cmp(&y.value)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.value.cmp(&y.value)),
        (Value::Char(x), Value::Char(y)) => Some(x.value.cmp(&y.value)),
        _ => None,
    }
}

fn default_value(ty: &Ty) -> Value {
    match ty {
        Ty::Primitive(p) => match p {
            graft_core::ast::TypePrimitive::Int(_) => Value::int(0),
            graft_core::ast::TypePrimitive::Decimal(_) => Value::decimal(0.0),
            graft_core::ast::TypePrimitive::Bool => Value::bool(false),
            graft_core::ast::TypePrimitive::Char => Value::char_value('\0'),
            graft_core::ast::TypePrimitive::String => Value::string(""),
        },
        Ty::Nullable(_) => Value::null(),
        Ty::Array(_) => Value::list(Vec::new()),
        Ty::Unit(_) => Value::unit(),
        _ => Value::null(),
    }
}

fn matches_ty(value: &Value, ty: &Ty) -> bool {
    if value.is_null() {
        return ty.is_nullable();
    }
    value.runtime_ty().without_nullability() == ty.without_nullability()
}

fn convert_value(value: Value, ty: &Ty, checked: bool) -> Result<Value> {
    use graft_core::ast::{TypeDecimal, TypeInt, TypePrimitive};
    match (value, ty) {
        (Value::Int(i), Ty::Primitive(TypePrimitive::Decimal(TypeDecimal::F64))) => {
            Ok(Value::decimal(i.value as f64))
        }
        (Value::Decimal(d), Ty::Primitive(TypePrimitive::Int(TypeInt::I64))) => {
            if checked && (d.value > i64::MAX as f64 || d.value < i64::MIN as f64) {
                return Err(interpolation_error(
                    "checked conversion overflowed".to_string(),
                ));
            }
            Ok(Value::int(d.value as i64))
        }
        (value, Ty::Nullable(inner)) => convert_value(value, &inner.inner, checked),
        (value, ty) if matches_ty(&value, ty) => Ok(value),
        (value, ty) => Err(interpolation_error(format!(
            "cannot convert {} to `{}`",
            value, ty
        ))),
    }
}
