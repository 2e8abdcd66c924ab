//! Behavior of the evaluated-side interpreter.

use graft_core::ast::{
    BinOpKind, Expr, ExprLambda, LambdaParam, QueryClause, QueryFrom, QueryOrderBy, QueryOrdering,
    QuerySelect, QueryWhere, Ty, Value,
};
use graft_core::context::SharedScopedContext;
use graft_core::sema::TableSemanticModel;
use graft_interpolate::runtime::Evaluator;
use pretty_assertions::assert_eq;

fn eval(expr: &Expr, env: &SharedScopedContext) -> graft_core::Result<Value> {
    let model = TableSemanticModel::new();
    Evaluator::new(&model).evaluate(expr, env)
}

#[test]
fn checked_addition_overflow_is_an_error_unchecked_wraps() {
    let env = SharedScopedContext::new();
    let sum = Expr::binary(BinOpKind::Add, Expr::int(i64::MAX), Expr::int(1));

    let checked = Expr::checked(true, sum.clone());
    assert!(eval(&checked, &env).is_err());

    let unchecked = Expr::checked(false, sum);
    assert_eq!(eval(&unchecked, &env).unwrap(), Value::int(i64::MIN));
}

#[test]
fn logical_operators_short_circuit() {
    let env = SharedScopedContext::new();
    // The right operand is unbound; short-circuiting must not evaluate it.
    let and = Expr::binary(BinOpKind::And, Expr::bool(false), Expr::ident("boom"));
    assert_eq!(eval(&and, &env).unwrap(), Value::bool(false));

    let or = Expr::binary(BinOpKind::Or, Expr::bool(true), Expr::ident("boom"));
    assert_eq!(eval(&or, &env).unwrap(), Value::bool(true));
}

#[test]
fn missing_identifier_reports_its_name() {
    let env = SharedScopedContext::new();
    let error = eval(&Expr::ident("nope"), &env).unwrap_err();
    assert!(error.to_string().contains("nope"));
}

#[test]
fn lambda_application_binds_parameters_in_a_child_scope() {
    let env = SharedScopedContext::new();
    let double = ExprLambda::new(
        vec![LambdaParam::new("v", Ty::i64())],
        Expr::binary(BinOpKind::Mul, Expr::ident("v"), Expr::int(2)),
    );
    env.insert_value("double", Value::lambda(double));

    let call = Expr::invoke_path("double", vec![], vec![Expr::int(21)]);
    assert_eq!(eval(&call, &env).unwrap(), Value::int(42));
}

#[test]
fn query_from_where_select_filters_and_projects() {
    let env = SharedScopedContext::new();
    env.insert_value(
        "data",
        Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]),
    );
    let query = Expr::query(vec![
        QueryClause::From(QueryFrom {
            var: "x".into(),
            cast_ty: None,
            source: Box::new(Expr::ident("data")),
        }),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::binary(BinOpKind::Gt, Expr::ident("x"), Expr::int(1))),
        }),
        QueryClause::Select(QuerySelect {
            projection: Box::new(Expr::binary(BinOpKind::Add, Expr::ident("x"), Expr::int(10))),
        }),
    ]);

    assert_eq!(
        eval(&query, &env).unwrap(),
        Value::list(vec![Value::int(12), Value::int(13)])
    );
}

#[test]
fn query_order_by_descending_sorts_rows() {
    let env = SharedScopedContext::new();
    env.insert_value(
        "data",
        Value::list(vec![Value::int(2), Value::int(3), Value::int(1)]),
    );
    let query = Expr::query(vec![
        QueryClause::From(QueryFrom {
            var: "x".into(),
            cast_ty: None,
            source: Box::new(Expr::ident("data")),
        }),
        QueryClause::OrderBy(QueryOrderBy {
            orderings: vec![QueryOrdering {
                key: Box::new(Expr::ident("x")),
                descending: true,
            }],
        }),
        QueryClause::Select(QuerySelect {
            projection: Box::new(Expr::ident("x")),
        }),
    ]);

    assert_eq!(
        eval(&query, &env).unwrap(),
        Value::list(vec![Value::int(3), Value::int(2), Value::int(1)])
    );
}

#[test]
fn reaching_a_splice_operation_fails_fast() {
    let env = SharedScopedContext::new();
    env.insert_value("ctx", Value::unit());
    let call = Expr::invoke_method(Expr::ident("ctx"), "splice_value", vec![Expr::int(1)]);
    let error = eval(&call, &env).unwrap_err();
    assert!(error.to_string().contains("interpolation step was skipped"));
}
