//! Structural behavior of the expression tree and type model.

use graft_core::ast::{
    BinOpKind, Expr, ExprLambda, LambdaParam, Ty, Value,
};
use pretty_assertions::assert_eq;

#[test]
fn structurally_identical_trees_are_equal() {
    let build = || {
        Expr::binary(
            BinOpKind::Eq,
            Expr::member(Expr::ident("cat"), "name"),
            Expr::string("Whiskers"),
        )
    };
    assert_eq!(build(), build());
    assert_ne!(
        build(),
        Expr::binary(
            BinOpKind::Eq,
            Expr::member(Expr::ident("cat"), "name"),
            Expr::string("Tom"),
        )
    );
}

#[test]
fn nullability_erasure_is_recursive() {
    let ty = Ty::nullable(Ty::generic(
        "Vec",
        vec![Ty::nullable(Ty::i64()), Ty::string()],
    ));
    assert_eq!(
        ty.without_nullability(),
        Ty::generic("Vec", vec![Ty::i64(), Ty::string()])
    );
}

#[test]
fn anonymous_types_are_never_nameable() {
    let anon = Ty::anonymous(vec![("name".into(), Ty::string())]);
    assert!(!anon.is_nameable());
    assert!(!Ty::generic("Vec", vec![anon]).is_nameable());
    assert!(Ty::generic("Vec", vec![Ty::named("Cat")]).is_nameable());
}

#[test]
fn type_parameter_detection_sees_through_wrappers() {
    let ty = Ty::array(Ty::generic("Map", vec![Ty::string(), Ty::param("T")]));
    assert!(ty.contains_param());
    assert!(!Ty::array(Ty::string()).contains_param());
}

#[test]
fn expression_trees_round_trip_through_serde() {
    let lambda = ExprLambda::new(
        vec![LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::binary(
            BinOpKind::And,
            Expr::member(Expr::ident("cat"), "adopted"),
            Expr::binary(
                BinOpKind::Gt,
                Expr::member(Expr::ident("cat"), "age"),
                Expr::int(2),
            ),
        ),
    );
    let expr = Expr::lambda(lambda.params.clone(), (*lambda.body).clone());
    let json = serde_json::to_string(&expr).unwrap();
    let back: Expr = serde_json::from_str(&json).unwrap();
    assert_eq!(back, expr);
}

#[test]
fn decimal_values_use_total_order_semantics() {
    assert_eq!(Value::decimal(f64::NAN), Value::decimal(f64::NAN));
    assert_ne!(Value::decimal(0.0), Value::decimal(-0.0));
    assert_eq!(Value::decimal(1.5), Value::decimal(1.5));
}

#[test]
fn lambda_fn_ty_reflects_parameter_and_body_types() {
    let lambda = ExprLambda::new(
        vec![LambdaParam::new("x", Ty::i64())],
        Expr::int(1),
    );
    assert_eq!(lambda.fn_ty(), Ty::function(vec![Ty::i64()], Ty::i64()));
}
