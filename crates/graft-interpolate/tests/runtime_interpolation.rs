//! End-to-end properties of the runtime pipeline: analyze, evaluate,
//! splice.

use graft_core::ast::{
    BinOpKind, ConvertKind, Expr, ExprLambda, LambdaParam, QueryClause, QueryFrom, QuerySelect,
    QueryWhere, Ty, Value,
};
use graft_core::cancel::CancellationFlag;
use graft_core::diagnostics::codes;
use graft_core::error::Error;
use graft_core::sema::TableSemanticModel;
use graft_interpolate::Interpolation;
use pretty_assertions::assert_eq;

fn ctx_param() -> LambdaParam {
    LambdaParam::new("ctx", Ty::named("graft::Splicer"))
}

fn cat_param() -> LambdaParam {
    LambdaParam::new("cat", Ty::named("Cat"))
}

fn splice_call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::invoke_method(Expr::ident("ctx"), name, args)
}

#[test]
fn no_splices_returns_input_minus_context_with_one_advisory() {
    let body = Expr::binary(
        BinOpKind::Eq,
        Expr::member(Expr::ident("cat"), "name"),
        Expr::string("Whiskers"),
    );
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body.clone());

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::NO_SPLICES), 1);
    let result = outcome.expect_result();
    assert_eq!(result.params, vec![cat_param()]);
    assert_eq!(*result.body, body);
}

#[test]
fn splice_value_of_constant_literal_embeds_a_typed_constant() {
    let body = Expr::binary(
        BinOpKind::Eq,
        Expr::member(Expr::ident("cat"), "age"),
        splice_call("splice_value", vec![Expr::int(21)]).with_ty(Ty::i64()),
    );
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert!(outcome.diagnostics.is_empty());
    let result = outcome.expect_result();
    assert_eq!(
        *result.body,
        Expr::binary(
            BinOpKind::Eq,
            Expr::member(Expr::ident("cat"), "age"),
            Expr::int(21),
        )
    );
}

#[test]
fn splice_value_of_runtime_computed_string_executes_and_embeds() {
    // (ctx, cat) => cat.name == ctx.splice_value(some_runtime_string)
    let body = Expr::binary(
        BinOpKind::Eq,
        Expr::member(Expr::ident("cat"), "name"),
        splice_call("splice_value", vec![Expr::ident("some_runtime_string")])
            .with_ty(Ty::string()),
    );
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let interpolation = Interpolation::new(&model);
    interpolation
        .env()
        .insert_value("some_runtime_string", Value::string("Whis"));
    let outcome = interpolation.interpolate(&lambda).unwrap();

    // Capturing an enclosing local is allowed but flagged, exactly once.
    assert_eq!(outcome.count_code(codes::CLOSURE_CAPTURE), 1);
    let result = outcome.expect_result();
    assert_eq!(
        *result.body,
        Expr::binary(
            BinOpKind::Eq,
            Expr::member(Expr::ident("cat"), "name"),
            Expr::string("Whis"),
        )
    );
}

#[test]
fn splice_body_is_a_pure_beta_reduction() {
    // Splicing `e => e + 1` at an argument bound to `x.field` must equal
    // writing `x.field + 1` inline.
    let add_one = ExprLambda::new(
        vec![LambdaParam::new("e", Ty::i64())],
        Expr::binary(BinOpKind::Add, Expr::ident("e"), Expr::int(1)),
    );
    let body = splice_call(
        "splice_body",
        vec![
            Expr::member(Expr::ident("x"), "field"),
            Expr::ident("add_one"),
        ],
    );
    let lambda = ExprLambda::new(
        vec![ctx_param(), LambdaParam::new("x", Ty::named("Thing"))],
        body,
    );

    let model = TableSemanticModel::new();
    let interpolation = Interpolation::new(&model);
    interpolation
        .env()
        .insert_value("add_one", Value::lambda(add_one));
    let outcome = interpolation.interpolate(&lambda).unwrap();

    let result = outcome.expect_result();
    assert_eq!(
        *result.body,
        Expr::binary(
            BinOpKind::Add,
            Expr::member(Expr::ident("x"), "field"),
            Expr::int(1),
        )
    );
}

#[test]
fn splice_coerces_when_static_types_differ() {
    let body = splice_call("splice", vec![Expr::ident("sub")]).with_ty(Ty::string());
    let lambda = ExprLambda::new(vec![ctx_param()], body);

    let model = TableSemanticModel::new();
    let interpolation = Interpolation::new(&model);
    interpolation
        .env()
        .insert_value("sub", Value::expr(Expr::ident("n")));
    let outcome = interpolation.interpolate(&lambda).unwrap();

    let result = outcome.expect_result();
    assert_eq!(
        *result.body,
        Expr::convert(ConvertKind::Convert, Expr::ident("n"), Ty::string()),
    );
}

#[test]
fn splice_embeds_directly_when_static_types_agree() {
    let body = splice_call("splice", vec![Expr::ident("sub")]).with_ty(Ty::string());
    let lambda = ExprLambda::new(vec![ctx_param()], body);

    let model = TableSemanticModel::new();
    let interpolation = Interpolation::new(&model);
    interpolation
        .env()
        .insert_value("sub", Value::expr(Expr::ident("n").with_ty(Ty::string())));
    let outcome = interpolation.interpolate(&lambda).unwrap();

    let result = outcome.expect_result();
    assert_eq!(*result.body, Expr::ident("n").with_ty(Ty::string()));
}

#[test]
fn splice_quoted_wraps_the_evaluated_lambda_unmodified() {
    let predicate = Expr::lambda(
        vec![LambdaParam::new("c", Ty::named("Cat"))],
        Expr::member(Expr::ident("c"), "adopted"),
    );
    let body = splice_call("splice_quoted", vec![Expr::ident("pred")]);
    let lambda = ExprLambda::new(vec![ctx_param()], body);

    let model = TableSemanticModel::new();
    let interpolation = Interpolation::new(&model);
    interpolation
        .env()
        .insert_value("pred", Value::expr(predicate.clone()));
    let outcome = interpolation.interpolate(&lambda).unwrap();

    let result = outcome.expect_result();
    assert_eq!(*result.body, Expr::quote(predicate));
}

#[test]
fn context_reference_outside_splice_receiver_is_one_error() {
    let body = Expr::member(Expr::ident("ctx"), "data");
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::CONTEXT_REFERENCE), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn context_reference_inside_nested_lambda_is_detected() {
    let body = Expr::lambda(
        vec![LambdaParam::new("y", Ty::i64())],
        Expr::member(Expr::ident("ctx"), "data"),
    );
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::CONTEXT_REFERENCE), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn context_reference_inside_query_clause_is_detected() {
    let body = Expr::query(vec![
        QueryClause::From(QueryFrom {
            var: "x".into(),
            cast_ty: None,
            source: Box::new(Expr::ident("xs")),
        }),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::member(Expr::ident("ctx"), "data")),
        }),
        QueryClause::Select(QuerySelect {
            projection: Box::new(Expr::ident("x")),
        }),
    ]);
    let lambda = ExprLambda::new(vec![ctx_param(), LambdaParam::new("xs", Ty::unknown())], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::CONTEXT_REFERENCE), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn evaluated_code_may_not_reference_interpolated_bindings() {
    let body = splice_call("splice_value", vec![Expr::ident("cat")]);
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(
        outcome.count_code(codes::EVALUATED_INTERPOLATED_IDENTIFIER),
        1
    );
    assert!(outcome.result.is_none());
}

#[test]
fn unrecognized_splice_shape_is_unsupported() {
    let body = splice_call("splice", vec![Expr::int(1), Expr::int(2)]);
    let lambda = ExprLambda::new(vec![ctx_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::UNSUPPORTED_SYNTAX), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn too_many_interpolated_parameters_is_a_shape_error() {
    let params = vec![
        ctx_param(),
        LambdaParam::new("a", Ty::i64()),
        LambdaParam::new("b", Ty::i64()),
        LambdaParam::new("c", Ty::i64()),
        LambdaParam::new("d", Ty::i64()),
        LambdaParam::new("e", Ty::i64()),
    ];
    let lambda = ExprLambda::new(params, Expr::int(1));

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::INVOCATION_SHAPE), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn first_parameter_must_be_the_context() {
    let lambda = ExprLambda::new(vec![cat_param()], Expr::int(1));

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model).interpolate(&lambda).unwrap();

    assert_eq!(outcome.count_code(codes::INVOCATION_SHAPE), 1);
    assert!(outcome.result.is_none());
}

#[test]
fn data_binding_is_evaluable_without_a_closure_advisory() {
    let body = splice_call("splice_value", vec![Expr::ident("data")]).with_ty(Ty::i64());
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], body);

    let model = TableSemanticModel::new();
    let outcome = Interpolation::new(&model)
        .interpolate_with_data(Value::int(5), &lambda)
        .unwrap();

    assert!(outcome.diagnostics.is_empty());
    let result = outcome.expect_result();
    assert_eq!(*result.body, Expr::int(5));
}

#[test]
fn cancellation_propagates_as_an_error() {
    let lambda = ExprLambda::new(vec![ctx_param(), cat_param()], Expr::int(1));
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let model = TableSemanticModel::new();
    let result = Interpolation::new(&model)
        .with_cancellation(cancel)
        .interpolate(&lambda);

    assert!(matches!(result, Err(Error::Cancelled)));
}
