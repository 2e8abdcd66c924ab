//! Query-expression lowering: clause-to-operator mapping, transparent
//! identifiers, and trailing-projection fusion.

use graft_core::ast::{
    BinOpKind, Expr, ExprKind, ExprQuery, FieldInit, InvokeTarget, LambdaParam, QueryClause,
    QueryFrom, QueryGroupBy, QueryInto, QueryJoin, QueryOrderBy, QueryOrdering, QueryLet,
    QuerySelect, QueryWhere, Ty,
};
use graft_core::sema::TableSemanticModel;
use graft_interpolate::desugar::QueryDesugarer;
use pretty_assertions::assert_eq;

fn from_clause(var: &str, source: Expr) -> QueryClause {
    QueryClause::From(QueryFrom {
        var: var.into(),
        cast_ty: None,
        source: Box::new(source),
    })
}

fn select_clause(projection: Expr) -> QueryClause {
    QueryClause::Select(QuerySelect {
        projection: Box::new(projection),
    })
}

fn desugar(clauses: Vec<QueryClause>) -> Expr {
    let model = TableSemanticModel::new();
    let mut desugarer = QueryDesugarer::new(&model);
    desugarer.desugar(&ExprQuery::new(clauses)).unwrap()
}

/// Number of operator calls in a desugared receiver chain.
fn count_operator_calls(expr: &Expr) -> usize {
    match &expr.kind {
        ExprKind::Invoke(invoke) => match &invoke.target {
            InvokeTarget::Method(method) => 1 + count_operator_calls(&method.receiver),
            InvokeTarget::Path(_) => 1,
        },
        _ => 0,
    }
}

fn operator_names(expr: &Expr) -> Vec<String> {
    match &expr.kind {
        ExprKind::Invoke(invoke) => match &invoke.target {
            InvokeTarget::Method(method) => {
                let mut names = operator_names(&method.receiver);
                names.push(method.name.name.clone());
                names
            }
            InvokeTarget::Path(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[test]
fn trailing_trivial_select_contributes_no_call() {
    let clauses = vec![
        from_clause("c", Expr::ident("cats")),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::member(Expr::ident("c"), "adopted")),
        }),
        QueryClause::OrderBy(QueryOrderBy {
            orderings: vec![QueryOrdering {
                key: Box::new(Expr::member(Expr::ident("c"), "name")),
                descending: false,
            }],
        }),
        select_clause(Expr::ident("c")),
    ];
    let chain = desugar(clauses);
    assert_eq!(operator_names(&chain), vec!["where_", "order_by"]);
    assert_eq!(count_operator_calls(&chain), 2);
}

#[test]
fn non_trivial_trailing_select_emits_its_own_call() {
    let clauses = vec![
        from_clause("c", Expr::ident("cats")),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::member(Expr::ident("c"), "adopted")),
        }),
        QueryClause::OrderBy(QueryOrderBy {
            orderings: vec![QueryOrdering {
                key: Box::new(Expr::member(Expr::ident("c"), "name")),
                descending: false,
            }],
        }),
        select_clause(Expr::member(Expr::ident("c"), "name")),
    ];
    let chain = desugar(clauses);
    assert_eq!(
        operator_names(&chain),
        vec!["where_", "order_by", "select"]
    );
}

#[test]
fn let_clause_projects_a_transparent_identifier_and_rebinds() {
    let clauses = vec![
        from_clause("a", Expr::ident("xs")),
        QueryClause::Let(QueryLet {
            var: "b".into(),
            value: Box::new(Expr::binary(BinOpKind::Add, Expr::ident("a"), Expr::int(1))),
        }),
        select_clause(Expr::binary(BinOpKind::Add, Expr::ident("a"), Expr::ident("b"))),
    ];
    let chain = desugar(clauses);

    let expected = Expr::invoke_method(
        Expr::invoke_method(
            Expr::ident("xs"),
            "select",
            vec![Expr::lambda(
                vec![LambdaParam::new("a", Ty::unknown())],
                Expr::anonymous_new(vec![
                    FieldInit::new("a", Expr::ident("a")),
                    FieldInit::new(
                        "b",
                        Expr::binary(BinOpKind::Add, Expr::ident("a"), Expr::int(1)),
                    ),
                ]),
            )],
        ),
        "select",
        vec![Expr::lambda(
            vec![LambdaParam::new("__q0", Ty::unknown())],
            Expr::binary(
                BinOpKind::Add,
                Expr::member(Expr::ident("__q0"), "a"),
                Expr::member(Expr::ident("__q0"), "b"),
            ),
        )],
    );
    assert_eq!(chain, expected);
}

#[test]
fn second_from_with_trailing_select_fuses_into_select_many() {
    let clauses = vec![
        from_clause("a", Expr::ident("xs")),
        from_clause("b", Expr::ident("ys")),
        select_clause(Expr::binary(BinOpKind::Add, Expr::ident("a"), Expr::ident("b"))),
    ];
    let chain = desugar(clauses);

    let expected = Expr::invoke_method(
        Expr::ident("xs"),
        "select_many",
        vec![
            Expr::lambda(vec![LambdaParam::new("a", Ty::unknown())], Expr::ident("ys")),
            Expr::lambda(
                vec![
                    LambdaParam::new("a", Ty::unknown()),
                    LambdaParam::new("b", Ty::unknown()),
                ],
                Expr::binary(BinOpKind::Add, Expr::ident("a"), Expr::ident("b")),
            ),
        ],
    );
    assert_eq!(chain, expected);
}

#[test]
fn typed_from_always_emits_an_explicit_element_cast() {
    let clauses = vec![
        QueryClause::From(QueryFrom {
            var: "c".into(),
            cast_ty: Some(Ty::named("Cat")),
            source: Box::new(Expr::ident("pets")),
        }),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::member(Expr::ident("c"), "adopted")),
        }),
        select_clause(Expr::ident("c")),
    ];
    let chain = desugar(clauses);
    assert_eq!(operator_names(&chain), vec!["cast_elements", "where_"]);

    // The cast's type argument is explicit even though the source never
    // wrote one; it cannot be inferred from the rewritten call shape.
    let ExprKind::Invoke(where_call) = &chain.kind else {
        panic!("expected an operator chain");
    };
    let InvokeTarget::Method(where_target) = &where_call.target else {
        panic!("expected a method chain");
    };
    let ExprKind::Invoke(cast_call) = &where_target.receiver.kind else {
        panic!("expected the cast call under the filter");
    };
    assert_eq!(cast_call.type_args, vec![Ty::named("Cat")]);
}

#[test]
fn join_with_trailing_select_fuses_into_the_join_call() {
    let clauses = vec![
        from_clause("c", Expr::ident("cats")),
        QueryClause::Join(QueryJoin {
            var: "o".into(),
            source: Box::new(Expr::ident("owners")),
            outer_key: Box::new(Expr::member(Expr::ident("c"), "owner_id")),
            inner_key: Box::new(Expr::member(Expr::ident("o"), "id")),
            group: None,
        }),
        select_clause(Expr::anonymous_new(vec![
            FieldInit::new("cat", Expr::ident("c")),
            FieldInit::new("owner", Expr::ident("o")),
        ])),
    ];
    let chain = desugar(clauses);
    assert_eq!(operator_names(&chain), vec!["join"]);

    // The result selector is fused in: source, outer key, inner key, result.
    let ExprKind::Invoke(join) = &chain.kind else {
        panic!("expected the join call");
    };
    assert_eq!(join.args.len(), 4);
    let result_selector = join.args[3].as_lambda().expect("fused result selector");
    assert_eq!(result_selector.params.len(), 2);
}

#[test]
fn group_into_continuation_restarts_the_range_scope() {
    let clauses = vec![
        from_clause("c", Expr::ident("cats")),
        QueryClause::GroupBy(QueryGroupBy {
            element: Box::new(Expr::ident("c")),
            key: Box::new(Expr::member(Expr::ident("c"), "color")),
        }),
        QueryClause::Into(QueryInto { var: "g".into() }),
        select_clause(Expr::ident("g")),
    ];
    let chain = desugar(clauses);
    // The trailing select over the continuation variable is trivial, so the
    // grouping call is the whole chain.
    assert_eq!(operator_names(&chain), vec!["group_by"]);
}

#[test]
fn query_must_end_in_select_or_group() {
    let model = TableSemanticModel::new();
    let mut desugarer = QueryDesugarer::new(&model);
    let query = ExprQuery::new(vec![
        from_clause("a", Expr::ident("xs")),
        QueryClause::Where(QueryWhere {
            predicate: Box::new(Expr::bool(true)),
        }),
    ]);
    assert!(desugarer.desugar(&query).is_err());
}
