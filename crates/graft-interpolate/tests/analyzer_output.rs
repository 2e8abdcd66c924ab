//! Source-pipeline behavior: call-shape validation, generated interceptor
//! assembly, memoized declarations, grouping.

use graft_core::ast::{
    BinOpKind, Expr, ExprInvoke, InvokeTarget, LambdaParam, Path, Ty,
};
use graft_core::diagnostics::codes;
use graft_core::sema::{MethodSymbol, TableSemanticModel};
use graft_core::span::Span;
use graft_interpolate::{AnalysisGroup, CallSite, InterpolationAnalyzer};

fn entry_model() -> TableSemanticModel {
    let mut model = TableSemanticModel::new();
    model.register_function(
        MethodSymbol::new(
            "ExprOn",
            "interpolate",
            vec![Ty::named("Expr")],
            Ty::named("Expr"),
        )
        .static_method()
        .entry_point(),
    );
    model
}

fn entry_invocation(args: Vec<Expr>) -> ExprInvoke {
    ExprInvoke {
        target: InvokeTarget::Path(Path::parse("ExprOn::interpolate")),
        type_args: vec![],
        args,
    }
}

fn site(invocation: ExprInvoke) -> CallSite {
    CallSite {
        file: "src/queries.rs".into(),
        assembly: "app".to_string(),
        span: Span::new(1, 100, 140),
        source_checksum: 42,
        invocation,
        enclosing_locals: vec!["some_str".into()],
        require_interception: false,
    }
}

fn ctx_param() -> LambdaParam {
    LambdaParam::new("ctx", Ty::named("graft::Splicer"))
}

#[test]
fn non_candidate_calls_are_ignored_silently() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let invocation = ExprInvoke {
        target: InvokeTarget::Path(Path::parse("Other::function")),
        type_args: vec![],
        args: vec![Expr::int(1)],
    };
    assert!(analyzer.analyze(&site(invocation)).unwrap().is_none());
}

#[test]
fn non_literal_lambda_halts_with_a_diagnostic() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let invocation = entry_invocation(vec![Expr::ident("prebuilt")]);
    let result = analyzer.analyze(&site(invocation)).unwrap().unwrap();
    assert!(!result.supported);
    assert!(result.method.is_none());
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(codes::NON_LITERAL_LAMBDA))
            .count(),
        1
    );
}

#[test]
fn no_splice_body_reuses_the_original_tree_wholesale() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::member(Expr::ident("cat"), "name"),
    );
    let result = analyzer
        .analyze(&site(entry_invocation(vec![lambda])))
        .unwrap()
        .unwrap();

    assert!(result.supported);
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(codes::NO_SPLICES))
            .count(),
        1
    );
    let rendered = result.method.expect("supported site generates code").render();
    // The body is unmodified, so the generated method reuses the original
    // subtree through its bindings instead of reconstructing it.
    assert!(rendered.contains("let __e1 = lambda_body(__e0);"));
    assert!(rendered.contains("let __e2 = member_target(__e1);"));
    assert!(rendered.contains("let __p0 = LambdaParam::new(\"cat\", Ty::named(\"Cat\"));"));
    assert!(rendered.contains("Expr::lambda(vec![__p0.clone()], __e1.clone())"));
    assert!(rendered.contains("#[intercepts(file = \"src/queries.rs\""));
}

#[test]
fn splice_value_site_hoists_the_evaluated_argument_once() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let body = Expr::binary(
        BinOpKind::Eq,
        Expr::member(Expr::ident("cat"), "name"),
        Expr::invoke_method(
            Expr::ident("ctx"),
            "splice_value",
            vec![Expr::ident("some_str")],
        )
        .with_ty(Ty::string()),
    );
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        body,
    );
    let result = analyzer
        .analyze(&site(entry_invocation(vec![lambda])))
        .unwrap()
        .unwrap();

    assert!(result.supported);
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(codes::CLOSURE_CAPTURE))
            .count(),
        1
    );
    let rendered = result.method.unwrap().render();
    assert!(rendered.contains("let __v0 = captured_local(\"some_str\");"));
    assert!(rendered.contains("constant_of(__v0, Ty::string())"));
    assert!(rendered.contains("BinOpKind::Eq"));
    // The untouched left operand is reused, not reconstructed.
    assert!(rendered.contains("let __e2 = bin_lhs(__e1);"));
    assert!(!rendered.contains("Expr::member(__e3.clone()"));
}

#[test]
fn context_reference_suppresses_codegen_for_the_site() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::member(Expr::ident("ctx"), "data"),
    );
    let result = analyzer
        .analyze(&site(entry_invocation(vec![lambda])))
        .unwrap()
        .unwrap();
    assert!(!result.supported);
    assert!(result.method.is_none());
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(codes::CONTEXT_REFERENCE))
            .count(),
        1
    );
}

#[test]
fn interception_requirement_escalates_the_no_op_advisory() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::member(Expr::ident("cat"), "name"),
    );
    let mut call_site = site(entry_invocation(vec![lambda]));
    call_site.require_interception = true;
    let result = analyzer.analyze(&call_site).unwrap().unwrap();
    assert!(!result.supported);
    assert!(result.method.is_none());
}

#[test]
fn generated_method_names_are_stable_and_input_sensitive() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::member(Expr::ident("cat"), "name"),
    );
    let call_site = site(entry_invocation(vec![lambda]));

    let first = analyzer.analyze(&call_site).unwrap().unwrap();
    let second = analyzer.analyze(&call_site).unwrap().unwrap();
    assert_eq!(first.method_name, second.method_name);
    assert!(first.method_name.starts_with("__graft_intercept_"));

    let mut moved = call_site.clone();
    moved.source_checksum = 43;
    let third = analyzer.analyze(&moved).unwrap().unwrap();
    assert_ne!(first.method_name, third.method_name);
}

#[test]
fn results_group_per_file_and_assembly() {
    let model = entry_model();
    let analyzer = InterpolationAnalyzer::new(&model);
    let lambda = Expr::lambda(
        vec![ctx_param(), LambdaParam::new("cat", Ty::named("Cat"))],
        Expr::member(Expr::ident("cat"), "name"),
    );

    let site_a = site(entry_invocation(vec![lambda.clone()]));
    let mut site_b = site(entry_invocation(vec![lambda.clone()]));
    site_b.span = Span::new(1, 200, 240);
    let mut site_c = site(entry_invocation(vec![lambda]));
    site_c.file = "src/other.rs".into();

    let results = analyzer
        .analyze_all(&[site_a, site_b, site_c])
        .unwrap();
    let groups = AnalysisGroup::group(results);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].supported_count(), 2);
    assert_eq!(groups[1].supported_count(), 1);

    let rendered = groups[0].render();
    assert!(rendered.contains(&groups[0].results[0].method_name));
    assert!(rendered.contains(&groups[0].results[1].method_name));
    assert!(groups[0].unit_name.starts_with("graft_generated_"));
}
