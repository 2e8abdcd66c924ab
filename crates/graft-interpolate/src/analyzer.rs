//! Call-site analysis orchestration for the source pipeline.
//!
//! For each candidate call site: validate the call shape, build the
//! per-site context, run the interpolated-side walker, and assemble the
//! generated interceptor method. No failure escapes as an error except
//! cooperative cancellation; everything else degrades to diagnostics plus
//! an unsupported aggregate.

use crate::capability::is_context_ty;
use crate::result::AnalysisResult;
use crate::visit::{AnalysisContext, InterpState, InterpolatedVisitor};
use graft_core::ast::{ExprInvoke, Ident, Ty};
use graft_core::cancel::CancellationFlag;
use graft_core::diagnostics::codes;
use graft_core::error::Result;
use graft_core::sema::SemanticModel;
use graft_core::span::{stable_hash, Span};
use std::path::PathBuf;

use crate::fragment::Fragment;

/// Everything the analyzer needs to know about one candidate call site.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub file: PathBuf,
    /// Originating assembly; output units are grouped per (file, assembly).
    pub assembly: String,
    pub span: Span,
    /// Checksum of the call site's source text; part of the stable
    /// generated-method identity.
    pub source_checksum: u64,
    /// The entry-point invocation: `(lambda)` or `(data, lambda)`.
    pub invocation: ExprInvoke,
    /// Locals of the enclosing method visible at the call site.
    pub enclosing_locals: Vec<Ident>,
    /// Escalates advisory diagnostics to errors for this site.
    pub require_interception: bool,
}

pub struct InterpolationAnalyzer<'m> {
    model: &'m dyn SemanticModel,
    cancel: CancellationFlag,
}

impl<'m> InterpolationAnalyzer<'m> {
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

    /// Analyze every site, skipping non-candidates. Diagnostics never stop
    /// the batch; cancellation aborts it.
    pub fn analyze_all(&self, sites: &[CallSite]) -> Result<Vec<AnalysisResult>> {
        let mut results = Vec::new();
        for site in sites {
            if let Some(result) = self.analyze(site)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// `Ok(None)` means the call is not an interpolation entry point at all
    /// and the pipeline ignores it.
    pub fn analyze(&self, site: &CallSite) -> Result<Option<AnalysisResult>> {
        let Ok(entry) = self.model.resolve_invoke(&site.invocation) else {
            return Ok(None);
        };
        if !entry.is_entry_point {
            return Ok(None);
        }
        tracing::debug!(file = %site.file.display(), "analyzing interpolation call site");

        let mut ctx = AnalysisContext::new(self.model, self.cancel.clone(), site.span);
        if site.require_interception {
            ctx = ctx.with_escalated_advisories();
        }
        let method_name = method_name_for(site);

        let halt = |ctx: AnalysisContext<'_>| {
            Ok(Some(AnalysisResult::failed(
                site,
                method_name.clone(),
                ctx.diagnostics.into_diagnostics(),
            )))
        };

        // Shape: (expression) or (data, expression).
        if site.invocation.args.is_empty() || site.invocation.args.len() > 2 {
            ctx.unsupported(
                codes::INVOCATION_SHAPE,
                "entry point expects (expression) or (data, expression)",
            );
            return halt(ctx);
        }
        let has_data = site.invocation.args.len() == 2;
        let lambda_arg = site.invocation.args.last().expect("argument checked above");
        let Some(lambda) = lambda_arg.as_lambda() else {
            ctx.unsupported(
                codes::NON_LITERAL_LAMBDA,
                "the interpolated expression must be an inline lambda literal",
            );
            return halt(ctx);
        };
        if lambda.params.is_empty() || !is_context_ty(&lambda.params[0].ty) {
            ctx.unsupported(
                codes::INVOCATION_SHAPE,
                "the lambda's first parameter must be the interpolation context",
            );
            return halt(ctx);
        }
        if lambda.params.len() > 5 {
            ctx.unsupported(
                codes::INVOCATION_SHAPE,
                "at most four interpolated parameters are supported",
            );
            return halt(ctx);
        }

        let mut st = InterpState::new(lambda.params[0].name.clone(), lambda);
        st.enclosing = site.enclosing_locals.iter().cloned().collect();
        if has_data {
            st.eval_locals.insert(Ident::new("data"));
        }

        let visitor = InterpolatedVisitor;
        let body = visitor.visit_child(&lambda.body, "lambda_body({})", &mut st, &mut ctx)?;

        if !ctx.splices_found {
            ctx.advise(
                codes::NO_SPLICES,
                "no splice operations found; interpolation is a no-op",
            );
        }

        // Result-lambda parameters: the original list minus the context.
        let mut result_params = Vec::new();
        for param in &lambda.params[1..] {
            let fragment = ctx.builder.parameter(&param.name, &param.ty);
            result_params.push(Fragment::concat(vec![
                fragment,
                Fragment::verbatim(".clone()"),
            ]));
        }

        let data_statement = if has_data {
            let data_ty = entry.params.first().cloned().unwrap_or(Ty::unknown());
            match ctx.builder.type_name(&data_ty) {
                Ok(name) => Some(format!("let data = coerce_value::<{}>(__data);", name)),
                Err(failure) => {
                    ctx.report_type_failure(&failure);
                    None
                }
            }
        } else {
            None
        };

        let supported = body.is_supported() && !ctx.diagnostics.has_errors();
        if !supported {
            return Ok(Some(AnalysisResult::failed(
                site,
                method_name,
                ctx.diagnostics.into_diagnostics(),
            )));
        }

        // Assemble the interceptor: memoized declarations, reused-node
        // bindings, once-evaluated splice arguments, the data coercion, and
        // the final typed-lambda construction.
        let mut statements: Vec<String> = Vec::new();
        for definition in ctx.builder.definitions() {
            statements.push(definition.render());
        }
        for declaration in st.bindings.declarations() {
            statements.push(declaration.render());
        }
        for hoisted in st.bindings.hoisted() {
            statements.push(hoisted.render());
        }
        if let Some(data_statement) = data_statement {
            statements.push(data_statement);
        }

        let result_lambda = Fragment::call(
            "Expr::lambda",
            vec![
                Fragment::concat(vec![
                    Fragment::verbatim("vec!"),
                    Fragment::initializer(result_params),
                ]),
                body,
            ],
        );

        let mut body_text = String::new();
        for statement in &statements {
            body_text.push_str(statement);
            body_text.push_str("\n    ");
        }
        let body_fragment = Fragment::concat(vec![
            Fragment::verbatim(body_text),
            result_lambda,
        ]);

        let data_param = if has_data { "__data: Value, " } else { "" };
        let signature = format!(
            "#[intercepts(file = \"{}\", lo = {}, hi = {})]\npub fn {}({}__e0: &Expr) -> Expr",
            site.file.display(),
            site.span.lo,
            site.span.hi,
            method_name,
            data_param,
        );
        let method = Fragment::method_def(signature, body_fragment);

        Ok(Some(AnalysisResult {
            file: site.file.clone(),
            assembly: site.assembly.clone(),
            span: site.span,
            method_name,
            supported: true,
            diagnostics: ctx.diagnostics.into_diagnostics(),
            method: Some(method),
            factories: ctx.builder.factories().to_vec(),
        }))
    }
}

/// Stable, deterministic per-call-site identity: hash of source checksum,
/// position and file path. Identical input produces an identical name
/// across recompilations.
fn method_name_for(site: &CallSite) -> String {
    let digest = stable_hash(&(
        site.source_checksum,
        site.span.lo,
        site.span.hi,
        site.file.to_string_lossy().to_string(),
    ));
    format!("__graft_intercept_{:016x}", digest)
}
