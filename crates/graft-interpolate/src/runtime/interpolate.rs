//! Runtime entry surface: analyze, evaluate, splice.

use crate::capability::is_context_ty;
use crate::runtime::analyze::AnalyzingVisitor;
use crate::runtime::evaluate::Evaluator;
use crate::runtime::splice::SplicingVisitor;
use graft_core::ast::{ExprLambda, Ident, Ty, Value};
use graft_core::cancel::CancellationFlag;
use graft_core::context::SharedScopedContext;
use graft_core::diagnostics::{codes, Diagnostic, DiagnosticCollector};
use graft_core::error::{Error, Result};
use graft_core::sema::SemanticModel;
use std::collections::HashSet;

/// One interpolation run's output: the rewritten lambda (with the context
/// parameter removed) when the input was fully supported, plus every
/// diagnostic collected along the way.
#[derive(Debug)]
pub struct InterpolationOutcome {
    pub result: Option<ExprLambda>,
    pub diagnostics: Vec<Diagnostic>,
}

impl InterpolationOutcome {
    pub fn expect_result(self) -> ExprLambda {
        match self.result {
            Some(lambda) => lambda,
            None => panic!("interpolation failed: {:?}", self.diagnostics),
        }
    }

    pub fn count_code(&self, code: &str) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(code))
            .count()
    }
}

pub struct Interpolation<'m> {
    model: &'m dyn SemanticModel,
    env: SharedScopedContext,
    cancel: CancellationFlag,
    escalate_advisories: bool,
}

impl<'m> Interpolation<'m> {
    pub fn new(model: &'m dyn SemanticModel) -> Self {
        Self {
            model,
            env: SharedScopedContext::new(),
            cancel: CancellationFlag::new(),
            escalate_advisories: false,
        }
    }

    pub fn with_env(mut self, env: SharedScopedContext) -> Self {
        self.env = env;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn require_interception(mut self) -> Self {
        self.escalate_advisories = true;
        self
    }

    /// The scope holding captured locals evaluated code may reference.
    pub fn env(&self) -> &SharedScopedContext {
        &self.env
    }

    pub fn interpolate(&self, lambda: &ExprLambda) -> Result<InterpolationOutcome> {
        self.run(lambda, None)
    }

    pub fn interpolate_with_data(
        &self,
        data: Value,
        lambda: &ExprLambda,
    ) -> Result<InterpolationOutcome> {
        self.run(lambda, Some(data))
    }

    fn run(&self, lambda: &ExprLambda, data: Option<Value>) -> Result<InterpolationOutcome> {
        tracing::debug!(arity = lambda.params.len().saturating_sub(1), "interpolating lambda");
        let mut diagnostics = if self.escalate_advisories {
            DiagnosticCollector::with_escalated_advisories()
        } else {
            DiagnosticCollector::new()
        };

        if !self.validate_shape(lambda, &mut diagnostics) {
            return Ok(outcome(None, diagnostics));
        }
        let context_param = lambda.params[0].name.clone();

        let env = self.env.child();
        let mut evaluable = HashSet::new();
        if let Some(data) = data {
            env.insert_value("data", data);
            evaluable.insert(Ident::new("data"));
        }

        let analyzer =
            AnalyzingVisitor::new(&context_param, evaluable, &env, self.cancel.clone());
        let analysis = analyzer.analyze(lambda, &mut diagnostics)?;

        if analysis.splice_count == 0 {
            diagnostics.report(
                Diagnostic::warning("no splice operations found; interpolation is a no-op")
                    .with_code(codes::NO_SPLICES),
            );
        }
        if diagnostics.has_errors() {
            return Ok(outcome(None, diagnostics));
        }

        // Evaluate every non-constant evaluated subtree, in visitation
        // order, against the captured-locals scope.
        let evaluator = Evaluator::new(self.model).with_cancellation(self.cancel.clone());
        let mut values = Vec::with_capacity(analysis.evaluations.len());
        for subtree in &analysis.evaluations {
            match evaluator.evaluate(subtree, &env) {
                Ok(value) => values.push(value),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => {
                    diagnostics.report(
                        Diagnostic::error(format!("evaluation failed: {}", error))
                            .with_code(codes::UNSUPPORTED_SYNTAX),
                    );
                    return Ok(outcome(None, diagnostics));
                }
            }
        }

        let mut splicer = SplicingVisitor::new(&context_param, values);
        let body = match splicer.splice(&lambda.body) {
            Ok(body) => body,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(error) => {
                diagnostics.report(
                    Diagnostic::error(format!("splicing failed: {}", error))
                        .with_code(codes::UNSUPPORTED_SYNTAX),
                );
                return Ok(outcome(None, diagnostics));
            }
        };

        let result = ExprLambda {
            params: lambda.params[1..].to_vec(),
            body: Box::new(body),
        };
        Ok(outcome(Some(result), diagnostics))
    }

    fn validate_shape(&self, lambda: &ExprLambda, diagnostics: &mut DiagnosticCollector) -> bool {
        if lambda.params.is_empty() {
            diagnostics.report(
                Diagnostic::error("interpolated lambda must take the interpolation context")
                    .with_code(codes::INVOCATION_SHAPE),
            );
            return false;
        }
        let context_ty = &lambda.params[0].ty;
        if !is_context_ty(context_ty) && !matches!(context_ty, Ty::Unknown(_)) {
            diagnostics.report(
                Diagnostic::error(
                    "the lambda's first parameter must be the interpolation context",
                )
                .with_code(codes::INVOCATION_SHAPE),
            );
            return false;
        }
        if lambda.params.len() > 5 {
            diagnostics.report(
                Diagnostic::error("at most four interpolated parameters are supported")
                    .with_code(codes::INVOCATION_SHAPE),
            );
            return false;
        }
        true
    }
}

fn outcome(result: Option<ExprLambda>, diagnostics: DiagnosticCollector) -> InterpolationOutcome {
    InterpolationOutcome {
        result,
        diagnostics: diagnostics.into_diagnostics(),
    }
}
