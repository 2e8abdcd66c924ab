//! The two walkers over the interpolated lambda body, plus the state they
//! share for one call-site analysis.

mod evaluated;
mod interpolated;

pub use evaluated::{EvalScope, EvaluatedVisitor};
pub use interpolated::{InterpState, InterpolatedVisitor};

use crate::builder::{FragmentBuilder, TypeNameFailure};
use crate::fragment::Fragment;
use graft_core::cancel::CancellationFlag;
use graft_core::diagnostics::{codes, Diagnostic, DiagnosticCollector};
use graft_core::sema::{ResolveFailure, SemanticModel};
use graft_core::span::Span;

/// Mutable state owned by exactly one call-site analysis. No cross-analysis
/// sharing and no locking: the driver hands each analysis its own context.
pub struct AnalysisContext<'m> {
    pub model: &'m dyn SemanticModel,
    pub builder: FragmentBuilder<'m>,
    pub diagnostics: DiagnosticCollector,
    pub cancel: CancellationFlag,
    pub site_span: Span,
    pub splices_found: bool,
}

impl<'m> AnalysisContext<'m> {
    pub fn new(model: &'m dyn SemanticModel, cancel: CancellationFlag, site_span: Span) -> Self {
        Self {
            model,
            builder: FragmentBuilder::new(model),
            diagnostics: DiagnosticCollector::new(),
            cancel,
            site_span,
            splices_found: false,
        }
    }

    pub fn with_escalated_advisories(mut self) -> Self {
        self.diagnostics = DiagnosticCollector::with_escalated_advisories();
        self
    }

    /// Record a failure and degrade to the sentinel so visitation continues.
    pub fn unsupported(&mut self, code: &str, message: impl Into<String>) -> Fragment {
        self.diagnostics
            .report(Diagnostic::error(message).with_code(code).with_span(self.site_span));
        Fragment::unsupported()
    }

    pub fn advise(&mut self, code: &str, message: impl Into<String>) {
        self.diagnostics
            .report(Diagnostic::warning(message).with_code(code).with_span(self.site_span));
    }

    pub fn report_resolve_failure(&mut self, failure: &ResolveFailure) -> Fragment {
        match failure {
            ResolveFailure::NotFound(message) => {
                self.unsupported(codes::UNSUPPORTED_SYNTAX, message.clone())
            }
            ResolveFailure::Inaccessible(message) => {
                self.unsupported(codes::INACCESSIBLE_SYMBOL, message.clone())
            }
        }
    }

    pub fn report_type_failure(&mut self, failure: &TypeNameFailure) -> Fragment {
        match failure {
            TypeNameFailure::Anonymous => self.unsupported(
                codes::UNSUPPORTED_TYPE,
                "anonymous type cannot be named in generated code",
            ),
            TypeNameFailure::Inaccessible(path) => self.unsupported(
                codes::INACCESSIBLE_SYMBOL,
                format!("type `{}` is not accessible from generated code", path),
            ),
            TypeNameFailure::UnboundParam(name) => self.unsupported(
                codes::UNBOUND_TYPE_PARAMETER,
                format!("type parameter `{}` is not visible here", name),
            ),
            TypeNameFailure::Unhandled(message) => {
                self.unsupported(codes::UNSUPPORTED_TYPE, message.clone())
            }
        }
    }
}
