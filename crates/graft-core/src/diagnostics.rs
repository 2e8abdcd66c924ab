use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable diagnostic codes emitted by the interpolation engine.
///
/// The code identifies a scenario, not a message: messages may be reworded,
/// codes never change meaning.
pub mod codes {
    /// A syntactic form with no reconstruction or evaluation rule.
    pub const UNSUPPORTED_SYNTAX: &str = "GRAFT001";
    /// A type that cannot be named, referenced, or witnessed.
    pub const UNSUPPORTED_TYPE: &str = "GRAFT002";
    /// The interpolation context parameter referenced outside a splice receiver.
    pub const CONTEXT_REFERENCE: &str = "GRAFT003";
    /// Evaluated code referencing an identifier bound only by interpolated scope.
    pub const EVALUATED_INTERPOLATED_IDENTIFIER: &str = "GRAFT004";
    /// A resolved symbol the generated code would not be allowed to use.
    pub const INACCESSIBLE_SYMBOL: &str = "GRAFT005";
    /// Entry-point call whose argument shape is not recognized.
    pub const INVOCATION_SHAPE: &str = "GRAFT006";
    /// The interpolated expression argument was not an inline lambda literal.
    pub const NON_LITERAL_LAMBDA: &str = "GRAFT007";
    /// Reference to a call-site-only type parameter with no substitution.
    pub const UNBOUND_TYPE_PARAMETER: &str = "GRAFT008";
    /// Advisory: no splice call occurred anywhere in the body.
    pub const NO_SPLICES: &str = "GRAFT009";
    /// Advisory: evaluated code closes over an enclosing-scope variable.
    pub const CLOSURE_CAPTURE: &str = "GRAFT010";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub span: Option<Span>,
    pub code: Option<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            span: None,
            code: None,
            suggestions: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            span: None,
            code: None,
            suggestions: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message: message.into(),
            span: None,
            code: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        if !self.suggestions.is_empty() {
            write!(f, " (hints: {})", self.suggestions.join("; "))?;
        }
        Ok(())
    }
}

/// Collects diagnostics for exactly one analysis.
///
/// Each call-site analysis constructs its own collector; reports append in
/// visitation order, so output order is deterministic for identical input.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    /// When set, advisory diagnostics (Info/Warning) are escalated to errors.
    escalate_advisories: bool,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escalated_advisories() -> Self {
        Self {
            diagnostics: Vec::new(),
            escalate_advisories: true,
        }
    }

    pub fn report(&mut self, mut diagnostic: Diagnostic) {
        if self.escalate_advisories && diagnostic.level != DiagnosticLevel::Error {
            diagnostic.level = DiagnosticLevel::Error;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn count_code(&self, code: &str) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(code))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_promotes_advisories_only_in_escalating_collector() {
        let mut plain = DiagnosticCollector::new();
        plain.report(Diagnostic::warning("w").with_code(codes::NO_SPLICES));
        assert!(!plain.has_errors());

        let mut strict = DiagnosticCollector::with_escalated_advisories();
        strict.report(Diagnostic::warning("w").with_code(codes::NO_SPLICES));
        assert!(strict.has_errors());
    }

    #[test]
    fn report_order_is_preserved() {
        let mut collector = DiagnosticCollector::new();
        collector.report(Diagnostic::error("first"));
        collector.report(Diagnostic::warning("second"));
        let messages: Vec<_> = collector
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }
}
