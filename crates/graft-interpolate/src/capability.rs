//! The splice capability surface.
//!
//! A call is a splice iff its receiver is the interpolation context
//! parameter and its member name and argument count match one of the shapes
//! below. A same-named member with a different shape is ordinary code, not
//! a splice.

use graft_core::ast::{Expr, ExprLambda, Ident, Path, Ty, Value};
use once_cell::sync::Lazy;

/// Maximum number of interpolated arguments `splice_body` accepts.
pub const MAX_SPLICE_BODY_ARGS: usize = 4;

static CONTEXT_PATH: Lazy<Path> = Lazy::new(|| Path::parse("graft::Splicer"));

/// Path of the interpolation-context capability type.
pub fn splice_context_path() -> &'static Path {
    &CONTEXT_PATH
}

/// Whether a lambda parameter type is the interpolation context (with any
/// data type argument).
pub fn is_context_ty(ty: &Ty) -> bool {
    match ty {
        Ty::Named(named) => &named.path == splice_context_path(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceKind {
    /// `splice(expr)`: the evaluated argument yields a subtree, coerced to
    /// the site's static type.
    Splice,
    /// `splice_body(args.., lambda)`: beta-reduce the evaluated lambda
    /// against the interpolated argument trees.
    Body { arity: usize },
    /// `splice_value(value)` / `splice_constant(value)`: embed the
    /// evaluated result as a constant of the expected static type.
    Value,
    /// `splice_quoted(expr)`: embed the evaluated lambda as a quote node.
    Quoted,
}

impl SpliceKind {
    /// Classify a member invocation on the context receiver. `None` means
    /// the member/shape is not part of the capability surface.
    pub fn classify(name: &Ident, arg_count: usize) -> Option<SpliceKind> {
        match name.as_str() {
            "splice" if arg_count == 1 => Some(SpliceKind::Splice),
            "splice_body" if (1..=MAX_SPLICE_BODY_ARGS + 1).contains(&arg_count) => {
                Some(SpliceKind::Body {
                    arity: arg_count - 1,
                })
            }
            "splice_value" | "splice_constant" if arg_count == 1 => Some(SpliceKind::Value),
            "splice_quoted" if arg_count == 1 => Some(SpliceKind::Quoted),
            _ => None,
        }
    }

    /// Whether the member name belongs to the capability surface at all,
    /// regardless of shape. Used to tell "wrong shape" apart from
    /// "ordinary member".
    pub fn is_surface_name(name: &Ident) -> bool {
        matches!(
            name.as_str(),
            "splice" | "splice_body" | "splice_value" | "splice_constant" | "splice_quoted"
        )
    }
}

/// The capability type itself. Its methods exist to be recognized in trees;
/// they are never meant to execute. Reaching one at runtime means the
/// interpolation step was skipped, and failing loudly is the contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct Splicer;

impl Splicer {
    pub fn splice(&self, _expr: Expr) -> Expr {
        panic!("Splicer::splice must be rewritten by interpolation before evaluation")
    }

    pub fn splice_body(&self, _args: Vec<Expr>, _lambda: ExprLambda) -> Expr {
        panic!("Splicer::splice_body must be rewritten by interpolation before evaluation")
    }

    pub fn splice_value(&self, _value: Value) -> Expr {
        panic!("Splicer::splice_value must be rewritten by interpolation before evaluation")
    }

    pub fn splice_quoted(&self, _lambda: ExprLambda) -> Expr {
        panic!("Splicer::splice_quoted must be rewritten by interpolation before evaluation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_only_recognized_shapes() {
        assert_eq!(
            SpliceKind::classify(&"splice".into(), 1),
            Some(SpliceKind::Splice)
        );
        assert_eq!(SpliceKind::classify(&"splice".into(), 2), None);
        assert_eq!(
            SpliceKind::classify(&"splice_body".into(), 3),
            Some(SpliceKind::Body { arity: 2 })
        );
        assert_eq!(SpliceKind::classify(&"splice_body".into(), 7), None);
        assert_eq!(
            SpliceKind::classify(&"splice_constant".into(), 1),
            Some(SpliceKind::Value)
        );
        assert_eq!(SpliceKind::classify(&"unrelated".into(), 1), None);
    }
}
