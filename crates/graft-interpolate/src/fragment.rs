//! The generated-code IR.
//!
//! A [`Fragment`] is an immutable piece of target code. Rendering a
//! fragment yields source text that either constructs an expression-tree
//! node or evaluates to a plain value, depending on which visitor produced
//! it. Two flags ride along the tree:
//!
//! - `supported`: false if the fragment or any descendant is the
//!   unsupported sentinel. Diagnostics carry the details; the sentinel only
//!   poisons the aggregate.
//! - `modified`: true if the fragment or any descendant was produced by a
//!   splice substitution. An unmodified child fragment tells the enclosing
//!   node it can reuse the original subtree instead of reconstruction code.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    supported: bool,
    modified: bool,
    kind: Arc<FragmentKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Literal target-code text.
    Verbatim(String),
    /// Juxtaposition of parts, rendered in order.
    Concat(Vec<Fragment>),
    Binary {
        op: String,
        lhs: Fragment,
        rhs: Fragment,
    },
    /// `callee(arg, ...)` where the callee is a fixed name.
    Call {
        callee: String,
        args: Vec<Fragment>,
    },
    /// `target(arg, ...)` where the target is itself computed.
    Invoke {
        target: Fragment,
        args: Vec<Fragment>,
    },
    Lambda {
        params: Vec<String>,
        body: Fragment,
    },
    Ternary {
        cond: Fragment,
        then: Fragment,
        otherwise: Fragment,
    },
    Switch {
        scrutinee: Fragment,
        arms: Vec<SwitchArm>,
    },
    /// `[a, b, ...]`
    Initializer(Vec<Fragment>),
    MethodDef {
        signature: String,
        body: Fragment,
    },
    /// The failure sentinel. Renders as an unreachable marker; its presence
    /// anywhere suppresses code generation for the call site.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwitchArm {
    pub pattern: Fragment,
    pub body: Fragment,
}

fn aggregate(children: &[&Fragment]) -> (bool, bool) {
    let supported = children.iter().all(|c| c.supported);
    let modified = children.iter().any(|c| c.modified);
    (supported, modified)
}

impl Fragment {
    fn from_kind(kind: FragmentKind, supported: bool, modified: bool) -> Self {
        Self {
            supported,
            modified,
            kind: Arc::new(kind),
        }
    }

    pub fn verbatim(text: impl Into<String>) -> Self {
        Self::from_kind(FragmentKind::Verbatim(text.into()), true, false)
    }

    pub fn unsupported() -> Self {
        Self::from_kind(FragmentKind::Unsupported, false, false)
    }

    pub fn concat(parts: Vec<Fragment>) -> Self {
        let (supported, modified) = aggregate(&parts.iter().collect::<Vec<_>>());
        Self::from_kind(FragmentKind::Concat(parts), supported, modified)
    }

    pub fn binary(op: impl Into<String>, lhs: Fragment, rhs: Fragment) -> Self {
        let (supported, modified) = aggregate(&[&lhs, &rhs]);
        Self::from_kind(
            FragmentKind::Binary {
                op: op.into(),
                lhs,
                rhs,
            },
            supported,
            modified,
        )
    }

    pub fn call(callee: impl Into<String>, args: Vec<Fragment>) -> Self {
        let (supported, modified) = aggregate(&args.iter().collect::<Vec<_>>());
        Self::from_kind(
            FragmentKind::Call {
                callee: callee.into(),
                args,
            },
            supported,
            modified,
        )
    }

    pub fn invoke(target: Fragment, args: Vec<Fragment>) -> Self {
        let mut children: Vec<&Fragment> = vec![&target];
        children.extend(args.iter());
        let (supported, modified) = aggregate(&children);
        Self::from_kind(FragmentKind::Invoke { target, args }, supported, modified)
    }

    pub fn lambda(params: Vec<String>, body: Fragment) -> Self {
        let (supported, modified) = (body.supported, body.modified);
        Self::from_kind(FragmentKind::Lambda { params, body }, supported, modified)
    }

    pub fn ternary(cond: Fragment, then: Fragment, otherwise: Fragment) -> Self {
        let (supported, modified) = aggregate(&[&cond, &then, &otherwise]);
        Self::from_kind(
            FragmentKind::Ternary {
                cond,
                then,
                otherwise,
            },
            supported,
            modified,
        )
    }

    pub fn switch(scrutinee: Fragment, arms: Vec<SwitchArm>) -> Self {
        let mut children: Vec<&Fragment> = vec![&scrutinee];
        for arm in &arms {
            children.push(&arm.pattern);
            children.push(&arm.body);
        }
        let (supported, modified) = aggregate(&children);
        Self::from_kind(
            FragmentKind::Switch { scrutinee, arms },
            supported,
            modified,
        )
    }

    pub fn initializer(items: Vec<Fragment>) -> Self {
        let (supported, modified) = aggregate(&items.iter().collect::<Vec<_>>());
        Self::from_kind(FragmentKind::Initializer(items), supported, modified)
    }

    pub fn method_def(signature: impl Into<String>, body: Fragment) -> Self {
        let (supported, modified) = (body.supported, body.modified);
        Self::from_kind(
            FragmentKind::MethodDef {
                signature: signature.into(),
                body,
            },
            supported,
            modified,
        )
    }

    /// The splice-touched variant of this fragment.
    pub fn modified(mut self) -> Self {
        self.modified = true;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn kind(&self) -> &FragmentKind {
        &self.kind
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, indent: usize) {
        match self.kind.as_ref() {
            FragmentKind::Verbatim(text) => out.push_str(text),
            FragmentKind::Concat(parts) => {
                for part in parts {
                    part.write(out, indent);
                }
            }
            FragmentKind::Binary { op, lhs, rhs } => {
                out.push('(');
                lhs.write(out, indent);
                out.push(' ');
                out.push_str(op);
                out.push(' ');
                rhs.write(out, indent);
                out.push(')');
            }
            FragmentKind::Call { callee, args } => {
                out.push_str(callee);
                out.push('(');
                write_list(out, args, indent);
                out.push(')');
            }
            FragmentKind::Invoke { target, args } => {
                target.write(out, indent);
                out.push('(');
                write_list(out, args, indent);
                out.push(')');
            }
            FragmentKind::Lambda { params, body } => {
                out.push('|');
                out.push_str(&params.join(", "));
                out.push_str("| ");
                body.write(out, indent);
            }
            FragmentKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                out.push_str("if ");
                cond.write(out, indent);
                out.push_str(" { ");
                then.write(out, indent);
                out.push_str(" } else { ");
                otherwise.write(out, indent);
                out.push_str(" }");
            }
            FragmentKind::Switch { scrutinee, arms } => {
                out.push_str("match ");
                scrutinee.write(out, indent);
                out.push_str(" {\n");
                for arm in arms {
                    push_indent(out, indent + 1);
                    arm.pattern.write(out, indent + 1);
                    out.push_str(" => ");
                    arm.body.write(out, indent + 1);
                    out.push_str(",\n");
                }
                push_indent(out, indent);
                out.push('}');
            }
            FragmentKind::Initializer(items) => {
                out.push('[');
                write_list(out, items, indent);
                out.push(']');
            }
            FragmentKind::MethodDef { signature, body } => {
                out.push_str(signature);
                out.push_str(" {\n");
                push_indent(out, indent + 1);
                body.write(out, indent + 1);
                out.push('\n');
                push_indent(out, indent);
                out.push('}');
            }
            FragmentKind::Unsupported => out.push_str("/* unsupported */"),
        }
    }
}

fn write_list(out: &mut String, items: &[Fragment], indent: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write(out, indent);
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_poisons_ancestors() {
        let frag = Fragment::call(
            "Expr::binary",
            vec![Fragment::verbatim("a"), Fragment::unsupported()],
        );
        assert!(!frag.is_supported());
        assert!(!frag.is_modified());
    }

    #[test]
    fn modified_propagates_upward() {
        let spliced = Fragment::verbatim("__v0").modified();
        let frag = Fragment::call("Expr::member", vec![spliced, Fragment::verbatim("\"name\"")]);
        assert!(frag.is_modified());
        assert!(frag.is_supported());
    }

    #[test]
    fn structural_equality_ignores_construction_site() {
        let a = Fragment::call("f", vec![Fragment::verbatim("x")]);
        let b = Fragment::call("f", vec![Fragment::verbatim("x")]);
        assert_eq!(a, b);
        let c = Fragment::call("f", vec![Fragment::verbatim("y")]);
        assert_ne!(a, c);
        // The modified mark is part of the structure.
        assert_ne!(a.clone(), a.modified());
    }

    #[test]
    fn render_nests_calls_and_lambdas() {
        let frag = Fragment::call(
            "Expr::lambda",
            vec![
                Fragment::initializer(vec![Fragment::verbatim("__p0.clone()")]),
                Fragment::call(
                    "Expr::member",
                    vec![Fragment::verbatim("__e1.clone()"), Fragment::verbatim("\"name\"")],
                ),
            ],
        );
        assert_eq!(
            frag.render(),
            "Expr::lambda([__p0.clone()], Expr::member(__e1.clone(), \"name\"))"
        );
    }
}
