//! Expression bindings: the scope stack mirroring the nesting of the
//! source expression during interpolated-side visitation.
//!
//! Each binding names "the original node at this position" (`__e3`) so that
//! generated code can reuse the original subtree whenever no splice
//! occurred beneath it. Binding and unbinding are strictly nested: only the
//! topmost binding may be finalized.

use crate::builder::ValueDefinition;
use crate::fragment::Fragment;
use graft_core::ast::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingId(usize);

#[derive(Debug)]
struct BindingRecord {
    name: String,
    /// Target-code accessor reaching this node from its parent binding.
    accessor: String,
    parent: Option<usize>,
    ty: Ty,
    used: bool,
}

#[derive(Debug)]
pub struct BindingStack {
    records: Vec<BindingRecord>,
    /// Indices into `records`, innermost last.
    active: Vec<usize>,
    /// Captured-value definitions hoisted out of splice sites, in first-use
    /// order. Declared ahead of the reconstruction expression.
    hoisted: Vec<ValueDefinition>,
    next: usize,
}

impl BindingStack {
    /// Opens the root binding over the original expression, reachable in
    /// generated code under `root_accessor`.
    pub fn new(root_accessor: impl Into<String>, ty: Ty) -> Self {
        let root = BindingRecord {
            name: "__e0".to_string(),
            accessor: root_accessor.into(),
            parent: None,
            ty,
            used: false,
        };
        Self {
            records: vec![root],
            active: vec![0],
            hoisted: Vec::new(),
            next: 1,
        }
    }

    pub fn current(&self) -> BindingId {
        BindingId(*self.active.last().expect("binding stack must not be empty"))
    }

    pub fn current_name(&self) -> &str {
        &self.records[self.current().0].name
    }

    /// Bind the child position reached by `accessor` from the current
    /// binding.
    pub fn bind(&mut self, accessor: impl Into<String>, ty: Ty) -> BindingId {
        let parent = self.current().0;
        let index = self.records.len();
        let name = format!("__e{}", self.next);
        self.next += 1;
        self.records.push(BindingRecord {
            name,
            accessor: accessor.into(),
            parent: Some(parent),
            ty,
            used: false,
        });
        self.active.push(index);
        BindingId(index)
    }

    /// Finalize the binding with the child's reconstruction fragment.
    ///
    /// The decision point for subtree reuse lives here: an unmodified
    /// fragment means no splice occurred anywhere beneath this node, so the
    /// generated code reuses the original node reference instead of the
    /// reconstruction.
    pub fn with_value(&mut self, id: BindingId, fragment: Fragment) -> Fragment {
        let top = self
            .active
            .pop()
            .expect("finalized a binding on an empty stack");
        assert!(
            top == id.0,
            "finalized binding {:?} but {:?} is topmost; bindings must nest",
            id.0,
            top
        );
        if fragment.is_modified() || !fragment.is_supported() {
            return fragment;
        }
        self.mark_used(id.0);
        Fragment::verbatim(format!("{}.clone()", self.records[id.0].name))
    }

    fn mark_used(&mut self, index: usize) {
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            if self.records[i].used {
                break;
            }
            self.records[i].used = true;
            cursor = self.records[i].parent;
        }
    }

    pub fn hoist(&mut self, definition: ValueDefinition) {
        self.hoisted.push(definition);
    }

    pub fn hoisted(&self) -> &[ValueDefinition] {
        &self.hoisted
    }

    pub fn expected_ty(&self, id: BindingId) -> &Ty {
        &self.records[id.0].ty
    }

    /// `let` declarations for every binding whose original node the
    /// generated code actually references, in creation (outer-first) order.
    /// The root binding is a parameter of the generated method and needs no
    /// declaration.
    pub fn declarations(&self) -> Vec<ValueDefinition> {
        self.records
            .iter()
            .filter(|record| record.used && record.parent.is_some())
            .map(|record| {
                let parent_name = record
                    .parent
                    .map(|p| self.records[p].name.as_str())
                    .unwrap_or_default();
                ValueDefinition {
                    identifier: record.name.clone(),
                    initializer: Fragment::verbatim(
                        record.accessor.replace("{}", parent_name),
                    ),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodified_child_reuses_original_node() {
        let mut stack = BindingStack::new("__expr", Ty::unknown());
        let child = stack.bind("bin_lhs({})", Ty::i64());
        let frag = Fragment::call("Expr::int", vec![Fragment::verbatim("1")]);
        let result = stack.with_value(child, frag);
        assert!(!result.is_modified());
        assert_eq!(result.render(), "__e1.clone()");
        let decls = stack.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].identifier, "__e1");
        assert_eq!(decls[0].initializer.render(), "bin_lhs(__e0)");
    }

    #[test]
    fn modified_child_keeps_reconstruction() {
        let mut stack = BindingStack::new("__expr", Ty::unknown());
        let child = stack.bind("bin_rhs({})", Ty::i64());
        let frag = Fragment::verbatim("__v0").modified();
        let result = stack.with_value(child, frag.clone());
        assert_eq!(result, frag);
        // Nothing referenced the original node, so no declaration appears.
        assert!(stack.declarations().is_empty());
    }

    #[test]
    #[should_panic(expected = "must nest")]
    fn finalizing_a_non_topmost_binding_panics() {
        let mut stack = BindingStack::new("__expr", Ty::unknown());
        let outer = stack.bind("bin_lhs({})", Ty::unknown());
        let _inner = stack.bind("bin_lhs({})", Ty::unknown());
        stack.with_value(outer, Fragment::verbatim("x"));
    }
}
