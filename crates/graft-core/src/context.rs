//! Scoped evaluation contexts for the runtime evaluator.
//!
//! A context is a node in a parent-linked chain of scopes. Lookup walks
//! outward; insertion always lands in the current scope. Contexts are
//! shared (`Arc`) because lambda values resolve their free identifiers
//! against the scope current at application time.

use crate::ast::{Ident, Value};
use crate::collections::ConcurrentMap;
use std::ops::Deref;
use std::sync::{Arc, Weak};

pub struct ScopedContext {
    parent: Option<Weak<Self>>,
    storages: ConcurrentMap<Ident, Value>,
}

impl ScopedContext {
    pub fn new() -> Self {
        ScopedContext {
            parent: None,
            storages: ConcurrentMap::new(),
        }
    }

    pub fn insert_value(&self, key: impl Into<Ident>, value: Value) {
        self.storages.insert(key.into(), value);
    }

    pub fn get_value(&self, key: &Ident) -> Option<Value> {
        self.storages.get_cloned(key)
    }

    pub fn get_value_recursive(&self, key: &Ident) -> Option<Value> {
        if let Some(value) = self.get_value(key) {
            return Some(value);
        }
        let mut parent = self.parent.clone();
        while let Some(weak) = parent {
            let scope = weak.upgrade()?;
            if let Some(value) = scope.get_value(key) {
                return Some(value);
            }
            parent = scope.parent.clone();
        }
        None
    }

    pub fn has_value(&self, key: &Ident) -> bool {
        self.storages.contains_key(key)
    }

    pub fn has_value_recursive(&self, key: &Ident) -> bool {
        self.get_value_recursive(key).is_some()
    }
}

impl Default for ScopedContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a scope chain.
#[derive(Clone)]
pub struct SharedScopedContext {
    inner: Arc<ScopedContext>,
}

impl SharedScopedContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopedContext::new()),
        }
    }

    /// Open a child scope whose lookups fall back to this one.
    pub fn child(&self) -> SharedScopedContext {
        let scope = ScopedContext {
            parent: Some(Arc::downgrade(&self.inner)),
            storages: ConcurrentMap::new(),
        };
        SharedScopedContext {
            inner: Arc::new(scope),
        }
    }
}

impl Default for SharedScopedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SharedScopedContext {
    type Target = ScopedContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;

    #[test]
    fn recursive_lookup_walks_parents() {
        let root = SharedScopedContext::new();
        root.insert_value("outer", Value::int(1));
        let child = root.child();
        child.insert_value("inner", Value::int(2));

        assert_eq!(child.get_value_recursive(&"outer".into()), Some(Value::int(1)));
        assert_eq!(child.get_value_recursive(&"inner".into()), Some(Value::int(2)));
        assert_eq!(root.get_value_recursive(&"inner".into()), None);
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let root = SharedScopedContext::new();
        root.insert_value("x", Value::int(1));
        let child = root.child();
        child.insert_value("x", Value::int(2));
        assert_eq!(child.get_value_recursive(&"x".into()), Some(Value::int(2)));
    }
}
