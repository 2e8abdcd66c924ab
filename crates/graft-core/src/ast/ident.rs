//! Identifier types for the expression tree.
//!
//! `Ident` is a single name like `cat` or `Orders`; `Path` is a
//! `::`-separated chain of idents naming a type, module, or function.

use serde::{Deserialize, Serialize};

/// A simple identifier - a single name like `cat` or `Orders`
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Ident {
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<Ident> for String {
    fn from(ident: Ident) -> Self {
        ident.name
    }
}

impl From<&Ident> for String {
    fn from(ident: &Ident) -> Self {
        ident.name.clone()
    }
}

impl From<String> for Ident {
    fn from(name: String) -> Self {
        Self { name }
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Path {
    pub segments: Vec<Ident>,
}

impl Path {
    pub fn new(segments: Vec<Ident>) -> Self {
        Self { segments }
    }

    pub fn ident(ident: impl Into<Ident>) -> Self {
        Self {
            segments: vec![ident.into()],
        }
    }

    /// Parse a `::`-separated path string.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split("::").map(Ident::new).collect(),
        }
    }

    pub fn last(&self) -> Option<&Ident> {
        self.segments.last()
    }

    pub fn with_segment(&self, segment: impl Into<Ident>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn is_single(&self) -> bool {
        self.segments.len() == 1
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "::")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

impl From<Ident> for Path {
    fn from(ident: Ident) -> Self {
        Path::ident(ident)
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::parse(path)
    }
}
