//! The semantic-resolution seam.
//!
//! The interpolation engine never resolves names itself: it asks a
//! [`SemanticModel`] for method, member and conversion facts and treats the
//! answers as ground truth. [`TableSemanticModel`] is a registry-backed
//! implementation sufficient for the runtime pipeline and for tests; a
//! compiler host can plug in its own model at the same seam.

use crate::ast::{ExprInvoke, Ident, InvokeTarget, Path, Ty};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accessibility {
    Public,
    Internal,
    Private,
}

impl Accessibility {
    pub fn is_visible(&self) -> bool {
        matches!(self, Accessibility::Public | Accessibility::Internal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSymbol {
    pub name: Ident,
    pub declaring: Path,
    pub params: Vec<Ty>,
    pub type_params: Vec<Ident>,
    pub ret: Ty,
    pub is_static: bool,
    pub is_extension: bool,
    /// Marked as an interpolation entry point; only such methods are
    /// candidates for call-site analysis.
    pub is_entry_point: bool,
    /// For an extension method resolved through a receiver, the original
    /// unreduced definition.
    pub reduced_from: Option<Box<MethodSymbol>>,
    pub accessibility: Accessibility,
}

impl MethodSymbol {
    pub fn new(declaring: impl Into<Path>, name: impl Into<Ident>, params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            name: name.into(),
            declaring: declaring.into(),
            params,
            type_params: Vec::new(),
            ret,
            is_static: false,
            is_extension: false,
            is_entry_point: false,
            reduced_from: None,
            accessibility: Accessibility::Public,
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<Ident>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn extension_method(mut self) -> Self {
        self.is_extension = true;
        self
    }

    pub fn entry_point(mut self) -> Self {
        self.is_entry_point = true;
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn full_path(&self) -> Path {
        self.declaring.with_segment(self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberSymbol {
    pub name: Ident,
    pub declaring: Path,
    pub ty: Ty,
    pub is_static: bool,
    pub accessibility: Accessibility,
}

impl MemberSymbol {
    pub fn new(declaring: impl Into<Path>, name: impl Into<Ident>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            declaring: declaring.into(),
            ty,
            is_static: false,
            accessibility: Accessibility::Public,
        }
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }
}

/// An implicit conversion the model expects at a node. `checked: None`
/// inherits the checkedness of the enclosing context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conversion {
    pub to: Ty,
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    NotFound(String),
    Inaccessible(String),
}

impl ResolveFailure {
    pub fn message(&self) -> &str {
        match self {
            ResolveFailure::NotFound(m) => m,
            ResolveFailure::Inaccessible(m) => m,
        }
    }
}

/// The query operators a clause chain desugars into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperator {
    Cast,
    Where,
    Select,
    SelectMany,
    Join,
    GroupJoin,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    GroupBy,
}

impl QueryOperator {
    pub fn method_name(&self) -> &'static str {
        match self {
            QueryOperator::Cast => "cast_elements",
            QueryOperator::Where => "where_",
            QueryOperator::Select => "select",
            QueryOperator::SelectMany => "select_many",
            QueryOperator::Join => "join",
            QueryOperator::GroupJoin => "group_join",
            QueryOperator::OrderBy => "order_by",
            QueryOperator::OrderByDescending => "order_by_descending",
            QueryOperator::ThenBy => "then_by",
            QueryOperator::ThenByDescending => "then_by_descending",
            QueryOperator::GroupBy => "group_by",
        }
    }
}

pub trait SemanticModel {
    /// Resolve an invocation site to its target method.
    fn resolve_invoke(&self, invoke: &ExprInvoke) -> Result<MethodSymbol, ResolveFailure>;

    /// Resolve `target.member` against the receiver's static type.
    fn resolve_member(&self, target_ty: &Ty, name: &Ident) -> Result<MemberSymbol, ResolveFailure>;

    /// Resolve the operator method a query clause lowers to.
    fn resolve_query_operator(
        &self,
        operator: QueryOperator,
        source_ty: &Ty,
    ) -> Result<MethodSymbol, ResolveFailure>;

    /// The implicit conversion, if any, from one static type to another.
    fn implicit_conversion(&self, from: &Ty, to: &Ty) -> Option<Conversion>;

    fn type_accessibility(&self, _path: &Path) -> Accessibility {
        Accessibility::Public
    }

    /// The compilation-level default for checked arithmetic.
    fn default_checked(&self) -> bool {
        false
    }
}

/// Key a receiver type down to the registry namespace its methods live in.
fn receiver_key(ty: &Ty) -> String {
    match ty {
        Ty::Named(named) => named.path.to_string(),
        Ty::Array(_) => "[]".to_string(),
        Ty::Nullable(nullable) => receiver_key(&nullable.inner),
        other => other.to_string(),
    }
}

/// Registry-backed [`SemanticModel`].
#[derive(Default)]
pub struct TableSemanticModel {
    /// Static functions and associated items, keyed by full path text.
    functions: HashMap<String, MethodSymbol>,
    /// Instance and extension methods, keyed by (receiver key, name).
    methods: HashMap<(String, String), MethodSymbol>,
    /// Members keyed by (receiver key, name).
    members: HashMap<(String, String), MemberSymbol>,
    /// Implicit conversions keyed by nullability-erased (from, to).
    conversions: HashMap<(Ty, Ty), Conversion>,
    type_accessibility: HashMap<String, Accessibility>,
    default_checked: bool,
}

impl TableSemanticModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_checked(mut self, checked: bool) -> Self {
        self.default_checked = checked;
        self
    }

    pub fn register_function(&mut self, symbol: MethodSymbol) {
        let key = symbol.full_path().to_string();
        self.functions.insert(key, symbol);
    }

    pub fn register_method(&mut self, receiver: impl Into<String>, symbol: MethodSymbol) {
        self.methods
            .insert((receiver.into(), symbol.name.name.clone()), symbol);
    }

    pub fn register_member(&mut self, receiver: impl Into<String>, symbol: MemberSymbol) {
        self.members
            .insert((receiver.into(), symbol.name.name.clone()), symbol);
    }

    pub fn register_conversion(&mut self, from: Ty, to: Ty, checked: Option<bool>) {
        let key = (from.without_nullability(), to.without_nullability());
        self.conversions.insert(
            key,
            Conversion {
                to,
                checked,
            },
        );
    }

    pub fn register_type_accessibility(
        &mut self,
        path: impl Into<Path>,
        accessibility: Accessibility,
    ) {
        self.type_accessibility
            .insert(path.into().to_string(), accessibility);
    }
}

impl SemanticModel for TableSemanticModel {
    fn resolve_invoke(&self, invoke: &ExprInvoke) -> Result<MethodSymbol, ResolveFailure> {
        let symbol = match &invoke.target {
            InvokeTarget::Path(path) => self.functions.get(&path.to_string()).ok_or_else(|| {
                ResolveFailure::NotFound(format!("no function registered at `{}`", path))
            })?,
            InvokeTarget::Method(method) => {
                let receiver_ty = method.receiver.ty().ok_or_else(|| {
                    ResolveFailure::NotFound(format!(
                        "receiver of `{}` has no resolved type",
                        method.name
                    ))
                })?;
                let key = (receiver_key(receiver_ty), method.name.name.clone());
                self.methods.get(&key).ok_or_else(|| {
                    ResolveFailure::NotFound(format!(
                        "no method `{}` on `{}`",
                        method.name, receiver_ty
                    ))
                })?
            }
        };
        if !symbol.accessibility.is_visible() {
            return Err(ResolveFailure::Inaccessible(format!(
                "method `{}` is not accessible from generated code",
                symbol.full_path()
            )));
        }
        Ok(symbol.clone())
    }

    fn resolve_member(&self, target_ty: &Ty, name: &Ident) -> Result<MemberSymbol, ResolveFailure> {
        let key = (receiver_key(target_ty), name.name.clone());
        let symbol = self.members.get(&key).ok_or_else(|| {
            ResolveFailure::NotFound(format!("no member `{}` on `{}`", name, target_ty))
        })?;
        if !symbol.accessibility.is_visible() {
            return Err(ResolveFailure::Inaccessible(format!(
                "member `{}.{}` is not accessible from generated code",
                symbol.declaring, symbol.name
            )));
        }
        Ok(symbol.clone())
    }

    fn resolve_query_operator(
        &self,
        operator: QueryOperator,
        source_ty: &Ty,
    ) -> Result<MethodSymbol, ResolveFailure> {
        // Explicit registrations win; otherwise every enumerable source
        // carries the standard operator surface.
        let key = (receiver_key(source_ty), operator.method_name().to_string());
        if let Some(symbol) = self.methods.get(&key) {
            return Ok(symbol.clone());
        }
        let mut symbol = MethodSymbol::new(
            Path::parse("query"),
            operator.method_name(),
            Vec::new(),
            Ty::unknown(),
        )
        .extension_method();
        if matches!(operator, QueryOperator::Cast) {
            symbol = symbol.with_type_params(vec![Ident::new("T")]);
        }
        Ok(symbol)
    }

    fn implicit_conversion(&self, from: &Ty, to: &Ty) -> Option<Conversion> {
        if from == to {
            return None;
        }
        let key = (from.without_nullability(), to.without_nullability());
        self.conversions.get(&key).cloned()
    }

    fn type_accessibility(&self, path: &Path) -> Accessibility {
        self.type_accessibility
            .get(&path.to_string())
            .copied()
            .unwrap_or(Accessibility::Public)
    }

    fn default_checked(&self) -> bool {
        self.default_checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn instance_method_resolves_through_receiver_type() {
        let mut model = TableSemanticModel::new();
        model.register_method(
            "Cat",
            MethodSymbol::new("Cat", "speak", vec![], Ty::string()),
        );

        let invoke = ExprInvoke {
            target: InvokeTarget::Method(crate::ast::InvokeMethod {
                receiver: Box::new(Expr::ident("c").with_ty(Ty::named("Cat"))),
                name: Ident::new("speak"),
            }),
            type_args: vec![],
            args: vec![],
        };
        let symbol = model.resolve_invoke(&invoke).unwrap();
        assert_eq!(symbol.name.as_str(), "speak");
    }

    #[test]
    fn inaccessible_method_reports_inaccessible_not_missing() {
        let mut model = TableSemanticModel::new();
        model.register_method(
            "Cat",
            MethodSymbol::new("Cat", "secret", vec![], Ty::unit())
                .with_accessibility(Accessibility::Private),
        );
        let invoke = ExprInvoke {
            target: InvokeTarget::Method(crate::ast::InvokeMethod {
                receiver: Box::new(Expr::ident("c").with_ty(Ty::named("Cat"))),
                name: Ident::new("secret"),
            }),
            type_args: vec![],
            args: vec![],
        };
        match model.resolve_invoke(&invoke) {
            Err(ResolveFailure::Inaccessible(_)) => {}
            other => panic!("expected inaccessible, got {:?}", other),
        }
    }

    #[test]
    fn conversions_are_nullability_insensitive() {
        let mut model = TableSemanticModel::new();
        model.register_conversion(Ty::i32(), Ty::i64(), None);
        assert!(model
            .implicit_conversion(&Ty::nullable(Ty::i32()), &Ty::i64())
            .is_some());
        assert!(model.implicit_conversion(&Ty::i64(), &Ty::i32()).is_none());
    }
}
