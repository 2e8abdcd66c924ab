//! Memoized factory for generated-code references to types, methods and
//! parameters.
//!
//! Everything expensive or impossible to reconstruct inline is built at
//! most once per analysis and declared exactly once in the output. Memo
//! keys follow documented comparer semantics:
//!
//! - method keys compare parameter types after nullability erasure;
//! - parameter keys compare `(name, type)` with the type nullability-erased;
//! - witness-factory keys use the unbound generic definition's path.

use crate::fragment::Fragment;
use graft_core::ast::{Ident, Path, Ty, Value};
use graft_core::sema::{MethodSymbol, SemanticModel};
use std::collections::HashMap;

/// A `(generated identifier, initializer)` pair declared once at the top of
/// the generated method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDefinition {
    pub identifier: String,
    pub initializer: Fragment,
}

impl ValueDefinition {
    pub fn render(&self) -> String {
        format!("let {} = {};", self.identifier, self.initializer.render())
    }
}

/// Why a type could not be named in generated source. The caller picks the
/// fallback (witness indirection) or the diagnostic from the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNameFailure {
    /// Anonymous types have no source-level name anywhere.
    Anonymous,
    /// The type is resolved but not visible from generated code.
    Inaccessible(Path),
    /// Reference to a type parameter with no substitution in force.
    UnboundParam(Ident),
    /// A kind this engine has no naming rule for.
    Unhandled(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    declaring: Path,
    name: String,
    params: Vec<Ty>,
    type_args: Vec<Ty>,
}

impl MethodKey {
    fn new(symbol: &MethodSymbol, type_args: &[Ty]) -> Self {
        Self {
            declaring: symbol.declaring.clone(),
            name: symbol.name.name.clone(),
            params: symbol.params.iter().map(Ty::without_nullability).collect(),
            type_args: type_args.iter().map(Ty::without_nullability).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ParameterKey {
    name: String,
    ty: Ty,
}

pub struct FragmentBuilder<'m> {
    model: &'m dyn SemanticModel,
    next_id: u32,
    /// Declaration-site type parameters currently substitutable, mapped to
    /// the target-code text that names them.
    type_params: HashMap<Ident, String>,
    definitions: Vec<ValueDefinition>,
    method_index: HashMap<MethodKey, usize>,
    parameter_index: HashMap<ParameterKey, usize>,
    witness_index: HashMap<Ty, usize>,
    /// Auxiliary generic witness-factory methods, one per unbound generic
    /// definition.
    factories: Vec<Fragment>,
    factory_index: HashMap<Path, String>,
}

impl<'m> FragmentBuilder<'m> {
    pub fn new(model: &'m dyn SemanticModel) -> Self {
        Self {
            model,
            next_id: 0,
            type_params: HashMap::new(),
            definitions: Vec::new(),
            method_index: HashMap::new(),
            parameter_index: HashMap::new(),
            witness_index: HashMap::new(),
            factories: Vec::new(),
            factory_index: HashMap::new(),
        }
    }

    /// Fresh identifier in the analysis-wide namespace. Prefixes only aid
    /// readability; uniqueness comes from the shared counter.
    pub fn fresh(&mut self, prefix: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("__{}{}", prefix, id)
    }

    pub fn substitute_type_param(&mut self, param: Ident, text: String) {
        self.type_params.insert(param, text);
    }

    /// Source-level name text for a type, or the reason it has none.
    pub fn type_name(&self, ty: &Ty) -> Result<String, TypeNameFailure> {
        match ty {
            Ty::Primitive(p) => Ok(p.to_string()),
            Ty::Unit(_) => Ok("()".to_string()),
            Ty::Named(named) => {
                if !self.model.type_accessibility(&named.path).is_visible() {
                    return Err(TypeNameFailure::Inaccessible(named.path.clone()));
                }
                let mut text = named.path.to_string();
                if !named.args.is_empty() {
                    let args: Result<Vec<_>, _> =
                        named.args.iter().map(|a| self.type_name(a)).collect();
                    text = format!("{}<{}>", text, args?.join(", "));
                }
                Ok(text)
            }
            Ty::Array(array) => Ok(format!("Vec<{}>", self.type_name(&array.elem)?)),
            Ty::Nullable(nullable) => Ok(format!("Option<{}>", self.type_name(&nullable.inner)?)),
            Ty::Tuple(tuple) => {
                let parts: Result<Vec<_>, _> =
                    tuple.types.iter().map(|t| self.type_name(t)).collect();
                Ok(format!("({})", parts?.join(", ")))
            }
            Ty::Function(function) => {
                let params: Result<Vec<_>, _> =
                    function.params.iter().map(|t| self.type_name(t)).collect();
                Ok(format!(
                    "fn({}) -> {}",
                    params?.join(", "),
                    self.type_name(&function.ret)?
                ))
            }
            Ty::Param(param) => self
                .type_params
                .get(&param.name)
                .cloned()
                .ok_or_else(|| TypeNameFailure::UnboundParam(param.name.clone())),
            Ty::Anonymous(_) => Err(TypeNameFailure::Anonymous),
            Ty::Unknown(_) => Err(TypeNameFailure::Unhandled("unknown type".to_string())),
        }
    }

    /// A memoized type-witness value for a type that (usually) cannot be
    /// named. For a plain anonymous type the witness wraps a freshly
    /// constructed default instance; for a generic type containing an
    /// anonymous argument, a per-definition factory method assembles the
    /// witness from its arguments' witnesses.
    pub fn type_ref(&mut self, ty: &Ty) -> Result<Fragment, TypeNameFailure> {
        let key = ty.without_nullability();
        if let Some(&index) = self.witness_index.get(&key) {
            return Ok(Fragment::verbatim(
                self.definitions[index].identifier.clone(),
            ));
        }
        let initializer = self.witness_initializer(ty)?;
        let identifier = self.fresh("w");
        let index = self.definitions.len();
        self.definitions.push(ValueDefinition {
            identifier: identifier.clone(),
            initializer,
        });
        self.witness_index.insert(key, index);
        Ok(Fragment::verbatim(identifier))
    }

    fn witness_initializer(&mut self, ty: &Ty) -> Result<Fragment, TypeNameFailure> {
        if let Ok(name) = self.type_name(ty) {
            return Ok(Fragment::verbatim(format!(
                "TypeWitness::<{}>::new()",
                name
            )));
        }
        match ty {
            Ty::Anonymous(_) => Ok(Fragment::call(
                "witness_of",
                vec![self.default_instance(ty)?],
            )),
            Ty::Named(named) => {
                let factory = self.witness_factory(&named.path, named.args.len());
                let args: Result<Vec<_>, _> = named
                    .args
                    .iter()
                    .map(|arg| self.argument_witness(arg))
                    .collect();
                Ok(Fragment::call(factory, args?))
            }
            Ty::Array(array) => {
                let factory = self.witness_factory(&Path::parse("Vec"), 1);
                Ok(Fragment::call(
                    factory,
                    vec![self.argument_witness(&array.elem)?],
                ))
            }
            Ty::Nullable(nullable) => {
                let factory = self.witness_factory(&Path::parse("Option"), 1);
                Ok(Fragment::call(
                    factory,
                    vec![self.argument_witness(&nullable.inner)?],
                ))
            }
            Ty::Param(param) => Err(TypeNameFailure::UnboundParam(param.name.clone())),
            other => Err(TypeNameFailure::Unhandled(format!(
                "no witness rule for `{}`",
                other
            ))),
        }
    }

    fn argument_witness(&mut self, arg: &Ty) -> Result<Fragment, TypeNameFailure> {
        match self.type_name(arg) {
            Ok(name) => Ok(Fragment::verbatim(format!(
                "TypeWitness::<{}>::new()",
                name
            ))),
            Err(TypeNameFailure::Anonymous) => self.type_ref(arg),
            Err(other) => Err(other),
        }
    }

    /// One factory per unbound generic definition, regardless of how many
    /// instantiations request it.
    fn witness_factory(&mut self, unbound: &Path, arity: usize) -> String {
        if let Some(name) = self.factory_index.get(unbound) {
            return name.clone();
        }
        let short = unbound
            .last()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "type".to_string());
        let name = format!("{}_{}", self.fresh("wf"), short);
        let type_params: Vec<String> = (0..arity).map(|i| format!("T{}", i)).collect();
        let value_params: Vec<String> = (0..arity)
            .map(|i| format!("__a{}: TypeWitness<T{}>", i, i))
            .collect();
        let signature = format!(
            "fn {}<{}>({}) -> TypeWitness<{}<{}>>",
            name,
            type_params.join(", "),
            value_params.join(", "),
            unbound,
            type_params.join(", "),
        );
        let body = Fragment::call(
            format!("lift_witness::<{}>", unbound),
            (0..arity)
                .map(|i| Fragment::verbatim(format!("__a{}", i)))
                .collect(),
        );
        self.factories.push(Fragment::method_def(signature, body));
        self.factory_index.insert(unbound.clone(), name.clone());
        name
    }

    /// A default-valued instance expression for `ty`, used to seed witness
    /// construction for anonymous types.
    fn default_instance(&mut self, ty: &Ty) -> Result<Fragment, TypeNameFailure> {
        match ty {
            Ty::Anonymous(anonymous) => {
                let fields: Result<Vec<_>, _> = anonymous
                    .fields
                    .iter()
                    .map(|field| {
                        self.default_instance(&field.ty).map(|value| {
                            Fragment::concat(vec![
                                Fragment::verbatim(format!("(\"{}\", ", field.name)),
                                value,
                                Fragment::verbatim(")"),
                            ])
                        })
                    })
                    .collect();
                Ok(Fragment::call("anonymous", fields?))
            }
            other => match self.type_name(other) {
                Ok(name) => Ok(Fragment::verbatim(format!("default::<{}>()", name))),
                Err(TypeNameFailure::Anonymous) => {
                    // A named generic with an anonymous argument: obtain the
                    // default through its witness instead.
                    let witness = self.type_ref(other)?;
                    Ok(Fragment::call("default_from_witness", vec![witness]))
                }
                Err(failure) => Err(failure),
            },
        }
    }

    /// Memoized reference to a resolved method's metadata.
    ///
    /// Non-generic methods resolve by declaring type + name + parameter
    /// types. Generic methods resolve by synthesizing a call with
    /// default-valued arguments and asking the model what it binds to,
    /// because parameter-matching lookups are unreliable under generic
    /// constraints. Extension methods invoked as instance methods re-resolve
    /// through the unreduced definition.
    pub fn method_info(
        &mut self,
        symbol: &MethodSymbol,
        type_args: &[Ty],
    ) -> Result<Fragment, TypeNameFailure> {
        let key = MethodKey::new(symbol, type_args);
        if let Some(&index) = self.method_index.get(&key) {
            return Ok(Fragment::verbatim(
                self.definitions[index].identifier.clone(),
            ));
        }
        let initializer = if symbol.is_generic() || symbol.reduced_from.is_some() {
            let unreduced: &MethodSymbol = symbol
                .reduced_from
                .as_deref()
                .unwrap_or(symbol);
            let full = unreduced.full_path();
            let ty_args = Fragment::initializer(
                type_args
                    .iter()
                    .map(|t| Fragment::verbatim(ty_literal(t)))
                    .collect(),
            );
            let defaults = Fragment::initializer(
                unreduced
                    .params
                    .iter()
                    .map(|p| Fragment::verbatim(format!("default_value({})", ty_literal(p))))
                    .collect(),
            );
            Fragment::call(
                "method_from_call",
                vec![
                    Fragment::verbatim(format!("\"{}\"", full)),
                    ty_args,
                    defaults,
                ],
            )
        } else {
            let params = Fragment::initializer(
                symbol
                    .params
                    .iter()
                    .map(|p| Fragment::verbatim(ty_literal(p)))
                    .collect(),
            );
            Fragment::call(
                "method_of",
                vec![
                    Fragment::verbatim(format!("\"{}\"", symbol.declaring)),
                    Fragment::verbatim(format!("\"{}\"", symbol.name)),
                    params,
                ],
            )
        };
        let identifier = self.fresh("m");
        let index = self.definitions.len();
        self.definitions.push(ValueDefinition {
            identifier: identifier.clone(),
            initializer,
        });
        self.method_index.insert(key, index);
        Ok(Fragment::verbatim(identifier))
    }

    /// Memoized named, typed parameter-expression object.
    pub fn parameter(&mut self, name: &Ident, ty: &Ty) -> Fragment {
        let key = ParameterKey {
            name: name.name.clone(),
            ty: ty.without_nullability(),
        };
        if let Some(&index) = self.parameter_index.get(&key) {
            return Fragment::verbatim(self.definitions[index].identifier.clone());
        }
        let initializer = Fragment::call(
            "LambdaParam::new",
            vec![
                Fragment::verbatim(format!("\"{}\"", name)),
                Fragment::verbatim(ty_literal(ty)),
            ],
        );
        let identifier = self.fresh("p");
        let index = self.definitions.len();
        self.definitions.push(ValueDefinition {
            identifier: identifier.clone(),
            initializer,
        });
        self.parameter_index.insert(key, index);
        Fragment::verbatim(identifier)
    }

    pub fn definitions(&self) -> &[ValueDefinition] {
        &self.definitions
    }

    pub fn factories(&self) -> &[Fragment] {
        &self.factories
    }
}

/// Target-code text constructing a `Ty` value. Total: every type, nameable
/// or not, has a value-level spelling.
pub fn ty_literal(ty: &Ty) -> String {
    match ty {
        Ty::Primitive(p) => match p {
            graft_core::ast::TypePrimitive::Bool => "Ty::bool()".to_string(),
            graft_core::ast::TypePrimitive::Char => "Ty::char_ty()".to_string(),
            graft_core::ast::TypePrimitive::String => "Ty::string()".to_string(),
            graft_core::ast::TypePrimitive::Int(graft_core::ast::TypeInt::I64) => {
                "Ty::i64()".to_string()
            }
            graft_core::ast::TypePrimitive::Int(graft_core::ast::TypeInt::I32) => {
                "Ty::i32()".to_string()
            }
            graft_core::ast::TypePrimitive::Decimal(graft_core::ast::TypeDecimal::F64) => {
                "Ty::f64()".to_string()
            }
            other => format!("Ty::primitive(\"{}\")", other),
        },
        Ty::Named(named) => {
            if named.args.is_empty() {
                format!("Ty::named(\"{}\")", named.path)
            } else {
                let args: Vec<_> = named.args.iter().map(ty_literal).collect();
                format!("Ty::generic(\"{}\", vec![{}])", named.path, args.join(", "))
            }
        }
        Ty::Array(array) => format!("Ty::array({})", ty_literal(&array.elem)),
        Ty::Nullable(nullable) => format!("Ty::nullable({})", ty_literal(&nullable.inner)),
        Ty::Tuple(tuple) => {
            let parts: Vec<_> = tuple.types.iter().map(ty_literal).collect();
            format!("Ty::tuple(vec![{}])", parts.join(", "))
        }
        Ty::Function(function) => {
            let params: Vec<_> = function.params.iter().map(ty_literal).collect();
            format!(
                "Ty::function(vec![{}], {})",
                params.join(", "),
                ty_literal(&function.ret)
            )
        }
        Ty::Param(param) => format!("Ty::param(\"{}\")", param.name),
        Ty::Anonymous(anonymous) => {
            let fields: Vec<_> = anonymous
                .fields
                .iter()
                .map(|f| format!("(\"{}\".into(), {})", f.name, ty_literal(&f.ty)))
                .collect();
            format!("Ty::anonymous(vec![{}])", fields.join(", "))
        }
        Ty::Unit(_) => "Ty::unit()".to_string(),
        Ty::Unknown(_) => "Ty::unknown()".to_string(),
    }
}

/// Target-code text for an ordinary-code literal of a constant value.
pub fn value_literal(value: &Value) -> Option<String> {
    match value {
        Value::Unit(_) => Some("()".to_string()),
        Value::Null(_) => Some("None".to_string()),
        Value::Bool(b) => Some(format!("{}", b.value)),
        Value::Int(i) => Some(format!("{}", i.value)),
        Value::Decimal(d) => Some(format!("{:?}", d.value)),
        Value::Char(c) => Some(format!("'{}'", c.value)),
        Value::String(s) => Some(format!("{:?}", s.value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::sema::TableSemanticModel;
    use pretty_assertions::assert_eq;

    #[test]
    fn method_info_is_memoized_per_analysis() {
        let model = TableSemanticModel::new();
        let mut builder = FragmentBuilder::new(&model);
        let symbol = MethodSymbol::new("Cat", "speak", vec![Ty::string()], Ty::unit());
        let a = builder.method_info(&symbol, &[]).unwrap();
        let b = builder.method_info(&symbol, &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.definitions().len(), 1);
    }

    #[test]
    fn method_keys_ignore_nullability() {
        let model = TableSemanticModel::new();
        let mut builder = FragmentBuilder::new(&model);
        let plain = MethodSymbol::new("Cat", "speak", vec![Ty::string()], Ty::unit());
        let nullable = MethodSymbol::new("Cat", "speak", vec![Ty::nullable(Ty::string())], Ty::unit());
        let a = builder.method_info(&plain, &[]).unwrap();
        let b = builder.method_info(&nullable, &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.definitions().len(), 1);
    }

    #[test]
    fn parameters_share_one_declaration_per_name_and_type() {
        let model = TableSemanticModel::new();
        let mut builder = FragmentBuilder::new(&model);
        let a = builder.parameter(&"cat".into(), &Ty::named("Cat"));
        let b = builder.parameter(&"cat".into(), &Ty::named("Cat"));
        let c = builder.parameter(&"cat".into(), &Ty::named("Dog"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.definitions().len(), 2);
    }

    #[test]
    fn anonymous_type_witness_wraps_a_default_instance() {
        let model = TableSemanticModel::new();
        let mut builder = FragmentBuilder::new(&model);
        let ty = Ty::anonymous(vec![("name".into(), Ty::string()), ("age".into(), Ty::i64())]);
        let frag = builder.type_ref(&ty).unwrap();
        assert_eq!(frag.render(), "__w0");
        assert_eq!(
            builder.definitions()[0].initializer.render(),
            "witness_of(anonymous((\"name\", default::<String>()), (\"age\", default::<i64>())))"
        );
    }

    #[test]
    fn generic_witness_factory_is_memoized_by_unbound_definition() {
        let model = TableSemanticModel::new();
        let mut builder = FragmentBuilder::new(&model);
        let anon = Ty::anonymous(vec![("name".into(), Ty::string())]);
        let list_of_anon = Ty::generic("Vec", vec![anon.clone()]);
        let other_anon = Ty::anonymous(vec![("age".into(), Ty::i64())]);
        let list_of_other = Ty::generic("Vec", vec![other_anon]);

        builder.type_ref(&list_of_anon).unwrap();
        builder.type_ref(&list_of_other).unwrap();
        // Two witnesses, but a single factory for the unbound `Vec`.
        assert_eq!(builder.factories().len(), 1);
    }

    #[test]
    fn unbound_type_parameter_is_an_explicit_failure() {
        let model = TableSemanticModel::new();
        let builder = FragmentBuilder::new(&model);
        match builder.type_name(&Ty::param("T")) {
            Err(TypeNameFailure::UnboundParam(name)) => assert_eq!(name.as_str(), "T"),
            other => panic!("expected unbound-param failure, got {:?}", other),
        }
    }
}
