//! Query-expression desugaring.
//!
//! One algorithm serves both walkers: a clause chain lowers to an ordinary
//! operator-method call chain over the source expression. The interpolated
//! visitor then reconstructs that chain as tree-factory calls while the
//! evaluated visitor emits it as ordinary code, which keeps the two sides'
//! range-variable scoping and projection-fusion rules identical by
//! construction.
//!
//! Rules carried here:
//! - each clause after the first lowers to one operator call;
//! - a clause that introduces a second range variable projects both into a
//!   transparent identifier and rebinds every visible variable to a member
//!   access off the new input;
//! - a trailing `select` whose projection is the bare current input fuses
//!   away entirely, and a trailing `select` after `from`/`join` fuses into
//!   that clause's result selector;
//! - `into` pops the scope down to the single continuation variable;
//! - a typed `from` emits the element-cast operator with its type argument
//!   always explicit, the one exception to "explicit only when written".

use crate::subst::substitute;
use graft_core::ast::{
    Expr, ExprQuery, FieldInit, Ident, LambdaParam, QueryClause, Ty,
};
use graft_core::sema::{QueryOperator, ResolveFailure, SemanticModel};
use std::collections::HashMap;

pub struct QueryDesugarer<'m> {
    model: &'m dyn SemanticModel,
    next_transparent: u32,
}

struct QueryScope {
    input: Ident,
    /// Visible range variables mapped to accessor expressions rooted at the
    /// current input, in introduction order.
    bindings: Vec<(Ident, Expr)>,
}

impl QueryScope {
    fn single(var: Ident) -> Self {
        let accessor = Expr::ident(var.clone());
        Self {
            input: var.clone(),
            bindings: vec![(var, accessor)],
        }
    }

    fn substitution(&self) -> HashMap<Ident, Expr> {
        self.bindings.iter().cloned().collect()
    }

    fn rewrite(&self, expr: &Expr) -> Expr {
        substitute(expr, &self.substitution())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesugarError {
    Malformed(String),
    Resolve(ResolveFailure),
}

impl DesugarError {
    pub fn message(&self) -> String {
        match self {
            DesugarError::Malformed(m) => m.clone(),
            DesugarError::Resolve(failure) => failure.message().to_string(),
        }
    }
}

impl<'m> QueryDesugarer<'m> {
    pub fn new(model: &'m dyn SemanticModel) -> Self {
        Self {
            model,
            next_transparent: 0,
        }
    }

    pub fn desugar(&mut self, query: &ExprQuery) -> Result<Expr, DesugarError> {
        let mut clauses = query.clauses.iter().peekable();
        let first = clauses
            .next()
            .ok_or_else(|| DesugarError::Malformed("query has no clauses".to_string()))?;
        let QueryClause::From(from) = first else {
            return Err(DesugarError::Malformed(
                "query must start with a from clause".to_string(),
            ));
        };

        let mut chain = (*from.source).clone();
        if let Some(cast_ty) = &from.cast_ty {
            chain = self.cast_elements(chain, cast_ty.clone())?;
        }
        let mut scope = QueryScope::single(from.var.clone());
        let mut projected = false;

        while let Some(clause) = clauses.next() {
            match clause {
                QueryClause::Where(w) => {
                    let predicate = scope.rewrite(&w.predicate);
                    chain = self.operator_call(
                        QueryOperator::Where,
                        chain,
                        vec![self.selector(&scope, predicate)],
                    )?;
                }
                QueryClause::OrderBy(order) => {
                    for (index, ordering) in order.orderings.iter().enumerate() {
                        let op = match (index, ordering.descending) {
                            (0, false) => QueryOperator::OrderBy,
                            (0, true) => QueryOperator::OrderByDescending,
                            (_, false) => QueryOperator::ThenBy,
                            (_, true) => QueryOperator::ThenByDescending,
                        };
                        let key = scope.rewrite(&ordering.key);
                        chain =
                            self.operator_call(op, chain, vec![self.selector(&scope, key)])?;
                    }
                }
                QueryClause::Let(l) => {
                    let value = scope.rewrite(&l.value);
                    let mut fields: Vec<FieldInit> = scope
                        .bindings
                        .iter()
                        .map(|(name, accessor)| FieldInit::new(name.clone(), accessor.clone()))
                        .collect();
                    fields.push(FieldInit::new(l.var.clone(), value));
                    let projection = Expr::anonymous_new(fields);
                    chain = self.operator_call(
                        QueryOperator::Select,
                        chain,
                        vec![self.selector(&scope, projection)],
                    )?;
                    scope = self.rebind(&scope, l.var.clone());
                }
                QueryClause::From(from) => {
                    let mut source = scope.rewrite(&from.source);
                    if let Some(cast_ty) = &from.cast_ty {
                        source = self.cast_elements(source, cast_ty.clone())?;
                    }
                    let collection = self.selector(&scope, source);
                    // A trailing select fuses into this clause's result
                    // selector instead of a separate call.
                    if let Some(QueryClause::Select(select)) = final_select(&mut clauses) {
                        let result =
                            self.pair_selector(&scope, &from.var, &select.projection);
                        chain = self.operator_call(
                            QueryOperator::SelectMany,
                            chain,
                            vec![collection, result],
                        )?;
                        projected = true;
                    } else {
                        let result = self.transparent_selector(&scope, &from.var);
                        chain = self.operator_call(
                            QueryOperator::SelectMany,
                            chain,
                            vec![collection, result],
                        )?;
                        scope = self.rebind(&scope, from.var.clone());
                    }
                }
                QueryClause::Join(join) => {
                    let operator = if join.group.is_some() {
                        QueryOperator::GroupJoin
                    } else {
                        QueryOperator::Join
                    };
                    let introduced = join.group.clone().unwrap_or_else(|| join.var.clone());
                    let source = scope.rewrite(&join.source);
                    let outer_key = scope.rewrite(&join.outer_key);
                    let inner_scope = QueryScope::single(join.var.clone());
                    let inner_key = inner_scope.rewrite(&join.inner_key);
                    let mut args = vec![
                        source,
                        self.selector(&scope, outer_key),
                        Expr::lambda(
                            vec![LambdaParam::new(join.var.clone(), Ty::unknown())],
                            inner_key,
                        ),
                    ];
                    if let Some(QueryClause::Select(select)) = final_select(&mut clauses) {
                        args.push(self.pair_selector(&scope, &introduced, &select.projection));
                        chain = self.operator_call(operator, chain, args)?;
                        projected = true;
                    } else {
                        args.push(self.transparent_selector(&scope, &introduced));
                        chain = self.operator_call(operator, chain, args)?;
                        scope = self.rebind(&scope, introduced);
                    }
                }
                QueryClause::GroupBy(group) => {
                    let key = scope.rewrite(&group.key);
                    let element = scope.rewrite(&group.element);
                    let mut args = vec![self.selector(&scope, key)];
                    if element != Expr::ident(scope.input.clone()) {
                        args.push(self.selector(&scope, element));
                    }
                    chain = self.operator_call(QueryOperator::GroupBy, chain, args)?;
                    projected = true;
                }
                QueryClause::Select(select) => {
                    let projection = scope.rewrite(&select.projection);
                    if projection == Expr::ident(scope.input.clone()) {
                        // Trivial projection: the previous clause already
                        // produces the result shape.
                        projected = true;
                    } else {
                        chain = self.operator_call(
                            QueryOperator::Select,
                            chain,
                            vec![self.selector(&scope, projection)],
                        )?;
                        projected = true;
                    }
                }
                QueryClause::Into(into) => {
                    if !projected {
                        return Err(DesugarError::Malformed(
                            "query continuation must follow a select or group clause".to_string(),
                        ));
                    }
                    scope = QueryScope::single(into.var.clone());
                    projected = false;
                }
            }
        }

        if !projected {
            return Err(DesugarError::Malformed(
                "query must end in a select or group clause".to_string(),
            ));
        }
        Ok(chain)
    }

    fn operator_call(
        &mut self,
        operator: QueryOperator,
        chain: Expr,
        args: Vec<Expr>,
    ) -> Result<Expr, DesugarError> {
        let source_ty = chain.ty.clone().unwrap_or(Ty::unknown());
        let symbol = self
            .model
            .resolve_query_operator(operator, &source_ty)
            .map_err(DesugarError::Resolve)?;
        Ok(Expr::invoke_method(chain, symbol.name.clone(), args))
    }

    fn cast_elements(&mut self, chain: Expr, cast_ty: Ty) -> Result<Expr, DesugarError> {
        let source_ty = chain.ty.clone().unwrap_or(Ty::unknown());
        let symbol = self
            .model
            .resolve_query_operator(QueryOperator::Cast, &source_ty)
            .map_err(DesugarError::Resolve)?;
        let mut call = Expr::invoke_method(chain, symbol.name.clone(), vec![]);
        if let graft_core::ast::ExprKind::Invoke(invoke) = &mut call.kind {
            // The rewritten call shape cannot infer the element type, so the
            // type argument is always explicit here.
            invoke.type_args = vec![cast_ty];
        }
        Ok(call)
    }

    fn selector(&self, scope: &QueryScope, body: Expr) -> Expr {
        Expr::lambda(
            vec![LambdaParam::new(scope.input.clone(), Ty::unknown())],
            body,
        )
    }

    fn pair_selector(&mut self, scope: &QueryScope, second: &Ident, projection: &Expr) -> Expr {
        let mut substitution = scope.substitution();
        substitution.insert(second.clone(), Expr::ident(second.clone()));
        let body = substitute(projection, &substitution);
        Expr::lambda(
            vec![
                LambdaParam::new(scope.input.clone(), Ty::unknown()),
                LambdaParam::new(second.clone(), Ty::unknown()),
            ],
            body,
        )
    }

    fn transparent_selector(&mut self, scope: &QueryScope, second: &Ident) -> Expr {
        let mut fields: Vec<FieldInit> = scope
            .bindings
            .iter()
            .map(|(name, accessor)| FieldInit::new(name.clone(), accessor.clone()))
            .collect();
        fields.push(FieldInit::new(second.clone(), Expr::ident(second.clone())));
        Expr::lambda(
            vec![
                LambdaParam::new(scope.input.clone(), Ty::unknown()),
                LambdaParam::new(second.clone(), Ty::unknown()),
            ],
            Expr::anonymous_new(fields),
        )
    }

    /// After a projection introduces `newcomer`, every visible variable is
    /// rebound to a member access off the fresh transparent input.
    fn rebind(&mut self, scope: &QueryScope, newcomer: Ident) -> QueryScope {
        let input = Ident::new(format!("__q{}", self.next_transparent));
        self.next_transparent += 1;
        let mut bindings: Vec<(Ident, Expr)> = scope
            .bindings
            .iter()
            .map(|(name, _)| {
                (
                    name.clone(),
                    Expr::member(Expr::ident(input.clone()), name.clone()),
                )
            })
            .collect();
        bindings.push((
            newcomer.clone(),
            Expr::member(Expr::ident(input.clone()), newcomer),
        ));
        QueryScope { input, bindings }
    }
}

/// Peek whether the only remaining clause is a `select`, and consume it if
/// so. The caller fuses its projection into the current clause.
fn final_select<'a, I>(clauses: &mut std::iter::Peekable<I>) -> Option<&'a QueryClause>
where
    I: Iterator<Item = &'a QueryClause> + Clone,
{
    match clauses.peek() {
        Some(QueryClause::Select(_)) => {
            let mut lookahead = clauses.clone();
            lookahead.next();
            if lookahead.peek().is_none() {
                clauses.next()
            } else {
                None
            }
        }
        _ => None,
    }
}
