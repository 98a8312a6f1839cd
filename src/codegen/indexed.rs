//! Loop-based procedures for systems with index families
//!
//! The generated body is a prologue of scalar assignments followed by a
//! single loop over the families' shared range:
//!
//! ```text
//! du[0] = ...                      // scalar block
//! for i in lo..=hi {
//!     du[start_n + (i - lo)] = ... // one assignment per family
//! }
//! ```

use super::layout::{partition, scalar_substitutions, ParamLayout, StateLayout};
use super::lower::Lowering;
use super::options::Options;
use super::relabel::{declared_indices, RuleSet};
use super::rewrite;
use crate::equations::EquationSet;
use crate::error::CodegenError;
use crate::ir::{canonicalize, check_structure, Node, Procedure, Stmt};
use crate::symbolic::Expr;
use crate::validate;

/// Compile an equation set that may contain index families.
pub fn compile_indexed(
    eqs: &EquationSet,
    params: &[Expr],
    options: &Options,
) -> Result<Procedure, CodegenError> {
    // 1. Missing symbols, with indices and indexed symbols left to relabeling
    let mut known = params.to_vec();
    known.extend(eqs.time().cloned().map(Expr::Symbol));
    let missing = validate::check_missing_indexed(&eqs.rhs(), &eqs.lhs(), &known);
    validate::ensure_complete(&missing, options.set_unknowns_zero)?;
    let eqs = eqs.remove_unknowns(&missing);

    // 2-3. Tag checks and the stable scalar-first split
    let (scalars, indexed) = partition(&eqs)?;

    // 4-5. Layout and scalar substitutions
    let param_layout = ParamLayout::new(params)?;
    let state_layout = StateLayout::new(&scalars, &indexed, &param_layout);
    let substitutions = scalar_substitutions(&state_layout, &param_layout, eqs.time())?;

    // 6. Relabel rules
    let declared = declared_indices(&eqs, &param_layout);
    let rules = RuleSet::build(
        &state_layout,
        &param_layout,
        &declared,
        options.max_relabel_rules,
    )?;
    tracing::debug!(
        rules = rules.len(),
        declared = declared.len(),
        "built relabel rules"
    );

    let naming = options.naming();
    let mut lowering = Lowering::new(
        &substitutions,
        &rules,
        &param_layout,
        options.set_unknowns_zero,
        &naming,
    );

    // 7-8. Scalar prologue, then one loop over the shared family range
    let mut body = Vec::with_capacity(scalars.len() + 1);
    for (slot, eq) in scalars.iter().enumerate() {
        let value = lowering.lower_equation(&eq.name(), eq.rhs(), None)?;
        body.push(Stmt::assign(Node::int(slot as i64), rewrite::apply(value)));
    }

    if let Some(first) = state_layout.families().first() {
        let var = lowering.fresh(&first.index);
        lowering.reserve(&var);
        let mut inner = Vec::with_capacity(indexed.len());
        for (eq, family) in indexed.iter().zip(state_layout.families()) {
            let site = Some((&family.index, var.as_str()));
            let value = lowering.lower_equation(&eq.name(), eq.rhs(), site)?;
            let slot = family.slot(Node::var(var.clone()), &param_layout);
            inner.push(Stmt::assign(slot, rewrite::apply(value)));
        }
        body.push(Stmt::Loop {
            var,
            lower: param_layout.bound_node(&first.index.lower),
            upper: param_layout.bound_node(&first.index.upper),
            body: inner,
        });
    }

    // 9. Canonicalization last, then the structural check
    let procedure = Procedure::new(
        naming,
        state_layout.entries(),
        param_layout.entries(),
        canonicalize(body),
        options.check_bounds,
    );
    check_structure(&procedure)?;
    tracing::debug!(
        scalars = scalars.len(),
        families = indexed.len(),
        "compiled indexed procedure"
    );
    Ok(procedure)
}
