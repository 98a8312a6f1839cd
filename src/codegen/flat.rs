//! Straight-line derivative procedures for systems without index families

use std::collections::HashSet;

use super::layout::{scalar_substitutions, ParamLayout, StateLayout};
use super::lower::Lowering;
use super::options::Options;
use super::relabel::RuleSet;
use crate::error::CodegenError;
use crate::ir::{canonicalize, check_structure, Node, Procedure, Stmt};
use crate::symbolic::{Expr, Symbol};
use crate::validate;

/// Compile equal-length right-hand side and state lists into a procedure.
///
/// State `i` maps to `state[i]`, parameter `k` to `params[k]` in declaration
/// order, and `time` to the time argument. The body is one assignment
/// `derivative[i] = rhs[i]` per state.
pub fn compile_flat(
    rhs: &[Expr],
    lhs: &[Expr],
    params: &[Expr],
    time: Option<&Symbol>,
    options: &Options,
) -> Result<Procedure, CodegenError> {
    if rhs.len() != lhs.len() {
        return Err(CodegenError::LengthMismatch {
            lhs: lhs.len(),
            rhs: rhs.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut states = Vec::with_capacity(lhs.len());
    for expr in lhs {
        let symbol = expr.as_symbol().ok_or_else(|| CodegenError::InvalidLhs {
            expr: expr.to_string(),
        })?;
        if !seen.insert(symbol) {
            return Err(CodegenError::DuplicateLhs {
                name: symbol.to_string(),
            });
        }
        states.push(symbol.clone());
    }

    let mut known = params.to_vec();
    known.extend(time.cloned().map(Expr::Symbol));
    let missing = validate::check_missing(rhs, lhs, &known);
    validate::ensure_complete(&missing, options.set_unknowns_zero)?;
    let rhs = validate::remove_unknowns(rhs, &missing);

    let param_layout = ParamLayout::new(params)?;
    let state_layout = StateLayout::scalar_block(&states);
    let substitutions = scalar_substitutions(&state_layout, &param_layout, time)?;
    let rules = RuleSet::empty();
    let naming = options.naming();
    let mut lowering = Lowering::new(
        &substitutions,
        &rules,
        &param_layout,
        options.set_unknowns_zero,
        &naming,
    );

    let mut body = Vec::with_capacity(rhs.len());
    for (slot, (expr, state)) in rhs.iter().zip(&states).enumerate() {
        let value = lowering.lower_equation(state.name(), expr, None)?;
        body.push(Stmt::assign(Node::int(slot as i64), value));
    }

    let procedure = Procedure::new(
        naming,
        state_layout.entries(),
        param_layout.entries(),
        canonicalize(body),
        options.check_bounds,
    );
    check_structure(&procedure)?;
    tracing::debug!(states = states.len(), "compiled flat procedure");
    Ok(procedure)
}
