//! Missing-symbol validation and zero elimination
//!
//! Every right-hand side symbol must resolve to a state, a parameter or the
//! time variable. Anything else is either reported or, when the caller opts
//! in through `set_unknowns_zero`, replaced with zero.

use std::collections::{HashMap, HashSet};

use crate::error::CodegenError;
use crate::symbolic::{Expr, FreeSymbol};

/// The declared symbol an lhs or parameter entry stands for
fn declared(expr: &Expr) -> Option<FreeSymbol> {
    match expr {
        Expr::Symbol(s) => Some(FreeSymbol::Scalar(s.clone())),
        Expr::Indexed(s) => Some(FreeSymbol::Indexed(s.clone())),
        _ => None,
    }
}

fn collect_missing<'a>(
    rhs: impl IntoIterator<Item = &'a Expr>,
    known: &HashSet<FreeSymbol>,
    keep: impl Fn(&FreeSymbol) -> bool,
) -> Vec<FreeSymbol> {
    let mut missing = Vec::new();
    for expr in rhs {
        for symbol in expr.free_symbols() {
            if keep(&symbol) && !known.contains(&symbol) && !missing.contains(&symbol) {
                missing.push(symbol);
            }
        }
    }
    missing
}

/// Free right-hand side symbols that are neither states nor parameters.
///
/// The result is in first-occurrence order without duplicates.
pub fn check_missing(rhs: &[Expr], lhs: &[Expr], params: &[Expr]) -> Vec<FreeSymbol> {
    let known: HashSet<FreeSymbol> = lhs.iter().chain(params).filter_map(declared).collect();
    collect_missing(rhs, &known, |_| true)
}

/// Index-aware variant of [`check_missing`].
///
/// Indices and indexed symbols are resolved later by the relabeling pass, so
/// only scalar symbols can be missing here. States and parameters are
/// expanded into their own free symbols before exclusion.
pub fn check_missing_indexed(rhs: &[Expr], lhs: &[Expr], params: &[Expr]) -> Vec<FreeSymbol> {
    let known: HashSet<FreeSymbol> = lhs
        .iter()
        .chain(params)
        .flat_map(|expr| expr.free_symbols())
        .collect();
    collect_missing(rhs, &known, |symbol| !symbol.is_index_like())
}

/// Apply the missing-symbol policy.
///
/// Without zero fill a non-empty `missing` list is fatal; with it the zeroed
/// names are logged.
pub fn ensure_complete(missing: &[FreeSymbol], zero_fill: bool) -> Result<(), CodegenError> {
    if missing.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
    if !zero_fill {
        return Err(CodegenError::MissingSymbols { names });
    }
    tracing::warn!(symbols = ?names, "substituting unknown symbols with zero");
    Ok(())
}

/// Substitute every missing symbol with zero and fold the resulting zeros.
pub fn remove_unknowns(exprs: &[Expr], missing: &[FreeSymbol]) -> Vec<Expr> {
    if missing.is_empty() {
        return exprs.to_vec();
    }
    let map: HashMap<FreeSymbol, Expr> = missing
        .iter()
        .map(|symbol| (symbol.clone(), Expr::zero()))
        .collect();
    exprs
        .iter()
        .map(|expr| expr.substitute(&map).simplify_zeros())
        .collect()
}
