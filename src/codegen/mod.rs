//! Code generation from equation sets to procedures
//!
//! [`build_procedure`] is a pure transform into the inspectable
//! [`Procedure`] representation; [`generate_procedure`] additionally
//! materializes it for immediate use. Callers that cache or serialize
//! generated code should stop at [`build_procedure`].

mod flat;
mod indexed;
mod layout;
mod lower;
mod options;
mod relabel;
mod rewrite;

use crate::equations::{EquationSet, SystemKind};
use crate::error::CodegenError;
use crate::ir::Procedure;
use crate::runtime::{materialize, CompiledProcedure, Value};
use crate::symbolic::Expr;

pub use flat::compile_flat;
pub use indexed::compile_indexed;
pub use options::Options;

/// Build the procedure for an equation set.
///
/// Systems tagged scalar with only scalar parameters take the flat path;
/// everything else goes through the indexed compiler.
pub fn build_procedure(
    eqs: &EquationSet,
    params: &[Expr],
    options: &Options,
) -> Result<Procedure, CodegenError> {
    let scalar_params = params.iter().all(|p| matches!(p, Expr::Symbol(_)));
    match eqs.kind() {
        SystemKind::Scalar if scalar_params => {
            compile_flat(&eqs.rhs(), &eqs.lhs(), params, eqs.time(), options)
        }
        _ => compile_indexed(eqs, params, options),
    }
}

/// Build and materialize in one step
pub fn generate_procedure<V: Value>(
    eqs: &EquationSet,
    params: &[Expr],
    options: &Options,
) -> Result<CompiledProcedure<V>, CodegenError> {
    let procedure = build_procedure(eqs, params, options)?;
    materialize(&procedure)
}
