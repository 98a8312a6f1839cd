//! Materialization of procedures into callable form
//!
//! [`materialize`] is the only place where a [`Procedure`] becomes something
//! that runs. The result is stateless: every call uses a fresh VM stack, so a
//! [`CompiledProcedure`] can be shared freely between threads.

pub mod builtins;
mod value;
mod vm;

use std::marker::PhantomData;

use nalgebra::DVector;
use ndarray::{parallel::prelude::*, Array2, Axis};

use crate::error::{CodegenError, RuntimeError};
use crate::ir::{self, render, Procedure};

pub use value::Value;
pub use vm::{Opcode, Program};

/// A procedure compiled for numeric type `V`.
///
/// The calling convention is `(derivative_out, state_in, params_in, time_in)`.
#[derive(Debug, Clone)]
pub struct CompiledProcedure<V: Value> {
    procedure: Procedure,
    program: Program,
    _value: PhantomData<fn() -> V>,
}

/// Check a procedure and compile it to bytecode over `V`
pub fn materialize<V: Value>(procedure: &Procedure) -> Result<CompiledProcedure<V>, CodegenError> {
    ir::check_structure(procedure)?;
    ir::check_tokens(procedure)?;
    let (program, uses_imaginary) = Program::compile(procedure)?;
    if uses_imaginary && V::imaginary_unit().is_none() {
        return Err(CodegenError::ComplexUnsupported {
            scalar: V::DIALECT.scalar,
        });
    }
    tracing::debug!(
        scalar = V::DIALECT.scalar,
        opcodes = program.code().len(),
        "materialized procedure"
    );
    Ok(CompiledProcedure {
        procedure: procedure.clone(),
        program,
        _value: PhantomData,
    })
}

impl<V: Value> CompiledProcedure<V> {
    /// The procedure this was compiled from
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Source text in the dialect of `V`
    pub fn source(&self) -> String {
        render::render(&self.procedure, V::DIALECT)
    }

    /// Evaluate the derivative in place
    pub fn call(&self, du: &mut [V], u: &[V], p: &[V], t: f64) -> Result<(), RuntimeError> {
        self.program.run(du, u, p, t)
    }

    pub fn call_dvector(
        &self,
        du: &mut DVector<V>,
        u: &DVector<V>,
        p: &DVector<V>,
        t: f64,
    ) -> Result<(), RuntimeError> {
        self.call(du.as_mut_slice(), u.as_slice(), p.as_slice(), t)
    }

    /// Evaluate an ensemble of states in parallel, one state per row.
    pub fn call_batch(
        &self,
        du: &mut Array2<V>,
        u: &Array2<V>,
        p: &[V],
        t: f64,
    ) -> Result<(), RuntimeError> {
        if du.nrows() != u.nrows() {
            return Err(RuntimeError::DimensionMismatch {
                expected: u.nrows(),
                found: du.nrows(),
            });
        }
        if du.ncols() != u.ncols() {
            return Err(RuntimeError::DimensionMismatch {
                expected: u.ncols(),
                found: du.ncols(),
            });
        }
        du.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(i, mut row)| {
                let state = u.row(i).to_vec();
                let mut out = vec![V::zero(); row.len()];
                self.call(&mut out, &state, p, t)?;
                row.iter_mut().zip(out).for_each(|(slot, v)| *slot = v);
                Ok(())
            })
    }
}
