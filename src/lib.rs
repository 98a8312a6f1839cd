//! Compile symbolic, optionally site-indexed, ODE systems into derivative
//! procedures `(du, u, p, t)` for a generic integrator.
//!
//! ```
//! use odegen::prelude::*;
//!
//! symbols!(a, b, g, k);
//! let eqs = EquationSet::from_pairs([(a.clone(), -g.clone() * a.clone()), (b, k.clone() * a)]).unwrap();
//! let f = generate_procedure::<f64>(&eqs, &[g, k], &Options::default()).unwrap();
//!
//! let mut du = [0.0; 2];
//! f.call(&mut du, &[1.0, 0.0], &[0.5, 2.0], 0.0).unwrap();
//! assert_eq!(du, [-0.5, 2.0]);
//! ```

pub mod codegen;
pub mod equations;
pub mod error;
pub mod ir;
pub mod runtime;
pub mod symbolic;
pub mod validate;

pub use crate::codegen::{build_procedure, generate_procedure, Options};
pub use crate::equations::{Equation, EquationKind, EquationSet, SystemKind};
pub use crate::ir::Procedure;
pub use crate::runtime::{materialize, CompiledProcedure, Value};
pub use crate::symbolic::{Expr, Index, IndexedSymbol, Symbol};
pub use error::{CodegenError, RuntimeError};
pub use num_complex::Complex64;

pub mod prelude {
    pub mod symbolic {
        pub use crate::symbolic::{Bindings, Bound, Expr, FreeSymbol, Func, Index, IndexedSymbol, Symbol};
    }
    pub mod codegen {
        pub use crate::codegen::{build_procedure, compile_flat, compile_indexed, generate_procedure, Options};
        pub use crate::ir::{render::Dialect, Node, Procedure, Stmt};
        pub use crate::runtime::{materialize, CompiledProcedure, Value};
    }

    pub use crate::codegen::{build_procedure, generate_procedure, Options};
    pub use crate::equations::{Equation, EquationSet};
    pub use crate::error::{CodegenError, RuntimeError};
    pub use crate::symbolic::{Expr, Index};
    pub use crate::symbols;

    /// Bind scalar symbols to local variables of the same name.
    ///
    /// ```
    /// use odegen::prelude::*;
    ///
    /// symbols!(gamma, kappa);
    /// assert_eq!(gamma, Expr::sym("gamma"));
    /// ```
    #[macro_export]
    macro_rules! symbols {
        ($($name:ident),* $(,)?) => {
            $(
                let $name = $crate::symbolic::Expr::sym(stringify!($name));
            )*
        };
    }
}
