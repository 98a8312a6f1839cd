use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_complex::Complex64;
use num_traits::{One, Zero};

use super::builtins::Builtin;
use crate::ir::render::Dialect;

/// Numeric type a procedure can be materialized over.
pub trait Value:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Rendering dialect and name of the type
    const DIALECT: Dialect;

    fn from_f64(v: f64) -> Self;

    /// `None` for real types
    fn imaginary_unit() -> Option<Self>;

    /// Real part, used for index arithmetic and comparisons
    fn real(self) -> f64;

    fn pow(self, exponent: Self) -> Self;

    fn apply(self, builtin: Builtin) -> Self;
}

impl Value for f64 {
    const DIALECT: Dialect = Dialect::REAL;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn imaginary_unit() -> Option<Self> {
        None
    }

    fn real(self) -> f64 {
        self
    }

    fn pow(self, exponent: Self) -> Self {
        if exponent.fract() == 0.0 && exponent.abs() < i32::MAX as f64 {
            self.powi(exponent as i32)
        } else {
            self.powf(exponent)
        }
    }

    fn apply(self, builtin: Builtin) -> Self {
        match builtin {
            Builtin::Sin => self.sin(),
            Builtin::Cos => self.cos(),
            Builtin::Exp => self.exp(),
            Builtin::Log => self.ln(),
            Builtin::Sqrt => self.sqrt(),
            Builtin::Abs => self.abs(),
            Builtin::Real | Builtin::Conj => self,
            Builtin::Imag => 0.0,
        }
    }
}

impl Value for Complex64 {
    const DIALECT: Dialect = Dialect::COMPLEX;

    fn from_f64(v: f64) -> Self {
        Complex64::new(v, 0.0)
    }

    fn imaginary_unit() -> Option<Self> {
        Some(Complex64::i())
    }

    fn real(self) -> f64 {
        self.re
    }

    fn pow(self, exponent: Self) -> Self {
        if exponent.im == 0.0 && exponent.re.fract() == 0.0 && exponent.re.abs() < i32::MAX as f64 {
            self.powi(exponent.re as i32)
        } else {
            self.powc(exponent)
        }
    }

    fn apply(self, builtin: Builtin) -> Self {
        match builtin {
            Builtin::Sin => self.sin(),
            Builtin::Cos => self.cos(),
            Builtin::Exp => self.exp(),
            Builtin::Log => self.ln(),
            Builtin::Sqrt => self.sqrt(),
            Builtin::Abs => Complex64::new(self.norm(), 0.0),
            Builtin::Real => Complex64::new(self.re, 0.0),
            Builtin::Imag => Complex64::new(self.im, 0.0),
            Builtin::Conj => self.conj(),
        }
    }
}
