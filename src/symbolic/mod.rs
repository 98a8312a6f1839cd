//! Symbolic expression model consumed by the code generator
//!
//! This module provides the minimal symbolic surface the compiler needs:
//! symbols, index ranges, indexed symbols and an expression tree with
//! free-symbol enumeration, substitution, zero simplification and direct
//! numeric evaluation (see [`ops`]). It deliberately does no general
//! simplification; equations are derived upstream.
//!
//! # Example
//!
//! ```
//! use odegen::symbolic::{Expr, Index};
//!
//! let i = Index::new("i", 1, "N");
//! let j = Index::new("j", 1, "N");
//! let n_i = Expr::indexed("n", [i.clone()]);
//! let n_j = Expr::indexed("n", [j.clone()]);
//!
//! // d(n_i) = Σ_{j≠i} J (n_j - n_i)
//! let rhs = Expr::sum_distinct(j, [i], Expr::sym("J") * (n_j - n_i));
//! assert!(rhs.has_index_structure());
//! ```

mod ops;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub use ops::{Bindings, FreeSymbol};

// ═══════════════════════════════════════════════════════════════════════════════
// Symbols and indices
// ═══════════════════════════════════════════════════════════════════════════════

/// An atomic named placeholder: a state, a parameter, the time or an index label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One end of an index range, either a literal or a parameter-backed symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Literal(i64),
    Symbol(Symbol),
}

impl Bound {
    pub fn as_literal(&self) -> Option<i64> {
        match self {
            Bound::Literal(v) => Some(*v),
            Bound::Symbol(_) => None,
        }
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Literal(v)
    }
}

impl From<i32> for Bound {
    fn from(v: i32) -> Self {
        Bound::Literal(v as i64)
    }
}

impl From<&str> for Bound {
    fn from(name: &str) -> Self {
        Bound::Symbol(Symbol::new(name))
    }
}

impl From<Symbol> for Bound {
    fn from(s: Symbol) -> Self {
        Bound::Symbol(s)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Literal(v) => write!(f, "{}", v),
            Bound::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// A discrete replication range `label ∈ lower..=upper`.
///
/// Two indices are the same index only if label and both bounds agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    pub label: Symbol,
    pub lower: Bound,
    pub upper: Bound,
}

impl Index {
    pub fn new(label: impl Into<Symbol>, lower: impl Into<Bound>, upper: impl Into<Bound>) -> Self {
        Self {
            label: label.into(),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// Whether both indices range over the same sites
    pub fn same_range(&self, other: &Index) -> bool {
        self.lower == other.lower && self.upper == other.upper
    }

    /// Number of sites, when both bounds are literals
    pub fn len(&self) -> Option<usize> {
        let lo = self.lower.as_literal()?;
        let hi = self.upper.as_literal()?;
        Some(if hi < lo { 0 } else { (hi - lo + 1) as usize })
    }

    /// The index used as a value inside an expression
    pub fn value(&self) -> Expr {
        Expr::Index(self.clone())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// A symbol replicated over one or more indices, e.g. `n_i` or `J_{i,j}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexedSymbol {
    pub base: Symbol,
    pub indices: Vec<Index>,
}

impl IndexedSymbol {
    pub fn new(base: impl Into<Symbol>, indices: impl IntoIterator<Item = Index>) -> Self {
        Self {
            base: base.into(),
            indices: indices.into_iter().collect(),
        }
    }
}

impl fmt::Display for IndexedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        if labels.len() == 1 {
            write!(f, "{}_{}", self.base, labels[0])
        } else {
            write!(f, "{}_{{{}}}", self.base, labels.join(","))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════════

/// Functions understood by the expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Func {
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
    Abs,
    Real,
    Imag,
    Conj,
    Adjoint,
    /// Any other function, passed through by name
    Named(String),
}

impl Func {
    pub fn name(&self) -> &str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Real => "real",
            Func::Imag => "imag",
            Func::Conj => "conj",
            Func::Adjoint => "adjoint",
            Func::Named(name) => name,
        }
    }

    /// Functions with `f(0) = 0`
    pub(crate) fn preserves_zero(&self) -> bool {
        matches!(
            self,
            Func::Sin | Func::Sqrt | Func::Abs | Func::Real | Func::Imag | Func::Conj | Func::Adjoint
        )
    }
}

/// A symbolic expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Number(f64),
    ImaginaryUnit,
    Symbol(Symbol),
    Indexed(IndexedSymbol),
    /// An index used as a value, e.g. a site-dependent coefficient
    Index(Index),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Call(Func, Vec<Expr>),
    /// `Σ_{index, index ∉ distinct_from} body`
    Sum {
        index: Index,
        distinct_from: Vec<Index>,
        body: Box<Expr>,
    },
    /// `body` when `a ≠ b`, zero otherwise
    Distinct { a: Index, b: Index, body: Box<Expr> },
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Number(0.0)
    }

    pub fn num(v: f64) -> Self {
        Expr::Number(v)
    }

    pub fn sym(name: impl Into<Symbol>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn imaginary_unit() -> Self {
        Expr::ImaginaryUnit
    }

    pub fn indexed(base: impl Into<Symbol>, indices: impl IntoIterator<Item = Index>) -> Self {
        Expr::Indexed(IndexedSymbol::new(base, indices))
    }

    pub fn sum(index: Index, body: Expr) -> Self {
        Expr::Sum {
            index,
            distinct_from: Vec::new(),
            body: Box::new(body),
        }
    }

    pub fn sum_distinct(
        index: Index,
        distinct_from: impl IntoIterator<Item = Index>,
        body: Expr,
    ) -> Self {
        Expr::Sum {
            index,
            distinct_from: distinct_from.into_iter().collect(),
            body: Box::new(body),
        }
    }

    pub fn distinct(a: Index, b: Index, body: Expr) -> Self {
        Expr::Distinct {
            a,
            b,
            body: Box::new(body),
        }
    }

    pub fn call(func: Func, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call(func, args.into_iter().collect())
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent.into()))
    }

    pub fn conj(self) -> Self {
        Expr::call(Func::Conj, [self])
    }

    pub fn adjoint(self) -> Self {
        Expr::call(Func::Adjoint, [self])
    }

    pub fn sin(self) -> Self {
        Expr::call(Func::Sin, [self])
    }

    pub fn cos(self) -> Self {
        Expr::call(Func::Cos, [self])
    }

    pub fn exp(self) -> Self {
        Expr::call(Func::Exp, [self])
    }

    /// The symbol if this is a plain scalar symbol
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The indexed symbol if this is one
    pub fn as_indexed(&self) -> Option<&IndexedSymbol> {
        match self {
            Expr::Indexed(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Number(v)
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::Symbol(s)
    }
}

impl From<IndexedSymbol> for Expr {
    fn from(s: IndexedSymbol) -> Self {
        Expr::Indexed(s)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::sym(name)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        let mut terms = match self {
            Expr::Add(terms) => terms,
            other => vec![other],
        };
        match rhs {
            Expr::Add(more) => terms.extend(more),
            other => terms.push(other),
        }
        Expr::Add(terms)
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        let mut factors = match self {
            Expr::Mul(factors) => factors,
            other => vec![other],
        };
        match rhs {
            Expr::Mul(more) => factors.extend(more),
            other => factors.push(other),
        }
        Expr::Mul(factors)
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        self * rhs.pow(-1.0)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

macro_rules! scalar_ops {
    ($($trait:ident :: $method:ident),*) => {
        $(
            impl $trait<f64> for Expr {
                type Output = Expr;
                fn $method(self, rhs: f64) -> Expr {
                    $trait::$method(self, Expr::Number(rhs))
                }
            }

            impl $trait<Expr> for f64 {
                type Output = Expr;
                fn $method(self, rhs: Expr) -> Expr {
                    $trait::$method(Expr::Number(self), rhs)
                }
            }
        )*
    };
}

scalar_ops!(Add::add, Sub::sub, Mul::mul, Div::div);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::ImaginaryUnit => write!(f, "im"),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Indexed(s) => write!(f, "{}", s),
            Expr::Index(i) => write!(f, "{}", i),
            Expr::Add(terms) => {
                write!(f, "(")?;
                for (k, term) in terms.iter().enumerate() {
                    match (k, term) {
                        (0, _) => write!(f, "{}", term)?,
                        (_, Expr::Neg(inner)) => write!(f, " - {}", inner)?,
                        _ => write!(f, " + {}", term)?,
                    }
                }
                write!(f, ")")
            }
            Expr::Mul(factors) => {
                let parts: Vec<String> = factors.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(" * "))
            }
            Expr::Pow(base, exp) => write!(f, "{}^{}", base, exp),
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Call(func, args) => {
                let parts: Vec<String> = args.iter().map(|x| x.to_string()).collect();
                write!(f, "{}({})", func.name(), parts.join(", "))
            }
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                write!(f, "Σ({}={}:{}", index.label, index.lower, index.upper)?;
                for other in distinct_from {
                    write!(f, ", {}≠{}", index.label, other.label)?;
                }
                write!(f, ") {}", body)
            }
            Expr::Distinct { a, b, body } => write!(f, "[{}≠{}]({})", a, b, body),
        }
    }
}
