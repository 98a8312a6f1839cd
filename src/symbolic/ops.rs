use std::collections::{HashMap, HashSet};
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{Bound, Expr, Index, IndexedSymbol, Symbol};
use crate::error::CodegenError;

/// A free occurrence inside an expression, tagged by what kind of symbol it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeSymbol {
    Scalar(Symbol),
    Index(Index),
    Indexed(IndexedSymbol),
}

impl FreeSymbol {
    /// Index-typed symbols are resolved by the index machinery, not by substitution
    pub fn is_index_like(&self) -> bool {
        matches!(self, FreeSymbol::Index(_) | FreeSymbol::Indexed(_))
    }
}

impl fmt::Display for FreeSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeSymbol::Scalar(s) => write!(f, "{}", s),
            FreeSymbol::Index(i) => write!(f, "{}", i),
            FreeSymbol::Indexed(s) => write!(f, "{}", s),
        }
    }
}

fn push_unique<T: PartialEq>(out: &mut Vec<T>, item: T) {
    if !out.contains(&item) {
        out.push(item);
    }
}

impl Expr {
    /// Free symbols in first-occurrence order, without duplicates.
    ///
    /// Indices bound by an enclosing sum are not free. Symbols appearing only
    /// inside index bounds are not reported.
    pub fn free_symbols(&self) -> Vec<FreeSymbol> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        self.collect_free(&mut bound, &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<Index>, out: &mut Vec<FreeSymbol>) {
        fn free_index(idx: &Index, bound: &[Index], out: &mut Vec<FreeSymbol>) {
            if !bound.contains(idx) {
                push_unique(out, FreeSymbol::Index(idx.clone()));
            }
        }
        match self {
            Expr::Number(_) | Expr::ImaginaryUnit => {}
            Expr::Symbol(s) => push_unique(out, FreeSymbol::Scalar(s.clone())),
            Expr::Indexed(s) => {
                push_unique(out, FreeSymbol::Indexed(s.clone()));
                for idx in &s.indices {
                    free_index(idx, bound, out);
                }
            }
            Expr::Index(idx) => free_index(idx, bound, out),
            Expr::Add(items) | Expr::Mul(items) | Expr::Call(_, items) => {
                for item in items {
                    item.collect_free(bound, out);
                }
            }
            Expr::Pow(base, exp) => {
                base.collect_free(bound, out);
                exp.collect_free(bound, out);
            }
            Expr::Neg(inner) => inner.collect_free(bound, out),
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                for other in distinct_from {
                    free_index(other, bound, out);
                }
                bound.push(index.clone());
                body.collect_free(bound, out);
                bound.pop();
            }
            Expr::Distinct { a, b, body } => {
                free_index(a, bound, out);
                free_index(b, bound, out);
                body.collect_free(bound, out);
            }
        }
    }

    /// Every index mentioned anywhere, bound or free, in first-occurrence order
    pub fn indices(&self) -> Vec<Index> {
        let mut out = Vec::new();
        self.collect_indices(&mut out);
        out
    }

    fn collect_indices(&self, out: &mut Vec<Index>) {
        match self {
            Expr::Number(_) | Expr::ImaginaryUnit | Expr::Symbol(_) => {}
            Expr::Indexed(s) => {
                for idx in &s.indices {
                    push_unique(out, idx.clone());
                }
            }
            Expr::Index(idx) => push_unique(out, idx.clone()),
            Expr::Add(items) | Expr::Mul(items) | Expr::Call(_, items) => {
                for item in items {
                    item.collect_indices(out);
                }
            }
            Expr::Pow(base, exp) => {
                base.collect_indices(out);
                exp.collect_indices(out);
            }
            Expr::Neg(inner) => inner.collect_indices(out),
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                push_unique(out, index.clone());
                for other in distinct_from {
                    push_unique(out, other.clone());
                }
                body.collect_indices(out);
            }
            Expr::Distinct { a, b, body } => {
                push_unique(out, a.clone());
                push_unique(out, b.clone());
                body.collect_indices(out);
            }
        }
    }

    /// Whether the tree contains indexed symbols, indices, sums or guards
    pub fn has_index_structure(&self) -> bool {
        match self {
            Expr::Indexed(_) | Expr::Index(_) | Expr::Sum { .. } | Expr::Distinct { .. } => true,
            Expr::Number(_) | Expr::ImaginaryUnit | Expr::Symbol(_) => false,
            Expr::Add(items) | Expr::Mul(items) | Expr::Call(_, items) => {
                items.iter().any(|x| x.has_index_structure())
            }
            Expr::Pow(base, exp) => base.has_index_structure() || exp.has_index_structure(),
            Expr::Neg(inner) => inner.has_index_structure(),
        }
    }

    /// Replace free occurrences of the mapped symbols.
    ///
    /// An index bound by a sum shadows a mapping for the same index inside
    /// that sum's body.
    pub fn substitute(&self, map: &HashMap<FreeSymbol, Expr>) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        let mut bound = Vec::new();
        self.substitute_inner(map, &mut bound)
    }

    fn substitute_inner(&self, map: &HashMap<FreeSymbol, Expr>, bound: &mut Vec<Index>) -> Expr {
        match self {
            Expr::Number(_) | Expr::ImaginaryUnit => self.clone(),
            Expr::Symbol(s) => map
                .get(&FreeSymbol::Scalar(s.clone()))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Expr::Indexed(s) => map
                .get(&FreeSymbol::Indexed(s.clone()))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Expr::Index(idx) => {
                if bound.contains(idx) {
                    return self.clone();
                }
                map.get(&FreeSymbol::Index(idx.clone()))
                    .cloned()
                    .unwrap_or_else(|| self.clone())
            }
            Expr::Add(items) => Expr::Add(
                items
                    .iter()
                    .map(|x| x.substitute_inner(map, bound))
                    .collect(),
            ),
            Expr::Mul(items) => Expr::Mul(
                items
                    .iter()
                    .map(|x| x.substitute_inner(map, bound))
                    .collect(),
            ),
            Expr::Call(func, items) => Expr::Call(
                func.clone(),
                items
                    .iter()
                    .map(|x| x.substitute_inner(map, bound))
                    .collect(),
            ),
            Expr::Pow(base, exp) => Expr::Pow(
                Box::new(base.substitute_inner(map, bound)),
                Box::new(exp.substitute_inner(map, bound)),
            ),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.substitute_inner(map, bound))),
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                bound.push(index.clone());
                let body = body.substitute_inner(map, bound);
                bound.pop();
                Expr::Sum {
                    index: index.clone(),
                    distinct_from: distinct_from.clone(),
                    body: Box::new(body),
                }
            }
            Expr::Distinct { a, b, body } => Expr::Distinct {
                a: a.clone(),
                b: b.clone(),
                body: Box::new(body.substitute_inner(map, bound)),
            },
        }
    }

    /// Fold away subterms that are identically zero.
    ///
    /// Only zero propagation is performed: products with a zero factor, zero
    /// summands, negated zeros, sums and guards over a zero body, and calls of
    /// functions that map zero to zero.
    pub fn simplify_zeros(&self) -> Expr {
        match self {
            Expr::Add(items) => {
                let kept: Vec<Expr> = items
                    .iter()
                    .map(|x| x.simplify_zeros())
                    .filter(|x| !x.is_literal_zero())
                    .collect();
                match kept.len() {
                    0 => Expr::zero(),
                    1 => kept.into_iter().next().unwrap_or_else(Expr::zero),
                    _ => Expr::Add(kept),
                }
            }
            Expr::Mul(items) => {
                let factors: Vec<Expr> = items.iter().map(|x| x.simplify_zeros()).collect();
                if factors.iter().any(|x| x.is_literal_zero()) {
                    Expr::zero()
                } else {
                    Expr::Mul(factors)
                }
            }
            Expr::Pow(base, exp) => {
                let base = base.simplify_zeros();
                let exp = exp.simplify_zeros();
                match (&base, &exp) {
                    (Expr::Number(b), Expr::Number(e)) if *b == 0.0 && *e > 0.0 => Expr::zero(),
                    _ => Expr::Pow(Box::new(base), Box::new(exp)),
                }
            }
            Expr::Neg(inner) => {
                let inner = inner.simplify_zeros();
                if inner.is_literal_zero() {
                    Expr::zero()
                } else {
                    Expr::Neg(Box::new(inner))
                }
            }
            Expr::Call(func, args) => {
                let args: Vec<Expr> = args.iter().map(|x| x.simplify_zeros()).collect();
                if func.preserves_zero() && args.len() == 1 && args[0].is_literal_zero() {
                    Expr::zero()
                } else {
                    Expr::Call(func.clone(), args)
                }
            }
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                let body = body.simplify_zeros();
                if body.is_literal_zero() {
                    Expr::zero()
                } else {
                    Expr::Sum {
                        index: index.clone(),
                        distinct_from: distinct_from.clone(),
                        body: Box::new(body),
                    }
                }
            }
            Expr::Distinct { a, b, body } => {
                let body = body.simplify_zeros();
                if body.is_literal_zero() {
                    Expr::zero()
                } else {
                    Expr::Distinct {
                        a: a.clone(),
                        b: b.clone(),
                        body: Box::new(body),
                    }
                }
            }
            _ => self.clone(),
        }
    }

    fn is_literal_zero(&self) -> bool {
        matches!(self, Expr::Number(v) if *v == 0.0)
    }

    /// Zero-simplification test
    pub fn is_zero(&self) -> bool {
        self.simplify_zeros().is_literal_zero()
    }

    /// Evaluate numerically against the given bindings.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Complex64, CodegenError> {
        let mut sites = Vec::new();
        self.evaluate_at(bindings, &mut sites)
    }

    /// Evaluate with some indices fixed to concrete sites.
    pub fn evaluate_with_sites(
        &self,
        bindings: &Bindings,
        sites: &[(Index, i64)],
    ) -> Result<Complex64, CodegenError> {
        let mut sites = sites.to_vec();
        self.evaluate_at(bindings, &mut sites)
    }

    fn evaluate_at(
        &self,
        bindings: &Bindings,
        sites: &mut Vec<(Index, i64)>,
    ) -> Result<Complex64, CodegenError> {
        fn site_of(idx: &Index, sites: &[(Index, i64)]) -> Result<i64, CodegenError> {
            sites
                .iter()
                .rev()
                .find(|(bound, _)| bound == idx)
                .map(|(_, site)| *site)
                .ok_or_else(|| CodegenError::UnboundSymbol {
                    name: idx.to_string(),
                })
        }
        Ok(match self {
            Expr::Number(v) => Complex64::new(*v, 0.0),
            Expr::ImaginaryUnit => Complex64::i(),
            Expr::Symbol(s) => bindings.scalar(s)?,
            Expr::Indexed(s) => {
                let at = s
                    .indices
                    .iter()
                    .map(|idx| site_of(idx, sites))
                    .collect::<Result<Vec<i64>, _>>()?;
                bindings.indexed(s, &at)?
            }
            Expr::Index(idx) => Complex64::new(site_of(idx, sites)? as f64, 0.0),
            Expr::Add(items) => {
                let mut acc = Complex64::new(0.0, 0.0);
                for item in items {
                    acc += item.evaluate_at(bindings, sites)?;
                }
                acc
            }
            Expr::Mul(items) => {
                let mut acc = Complex64::new(1.0, 0.0);
                for item in items {
                    acc *= item.evaluate_at(bindings, sites)?;
                }
                acc
            }
            Expr::Pow(base, exp) => {
                let b = base.evaluate_at(bindings, sites)?;
                let e = exp.evaluate_at(bindings, sites)?;
                if e.im == 0.0 && e.re.fract() == 0.0 && e.re.abs() < i32::MAX as f64 {
                    b.powi(e.re as i32)
                } else {
                    b.powc(e)
                }
            }
            Expr::Neg(inner) => -inner.evaluate_at(bindings, sites)?,
            Expr::Call(func, args) => {
                let z = match args.first() {
                    Some(arg) => arg.evaluate_at(bindings, sites)?,
                    None => {
                        return Err(CodegenError::UnboundSymbol {
                            name: format!("{}()", func.name()),
                        })
                    }
                };
                match func {
                    super::Func::Sin => z.sin(),
                    super::Func::Cos => z.cos(),
                    super::Func::Exp => z.exp(),
                    super::Func::Log => z.ln(),
                    super::Func::Sqrt => z.sqrt(),
                    super::Func::Abs => Complex64::new(z.norm(), 0.0),
                    super::Func::Real => Complex64::new(z.re, 0.0),
                    super::Func::Imag => Complex64::new(z.im, 0.0),
                    super::Func::Conj | super::Func::Adjoint => z.conj(),
                    super::Func::Named(name) => {
                        return Err(CodegenError::UnboundSymbol { name: name.clone() })
                    }
                }
            }
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                let lo = bindings.bound(&index.lower)?;
                let hi = bindings.bound(&index.upper)?;
                let excluded = distinct_from
                    .iter()
                    .map(|idx| site_of(idx, sites))
                    .collect::<Result<HashSet<i64>, _>>()?;
                let mut acc = Complex64::new(0.0, 0.0);
                for site in lo..=hi {
                    if excluded.contains(&site) {
                        continue;
                    }
                    sites.push((index.clone(), site));
                    let term = body.evaluate_at(bindings, sites);
                    sites.pop();
                    acc += term?;
                }
                acc
            }
            Expr::Distinct { a, b, body } => {
                if site_of(a, sites)? == site_of(b, sites)? {
                    Complex64::new(0.0, 0.0)
                } else {
                    body.evaluate_at(bindings, sites)?
                }
            }
        })
    }
}

/// Numeric values for symbols, used for direct evaluation of expressions.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    scalars: HashMap<Symbol, Complex64>,
    indexed: HashMap<(Symbol, Vec<i64>), Complex64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a scalar symbol
    pub fn with(mut self, symbol: impl Into<Symbol>, value: impl Into<Complex64>) -> Self {
        self.scalars.insert(symbol.into(), value.into());
        self
    }

    /// Bind one site of an indexed symbol
    pub fn with_site(
        mut self,
        base: impl Into<Symbol>,
        sites: impl IntoIterator<Item = i64>,
        value: impl Into<Complex64>,
    ) -> Self {
        self.indexed
            .insert((base.into(), sites.into_iter().collect()), value.into());
        self
    }

    fn scalar(&self, symbol: &Symbol) -> Result<Complex64, CodegenError> {
        self.scalars
            .get(symbol)
            .copied()
            .ok_or_else(|| CodegenError::UnboundSymbol {
                name: symbol.to_string(),
            })
    }

    fn indexed(&self, symbol: &IndexedSymbol, sites: &[i64]) -> Result<Complex64, CodegenError> {
        self.indexed
            .get(&(symbol.base.clone(), sites.to_vec()))
            .copied()
            .ok_or_else(|| CodegenError::UnboundSymbol {
                name: format!("{}{:?}", symbol.base, sites),
            })
    }

    fn bound(&self, bound: &Bound) -> Result<i64, CodegenError> {
        match bound {
            Bound::Literal(v) => Ok(*v),
            Bound::Symbol(s) => Ok(self.scalar(s)?.re.round() as i64),
        }
    }
}
