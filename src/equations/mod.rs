//! Equations and equation sets
//!
//! Every [`Equation`] is tagged once, at construction, as either scalar or
//! belonging to an index family. The code generator dispatches on these tags
//! instead of re-inspecting expressions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CodegenError;
use crate::symbolic::{Expr, FreeSymbol, Index, Symbol};

/// Whether an equation is a single scalar equation or a templated family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationKind {
    Scalar,
    /// Free indices of the equation, left-hand side first
    Indexed(Vec<Index>),
}

impl EquationKind {
    /// Number of free indices, i.e. the loop depth needed to emit the equation
    pub fn depth(&self) -> usize {
        match self {
            EquationKind::Scalar => 0,
            EquationKind::Indexed(indices) => indices.len(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, EquationKind::Scalar)
    }
}

/// A system-level tag: any indexed content sends the set down the indexed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Scalar,
    Indexed,
}

/// One differential equation `d(lhs)/dt = rhs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Equation {
    lhs: Expr,
    rhs: Expr,
    kind: EquationKind,
}

impl Equation {
    /// Create an equation; the left-hand side must be a symbol or an indexed symbol.
    pub fn new(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Result<Self, CodegenError> {
        let lhs = lhs.into();
        if !matches!(lhs, Expr::Symbol(_) | Expr::Indexed(_)) {
            return Err(CodegenError::InvalidLhs {
                expr: lhs.to_string(),
            });
        }
        Ok(Self::tagged(lhs, rhs.into()))
    }

    fn tagged(lhs: Expr, rhs: Expr) -> Self {
        let mut free: Vec<Index> = lhs_indices(&lhs).to_vec();
        for symbol in rhs.free_symbols() {
            if let FreeSymbol::Index(idx) = symbol {
                if !free.contains(&idx) {
                    free.push(idx);
                }
            }
        }
        let kind = if free.is_empty() {
            EquationKind::Scalar
        } else {
            EquationKind::Indexed(free)
        };
        Self { lhs, rhs, kind }
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn kind(&self) -> &EquationKind {
        &self.kind
    }

    /// Indices carried by the left-hand side
    pub fn lhs_indices(&self) -> &[Index] {
        lhs_indices(&self.lhs)
    }

    /// The state symbol this equation defines, without its indices
    pub fn state(&self) -> &Symbol {
        match &self.lhs {
            Expr::Indexed(s) => &s.base,
            Expr::Symbol(s) => s,
            _ => unreachable!("lhs is checked in Equation::new"),
        }
    }

    /// Display name of the left-hand side
    pub fn name(&self) -> String {
        self.lhs.to_string()
    }

    fn substituted(&self, map: &HashMap<FreeSymbol, Expr>) -> (Expr, Expr) {
        (
            self.lhs.substitute(map).simplify_zeros(),
            self.rhs.substitute(map).simplify_zeros(),
        )
    }
}

fn lhs_indices(lhs: &Expr) -> &[Index] {
    match lhs {
        Expr::Indexed(s) => &s.indices,
        _ => &[],
    }
}

/// An ordered set of equations with pairwise distinct left-hand sides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquationSet {
    equations: Vec<Equation>,
    time: Option<Symbol>,
}

impl EquationSet {
    pub fn new(equations: Vec<Equation>) -> Result<Self, CodegenError> {
        let mut seen = HashSet::new();
        for eq in &equations {
            if !seen.insert(eq.state().clone()) {
                return Err(CodegenError::DuplicateLhs {
                    name: eq.state().to_string(),
                });
            }
        }
        Ok(Self {
            equations,
            time: None,
        })
    }

    /// Build from `(lhs, rhs)` pairs
    pub fn from_pairs<L, R>(pairs: impl IntoIterator<Item = (L, R)>) -> Result<Self, CodegenError>
    where
        L: Into<Expr>,
        R: Into<Expr>,
    {
        let equations = pairs
            .into_iter()
            .map(|(lhs, rhs)| Equation::new(lhs, rhs))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(equations)
    }

    /// Declare the independent variable appearing on right-hand sides
    pub fn with_time(mut self, time: impl Into<Symbol>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn time(&self) -> Option<&Symbol> {
        self.time.as_ref()
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Equation> {
        self.equations.iter()
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn lhs(&self) -> Vec<Expr> {
        self.equations.iter().map(|eq| eq.lhs.clone()).collect()
    }

    pub fn rhs(&self) -> Vec<Expr> {
        self.equations.iter().map(|eq| eq.rhs.clone()).collect()
    }

    pub fn kind(&self) -> SystemKind {
        let indexed = self
            .equations
            .iter()
            .any(|eq| !eq.kind.is_scalar() || eq.rhs.has_index_structure());
        if indexed {
            SystemKind::Indexed
        } else {
            SystemKind::Scalar
        }
    }

    /// Substitute every missing symbol with zero, dropping equations whose
    /// left-hand side vanishes.
    pub fn remove_unknowns(&self, missing: &[FreeSymbol]) -> Self {
        if missing.is_empty() {
            return self.clone();
        }
        let map: HashMap<FreeSymbol, Expr> = missing
            .iter()
            .map(|symbol| (symbol.clone(), Expr::zero()))
            .collect();
        let equations = self
            .equations
            .iter()
            .filter_map(|eq| {
                let (lhs, rhs) = eq.substituted(&map);
                if lhs.is_zero() {
                    tracing::debug!(equation = %eq.name(), "dropping equation with vanished lhs");
                    None
                } else {
                    Some(Equation::tagged(lhs, rhs))
                }
            })
            .collect();
        Self {
            equations,
            time: self.time.clone(),
        }
    }
}
