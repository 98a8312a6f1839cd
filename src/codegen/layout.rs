//! Flat memory layout of states and parameters
//!
//! States: scalars first in equation order, then one contiguous block per
//! indexed family. Parameters: declaration order, indexed families flattened
//! row-major.

use std::collections::HashMap;

use crate::equations::{Equation, EquationKind, EquationSet};
use crate::error::CodegenError;
use crate::ir::{Array, LayoutEntry, Node};
use crate::symbolic::{Bound, Expr, Index, Symbol};

/// Stable split of an equation set into its scalar block and its indexed block.
///
/// Rejects lhs with more than one index and free right-hand side indices the
/// lhs does not carry, and requires every family to share one range.
pub(crate) fn partition(eqs: &EquationSet) -> Result<(Vec<&Equation>, Vec<&Equation>), CodegenError> {
    let mut scalars = Vec::new();
    let mut indexed: Vec<&Equation> = Vec::new();
    for eq in eqs.iter() {
        let own = eq.lhs_indices();
        if own.len() > 1 {
            return Err(CodegenError::UnsupportedDepth {
                equation: eq.name(),
                depth: eq.kind().depth(),
            });
        }
        let free = match eq.kind() {
            EquationKind::Scalar => &[][..],
            EquationKind::Indexed(free) => &free[..],
        };
        if let Some(stray) = free.iter().find(|idx| !own.contains(idx)) {
            let reason = if own.is_empty() {
                format!("scalar lhs but the rhs carries free index '{}'", stray)
            } else {
                format!("rhs carries free index '{}' besides the lhs index '{}'", stray, own[0])
            };
            return Err(CodegenError::inconsistent_index(eq.name(), reason));
        }
        match own.first() {
            None => scalars.push(eq),
            Some(idx) => {
                if let Some(first) = indexed.first().and_then(|f| f.lhs_indices().first()) {
                    if !first.same_range(idx) {
                        return Err(CodegenError::inconsistent_index(
                            eq.name(),
                            format!(
                                "range {}..={} differs from the loop range {}..={}",
                                idx.lower, idx.upper, first.lower, first.upper
                            ),
                        ));
                    }
                }
                indexed.push(eq);
            }
        }
    }
    tracing::debug!(
        scalars = scalars.len(),
        families = indexed.len(),
        "partitioned equations"
    );
    Ok((scalars, indexed))
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// A flattened indexed parameter family
#[derive(Debug, Clone)]
pub(crate) struct ParamFamily {
    pub base: Symbol,
    pub indices: Vec<Index>,
    pub start: usize,
    /// `(lower, len)` per dimension
    pub dims: Vec<(i64, usize)>,
}

impl ParamFamily {
    fn len(&self) -> usize {
        self.dims.iter().map(|(_, len)| *len).product()
    }

    /// Row-major stride of each dimension
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for d in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.dims[d + 1].1;
        }
        strides
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ParamLayout {
    scalars: Vec<(Symbol, usize)>,
    families: Vec<ParamFamily>,
}

impl ParamLayout {
    pub fn new(params: &[Expr]) -> Result<Self, CodegenError> {
        let mut layout = ParamLayout::default();
        let mut next = 0;
        for param in params {
            match param {
                Expr::Symbol(s) => {
                    layout.ensure_new(s)?;
                    layout.scalars.push((s.clone(), next));
                    next += 1;
                }
                Expr::Indexed(s) => {
                    layout.ensure_new(&s.base)?;
                    let dims = s
                        .indices
                        .iter()
                        .map(|idx| match (idx.lower.as_literal(), idx.len()) {
                            (Some(lower), Some(len)) => Ok((lower, len)),
                            _ => Err(CodegenError::invalid_param(
                                s.to_string(),
                                format!("index '{}' needs literal bounds", idx),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let family = ParamFamily {
                        base: s.base.clone(),
                        indices: s.indices.clone(),
                        start: next,
                        dims,
                    };
                    next += family.len();
                    layout.families.push(family);
                }
                other => {
                    return Err(CodegenError::invalid_param(
                        other.to_string(),
                        "expected a symbol or an indexed symbol",
                    ))
                }
            }
        }
        Ok(layout)
    }

    fn ensure_new(&self, symbol: &Symbol) -> Result<(), CodegenError> {
        let taken = self.scalars.iter().any(|(s, _)| s == symbol)
            || self.families.iter().any(|f| &f.base == symbol);
        if taken {
            return Err(CodegenError::invalid_param(symbol.to_string(), "declared twice"));
        }
        Ok(())
    }

    pub fn scalars(&self) -> &[(Symbol, usize)] {
        &self.scalars
    }

    pub fn families(&self) -> &[ParamFamily] {
        &self.families
    }

    pub fn scalar_slot(&self, symbol: &Symbol) -> Option<usize> {
        self.scalars
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, slot)| *slot)
    }

    /// A loop or sum bound as an index expression.
    ///
    /// Symbolic bounds resolve to the matching scalar parameter; anything else
    /// is left unresolved and fails when the procedure runs.
    pub fn bound_node(&self, bound: &Bound) -> Node {
        match bound {
            Bound::Literal(v) => Node::int(*v),
            Bound::Symbol(s) => match self.scalar_slot(s) {
                Some(slot) => Node::access(Array::Param, Node::int(slot as i64)),
                None => {
                    tracing::warn!(symbol = %s, "index bound is not a parameter, deferring to runtime");
                    Node::Unresolved(s.to_string())
                }
            },
        }
    }

    /// Number of sites of an index
    pub fn range_len(&self, index: &Index) -> Node {
        let lower = self.bound_node(&index.lower);
        let upper = self.bound_node(&index.upper);
        match lower.as_const() {
            Some(l) => Node::add(upper, Node::Const(1.0 - l)),
            None => Node::add(Node::sub(upper, lower), Node::int(1)),
        }
    }

    pub fn entries(&self) -> Vec<LayoutEntry> {
        let mut entries: Vec<(usize, LayoutEntry)> = self
            .scalars
            .iter()
            .map(|(s, slot)| {
                (
                    *slot,
                    LayoutEntry::Scalar {
                        name: s.to_string(),
                        slot: *slot,
                    },
                )
            })
            .chain(self.families.iter().map(|f| {
                (
                    f.start,
                    LayoutEntry::Family {
                        name: f.base.to_string(),
                        start: Node::int(f.start as i64),
                        len: Node::int(f.len() as i64),
                    },
                )
            }))
            .collect();
        entries.sort_by_key(|(slot, _)| *slot);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// States
// ─────────────────────────────────────────────────────────────────────────────

/// A one-dimensional indexed state family
#[derive(Debug, Clone)]
pub(crate) struct StateFamily {
    pub base: Symbol,
    pub index: Index,
    pub start: Node,
    pub len: Node,
}

impl StateFamily {
    /// Slot of the site whose index evaluates to `site`
    pub fn slot(&self, site: Node, params: &ParamLayout) -> Node {
        Node::add(
            self.start.clone(),
            Node::sub(site, params.bound_node(&self.index.lower)),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StateLayout {
    scalars: Vec<(Symbol, usize)>,
    families: Vec<StateFamily>,
}

impl StateLayout {
    /// Scalars occupy `0..n`; family `f` starts at `n + Σ len(previous)`.
    pub fn new(scalars: &[&Equation], indexed: &[&Equation], params: &ParamLayout) -> Self {
        let scalars: Vec<(Symbol, usize)> = scalars
            .iter()
            .enumerate()
            .map(|(slot, eq)| (eq.state().clone(), slot))
            .collect();
        let mut offset = Node::int(scalars.len() as i64);
        let mut families = Vec::with_capacity(indexed.len());
        for eq in indexed {
            let Some(index) = eq.lhs_indices().first() else {
                continue;
            };
            let len = params.range_len(index);
            families.push(StateFamily {
                base: eq.state().clone(),
                index: index.clone(),
                start: offset.clone(),
                len: len.clone(),
            });
            offset = Node::add(offset, len);
        }
        Self { scalars, families }
    }

    /// Layout of a system without indexed families
    pub fn scalar_block(states: &[Symbol]) -> Self {
        Self {
            scalars: states.iter().cloned().zip(0..).collect(),
            families: Vec::new(),
        }
    }

    pub fn scalars(&self) -> &[(Symbol, usize)] {
        &self.scalars
    }

    pub fn families(&self) -> &[StateFamily] {
        &self.families
    }

    pub fn entries(&self) -> Vec<LayoutEntry> {
        self.scalars
            .iter()
            .map(|(s, slot)| LayoutEntry::Scalar {
                name: s.to_string(),
                slot: *slot,
            })
            .chain(self.families.iter().map(|f| LayoutEntry::Family {
                name: f.base.to_string(),
                start: f.start.clone(),
                len: f.len.clone(),
            }))
            .collect()
    }
}

/// Scalar substitution map: states, scalar parameters and the time symbol.
pub(crate) fn scalar_substitutions(
    states: &StateLayout,
    params: &ParamLayout,
    time: Option<&Symbol>,
) -> Result<HashMap<Symbol, Node>, CodegenError> {
    let mut map = HashMap::new();
    for (symbol, slot) in states.scalars() {
        map.insert(symbol.clone(), Node::access(Array::State, Node::int(*slot as i64)));
    }
    for (symbol, slot) in params.scalars() {
        let shadows_state = map.contains_key(symbol)
            || states.families().iter().any(|f| &f.base == symbol);
        if shadows_state {
            return Err(CodegenError::invalid_param(symbol.to_string(), "shadows a state"));
        }
        map.insert(symbol.clone(), Node::access(Array::Param, Node::int(*slot as i64)));
    }
    if let Some(time) = time {
        map.insert(time.clone(), Node::Time);
    }
    Ok(map)
}
