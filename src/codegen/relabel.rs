//! Index relabeling rule engine
//!
//! A family is declared once over its own indices, e.g. `n_i` or `J_{i,j}`,
//! but right-hand sides refer to it through any index with the same range
//! (`n_j`, `J_{j,i}`). For every family this builds one rule per legal
//! relabeling, keyed by `(base symbol, index tuple)`. Occurrences are
//! resolved by lookup in that table.

use std::collections::{HashMap, HashSet};

use super::layout::{ParamLayout, StateLayout};
use crate::equations::EquationSet;
use crate::error::CodegenError;
use crate::ir::{Array, Node};
use crate::symbolic::{Index, IndexedSymbol, Symbol};

#[derive(Debug, Clone, PartialEq)]
struct RuleDim {
    lower: Node,
    stride: Node,
}

/// Location of an indexed symbol in its flat array.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AccessRule {
    array: Array,
    start: Node,
    dims: Vec<RuleDim>,
}

impl AccessRule {
    /// Array access for the given site of every dimension
    pub fn location(&self, sites: Vec<Node>) -> Node {
        let mut at = self.start.clone();
        for (dim, site) in self.dims.iter().zip(sites) {
            let offset = Node::mul(Node::sub(site, dim.lower.clone()), dim.stride.clone());
            at = Node::add(at, offset);
        }
        Node::access(self.array, at)
    }
}

/// Outcome of resolving one indexed occurrence
#[derive(Debug)]
pub(crate) enum Relabel<'a> {
    Access(&'a AccessRule),
    /// The family exists but not over these indices
    Incompatible,
    Unknown,
}

struct FamilyDecl {
    base: Symbol,
    declared: Vec<Index>,
    rule: AccessRule,
}

#[derive(Debug, Default)]
pub(crate) struct RuleSet {
    rules: HashMap<(Symbol, Vec<Index>), AccessRule>,
    families: HashSet<Symbol>,
}

/// Every index mentioned anywhere in the system, in first-occurrence order
pub(crate) fn declared_indices(eqs: &EquationSet, params: &ParamLayout) -> Vec<Index> {
    let mut declared: Vec<Index> = Vec::new();
    let from_eqs = eqs
        .iter()
        .flat_map(|eq| eq.lhs().indices().into_iter().chain(eq.rhs().indices()));
    let from_params = params.families().iter().flat_map(|f| f.indices.clone());
    for idx in from_eqs.chain(from_params) {
        if !declared.contains(&idx) {
            declared.push(idx);
        }
    }
    declared
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Generate the rules for all state and parameter families.
    ///
    /// Fails with [`CodegenError::RelabelLimit`] before generating anything
    /// if more than `limit` rules would be needed.
    pub fn build(
        states: &StateLayout,
        params: &ParamLayout,
        declared: &[Index],
        limit: usize,
    ) -> Result<Self, CodegenError> {
        let state_decls = states.families().iter().map(|f| FamilyDecl {
            base: f.base.clone(),
            declared: vec![f.index.clone()],
            rule: AccessRule {
                array: Array::State,
                start: f.start.clone(),
                dims: vec![RuleDim {
                    lower: params.bound_node(&f.index.lower),
                    stride: Node::int(1),
                }],
            },
        });
        let param_decls = params.families().iter().map(|f| FamilyDecl {
            base: f.base.clone(),
            declared: f.indices.clone(),
            rule: AccessRule {
                array: Array::Param,
                start: Node::int(f.start as i64),
                dims: f
                    .dims
                    .iter()
                    .zip(f.strides())
                    .map(|((lower, _), stride)| RuleDim {
                        lower: Node::int(*lower),
                        stride: Node::int(stride as i64),
                    })
                    .collect(),
            },
        });
        let decls: Vec<FamilyDecl> = state_decls.chain(param_decls).collect();

        let candidates: Vec<Vec<Vec<Index>>> = decls
            .iter()
            .map(|decl| {
                decl.declared
                    .iter()
                    .map(|own| {
                        declared
                            .iter()
                            .filter(|idx| idx.same_range(own))
                            .cloned()
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let required = candidates
            .iter()
            .map(|dims| {
                dims.iter()
                    .fold(1usize, |acc, c: &Vec<Index>| acc.saturating_mul(c.len()))
            })
            .fold(0usize, usize::saturating_add);
        if required > limit {
            return Err(CodegenError::RelabelLimit { required, limit });
        }

        let mut set = RuleSet::empty();
        for (decl, dims) in decls.into_iter().zip(candidates) {
            let mut tuples: Vec<Vec<Index>> = vec![Vec::new()];
            for choices in &dims {
                tuples = tuples
                    .into_iter()
                    .flat_map(|prefix| {
                        choices.iter().map(move |idx| {
                            let mut tuple = prefix.clone();
                            tuple.push(idx.clone());
                            tuple
                        })
                    })
                    .collect();
            }
            tracing::trace!(family = %decl.base, rules = tuples.len(), "generated relabel rules");
            for tuple in tuples {
                set.rules
                    .insert((decl.base.clone(), tuple), decl.rule.clone());
            }
            set.families.insert(decl.base);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Look up the rule matching an occurrence
    pub fn resolve(&self, symbol: &IndexedSymbol) -> Relabel<'_> {
        match self.rules.get(&(symbol.base.clone(), symbol.indices.clone())) {
            Some(rule) => Relabel::Access(rule),
            None if self.families.contains(&symbol.base) => Relabel::Incompatible,
            None => Relabel::Unknown,
        }
    }
}
