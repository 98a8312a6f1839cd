//! Structural lowering from the symbolic tree into the IR

use std::collections::{HashMap, HashSet};

use super::layout::ParamLayout;
use super::relabel::{Relabel, RuleSet};
use crate::error::CodegenError;
use crate::ir::{Array, BinaryOp, Naming, Node};
use crate::symbolic::{Expr, Index, Symbol};

pub(crate) struct Lowering<'a> {
    scalars: &'a HashMap<Symbol, Node>,
    rules: &'a RuleSet,
    params: &'a ParamLayout,
    zero_fill: bool,
    reserved: HashSet<String>,
    scope: Vec<(Index, String)>,
    counter: usize,
    equation: String,
}

impl<'a> Lowering<'a> {
    pub fn new(
        scalars: &'a HashMap<Symbol, Node>,
        rules: &'a RuleSet,
        params: &'a ParamLayout,
        zero_fill: bool,
        naming: &Naming,
    ) -> Self {
        let reserved = [
            &naming.derivative,
            &naming.state,
            &naming.params,
            &naming.time,
        ]
        .into_iter()
        .cloned()
        .collect();
        Self {
            scalars,
            rules,
            params,
            zero_fill,
            reserved,
            scope: Vec::new(),
            counter: 0,
            equation: String::new(),
        }
    }

    /// A variable name for `index` that clashes with no argument or live variable
    pub fn fresh(&mut self, index: &Index) -> String {
        let base = index.label.to_string();
        let taken = |name: &str, this: &Self| {
            this.reserved.contains(name) || this.scope.iter().any(|(_, v)| v == name)
        };
        if !taken(&base, self) {
            return base;
        }
        loop {
            self.counter += 1;
            let candidate = format!("{}_{}", base, self.counter);
            if !taken(&candidate, self) {
                return candidate;
            }
        }
    }

    /// Reserve a name for the whole procedure, e.g. the loop variable
    pub fn reserve(&mut self, name: &str) {
        self.reserved.insert(name.to_string());
    }

    /// Lower one right-hand side; `site` binds the equation's own index to a loop variable.
    pub fn lower_equation(
        &mut self,
        equation: &str,
        rhs: &Expr,
        site: Option<(&Index, &str)>,
    ) -> Result<Node, CodegenError> {
        self.equation = equation.to_string();
        self.scope.clear();
        if let Some((index, var)) = site {
            self.scope.push((index.clone(), var.to_string()));
        }
        let node = self.lower(rhs);
        self.scope.clear();
        node
    }

    fn index_value(&self, index: &Index) -> Result<Node, CodegenError> {
        self.scope
            .iter()
            .rev()
            .find(|(bound, _)| bound == index)
            .map(|(_, var)| Node::var(var.clone()))
            .ok_or_else(|| {
                CodegenError::inconsistent_index(
                    self.equation.clone(),
                    format!("index '{}' is not bound by the loop or a sum", index),
                )
            })
    }

    fn lower(&mut self, expr: &Expr) -> Result<Node, CodegenError> {
        Ok(match expr {
            Expr::Number(v) => Node::Const(*v),
            Expr::ImaginaryUnit => Node::Named("im".to_string()),
            Expr::Symbol(s) => match self.scalars.get(s) {
                Some(node) => node.clone(),
                None => Node::Named(s.to_string()),
            },
            Expr::Indexed(s) => match self.rules.resolve(s) {
                Relabel::Access(rule) => {
                    let sites = s
                        .indices
                        .iter()
                        .map(|idx| self.index_value(idx))
                        .collect::<Result<Vec<_>, _>>()?;
                    rule.location(sites)
                }
                Relabel::Incompatible => {
                    let labels: Vec<String> = s.indices.iter().map(|i| i.to_string()).collect();
                    return Err(CodegenError::IncompatibleIndex {
                        symbol: s.base.to_string(),
                        index: labels.join(","),
                    });
                }
                Relabel::Unknown if self.zero_fill => {
                    let site = match s.indices.first() {
                        Some(idx) => self.index_value(idx)?,
                        None => Node::int(0),
                    };
                    Node::access(Array::Zero, site)
                }
                Relabel::Unknown => {
                    return Err(CodegenError::MissingSymbols {
                        names: vec![s.to_string()],
                    })
                }
            },
            Expr::Index(idx) => self.index_value(idx)?,
            Expr::Add(terms) => {
                let mut acc: Option<Node> = None;
                for term in terms {
                    acc = Some(match (acc, term) {
                        (None, t) => self.lower(t)?,
                        (Some(a), Expr::Neg(inner)) => {
                            Node::binary(BinaryOp::Sub, a, self.lower(inner)?)
                        }
                        (Some(a), t) => Node::binary(BinaryOp::Add, a, self.lower(t)?),
                    });
                }
                acc.unwrap_or(Node::Const(0.0))
            }
            Expr::Mul(factors) => {
                let mut acc: Option<Node> = None;
                for factor in factors {
                    let reciprocal = match factor {
                        Expr::Pow(base, exp) if **exp == Expr::Number(-1.0) => Some(base),
                        _ => None,
                    };
                    acc = Some(match (acc, reciprocal) {
                        (None, Some(base)) => {
                            Node::binary(BinaryOp::Div, Node::Const(1.0), self.lower(base)?)
                        }
                        (None, None) => self.lower(factor)?,
                        (Some(a), Some(base)) => Node::binary(BinaryOp::Div, a, self.lower(base)?),
                        (Some(a), None) => Node::binary(BinaryOp::Mul, a, self.lower(factor)?),
                    });
                }
                acc.unwrap_or(Node::Const(1.0))
            }
            Expr::Pow(base, exp) => Node::binary(BinaryOp::Pow, self.lower(base)?, self.lower(exp)?),
            Expr::Neg(inner) => Node::neg(self.lower(inner)?),
            Expr::Call(func, args) => Node::Call {
                func: func.name().to_string(),
                args: args
                    .iter()
                    .map(|a| self.lower(a))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            Expr::Sum {
                index,
                distinct_from,
                body,
            } => {
                let excluded = distinct_from
                    .iter()
                    .map(|idx| self.index_value(idx))
                    .collect::<Result<Vec<_>, _>>()?;
                let var = self.fresh(index);
                self.scope.push((index.clone(), var.clone()));
                let body = self.lower(body);
                self.scope.pop();
                Node::BoundedSum {
                    var,
                    lower: Box::new(self.params.bound_node(&index.lower)),
                    upper: Box::new(self.params.bound_node(&index.upper)),
                    excluded,
                    body: Box::new(body?),
                }
            }
            Expr::Distinct { a, b, body } => Node::Guarded {
                left: Box::new(self.index_value(a)?),
                right: Box::new(self.index_value(b)?),
                body: Box::new(self.lower(body)?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtraction_and_division_shapes() {
        let scalars: HashMap<Symbol, Node> = [
            (Symbol::new("a"), Node::access(Array::State, Node::int(0))),
            (Symbol::new("k"), Node::access(Array::Param, Node::int(0))),
        ]
        .into_iter()
        .collect();
        let rules = RuleSet::empty();
        let params = ParamLayout::default();
        let naming = Naming::default();
        let mut lowering = Lowering::new(&scalars, &rules, &params, false, &naming);

        let expr = Expr::sym("a") - Expr::sym("a") / Expr::sym("k");
        let node = lowering.lower_equation("a", &expr, None).unwrap();

        let a = Node::access(Array::State, Node::int(0));
        let k = Node::access(Array::Param, Node::int(0));
        assert_eq!(
            node,
            Node::binary(
                BinaryOp::Sub,
                a.clone(),
                Node::binary(BinaryOp::Div, a, k)
            )
        );
    }

    #[test]
    fn test_fresh_names_avoid_arguments() {
        let scalars = HashMap::new();
        let rules = RuleSet::empty();
        let params = ParamLayout::default();
        let naming = Naming::default();
        let mut lowering = Lowering::new(&scalars, &rules, &params, false, &naming);

        assert_eq!(lowering.fresh(&Index::new("i", 1, 2)), "i");
        assert_eq!(lowering.fresh(&Index::new("p", 1, 2)), "p_1");
    }

    #[test]
    fn test_unknown_family_without_zero_fill() {
        let scalars = HashMap::new();
        let rules = RuleSet::empty();
        let params = ParamLayout::default();
        let naming = Naming::default();
        let mut lowering = Lowering::new(&scalars, &rules, &params, false, &naming);

        let i = Index::new("i", 1, 2);
        let expr = Expr::indexed("m", [i.clone()]);
        let err = lowering
            .lower_equation("n_i", &expr, Some((&i, "i")))
            .unwrap_err();
        assert!(matches!(err, CodegenError::MissingSymbols { .. }));
    }
}
