//! Typed intermediate representation of a generated derivative procedure
//!
//! A [`Procedure`] is the inspectable, printable and cacheable result of code
//! generation. It has two backends: [`render`] prints it as source text and
//! [`crate::runtime`] compiles it to bytecode for in-process execution.
//!
//! Index arithmetic and numeric values share one [`Node`] type; the backends
//! tell them apart by position (array subscripts and loop bounds are index
//! context, everything else is value context).

mod canonical;
pub mod render;
mod typecheck;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodegenError;

pub(crate) use canonical::canonicalize;
pub(crate) use typecheck::{check_structure, check_tokens};

/// Arrays a procedure reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Array {
    State,
    Param,
    /// Placeholder for a zero-filled indexed symbol, removed before emission
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
}

/// A summation exclusion `var ≠ value`.
///
/// `absorbed` is set once the exclusion has been turned into an indicator
/// factor on the summand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub value: Node,
    pub absorbed: bool,
}

/// An expression in the intermediate representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Const(f64),
    ImaginaryUnit,
    /// A raw token from the symbolic engine, replaced during canonicalization
    Named(String),
    Time,
    /// A loop or summation variable
    Var(String),
    Access {
        array: Array,
        index: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        func: String,
        args: Vec<Node>,
    },
    /// Generic bounded sum as lowered from the symbolic tree
    BoundedSum {
        var: String,
        lower: Box<Node>,
        upper: Box<Node>,
        excluded: Vec<Node>,
        body: Box<Node>,
    },
    /// Native range sum
    Sum {
        var: String,
        lower: Box<Node>,
        upper: Box<Node>,
        excluded: Vec<Exclusion>,
        body: Box<Node>,
    },
    /// `body` when `left ≠ right`, zero otherwise
    Guarded {
        left: Box<Node>,
        right: Box<Node>,
        body: Box<Node>,
    },
    /// 1 when `left ≠ right`, 0 otherwise
    Indicator {
        left: Box<Node>,
        right: Box<Node>,
    },
    /// A symbol that could not be resolved; evaluating it is a runtime error
    Unresolved(String),
}

impl Node {
    pub fn int(v: i64) -> Node {
        Node::Const(v as f64)
    }

    pub fn var(name: impl Into<String>) -> Node {
        Node::Var(name.into())
    }

    pub fn access(array: Array, index: Node) -> Node {
        Node::Access {
            array,
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn neg(operand: Node) -> Node {
        Node::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }
    }

    pub fn indicator(left: Node, right: Node) -> Node {
        Node::Indicator {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Node::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0.0)
    }

    // Constant-folding constructors for index arithmetic

    pub fn add(lhs: Node, rhs: Node) -> Node {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Node::Const(a + b),
            (Some(a), _) if a == 0.0 => rhs,
            (_, Some(b)) if b == 0.0 => lhs,
            _ => Node::binary(BinaryOp::Add, lhs, rhs),
        }
    }

    pub fn sub(lhs: Node, rhs: Node) -> Node {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Node::Const(a - b),
            (_, Some(b)) if b == 0.0 => lhs,
            _ => Node::binary(BinaryOp::Sub, lhs, rhs),
        }
    }

    pub fn mul(lhs: Node, rhs: Node) -> Node {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Node::Const(a * b),
            (Some(a), _) if a == 1.0 => rhs,
            (_, Some(b)) if b == 1.0 => lhs,
            _ => Node::binary(BinaryOp::Mul, lhs, rhs),
        }
    }

    /// Rebuild the tree bottom-up, applying `f` to every node after its children.
    pub fn transform(self, f: &mut impl FnMut(Node) -> Node) -> Node {
        let node = match self {
            Node::Access { array, index } => Node::Access {
                array,
                index: Box::new(index.transform(f)),
            },
            Node::Unary { op, operand } => Node::Unary {
                op,
                operand: Box::new(operand.transform(f)),
            },
            Node::Binary { op, lhs, rhs } => Node::Binary {
                op,
                lhs: Box::new(lhs.transform(f)),
                rhs: Box::new(rhs.transform(f)),
            },
            Node::Call { func, args } => Node::Call {
                func,
                args: args.into_iter().map(|a| a.transform(f)).collect(),
            },
            Node::BoundedSum {
                var,
                lower,
                upper,
                excluded,
                body,
            } => Node::BoundedSum {
                var,
                lower: Box::new(lower.transform(f)),
                upper: Box::new(upper.transform(f)),
                excluded: excluded.into_iter().map(|e| e.transform(f)).collect(),
                body: Box::new(body.transform(f)),
            },
            Node::Sum {
                var,
                lower,
                upper,
                excluded,
                body,
            } => Node::Sum {
                var,
                lower: Box::new(lower.transform(f)),
                upper: Box::new(upper.transform(f)),
                excluded: excluded
                    .into_iter()
                    .map(|e| Exclusion {
                        value: e.value.transform(f),
                        absorbed: e.absorbed,
                    })
                    .collect(),
                body: Box::new(body.transform(f)),
            },
            Node::Guarded { left, right, body } => Node::Guarded {
                left: Box::new(left.transform(f)),
                right: Box::new(right.transform(f)),
                body: Box::new(body.transform(f)),
            },
            Node::Indicator { left, right } => Node::Indicator {
                left: Box::new(left.transform(f)),
                right: Box::new(right.transform(f)),
            },
            leaf => leaf,
        };
        f(node)
    }

    /// Visit every node in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match self {
            Node::Access { index, .. } => index.visit(f),
            Node::Unary { operand, .. } => operand.visit(f),
            Node::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Node::Call { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Node::BoundedSum {
                lower,
                upper,
                excluded,
                body,
                ..
            } => {
                lower.visit(f);
                upper.visit(f);
                excluded.iter().for_each(|e| e.visit(f));
                body.visit(f);
            }
            Node::Sum {
                lower,
                upper,
                excluded,
                body,
                ..
            } => {
                lower.visit(f);
                upper.visit(f);
                excluded.iter().for_each(|e| e.value.visit(f));
                body.visit(f);
            }
            Node::Guarded { left, right, body } => {
                left.visit(f);
                right.visit(f);
                body.visit(f);
            }
            Node::Indicator { left, right } => {
                left.visit(f);
                right.visit(f);
            }
            _ => {}
        }
    }

    /// Whether any node satisfies the predicate
    pub fn any(&self, pred: impl Fn(&Node) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |node| found |= pred(node));
        found
    }
}

/// A statement of the procedure body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// `derivative[slot] = value`
    Assign { slot: Node, value: Node },
    /// `for var in lower..=upper { body }`
    Loop {
        var: String,
        lower: Node,
        upper: Node,
        body: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn assign(slot: Node, value: Node) -> Stmt {
        Stmt::Assign { slot, value }
    }

    /// Apply a bottom-up node transform to every expression in the statement
    pub fn transform(self, f: &mut impl FnMut(Node) -> Node) -> Stmt {
        match self {
            Stmt::Assign { slot, value } => Stmt::Assign {
                slot: slot.transform(f),
                value: value.transform(f),
            },
            Stmt::Loop {
                var,
                lower,
                upper,
                body,
            } => Stmt::Loop {
                var,
                lower: lower.transform(f),
                upper: upper.transform(f),
                body: body.into_iter().map(|s| s.transform(f)).collect(),
            },
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&Node)) {
        match self {
            Stmt::Assign { slot, value } => {
                slot.visit(f);
                value.visit(f);
            }
            Stmt::Loop {
                lower, upper, body, ..
            } => {
                lower.visit(f);
                upper.visit(f);
                body.iter().for_each(|s| s.visit(f));
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Stmt::Assign { .. } => 0,
            Stmt::Loop { body, .. } => 1 + body.iter().map(Stmt::depth).max().unwrap_or(0),
        }
    }
}

/// Identifiers used for the four procedure arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Naming {
    pub derivative: String,
    pub state: String,
    pub params: String,
    pub time: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            derivative: "du".to_string(),
            state: "u".to_string(),
            params: "p".to_string(),
            time: "t".to_string(),
        }
    }
}

/// Where a state or parameter lives in its flat array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutEntry {
    Scalar { name: String, slot: usize },
    /// An indexed family occupying `start..start + len`
    Family { name: String, start: Node, len: Node },
}

impl LayoutEntry {
    pub fn name(&self) -> &str {
        match self {
            LayoutEntry::Scalar { name, .. } | LayoutEntry::Family { name, .. } => name,
        }
    }
}

/// A generated derivative procedure `(derivative, state, params, time)`.
///
/// Immutable once built. It never executes anything by itself; see
/// [`crate::runtime::materialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    naming: Naming,
    states: Vec<LayoutEntry>,
    params: Vec<LayoutEntry>,
    body: Vec<Stmt>,
    check_bounds: bool,
}

impl Procedure {
    pub(crate) fn new(
        naming: Naming,
        states: Vec<LayoutEntry>,
        params: Vec<LayoutEntry>,
        body: Vec<Stmt>,
        check_bounds: bool,
    ) -> Self {
        Self {
            naming,
            states,
            params,
            body,
            check_bounds,
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// State layout in slot order
    pub fn states(&self) -> &[LayoutEntry] {
        &self.states
    }

    /// Parameter layout in declaration order
    pub fn params(&self) -> &[LayoutEntry] {
        &self.params
    }

    pub fn body(&self) -> &[Stmt] {
        &self.body
    }

    pub fn check_bounds(&self) -> bool {
        self.check_bounds
    }

    /// Deepest loop nesting in the body
    pub fn loop_depth(&self) -> usize {
        self.body.iter().map(Stmt::depth).max().unwrap_or(0)
    }

    /// Whether evaluating the body needs complex arithmetic
    pub fn uses_imaginary_unit(&self) -> bool {
        let mut found = false;
        for stmt in &self.body {
            stmt.visit(&mut |node| found |= matches!(node, Node::ImaginaryUnit));
        }
        found
    }

    /// Source text of the procedure over complex numbers
    pub fn render_source(&self) -> String {
        render::render(self, render::Dialect::COMPLEX)
    }

    pub fn to_json(&self) -> Result<String, CodegenError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore a cached procedure, re-running the structural checks
    pub fn from_json(json: &str) -> Result<Self, CodegenError> {
        let procedure: Procedure = serde_json::from_str(json)?;
        check_structure(&procedure)?;
        Ok(procedure)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folding_constructors() {
        assert_eq!(Node::add(Node::int(2), Node::int(3)), Node::int(5));
        assert_eq!(Node::add(Node::int(0), Node::var("i")), Node::var("i"));
        assert_eq!(Node::mul(Node::var("i"), Node::int(1)), Node::var("i"));
        assert_eq!(Node::sub(Node::var("i"), Node::int(0)), Node::var("i"));
    }

    #[test]
    fn test_transform_is_bottom_up() {
        let node = Node::binary(
            BinaryOp::Add,
            Node::access(Array::Zero, Node::var("j")),
            Node::int(1),
        );
        let out = node.transform(&mut |n| match n {
            Node::Access {
                array: Array::Zero, ..
            } => Node::int(0),
            Node::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
            } => Node::add(*lhs, *rhs),
            other => other,
        });
        assert_eq!(out, Node::int(1));
    }

    #[test]
    fn test_loop_depth() {
        let body = vec![
            Stmt::assign(Node::int(0), Node::int(1)),
            Stmt::Loop {
                var: "i".into(),
                lower: Node::int(1),
                upper: Node::int(2),
                body: vec![Stmt::assign(Node::var("i"), Node::int(0))],
            },
        ];
        let procedure = Procedure::new(Naming::default(), vec![], vec![], body, true);
        assert_eq!(procedure.loop_depth(), 1);
    }
}
