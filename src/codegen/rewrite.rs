//! Ordered rewrite passes over lowered right-hand sides
//!
//! 1. generic bounded sums become native range sums
//! 2. inequality guards and sum exclusions become indicator factors
//! 3. absorbed exclusions are stripped, leaving plain ranges
//! 4. zero-array accesses collapse to `0` and zero subterms fold away
//!
//! The order matters: exclusions can only be stripped once the indicator
//! carries their meaning.

use crate::ir::{Array, BinaryOp, Exclusion, Node, UnaryOp};

/// Run all four passes in order
pub(crate) fn apply(node: Node) -> Node {
    let node = native_sums(node);
    let node = absorb_guards(node);
    let node = strip_exclusions(node);
    collapse_zeros(node)
}

pub(crate) fn native_sums(node: Node) -> Node {
    node.transform(&mut |n| match n {
        Node::BoundedSum {
            var,
            lower,
            upper,
            excluded,
            body,
        } => Node::Sum {
            var,
            lower,
            upper,
            excluded: excluded
                .into_iter()
                .map(|value| Exclusion {
                    value,
                    absorbed: false,
                })
                .collect(),
            body,
        },
        other => other,
    })
}

pub(crate) fn absorb_guards(node: Node) -> Node {
    node.transform(&mut |n| match n {
        Node::Guarded { left, right, body } => Node::binary(
            BinaryOp::Mul,
            Node::Indicator { left, right },
            *body,
        ),
        Node::Sum {
            var,
            lower,
            upper,
            excluded,
            body,
        } => {
            let mut body = *body;
            let mut marked = Vec::with_capacity(excluded.len());
            for exclusion in excluded {
                if !exclusion.absorbed {
                    body = Node::binary(
                        BinaryOp::Mul,
                        Node::indicator(Node::var(var.clone()), exclusion.value.clone()),
                        body,
                    );
                }
                marked.push(Exclusion {
                    value: exclusion.value,
                    absorbed: true,
                });
            }
            Node::Sum {
                var,
                lower,
                upper,
                excluded: marked,
                body: Box::new(body),
            }
        }
        other => other,
    })
}

pub(crate) fn strip_exclusions(node: Node) -> Node {
    node.transform(&mut |n| match n {
        Node::Sum {
            var,
            lower,
            upper,
            mut excluded,
            body,
        } => {
            excluded.retain(|e| !e.absorbed);
            Node::Sum {
                var,
                lower,
                upper,
                excluded,
                body,
            }
        }
        other => other,
    })
}

/// Functions with `f(0) = 0`
fn preserves_zero(func: &str) -> bool {
    matches!(func, "sin" | "sqrt" | "abs" | "real" | "imag" | "conj")
}

pub(crate) fn collapse_zeros(node: Node) -> Node {
    node.transform(&mut |n| match n {
        Node::Access {
            array: Array::Zero,
            ..
        } => Node::Const(0.0),
        Node::Binary { op, lhs, rhs } => {
            let (l, r) = (lhs.is_zero(), rhs.is_zero());
            match op {
                BinaryOp::Mul if l || r => Node::Const(0.0),
                BinaryOp::Div if l => Node::Const(0.0),
                BinaryOp::Add if l => *rhs,
                BinaryOp::Add | BinaryOp::Sub if r => *lhs,
                BinaryOp::Sub if l => Node::neg(*rhs),
                BinaryOp::Pow if l && rhs.as_const().is_some_and(|e| e > 0.0) => Node::Const(0.0),
                _ => Node::Binary { op, lhs, rhs },
            }
        }
        Node::Unary {
            op: UnaryOp::Neg,
            operand,
        } if operand.is_zero() => Node::Const(0.0),
        Node::Call { func, args } if preserves_zero(&func) && args.len() == 1 && args[0].is_zero() => {
            Node::Const(0.0)
        }
        Node::Sum { ref body, .. } if body.is_zero() => Node::Const(0.0),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(index: Node) -> Node {
        Node::access(Array::State, index)
    }

    #[test]
    fn test_exclusion_becomes_indicator_on_plain_range() {
        let bounded = Node::BoundedSum {
            var: "j".into(),
            lower: Box::new(Node::int(1)),
            upper: Box::new(Node::int(2)),
            excluded: vec![Node::var("i")],
            body: Box::new(state(Node::var("j"))),
        };
        let out = apply(bounded);
        assert_eq!(
            out,
            Node::Sum {
                var: "j".into(),
                lower: Box::new(Node::int(1)),
                upper: Box::new(Node::int(2)),
                excluded: vec![],
                body: Box::new(Node::binary(
                    BinaryOp::Mul,
                    Node::indicator(Node::var("j"), Node::var("i")),
                    state(Node::var("j")),
                )),
            }
        );
    }

    #[test]
    fn test_guard_becomes_indicator_product() {
        let guarded = Node::Guarded {
            left: Box::new(Node::var("i")),
            right: Box::new(Node::var("j")),
            body: Box::new(state(Node::var("j"))),
        };
        assert_eq!(
            absorb_guards(guarded),
            Node::binary(
                BinaryOp::Mul,
                Node::indicator(Node::var("i"), Node::var("j")),
                state(Node::var("j")),
            )
        );
    }

    #[test]
    fn test_absorption_runs_once() {
        let sum = native_sums(Node::BoundedSum {
            var: "j".into(),
            lower: Box::new(Node::int(1)),
            upper: Box::new(Node::int(2)),
            excluded: vec![Node::var("i")],
            body: Box::new(Node::var("j")),
        });
        let once = absorb_guards(sum);
        assert_eq!(absorb_guards(once.clone()), once);
    }

    #[test]
    fn test_zero_access_collapses_whole_term() {
        // k * (0)[j] + u[0]  ->  u[0]
        let node = Node::binary(
            BinaryOp::Add,
            Node::binary(
                BinaryOp::Mul,
                Node::access(Array::Param, Node::int(0)),
                Node::access(Array::Zero, Node::var("j")),
            ),
            state(Node::int(0)),
        );
        assert_eq!(collapse_zeros(node), state(Node::int(0)));
    }

    #[test]
    fn test_sum_of_zero_folds() {
        let sum = Node::Sum {
            var: "j".into(),
            lower: Box::new(Node::int(1)),
            upper: Box::new(Node::int(3)),
            excluded: vec![],
            body: Box::new(Node::access(Array::Zero, Node::var("j"))),
        };
        assert_eq!(collapse_zeros(sum), Node::Const(0.0));
    }
}
