use super::{Array, Node, Procedure, Stmt};
use crate::error::CodegenError;
use crate::runtime::builtins;

// Two small checks over a finished procedure. The structural check runs when
// a procedure is built or restored; the token check runs before
// materialization, since a procedure with foreign tokens can still be
// rendered and inspected.

/// Verify loop depth, variable scoping and that no high-level node survived
/// the rewrite passes.
pub(crate) fn check_structure(procedure: &Procedure) -> Result<(), CodegenError> {
    let depth = procedure.loop_depth();
    if depth > 1 {
        return Err(CodegenError::UnsupportedDepth {
            equation: "<procedure body>".to_string(),
            depth,
        });
    }
    let mut scope = Vec::new();
    for stmt in procedure.body() {
        check_stmt(stmt, &mut scope)?;
    }
    Ok(())
}

fn check_stmt(stmt: &Stmt, scope: &mut Vec<String>) -> Result<(), CodegenError> {
    match stmt {
        Stmt::Assign { slot, value } => {
            check_node(slot, scope)?;
            check_node(value, scope)
        }
        Stmt::Loop {
            var,
            lower,
            upper,
            body,
        } => {
            check_node(lower, scope)?;
            check_node(upper, scope)?;
            scope.push(var.clone());
            let result = body.iter().try_for_each(|s| check_stmt(s, scope));
            scope.pop();
            result
        }
    }
}

fn check_node(node: &Node, scope: &mut Vec<String>) -> Result<(), CodegenError> {
    match node {
        Node::Const(_) | Node::ImaginaryUnit | Node::Named(_) | Node::Time | Node::Unresolved(_) => {
            Ok(())
        }
        Node::Var(name) => {
            if scope.contains(name) {
                Ok(())
            } else {
                Err(CodegenError::malformed(format!(
                    "variable '{}' used outside its loop or sum",
                    name
                )))
            }
        }
        Node::Access { array, index } => {
            if *array == Array::Zero {
                return Err(CodegenError::malformed("residual zero-array access"));
            }
            check_node(index, scope)
        }
        Node::Unary { operand, .. } => check_node(operand, scope),
        Node::Binary { lhs, rhs, .. } => {
            check_node(lhs, scope)?;
            check_node(rhs, scope)
        }
        Node::Call { args, .. } => args.iter().try_for_each(|a| check_node(a, scope)),
        Node::Indicator { left, right } => {
            check_node(left, scope)?;
            check_node(right, scope)
        }
        Node::Sum {
            var,
            lower,
            upper,
            excluded,
            body,
        } => {
            if !excluded.is_empty() {
                return Err(CodegenError::malformed(format!(
                    "sum over '{}' still carries {} exclusion(s)",
                    var,
                    excluded.len()
                )));
            }
            check_node(lower, scope)?;
            check_node(upper, scope)?;
            scope.push(var.clone());
            let result = check_node(body, scope);
            scope.pop();
            result
        }
        Node::BoundedSum { var, .. } => Err(CodegenError::malformed(format!(
            "generic bounded sum over '{}' was not lowered",
            var
        ))),
        Node::Guarded { .. } => Err(CodegenError::malformed(
            "inequality guard was not rewritten into an indicator",
        )),
    }
}

/// Verify that every token has a runtime meaning.
pub(crate) fn check_tokens(procedure: &Procedure) -> Result<(), CodegenError> {
    let mut error = None;
    for stmt in procedure.body() {
        stmt.visit(&mut |node| {
            if error.is_some() {
                return;
            }
            match node {
                Node::Named(name) => {
                    error = Some(CodegenError::UnknownToken { name: name.clone() });
                }
                Node::Call { func, args } => match builtins::arg_count_range(func) {
                    None => error = Some(CodegenError::UnknownToken { name: func.clone() }),
                    Some(range) if !range.contains(&args.len()) => {
                        error = Some(CodegenError::malformed(format!(
                            "'{}' called with {} argument(s)",
                            func,
                            args.len()
                        )))
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        });
    }
    match error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Exclusion, Naming};

    fn procedure(body: Vec<Stmt>) -> Procedure {
        Procedure::new(Naming::default(), vec![], vec![], body, true)
    }

    #[test]
    fn test_rejects_nested_loops() {
        let inner = Stmt::Loop {
            var: "j".into(),
            lower: Node::int(1),
            upper: Node::int(2),
            body: vec![Stmt::assign(Node::var("j"), Node::int(0))],
        };
        let outer = Stmt::Loop {
            var: "i".into(),
            lower: Node::int(1),
            upper: Node::int(2),
            body: vec![inner],
        };
        let err = check_structure(&procedure(vec![outer])).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedDepth { depth: 2, .. }));
    }

    #[test]
    fn test_rejects_unabsorbed_exclusion() {
        let sum = Node::Sum {
            var: "j".into(),
            lower: Box::new(Node::int(1)),
            upper: Box::new(Node::int(2)),
            excluded: vec![Exclusion {
                value: Node::int(1),
                absorbed: false,
            }],
            body: Box::new(Node::var("j")),
        };
        let err = check_structure(&procedure(vec![Stmt::assign(Node::int(0), sum)])).unwrap_err();
        assert!(matches!(err, CodegenError::MalformedProgram(_)));
    }

    #[test]
    fn test_rejects_unscoped_variable() {
        let body = vec![Stmt::assign(Node::int(0), Node::var("k"))];
        assert!(check_structure(&procedure(body)).is_err());
    }

    #[test]
    fn test_unknown_function_token() {
        let body = vec![Stmt::assign(
            Node::int(0),
            Node::Call {
                func: "besselj".into(),
                args: vec![Node::Time],
            },
        )];
        let err = check_tokens(&procedure(body)).unwrap_err();
        assert!(matches!(err, CodegenError::UnknownToken { name } if name == "besselj"));
    }
}
