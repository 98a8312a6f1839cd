use super::{Node, Stmt};

/// Runtime spelling of a function token, if it has a canonical replacement
fn canonical_func(name: &str) -> Option<&'static str> {
    match name {
        "adjoint" | "dagger" | "conjugate" => Some("conj"),
        "ln" => Some("log"),
        _ => None,
    }
}

/// Rename symbolic-engine tokens to their runtime equivalents.
///
/// The table is fixed: `im` becomes the imaginary unit, adjoints and
/// conjugates become `conj`. Anything else is left for the token check.
pub(crate) fn canonicalize(body: Vec<Stmt>) -> Vec<Stmt> {
    body.into_iter()
        .map(|stmt| {
            stmt.transform(&mut |node| match node {
                // lowering spells the imaginary unit as `im`
                Node::Named(name) if name == "im" => Node::ImaginaryUnit,
                Node::Call { func, args } => match canonical_func(&func) {
                    Some(canonical) => Node::Call {
                        func: canonical.to_string(),
                        args,
                    },
                    None => Node::Call { func, args },
                },
                other => other,
            })
        })
        .collect()
}
