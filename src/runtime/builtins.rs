//! Builtin function metadata used by the bytecode compiler and the token check.
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Functions the VM can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
    Abs,
    Real,
    Imag,
    Conj,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "sin" => Some(Builtin::Sin),
            "cos" => Some(Builtin::Cos),
            "exp" => Some(Builtin::Exp),
            "log" => Some(Builtin::Log),
            "sqrt" => Some(Builtin::Sqrt),
            "abs" => Some(Builtin::Abs),
            "real" => Some(Builtin::Real),
            "imag" => Some(Builtin::Imag),
            "conj" => Some(Builtin::Conj),
            _ => None,
        }
    }
}

/// Return true if the name is a known builtin function.
pub fn is_known_function(name: &str) -> bool {
    Builtin::from_name(name).is_some()
}

/// Return the allowed argument count range for a builtin, if known.
pub fn arg_count_range(name: &str) -> Option<RangeInclusive<usize>> {
    if is_known_function(name) {
        Some(1..=1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_functions() {
        assert!(is_known_function("conj"));
        assert!(!is_known_function("adjoint"));
        assert_eq!(arg_count_range("sin"), Some(1..=1));
        assert_eq!(arg_count_range("besselj"), None);
    }
}
