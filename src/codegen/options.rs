use serde::{Deserialize, Serialize};

use crate::error::CodegenError;
use crate::ir::Naming;

/// Options controlling procedure generation.
///
/// Every field has a default, so partial JSON such as
/// `{"set_unknowns_zero": true}` is accepted by [`Options::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Identifier of the state argument
    pub state_token: String,
    /// Identifier of the parameter argument
    pub param_token: String,
    /// Identifier of the time argument
    pub time_token: String,
    /// Identifier of the derivative argument, `d` + state token when unset
    pub derivative_token: Option<String>,
    /// Replace unknown symbols with zero instead of failing
    pub set_unknowns_zero: bool,
    /// Keep bounds checks on array accesses
    pub check_bounds: bool,
    /// Upper bound on generated index relabeling rules
    pub max_relabel_rules: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            state_token: "u".to_string(),
            param_token: "p".to_string(),
            time_token: "t".to_string(),
            derivative_token: None,
            set_unknowns_zero: false,
            check_bounds: true,
            max_relabel_rules: 65_536,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, CodegenError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_tokens(
        mut self,
        state: impl Into<String>,
        params: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        self.state_token = state.into();
        self.param_token = params.into();
        self.time_token = time.into();
        self
    }

    pub fn with_derivative_token(mut self, token: impl Into<String>) -> Self {
        self.derivative_token = Some(token.into());
        self
    }

    pub fn with_unknowns_zero(mut self, zero: bool) -> Self {
        self.set_unknowns_zero = zero;
        self
    }

    pub fn with_bounds_check(mut self, check: bool) -> Self {
        self.check_bounds = check;
        self
    }

    pub fn with_max_relabel_rules(mut self, limit: usize) -> Self {
        self.max_relabel_rules = limit;
        self
    }

    /// Argument names of the generated procedure
    pub fn naming(&self) -> Naming {
        Naming {
            derivative: self
                .derivative_token
                .clone()
                .unwrap_or_else(|| format!("d{}", self.state_token)),
            state: self.state_token.clone(),
            params: self.param_token.clone(),
            time: self.time_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = Options::from_json(r#"{"set_unknowns_zero": true, "state_token": "x"}"#).unwrap();
        assert!(options.set_unknowns_zero);
        assert!(options.check_bounds);
        assert_eq!(options.naming().derivative, "dx");
        assert_eq!(options.max_relabel_rules, 65_536);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(matches!(
            Options::from_json(r#"{"bounds": false}"#),
            Err(CodegenError::Serialization(_))
        ));
    }
}
