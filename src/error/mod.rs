//! Error types for equation validation, code generation and procedure execution

use thiserror::Error;

/// Errors raised while validating equations, building the intermediate
/// representation or materializing it into a callable procedure.
///
/// Generation is all-or-nothing: when one of these is returned no partial
/// procedure exists.
#[derive(Debug, Error)]
pub enum CodegenError {
    // ─────────────────────────────────────────────────────────────────────────
    // Incompleteness Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Right-hand sides reference symbols that are neither states nor parameters
    #[error(
        "Right-hand sides reference unknown symbols [{}]. Declare them as states or \
         parameters, or enable `set_unknowns_zero` to substitute them with zero",
        .names.join(", ")
    )]
    MissingSymbols { names: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Structural Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Left- and right-hand side lists disagree in length
    #[error("Got {rhs} right-hand sides for {lhs} states")]
    LengthMismatch { lhs: usize, rhs: usize },

    /// The same state appears on two left-hand sides
    #[error("State '{name}' has more than one equation")]
    DuplicateLhs { name: String },

    /// A left-hand side is not a (possibly indexed) symbol
    #[error("Left-hand side '{expr}' must be a symbol or an indexed symbol")]
    InvalidLhs { expr: String },

    /// A parameter entry is not a symbol or a literal-bounded indexed symbol
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Index usage contradicts the family layout
    #[error("Inconsistent index family in equation for '{equation}': {reason}")]
    InconsistentIndex { equation: String, reason: String },

    /// An indexed state or parameter is accessed through an index with another range
    #[error("'{symbol}' cannot be accessed through index '{index}': no relabeling matches its declared range")]
    IncompatibleIndex { symbol: String, index: String },

    /// The relabeling pass would generate more rules than allowed
    #[error("Index relabeling needs {required} rewrite rules, exceeding the limit of {limit}")]
    RelabelLimit { required: usize, limit: usize },

    /// The intermediate representation failed a structural check
    #[error("Malformed procedure: {0}")]
    MalformedProgram(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Unsupported Shapes
    // ─────────────────────────────────────────────────────────────────────────
    /// Equations nested over more than one index
    #[error("Equation for '{equation}' is indexed over {depth} indices; only one loop level is supported")]
    UnsupportedDepth { equation: String, depth: usize },

    // ─────────────────────────────────────────────────────────────────────────
    // Materialization Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A runtime token survived canonicalization but has no builtin
    #[error("Unknown runtime token '{name}'")]
    UnknownToken { name: String },

    /// The procedure uses complex arithmetic but the numeric type is real
    #[error("Procedure uses the imaginary unit but is materialized over the real type '{scalar}'")]
    ComplexUnsupported { scalar: &'static str },

    /// Direct evaluation of a symbolic expression hit an unbound symbol
    #[error("Cannot evaluate '{name}': no value bound")]
    UnboundSymbol { name: String },

    /// Failed to (de)serialize a procedure
    #[error("Failed to (de)serialize procedure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CodegenError {
    /// Create an inconsistent index error
    pub fn inconsistent_index(equation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InconsistentIndex {
            equation: equation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed program error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedProgram(message.into())
    }
}

/// Errors that surface only when a generated procedure executes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A symbolic bound or token was never resolved during generation
    #[error("Unresolved symbol '{name}' reached at execution time")]
    UnresolvedSymbol { name: String },

    /// Array access outside the provided slice
    #[error("Index {index} out of bounds for '{array}' (len={len})")]
    IndexOutOfBounds {
        array: String,
        index: usize,
        len: usize,
    },

    /// An index expression evaluated to something that is not a slot
    #[error("Invalid index {value} for '{array}'")]
    InvalidIndex { array: String, value: f64 },

    /// Batch arrays have incompatible shapes
    #[error("Dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}
