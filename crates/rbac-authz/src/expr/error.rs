use thiserror::Error;

/// Compile-time expression failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("function {function} expects {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("matches() needs a string literal pattern")]
    DynamicRegex,
}

/// Runtime expression failure. Never escapes a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("attribute not present: {0}")]
    Absent(&'static str),
    #[error("no such key: {0}")]
    NoSuchKey(String),
    #[error("no such overload: {op} on {lhs} (rhs: {rhs:?})")]
    NoSuchOverload {
        op: &'static str,
        lhs: &'static str,
        rhs: Option<&'static str>,
    },
}

impl EvalError {
    pub(crate) fn overload(op: &'static str, lhs: &'static str, rhs: Option<&'static str>) -> Self {
        EvalError::NoSuchOverload { op, lhs, rhs }
    }
}
