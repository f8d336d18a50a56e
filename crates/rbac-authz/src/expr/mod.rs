//! Attribute expressions used by policy `condition` fields.
//!
//! The engine only depends on the two traits below: an [`ExpressionBuilder`]
//! turns source text into a [`CompiledExpression`], which is then evaluated
//! against an attribute snapshot on every request. The built-in
//! [`DefaultExpressionBuilder`] implements a small CEL-like language:
//!
//! ```text
//! request.headers['x-env'] == 'prod' && source.port != 22
//! request.path.startsWith('/admin') || !connection.mtls
//! metadata.authn.groups.contains('ops')            // list membership
//! request.host.matches('[a-z]+\\.example\\.com')
//! ```
//!
//! Compilation errors are reported at engine build time. Evaluation errors
//! (missing key, type mismatch) are returned to the caller, which treats them
//! as a non-match.

pub mod builder;
pub mod error;
mod eval;
mod lexer;
mod parser;
pub mod value;

use std::fmt;
use std::sync::Arc;

use rbac_core::Attributes;

pub use builder::DefaultExpressionBuilder;
pub use error::{EvalError, ExprError};
pub use value::Value;

/// A compiled predicate. Must be pure and safe to evaluate concurrently.
pub trait CompiledExpression: Send + Sync + fmt::Debug {
    fn evaluate(&self, attrs: &Attributes<'_>) -> Result<Value, EvalError>;
}

/// Compiles expression source text. One builder is shared by every expression
/// leaf of an engine, so implementations may keep constant caches; any such
/// cache must be internally synchronized.
pub trait ExpressionBuilder: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExprError>;
}
