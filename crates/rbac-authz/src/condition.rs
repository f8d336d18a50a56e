//! Condition trees: the boolean predicate behind every policy.
//!
//! A condition is a closed set of variants so that adding a combinator forces
//! every evaluation site to handle it. Trees are built once from configuration
//! and are immutable afterwards; evaluation is pure and never fails.

use std::fmt;
use std::sync::Arc;

use rbac_core::error::{RbacError, Result};
use rbac_core::Attributes;
use tracing::debug;

use crate::config::schema::{MatcherSpec, StringMatchSpec};
use crate::expr::{CompiledExpression, ExpressionBuilder, Value};
use crate::matcher::{parse_cidr, HeaderMatcher, Matcher, MetadataMatcher, StringMatcher};

#[derive(Debug, Clone)]
pub enum Condition {
    /// Always true.
    Any,
    /// True when every child is true; empty is true.
    And(Vec<Condition>),
    /// True when some child is true; empty is false.
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Leaf(Matcher),
    Expression(Expression),
}

impl Condition {
    pub fn evaluate(&self, attrs: &Attributes<'_>) -> bool {
        match self {
            Condition::Any => true,
            Condition::And(xs) => xs.iter().all(|c| c.evaluate(attrs)),
            Condition::Or(xs) => xs.iter().any(|c| c.evaluate(attrs)),
            Condition::Not(c) => !c.evaluate(attrs),
            Condition::Leaf(m) => m.matches(attrs),
            Condition::Expression(e) => e.evaluate(attrs),
        }
    }

    /// Compile a configured matcher tree. `policy` names the owning policy in
    /// error messages.
    pub fn compile(spec: &MatcherSpec, policy: &str) -> Result<Self> {
        let leaf = |m: Matcher| -> Result<Self> { Ok(Condition::Leaf(m)) };
        let string = |s: &StringMatchSpec| StringMatcher::compile(s, policy);

        match spec {
            MatcherSpec::Any(true) => Ok(Condition::Any),
            MatcherSpec::Any(false) => Err(RbacError::InvalidMatcher {
                policy: policy.to_string(),
                reason: "any must be true".into(),
            }),
            MatcherSpec::And(xs) => Self::compile_all(xs, policy).map(Condition::And),
            MatcherSpec::Or(xs) => Self::compile_all(xs, policy).map(Condition::Or),
            MatcherSpec::Not(x) => Ok(Condition::Not(Box::new(Self::compile(x, policy)?))),
            MatcherSpec::Header(h) => leaf(Matcher::Header(HeaderMatcher::compile(h, policy)?)),
            MatcherSpec::UrlPath(s) => leaf(Matcher::UrlPath(string(s)?)),
            MatcherSpec::Method(s) => leaf(Matcher::Method(string(s)?)),
            MatcherSpec::SourceIp(c) => leaf(Matcher::SourceIp(parse_cidr(c, policy)?)),
            MatcherSpec::DestinationIp(c) => leaf(Matcher::DestinationIp(parse_cidr(c, policy)?)),
            MatcherSpec::DestinationPort(p) => leaf(Matcher::DestinationPort(*p)),
            MatcherSpec::RequestedServerName(s) => leaf(Matcher::RequestedServerName(string(s)?)),
            MatcherSpec::Authenticated(a) => {
                let name = a.principal_name.as_ref().map(string).transpose()?;
                leaf(Matcher::Authenticated(name))
            }
            MatcherSpec::Metadata(m) => leaf(Matcher::Metadata(MetadataMatcher::compile(m, policy)?)),
        }
    }

    fn compile_all(specs: &[MatcherSpec], policy: &str) -> Result<Vec<Self>> {
        specs.iter().map(|s| Self::compile(s, policy)).collect()
    }
}

/// Expression leaf: a compiled predicate plus the builder that produced it.
#[derive(Clone)]
pub struct Expression {
    source: String,
    program: Arc<dyn CompiledExpression>,
    // Keeps the engine's shared builder (and its constant cache) alive for as
    // long as any compiled program refers to it.
    _builder: Arc<dyn ExpressionBuilder>,
}

impl Expression {
    pub fn compile(
        source: &str,
        builder: &Arc<dyn ExpressionBuilder>,
        policy: &str,
    ) -> Result<Self> {
        let program = builder
            .compile(source)
            .map_err(|e| RbacError::InvalidExpression {
                policy: policy.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            program,
            _builder: Arc::clone(builder),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Non-boolean results and evaluation errors are a non-match.
    pub fn evaluate(&self, attrs: &Attributes<'_>) -> bool {
        match self.program.evaluate(attrs) {
            Ok(Value::Bool(b)) => b,
            Ok(other) => {
                debug!(expr = %self.source, ty = other.type_name(), "condition is not boolean; treating as non-match");
                false
            }
            Err(e) => {
                debug!(expr = %self.source, error = %e, "condition evaluation failed; treating as non-match");
                false
            }
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DefaultExpressionBuilder;
    use rbac_core::{ConnectionInfo, RequestHeaders, StreamInfo};

    fn eval(c: &Condition, headers: &RequestHeaders) -> bool {
        let conn = ConnectionInfo::default();
        let stream = StreamInfo::default();
        c.evaluate(&Attributes::new(&conn, headers, &stream))
    }

    fn yaml(s: &str) -> MatcherSpec {
        serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(s))
            .unwrap()
    }

    #[test]
    fn empty_combinators() {
        let h = RequestHeaders::new();
        assert!(eval(&Condition::And(vec![]), &h));
        assert!(!eval(&Condition::Or(vec![]), &h));
        assert!(!eval(&Condition::Not(Box::new(Condition::Any)), &h));
    }

    #[test]
    fn compiles_nested_tree() {
        let spec = yaml(
            r#"
and:
  - header: { name: x-env, exact: prod }
  - not:
      url_path: { prefix: /healthz }
  - or:
      - method: { exact: POST }
      - method: { exact: PUT }
"#,
        );
        let c = Condition::compile(&spec, "p").unwrap();

        let post = RequestHeaders::new()
            .with("x-env", "prod")
            .with(":path", "/api")
            .with(":method", "POST");
        assert!(eval(&c, &post));

        let health = RequestHeaders::new()
            .with("x-env", "prod")
            .with(":path", "/healthz")
            .with(":method", "POST");
        assert!(!eval(&c, &health));

        let get = RequestHeaders::new()
            .with("x-env", "prod")
            .with(":path", "/api")
            .with(":method", "GET");
        assert!(!eval(&c, &get));
    }

    #[test]
    fn compile_errors_name_the_policy() {
        let err = Condition::compile(&yaml("source_ip: 300.1.1.1/8"), "edge").unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_MATCHER");
        assert!(err.to_string().contains("edge"));
    }

    #[test]
    fn any_false_is_rejected() {
        let err = Condition::compile(&MatcherSpec::Any(false), "p").unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_MATCHER");

        let nested = yaml("or: [ { any: true }, { not: { any: false } } ]");
        assert!(Condition::compile(&nested, "p").is_err());
    }

    #[test]
    fn expression_faults_are_non_match() {
        let builder: Arc<dyn ExpressionBuilder> = Arc::new(DefaultExpressionBuilder::new());
        let e = Expression::compile("request.headers['x-env'] == 'prod'", &builder, "p").unwrap();
        let c = Condition::Expression(e);

        assert!(eval(&c, &RequestHeaders::new().with("x-env", "prod")));
        // Missing key: evaluation error.
        assert!(!eval(&c, &RequestHeaders::new()));
        // A fault is a plain `false` at the leaf, so `Not` over it is true.
        assert!(eval(&Condition::Not(Box::new(c)), &RequestHeaders::new()));

        let non_bool = Expression::compile("request.headers", &builder, "p").unwrap();
        assert!(!eval(&Condition::Expression(non_bool), &RequestHeaders::new()));
    }

    #[test]
    fn invalid_expression_is_a_build_error() {
        let builder: Arc<dyn ExpressionBuilder> = Arc::new(DefaultExpressionBuilder::new());
        let err = Expression::compile("request.method ==", &builder, "p1").unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_EXPRESSION");
    }
}
