//! Role-based access control decision engine.
//!
//! An engine holds an action mode and a set of named policies. For a request it
//! finds the first matching policy and turns "did anything match" into a
//! verdict:
//!
//! | action | match  | no match |
//! |--------|--------|----------|
//! | allow  | permit | deny     |
//! | deny   | deny   | permit   |
//! | log    | permit | permit   |
//!
//! In log mode the audit verdict is only available through
//! [`RbacEngine::should_log`].
//!
//! Policies are evaluated in ascending name order and evaluation stops at the
//! first match, so when several policies match, the reported effective policy
//! id is the lexicographically smallest matching name.
//!
//! Construct once per configuration generation, then share via `Arc`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use rbac_core::error::Result;
use rbac_core::{Attributes, ConnectionInfo, RequestHeaders, StreamInfo};

use crate::config::schema::{Action, RulesConfig};
use crate::expr::{DefaultExpressionBuilder, ExpressionBuilder};
use crate::policy::Policy;

/// Audit verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogDecision {
    /// Log mode, some policy matched.
    Yes,
    /// Log mode, nothing matched.
    No,
    /// The engine is not in log mode; defer to [`RbacEngine::allowed`].
    Undecided,
}

impl LogDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            LogDecision::Yes => "yes",
            LogDecision::No => "no",
            LogDecision::Undecided => "undecided",
        }
    }
}

pub struct RbacEngine {
    action: Action,
    /// Sorted by name.
    policies: Vec<Policy>,
    builder: Option<Arc<dyn ExpressionBuilder>>,
}

impl RbacEngine {
    /// Build from validated rules using the built-in expression language.
    pub fn new(rules: &RulesConfig) -> Result<Self> {
        Self::with_builder_factory(rules, || Arc::new(DefaultExpressionBuilder::new()))
    }

    /// Build from validated rules. `factory` is invoked at most once, and only
    /// if some policy carries an expression condition; the resulting builder
    /// is shared by every expression in the engine.
    ///
    /// Fails as a whole if any policy fails to compile.
    pub fn with_builder_factory<F>(rules: &RulesConfig, factory: F) -> Result<Self>
    where
        F: FnOnce() -> Arc<dyn ExpressionBuilder>,
    {
        let builder = rules
            .policies
            .values()
            .any(|p| p.has_condition())
            .then(factory);

        // `policies` is a BTreeMap, so this is already name order.
        let policies = rules
            .policies
            .iter()
            .map(|(name, cfg)| Policy::compile(name, cfg, builder.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            action = rules.action.as_str(),
            policies = policies.len(),
            expression_builder = builder.is_some(),
            "rbac engine built"
        );

        Ok(Self {
            action: rules.action,
            policies,
            builder,
        })
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn has_expression_builder(&self) -> bool {
        self.builder.is_some()
    }

    /// Whether the request is permitted. On a match, the matching policy's name
    /// is written to `effective_policy_id`; otherwise the slot is untouched.
    /// Log mode always permits and evaluates nothing.
    pub fn allowed(
        &self,
        connection: &ConnectionInfo,
        headers: &RequestHeaders,
        stream: &StreamInfo,
        effective_policy_id: Option<&mut String>,
    ) -> bool {
        if self.action == Action::Log {
            return true;
        }

        let attrs = Attributes::new(connection, headers, stream);
        let matched = self.record_first_match(&attrs, effective_policy_id);

        // allowed iff: matched under allow, or unmatched under deny.
        matched == (self.action == Action::Allow)
    }

    /// [`allowed`](Self::allowed) for decisions taken before headers exist.
    pub fn allowed_without_headers(
        &self,
        connection: &ConnectionInfo,
        stream: &StreamInfo,
        effective_policy_id: Option<&mut String>,
    ) -> bool {
        let headers = RequestHeaders::default();
        self.allowed(connection, &headers, stream, effective_policy_id)
    }

    /// Audit verdict; [`LogDecision::Undecided`] unless the engine is in log mode.
    pub fn should_log(
        &self,
        connection: &ConnectionInfo,
        headers: &RequestHeaders,
        stream: &StreamInfo,
        effective_policy_id: Option<&mut String>,
    ) -> LogDecision {
        if self.action != Action::Log {
            return LogDecision::Undecided;
        }

        let attrs = Attributes::new(connection, headers, stream);
        if self.record_first_match(&attrs, effective_policy_id) {
            LogDecision::Yes
        } else {
            LogDecision::No
        }
    }

    /// [`should_log`](Self::should_log) for decisions taken before headers exist.
    pub fn should_log_without_headers(
        &self,
        connection: &ConnectionInfo,
        stream: &StreamInfo,
        effective_policy_id: Option<&mut String>,
    ) -> LogDecision {
        let headers = RequestHeaders::default();
        self.should_log(connection, &headers, stream, effective_policy_id)
    }

    /// First matching policy in evaluation order. Later policies are not
    /// evaluated once one matches.
    pub fn first_match(&self, attrs: &Attributes<'_>) -> Option<&Policy> {
        self.policies.iter().find(|p| p.matches(attrs))
    }

    fn record_first_match(&self, attrs: &Attributes<'_>, slot: Option<&mut String>) -> bool {
        let Some(policy) = self.first_match(attrs) else {
            return false;
        };
        trace!(policy = policy.name(), action = self.action.as_str(), "rbac policy matched");
        if let Some(slot) = slot {
            slot.clear();
            slot.push_str(policy.name());
        }
        true
    }
}

impl std::fmt::Debug for RbacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacEngine")
            .field("action", &self.action)
            .field(
                "policies",
                &self.policies.iter().map(Policy::name).collect::<Vec<_>>(),
            )
            .field("expression_builder", &self.builder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MatcherSpec, PolicyConfig};

    fn header_policy(name: &str, value: &str) -> PolicyConfig {
        PolicyConfig::new(
            vec![MatcherSpec::header_exact(name, value)],
            vec![MatcherSpec::Any(true)],
        )
    }

    #[test]
    fn allow_and_deny_are_inverses() {
        let allow = RbacEngine::new(
            &RulesConfig::new(Action::Allow).with_policy("p1", header_policy("x-env", "prod")),
        )
        .unwrap();
        let deny = RbacEngine::new(
            &RulesConfig::new(Action::Deny).with_policy("p1", header_policy("x-env", "prod")),
        )
        .unwrap();

        let conn = ConnectionInfo::default();
        let stream = StreamInfo::default();
        for value in ["prod", "staging"] {
            let headers = RequestHeaders::new().with("x-env", value);
            assert_ne!(
                allow.allowed(&conn, &headers, &stream, None),
                deny.allowed(&conn, &headers, &stream, None),
                "x-env={value}"
            );
        }
    }

    #[test]
    fn slot_is_overwritten_only_on_match() {
        let e = RbacEngine::new(
            &RulesConfig::new(Action::Allow).with_policy("p1", header_policy("x-env", "prod")),
        )
        .unwrap();
        let conn = ConnectionInfo::default();
        let stream = StreamInfo::default();

        let mut id = String::from("previous");
        assert!(!e.allowed(&conn, &RequestHeaders::new(), &stream, Some(&mut id)));
        assert_eq!(id, "previous");

        let headers = RequestHeaders::new().with("x-env", "prod");
        assert!(e.allowed(&conn, &headers, &stream, Some(&mut id)));
        assert_eq!(id, "p1");
    }

    #[test]
    fn builder_only_built_when_needed() {
        let plain = RbacEngine::with_builder_factory(
            &RulesConfig::new(Action::Deny).with_policy("p1", header_policy("x-env", "prod")),
            || panic!("factory must not run without expression conditions"),
        )
        .unwrap();
        assert!(!plain.has_expression_builder());

        let with_expr = RbacEngine::new(
            &RulesConfig::new(Action::Deny)
                .with_policy("p1", header_policy("x-env", "prod").with_condition("true")),
        )
        .unwrap();
        assert!(with_expr.has_expression_builder());
    }

    #[test]
    fn any_false_fails_the_build() {
        let rules = RulesConfig::new(Action::Allow).with_policy(
            "p",
            PolicyConfig::new(vec![MatcherSpec::Any(false)], vec![MatcherSpec::Any(true)]),
        );
        let err = RbacEngine::new(&rules).unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_MATCHER");
    }

    #[test]
    fn overlong_condition_fails_the_build() {
        let chain = vec!["request.method == 'GET'"; 10_000].join(" && ");
        let rules = RulesConfig::new(Action::Deny)
            .with_policy("p", header_policy("x-env", "prod").with_condition(&chain));
        let err = RbacEngine::new(&rules).unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_EXPRESSION");
    }

    #[test]
    fn debug_lists_policy_names() {
        let e = RbacEngine::new(
            &RulesConfig::new(Action::Log)
                .with_policy("b", header_policy("x", "1"))
                .with_policy("a", header_policy("x", "2")),
        )
        .unwrap();
        let s = format!("{e:?}");
        assert!(s.contains(r#"["a", "b"]"#), "{s}");
    }
}
