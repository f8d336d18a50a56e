use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use rbac_core::error::{RbacError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RbacConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    /// Enforced rules. Absent means every request is allowed.
    #[serde(default)]
    pub rules: Option<RulesConfig>,

    /// Rules evaluated for observation only; never enforced.
    #[serde(default)]
    pub shadow_rules: Option<RulesConfig>,
}

impl RbacConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RbacError::UnsupportedVersion);
        }
        self.server.validate()?;
        if let Some(rules) = &self.rules {
            rules.validate().map_err(|e| prefixed("rules", e))?;
        }
        if let Some(rules) = &self.shadow_rules {
            rules.validate().map_err(|e| prefixed("shadow_rules", e))?;
        }
        Ok(())
    }
}

fn prefixed(section: &str, e: RbacError) -> RbacError {
    match e {
        RbacError::InvalidConfig(msg) => RbacError::InvalidConfig(format!("{section}.{msg}")),
        other => other,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(RbacError::InvalidConfig(format!(
                "server.listen must be a valid socket address: {}",
                self.listen
            )));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:9191".into()
}

/// Engine-wide action mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A match permits; no match denies.
    Allow,
    /// A match denies; no match permits.
    Deny,
    /// Never blocks; a match only flags the request for audit logging.
    Log,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
            Action::Log => "log",
        }
    }
}

/// Action mode plus named policies. The map keeps policies sorted by name,
/// which is also the engine's evaluation order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    pub action: Action,
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl RulesConfig {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            policies: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, name: impl Into<String>, policy: PolicyConfig) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, policy) in &self.policies {
            if name.trim().is_empty() {
                return Err(RbacError::InvalidConfig(
                    "policies: policy name must not be empty".into(),
                ));
            }
            policy
                .validate()
                .map_err(|msg| RbacError::InvalidConfig(format!("policies.{name}: {msg}")))?;
        }
        Ok(())
    }
}

/// A policy matches when any permission AND any principal match, and the
/// optional expression condition evaluates to true.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    // Matcher trees are written as single-key maps (`- header: {...}`), not
    // YAML tags, at every nesting level.
    #[serde(deserialize_with = "serde_yaml::with::singleton_map_recursive::deserialize")]
    pub permissions: Vec<MatcherSpec>,
    #[serde(deserialize_with = "serde_yaml::with::singleton_map_recursive::deserialize")]
    pub principals: Vec<MatcherSpec>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl PolicyConfig {
    pub fn new(permissions: Vec<MatcherSpec>, principals: Vec<MatcherSpec>) -> Self {
        Self {
            permissions,
            principals,
            condition: None,
        }
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(expr.into());
        self
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.permissions.is_empty() {
            return Err("permissions must not be empty".into());
        }
        if self.principals.is_empty() {
            return Err("principals must not be empty".into());
        }
        for m in self.permissions.iter().chain(self.principals.iter()) {
            m.validate()?;
        }
        if let Some(c) = &self.condition {
            if c.trim().is_empty() {
                return Err("condition must not be empty when set".into());
            }
        }
        Ok(())
    }
}

/// Structural matcher tree, as written in configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum MatcherSpec {
    Any(bool),
    And(Vec<MatcherSpec>),
    Or(Vec<MatcherSpec>),
    Not(Box<MatcherSpec>),
    Header(HeaderMatchSpec),
    UrlPath(StringMatchSpec),
    Method(StringMatchSpec),
    /// CIDR or bare address of the connection peer.
    SourceIp(String),
    /// CIDR or bare address of the local end.
    DestinationIp(String),
    DestinationPort(u16),
    RequestedServerName(StringMatchSpec),
    Authenticated(AuthenticatedSpec),
    Metadata(MetadataSpec),
}

impl MatcherSpec {
    pub fn header_exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        MatcherSpec::Header(HeaderMatchSpec {
            name: name.into(),
            exact: Some(value.into()),
            ..Default::default()
        })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            MatcherSpec::Any(true) => Ok(()),
            MatcherSpec::Any(false) => Err("any must be true".into()),
            MatcherSpec::And(xs) | MatcherSpec::Or(xs) => {
                xs.iter().try_for_each(MatcherSpec::validate)
            }
            MatcherSpec::Not(x) => x.validate(),
            MatcherSpec::Header(h) => h.validate(),
            MatcherSpec::UrlPath(s)
            | MatcherSpec::Method(s)
            | MatcherSpec::RequestedServerName(s) => s.validate(),
            MatcherSpec::SourceIp(_)
            | MatcherSpec::DestinationIp(_)
            | MatcherSpec::DestinationPort(_) => Ok(()),
            MatcherSpec::Authenticated(a) => match &a.principal_name {
                Some(s) => s.validate(),
                None => Ok(()),
            },
            MatcherSpec::Metadata(m) => {
                if m.filter.is_empty() {
                    return Err("metadata.filter must not be empty".into());
                }
                if m.path.is_empty() {
                    return Err("metadata.path must not be empty".into());
                }
                m.value.validate()
            }
        }
    }
}

/// Exactly one pattern field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StringMatchSpec {
    #[serde(default)]
    pub exact: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub safe_regex: Option<String>,
    #[serde(default)]
    pub ignore_case: bool,
}

impl StringMatchSpec {
    pub fn exact(v: impl Into<String>) -> Self {
        Self {
            exact: Some(v.into()),
            ..Default::default()
        }
    }

    pub fn prefix(v: impl Into<String>) -> Self {
        Self {
            prefix: Some(v.into()),
            ..Default::default()
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let set = [
            &self.exact,
            &self.prefix,
            &self.suffix,
            &self.contains,
            &self.safe_regex,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count();
        if set != 1 {
            return Err(
                "string matcher needs exactly one of exact/prefix/suffix/contains/safe_regex"
                    .into(),
            );
        }
        Ok(())
    }
}

/// Header matcher: one of the string patterns or `present`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderMatchSpec {
    pub name: String,
    #[serde(default)]
    pub exact: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub safe_regex: Option<String>,
    #[serde(default)]
    pub present: Option<bool>,
    #[serde(default)]
    pub invert_match: bool,
}

impl HeaderMatchSpec {
    /// Value pattern as a string matcher; `None` for a `present` matcher.
    pub fn value_matcher(&self) -> Option<StringMatchSpec> {
        if self.present.is_some() {
            return None;
        }
        Some(StringMatchSpec {
            exact: self.exact.clone(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            contains: self.contains.clone(),
            safe_regex: self.safe_regex.clone(),
            ignore_case: false,
        })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("header.name must not be empty".into());
        }
        match self.value_matcher() {
            None => {
                let others = [
                    &self.exact,
                    &self.prefix,
                    &self.suffix,
                    &self.contains,
                    &self.safe_regex,
                ];
                if others.iter().any(|v| v.is_some()) {
                    return Err(format!(
                        "header {}: present cannot be combined with a value pattern",
                        self.name
                    ));
                }
                Ok(())
            }
            Some(s) => s
                .validate()
                .map_err(|e| format!("header {}: {e} (or present)", self.name)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticatedSpec {
    /// Matched against the peer's URI SANs, DNS SANs, then subject.
    /// Absent means "any authenticated peer".
    #[serde(default)]
    pub principal_name: Option<StringMatchSpec>,
}

/// Dynamic metadata matcher. Scalars (strings, numbers, booleans) are
/// compared in their string form.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataSpec {
    pub filter: String,
    pub path: Vec<String>,
    pub value: StringMatchSpec,
    #[serde(default)]
    pub invert: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_matcher_requires_exactly_one_pattern() {
        assert!(StringMatchSpec::default().validate().is_err());
        let two = StringMatchSpec {
            exact: Some("a".into()),
            prefix: Some("b".into()),
            ..Default::default()
        };
        assert!(two.validate().is_err());
        assert!(StringMatchSpec::prefix("/api").validate().is_ok());
    }

    #[test]
    fn header_present_excludes_value_patterns() {
        let h = HeaderMatchSpec {
            name: "x-env".into(),
            present: Some(true),
            exact: Some("prod".into()),
            ..Default::default()
        };
        assert!(h.validate().is_err());
        let h = HeaderMatchSpec {
            name: "x-env".into(),
            present: Some(true),
            ..Default::default()
        };
        assert!(h.validate().is_ok());
    }

    #[test]
    fn policy_needs_permissions_and_principals() {
        let p = PolicyConfig::new(vec![], vec![MatcherSpec::Any(true)]);
        assert!(p.validate().is_err());
        let p = PolicyConfig::new(vec![MatcherSpec::Any(true)], vec![]);
        assert!(p.validate().is_err());
        let p = PolicyConfig::new(vec![MatcherSpec::Any(true)], vec![MatcherSpec::Any(true)]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn matcher_trees_use_single_key_maps() {
        let cfg = crate::config::load_from_str(
            r#"
version: 1
rules:
  action: deny
  policies:
    p1:
      permissions:
        - and:
            - header: { name: x-env, exact: prod }
            - not:
                or:
                  - url_path: { prefix: /healthz }
                  - method: { exact: OPTIONS }
      principals:
        - or:
            - source_ip: 10.0.0.0/8
            - authenticated: {}
"#,
        )
        .unwrap();

        let p = &cfg.rules.unwrap().policies["p1"];
        let MatcherSpec::And(parts) = &p.permissions[0] else {
            panic!("expected and: {:?}", p.permissions[0]);
        };
        assert!(matches!(parts[0], MatcherSpec::Header(_)));
        let MatcherSpec::Not(inner) = &parts[1] else {
            panic!("expected not: {:?}", parts[1]);
        };
        assert!(matches!(inner.as_ref(), MatcherSpec::Or(xs) if xs.len() == 2));
        assert!(matches!(&p.principals[0], MatcherSpec::Or(xs) if xs.len() == 2));
    }

    #[test]
    fn nested_errors_surface_through_combinators() {
        let p = PolicyConfig::new(
            vec![MatcherSpec::Not(Box::new(MatcherSpec::And(vec![
                MatcherSpec::Any(false),
            ])))],
            vec![MatcherSpec::Any(true)],
        );
        assert!(p.validate().is_err());
    }
}
