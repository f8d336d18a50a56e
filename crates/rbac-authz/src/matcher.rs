//! Compiled structural leaf matchers.
//!
//! Every pattern (regex, CIDR) is compiled once when the engine is built, so
//! request-time matching never allocates a matcher or fails. An attribute that
//! is absent from the snapshot is a non-match.

use std::net::IpAddr;

use ipnet::IpNet;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use rbac_core::error::{RbacError, Result};
use rbac_core::Attributes;

use crate::config::schema::{HeaderMatchSpec, MetadataSpec, StringMatchSpec};

/// String comparison compiled from a [`StringMatchSpec`].
///
/// `safe_regex` patterns must match the whole input.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    kind: StringKind,
    ignore_case: bool,
}

#[derive(Debug, Clone)]
enum StringKind {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(Regex),
}

impl StringMatcher {
    pub fn compile(spec: &StringMatchSpec, policy: &str) -> Result<Self> {
        let ic = spec.ignore_case;
        let fold = |s: &str| if ic { s.to_lowercase() } else { s.to_string() };

        let kind = if let Some(v) = &spec.exact {
            StringKind::Exact(fold(v))
        } else if let Some(v) = &spec.prefix {
            StringKind::Prefix(fold(v))
        } else if let Some(v) = &spec.suffix {
            StringKind::Suffix(fold(v))
        } else if let Some(v) = &spec.contains {
            StringKind::Contains(fold(v))
        } else if let Some(v) = &spec.safe_regex {
            let re = RegexBuilder::new(&format!("^(?:{v})$"))
                .case_insensitive(ic)
                .build()
                .map_err(|e| RbacError::InvalidMatcher {
                    policy: policy.to_string(),
                    reason: format!("invalid regex {v:?}: {e}"),
                })?;
            StringKind::Regex(re)
        } else {
            return Err(RbacError::InvalidMatcher {
                policy: policy.to_string(),
                reason: "string matcher has no pattern".into(),
            });
        };

        Ok(Self {
            kind,
            ignore_case: ic,
        })
    }

    pub fn matches(&self, input: &str) -> bool {
        if let StringKind::Regex(re) = &self.kind {
            return re.is_match(input);
        }

        let folded;
        let input = if self.ignore_case {
            folded = input.to_lowercase();
            folded.as_str()
        } else {
            input
        };

        match &self.kind {
            StringKind::Exact(p) => input == p,
            StringKind::Prefix(p) => input.starts_with(p.as_str()),
            StringKind::Suffix(p) => input.ends_with(p.as_str()),
            StringKind::Contains(p) => input.contains(p.as_str()),
            StringKind::Regex(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    kind: HeaderKind,
    invert: bool,
}

#[derive(Debug, Clone)]
enum HeaderKind {
    Present(bool),
    Value(StringMatcher),
}

impl HeaderMatcher {
    pub fn compile(spec: &HeaderMatchSpec, policy: &str) -> Result<Self> {
        let kind = match (spec.present, spec.value_matcher()) {
            (Some(p), _) => HeaderKind::Present(p),
            (None, Some(s)) => HeaderKind::Value(StringMatcher::compile(&s, policy)?),
            (None, None) => {
                return Err(RbacError::InvalidMatcher {
                    policy: policy.to_string(),
                    reason: format!("header {} has no pattern", spec.name),
                })
            }
        };
        Ok(Self {
            name: spec.name.to_ascii_lowercase(),
            kind,
            invert: spec.invert_match,
        })
    }

    /// A value pattern against a missing header never matches, inverted or not.
    pub fn matches(&self, attrs: &Attributes<'_>) -> bool {
        match &self.kind {
            HeaderKind::Present(expected) => {
                (attrs.headers.contains(&self.name) == *expected) != self.invert
            }
            HeaderKind::Value(m) => match attrs.headers.get(&self.name) {
                Some(v) => m.matches(&v) != self.invert,
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataMatcher {
    filter: String,
    path: Vec<String>,
    value: StringMatcher,
    invert: bool,
}

impl MetadataMatcher {
    pub fn compile(spec: &MetadataSpec, policy: &str) -> Result<Self> {
        Ok(Self {
            filter: spec.filter.clone(),
            path: spec.path.clone(),
            value: StringMatcher::compile(&spec.value, policy)?,
            invert: spec.invert,
        })
    }

    pub fn matches(&self, attrs: &Attributes<'_>) -> bool {
        let Some(v) = attrs.stream.metadata(&self.filter, &self.path) else {
            return false;
        };
        let matched = match v {
            Value::String(s) => self.value.matches(s),
            Value::Bool(b) => self.value.matches(if *b { "true" } else { "false" }),
            Value::Number(n) => self.value.matches(&n.to_string()),
            _ => return false,
        };
        matched != self.invert
    }
}

/// Parse a CIDR range; a bare address is treated as a host route.
pub fn parse_cidr(raw: &str, policy: &str) -> Result<IpNet> {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    raw.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|e| RbacError::InvalidMatcher {
            policy: policy.to_string(),
            reason: format!("invalid CIDR {raw:?}: {e}"),
        })
}

/// A single structural predicate over the attribute snapshot.
#[derive(Debug, Clone)]
pub enum Matcher {
    Header(HeaderMatcher),
    UrlPath(StringMatcher),
    Method(StringMatcher),
    SourceIp(IpNet),
    DestinationIp(IpNet),
    DestinationPort(u16),
    RequestedServerName(StringMatcher),
    /// `None` matches any peer that presented a certificate.
    Authenticated(Option<StringMatcher>),
    Metadata(MetadataMatcher),
}

impl Matcher {
    pub fn matches(&self, attrs: &Attributes<'_>) -> bool {
        let conn = attrs.connection;
        match self {
            Matcher::Header(h) => h.matches(attrs),
            Matcher::UrlPath(m) => attrs.headers.url_path().is_some_and(|p| m.matches(p)),
            Matcher::Method(m) => attrs.headers.method().is_some_and(|p| m.matches(p)),
            Matcher::SourceIp(net) => conn.source_ip().is_some_and(|ip| net.contains(&ip)),
            Matcher::DestinationIp(net) => {
                conn.destination_ip().is_some_and(|ip| net.contains(&ip))
            }
            Matcher::DestinationPort(port) => conn.destination_port() == Some(*port),
            Matcher::RequestedServerName(m) => {
                conn.requested_server_name().is_some_and(|s| m.matches(s))
            }
            Matcher::Authenticated(None) => conn.is_mtls(),
            Matcher::Authenticated(Some(m)) => {
                conn.peer_principals().into_iter().any(|p| m.matches(p))
            }
            Matcher::Metadata(m) => m.matches(attrs),
        }
    }
}
