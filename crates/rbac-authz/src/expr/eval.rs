//! Lowered expression tree and its interpreter.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use rbac_core::Attributes;

use super::error::EvalError;
use super::parser::RelOp;
use super::value::Value;

/// Attribute paths known to the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attr {
    RequestHeaders,
    RequestMethod,
    RequestPath,
    RequestUrlPath,
    RequestHost,
    RequestProtocol,
    SourceAddress,
    SourcePort,
    DestinationAddress,
    DestinationPort,
    RequestedServerName,
    UriSanPeerCertificate,
    DnsSanPeerCertificate,
    SubjectPeerCertificate,
    TlsVersion,
    Mtls,
    Metadata,
}

impl Attr {
    pub(crate) fn resolve(root: &str, field: &str) -> Option<Attr> {
        let attr = match (root, field) {
            ("request", "headers") => Attr::RequestHeaders,
            ("request", "method") => Attr::RequestMethod,
            ("request", "path") => Attr::RequestPath,
            ("request", "url_path") => Attr::RequestUrlPath,
            ("request", "host") => Attr::RequestHost,
            ("request", "protocol") => Attr::RequestProtocol,
            ("source", "address") => Attr::SourceAddress,
            ("source", "port") => Attr::SourcePort,
            ("destination", "address") => Attr::DestinationAddress,
            ("destination", "port") => Attr::DestinationPort,
            ("connection", "requested_server_name") => Attr::RequestedServerName,
            ("connection", "uri_san_peer_certificate") => Attr::UriSanPeerCertificate,
            ("connection", "dns_san_peer_certificate") => Attr::DnsSanPeerCertificate,
            ("connection", "subject_peer_certificate") => Attr::SubjectPeerCertificate,
            ("connection", "tls_version") => Attr::TlsVersion,
            ("connection", "mtls") => Attr::Mtls,
            _ => return None,
        };
        Some(attr)
    }

    fn name(self) -> &'static str {
        match self {
            Attr::RequestHeaders => "request.headers",
            Attr::RequestMethod => "request.method",
            Attr::RequestPath => "request.path",
            Attr::RequestUrlPath => "request.url_path",
            Attr::RequestHost => "request.host",
            Attr::RequestProtocol => "request.protocol",
            Attr::SourceAddress => "source.address",
            Attr::SourcePort => "source.port",
            Attr::DestinationAddress => "destination.address",
            Attr::DestinationPort => "destination.port",
            Attr::RequestedServerName => "connection.requested_server_name",
            Attr::UriSanPeerCertificate => "connection.uri_san_peer_certificate",
            Attr::DnsSanPeerCertificate => "connection.dns_san_peer_certificate",
            Attr::SubjectPeerCertificate => "connection.subject_peer_certificate",
            Attr::TlsVersion => "connection.tls_version",
            Attr::Mtls => "connection.mtls",
            Attr::Metadata => "metadata",
        }
    }

    fn load(self, attrs: &Attributes<'_>) -> Result<Value, EvalError> {
        let conn = attrs.connection;
        let headers = attrs.headers;
        let tls = conn.tls.as_ref().filter(|t| t.peer_certificate_presented);
        let string = |s: Option<&str>| s.map(Value::from);

        let v = match self {
            Attr::RequestHeaders => {
                let mut map = BTreeMap::new();
                for (name, _) in headers.iter() {
                    if !map.contains_key(name) {
                        if let Some(v) = headers.get(name) {
                            map.insert(name.to_string(), Value::String(v.into_owned()));
                        }
                    }
                }
                Some(Value::Map(map))
            }
            Attr::RequestMethod => string(headers.method()),
            Attr::RequestPath => string(headers.get_all(":path").next()),
            Attr::RequestUrlPath => string(headers.url_path()),
            Attr::RequestHost => string(headers.host()),
            Attr::RequestProtocol => string(attrs.stream.protocol.as_deref()),
            Attr::SourceAddress => conn.source.map(|a| Value::String(a.to_string())),
            Attr::SourcePort => conn.source_port().map(|p| Value::Int(i64::from(p))),
            Attr::DestinationAddress => conn.destination.map(|a| Value::String(a.to_string())),
            Attr::DestinationPort => conn.destination_port().map(|p| Value::Int(i64::from(p))),
            Attr::RequestedServerName => string(conn.requested_server_name()),
            Attr::UriSanPeerCertificate => {
                string(tls.and_then(|t| t.uri_san_peer_certificate.first().map(String::as_str)))
            }
            Attr::DnsSanPeerCertificate => {
                string(tls.and_then(|t| t.dns_san_peer_certificate.first().map(String::as_str)))
            }
            Attr::SubjectPeerCertificate => {
                string(tls.and_then(|t| t.subject_peer_certificate.as_deref()))
            }
            Attr::TlsVersion => string(conn.tls.as_ref().and_then(|t| t.version.as_deref())),
            Attr::Mtls => Some(Value::Bool(conn.is_mtls())),
            Attr::Metadata => Some(Value::Map(
                attrs
                    .stream
                    .dynamic_metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            )),
        };

        v.ok_or(EvalError::Absent(self.name()))
    }
}

#[derive(Debug)]
pub(crate) enum Node {
    Const(Value),
    Attr(Attr),
    Field(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
    Rel(RelOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    List(Vec<Node>),
    Size(Box<Node>),
    StartsWith(Box<Node>, Box<Node>),
    EndsWith(Box<Node>, Box<Node>),
    Contains(Box<Node>, Box<Node>),
    Matches(Box<Node>, Arc<Regex>),
}

fn eval_bool(node: &Node, attrs: &Attributes<'_>, op: &'static str) -> Result<bool, EvalError> {
    match eval(node, attrs)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::overload(op, other.type_name(), None)),
    }
}

fn eval_string(node: &Node, attrs: &Attributes<'_>, op: &'static str) -> Result<String, EvalError> {
    match eval(node, attrs)? {
        Value::String(s) => Ok(s),
        other => Err(EvalError::overload(op, other.type_name(), None)),
    }
}

pub(crate) fn eval(node: &Node, attrs: &Attributes<'_>) -> Result<Value, EvalError> {
    match node {
        Node::Const(v) => Ok(v.clone()),
        Node::Attr(a) => a.load(attrs),
        Node::Field(target, field) => match eval(target, attrs)? {
            Value::Map(mut m) => m
                .remove(field)
                .ok_or_else(|| EvalError::NoSuchKey(field.clone())),
            other => Err(EvalError::overload(".", other.type_name(), None)),
        },
        Node::Index(target, key) => index(eval(target, attrs)?, eval(key, attrs)?),
        Node::Not(e) => Ok(Value::Bool(!eval_bool(e, attrs, "!")?)),
        Node::Neg(e) => match eval(e, attrs)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(EvalError::overload("-", "int", None)),
            Value::Double(d) => Ok(Value::Double(-d)),
            other => Err(EvalError::overload("-", other.type_name(), None)),
        },
        Node::Rel(op, l, r) => relation(*op, eval(l, attrs)?, eval(r, attrs)?),
        // `false && error` and `error && false` are both false; same for `||`
        // with true. Otherwise the first error wins.
        Node::And(l, r) => match eval_bool(l, attrs, "&&") {
            Ok(false) => Ok(Value::Bool(false)),
            Ok(true) => eval_bool(r, attrs, "&&").map(Value::Bool),
            Err(e) => match eval_bool(r, attrs, "&&") {
                Ok(false) => Ok(Value::Bool(false)),
                _ => Err(e),
            },
        },
        Node::Or(l, r) => match eval_bool(l, attrs, "||") {
            Ok(true) => Ok(Value::Bool(true)),
            Ok(false) => eval_bool(r, attrs, "||").map(Value::Bool),
            Err(e) => match eval_bool(r, attrs, "||") {
                Ok(true) => Ok(Value::Bool(true)),
                _ => Err(e),
            },
        },
        Node::List(items) => items
            .iter()
            .map(|n| eval(n, attrs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Node::Size(e) => match eval(e, attrs)? {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(xs) => Ok(Value::Int(xs.len() as i64)),
            Value::Map(m) => Ok(Value::Int(m.len() as i64)),
            other => Err(EvalError::overload("size", other.type_name(), None)),
        },
        Node::StartsWith(t, arg) => {
            let s = eval_string(t, attrs, "startsWith")?;
            let p = eval_string(arg, attrs, "startsWith")?;
            Ok(Value::Bool(s.starts_with(&p)))
        }
        Node::EndsWith(t, arg) => {
            let s = eval_string(t, attrs, "endsWith")?;
            let p = eval_string(arg, attrs, "endsWith")?;
            Ok(Value::Bool(s.ends_with(&p)))
        }
        Node::Contains(t, arg) => match (eval(t, attrs)?, eval(arg, attrs)?) {
            (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.contains(&p))),
            (Value::List(xs), needle) => Ok(Value::Bool(xs.iter().any(|x| equal(x, &needle)))),
            (l, r) => Err(EvalError::overload(
                "contains",
                l.type_name(),
                Some(r.type_name()),
            )),
        },
        Node::Matches(t, re) => Ok(Value::Bool(re.is_match(&eval_string(t, attrs, "matches")?))),
    }
}

fn index(target: Value, key: Value) -> Result<Value, EvalError> {
    match (target, key) {
        (Value::Map(mut m), Value::String(k)) => m.remove(&k).ok_or(EvalError::NoSuchKey(k)),
        (Value::List(xs), Value::Int(i)) => usize::try_from(i)
            .ok()
            .and_then(|i| xs.into_iter().nth(i))
            .ok_or_else(|| EvalError::NoSuchKey(i.to_string())),
        (t, k) => Err(EvalError::overload("[]", t.type_name(), Some(k.type_name()))),
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(i), Value::Double(d)) | (Value::Double(d), Value::Int(i)) => *i as f64 == *d,
        _ => a == b,
    }
}

fn relation(op: RelOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;

    let ordering = |name: &'static str| -> Result<Ordering, EvalError> {
        let ord = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ord.ok_or(EvalError::overload(name, l.type_name(), Some(r.type_name())))
    };

    let b = match op {
        RelOp::Eq => equal(&l, &r),
        RelOp::Ne => !equal(&l, &r),
        RelOp::Lt => ordering("<")? == Ordering::Less,
        RelOp::Le => ordering("<=")? != Ordering::Greater,
        RelOp::Gt => ordering(">")? == Ordering::Greater,
        RelOp::Ge => ordering(">=")? != Ordering::Less,
        RelOp::In => match (&l, &r) {
            (needle, Value::List(xs)) => xs.iter().any(|x| equal(x, needle)),
            (Value::String(k), Value::Map(m)) => m.contains_key(k),
            _ => {
                return Err(EvalError::overload(
                    "in",
                    l.type_name(),
                    Some(r.type_name()),
                ))
            }
        },
    };
    Ok(Value::Bool(b))
}
