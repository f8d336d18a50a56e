//! Attribute snapshot JSON vectors.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use serde::Deserialize;

use rbac_core::{ConnectionInfo, RequestHeaders, StreamInfo};

#[derive(Debug, Deserialize)]
struct Snapshot {
    connection: ConnectionInfo,
    headers: RequestHeaders,
    stream: StreamInfo,
}

fn load(name: &str) -> Snapshot {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn parse_snapshot_full() {
    let s = load("snapshot_full.json");

    let c = &s.connection;
    assert_eq!(c.source_ip().map(|ip| ip.to_string()).as_deref(), Some("10.0.0.7"));
    assert_eq!(c.source_port(), Some(51234));
    assert_eq!(c.destination_port(), Some(8443));
    assert_eq!(c.requested_server_name(), Some("api.example.com"));
    assert!(c.is_mtls());
    assert_eq!(
        c.peer_principals(),
        ["spiffe://td/ns/web/sa/frontend", "frontend.web.svc", "CN=frontend"]
    );

    let h = &s.headers;
    assert_eq!(h.method(), Some("POST"));
    assert_eq!(h.url_path(), Some("/v1/orders"));
    assert_eq!(h.host(), Some("api.example.com"));
    assert_eq!(h.get("x-request-id").as_deref(), Some("abc-123"));

    assert_eq!(s.stream.protocol.as_deref(), Some("HTTP/2"));
    assert_eq!(
        s.stream.metadata("authn", &["claims", "tenant"]).and_then(|v| v.as_str()),
        Some("acme")
    );
    assert!(s.stream.metadata("authn", &["claims", "missing"]).is_none());
    assert!(s.stream.metadata("other", &["sub"]).is_none());
}

#[test]
fn parse_snapshot_min() {
    let s = load("snapshot_min.json");
    assert_eq!(s.connection, ConnectionInfo::default());
    assert!(s.headers.is_empty());
    assert!(!s.connection.is_mtls());
    assert!(s.connection.peer_principals().is_empty());
    assert!(s.stream.dynamic_metadata.is_empty());
}

#[test]
fn unknown_connection_field_is_rejected() {
    let bad = r#"{ "connection": { "sourse": "10.0.0.1:1" }, "headers": {}, "stream": {} }"#;
    assert!(serde_json::from_str::<Snapshot>(bad).is_err());
}
