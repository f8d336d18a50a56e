#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use rbac_authz::config;
use rbac_authz::RbacEngine;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
rules:
  action: deny
  policies:
    p1:
      permissions: [ { header: { name: x-env, exakt: prod } } ] # typo should fail
      principals: [ { any: true } ]
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn unknown_action_is_rejected() {
    let bad = r#"
version: 1
rules:
  action: audit
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn policy_needs_permissions_and_principals() {
    let bad = r#"
version: 1
shadow_rules:
  action: allow
  policies:
    p1:
      permissions: []
      principals: [ { any: true } ]
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
    assert!(err.to_string().contains("shadow_rules.policies.p1"), "{err}");
}

#[test]
fn bad_listen_address() {
    let err = config::load_from_str("version: 1\nserver: { listen: nowhere }\n")
        .expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.listen, "0.0.0.0:9191");
    assert!(cfg.rules.is_none());
    assert!(cfg.shadow_rules.is_none());
}

#[test]
fn ok_full_config_builds_engine() {
    let ok = r#"
version: 1
server:
  listen: "127.0.0.1:9000"
rules:
  action: allow
  policies:
    admins:
      permissions:
        - and:
            - url_path: { prefix: /admin }
            - not: { method: { exact: DELETE } }
      principals:
        - authenticated: { principal_name: { prefix: "spiffe://td/" } }
        - source_ip: 10.0.0.0/8
      condition: "request.headers['x-env'] == 'prod'"
    readers:
      permissions: [ { method: { safe_regex: "GET|HEAD", ignore_case: true } } ]
      principals: [ { any: true } ]
    tenants:
      permissions:
        - metadata: { filter: authn, path: [tenant], value: { exact: acme } }
        - header: { name: x-debug, present: true, invert_match: true }
        - requested_server_name: { suffix: .example.com }
        - destination_port: 8443
        - destination_ip: 192.168.1.1
      principals: [ { any: true } ]
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let engine = RbacEngine::new(cfg.rules.as_ref().unwrap()).expect("must build");
    let names: Vec<_> = engine.policies().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["admins", "readers", "tenants"]);
    assert!(engine.has_expression_builder());
}

#[test]
fn invalid_regex_fails_the_whole_build() {
    let bad = r#"
version: 1
rules:
  action: deny
  policies:
    a-good:
      permissions: [ { any: true } ]
      principals: [ { any: true } ]
    b-bad:
      permissions: [ { url_path: { safe_regex: "(" } } ]
      principals: [ { any: true } ]
"#;
    let cfg = config::load_from_str(bad).expect("schema is valid");
    let err = RbacEngine::new(cfg.rules.as_ref().unwrap()).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_MATCHER");
    assert!(err.to_string().contains("b-bad"), "{err}");
}
