//! Decision vectors: config + request snapshots + expected verdicts.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use rbac_authz::config;
use rbac_authz::obs::RbacMetrics;
use rbac_authz::RbacFilter;


fn run(name: &str) {
    let v = vector_loader::load(name);
    let cfg = config::load_from_str(&v.config)
        .unwrap_or_else(|e| panic!("{name} ({}): {e}", v.description));
    let filter = RbacFilter::from_config(&cfg, Arc::new(RbacMetrics::default()))
        .unwrap_or_else(|e| panic!("{name} ({}): {e}", v.description));

    for case in &v.cases {
        let req = &case.request;
        let d = match &req.headers {
            Some(h) => filter.decide(&req.connection, h, &req.stream),
            None => filter.decide_without_headers(&req.connection, &req.stream),
        };
        let ctx = format!("{name}: {}", case.description);

        assert_eq!(d.allowed, case.expect.allowed, "{ctx}");
        assert_eq!(d.effective_policy_id, case.expect.effective_policy_id, "{ctx}");
        if let Some(log) = &case.expect.should_log {
            assert_eq!(d.should_log.as_str(), log, "{ctx}");
        }
        if let Some(shadow) = &case.expect.shadow {
            let got = d.shadow.as_ref().unwrap_or_else(|| panic!("{ctx}: no shadow"));
            assert_eq!(got.allowed, shadow.allowed, "{ctx}");
            assert_eq!(got.effective_policy_id, shadow.effective_policy_id, "{ctx}");
        }
    }
}

#[test]
fn deny_env_vectors() {
    run("deny_env.yaml");
}

#[test]
fn allow_structural_vectors() {
    run("allow_structural.yaml");
}

#[test]
fn log_mode_vectors() {
    run("log_mode.yaml");
}

#[test]
fn expression_vectors() {
    run("expressions.yaml");
}

#[test]
fn shadow_vectors() {
    run("shadow.yaml");
}
