//! Request-level access control: an enforced engine plus an optional shadow
//! engine.
//!
//! The shadow engine is evaluated on every request so new rules can be
//! observed in production, but its verdict is only reported, never enforced.
//! With no enforced engine every request is permitted.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use rbac_core::error::Result;
use rbac_core::{ConnectionInfo, RequestHeaders, StreamInfo};

use crate::config::RbacConfig;
use crate::engine::{LogDecision, RbacEngine};
use crate::obs::RbacMetrics;

const NO_POLICY: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDecision {
    pub allowed: bool,
    pub effective_policy_id: Option<String>,
    pub should_log: LogDecision,
    pub shadow: Option<ShadowDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowDecision {
    pub allowed: bool,
    pub effective_policy_id: Option<String>,
}

#[derive(Debug)]
pub struct RbacFilter {
    engine: Option<Arc<RbacEngine>>,
    shadow: Option<Arc<RbacEngine>>,
    metrics: Arc<RbacMetrics>,
}

impl RbacFilter {
    pub fn new(
        engine: Option<RbacEngine>,
        shadow: Option<RbacEngine>,
        metrics: Arc<RbacMetrics>,
    ) -> Self {
        Self {
            engine: engine.map(Arc::new),
            shadow: shadow.map(Arc::new),
            metrics,
        }
    }

    /// Build both engines; fails if either fails.
    pub fn from_config(cfg: &RbacConfig, metrics: Arc<RbacMetrics>) -> Result<Self> {
        let engine = cfg.rules.as_ref().map(RbacEngine::new).transpose()?;
        let shadow = cfg.shadow_rules.as_ref().map(RbacEngine::new).transpose()?;
        Ok(Self::new(engine, shadow, metrics))
    }

    pub fn engine(&self) -> Option<&Arc<RbacEngine>> {
        self.engine.as_ref()
    }

    pub fn shadow_engine(&self) -> Option<&Arc<RbacEngine>> {
        self.shadow.as_ref()
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        &self.metrics
    }

    pub fn decide(
        &self,
        connection: &ConnectionInfo,
        headers: &RequestHeaders,
        stream: &StreamInfo,
    ) -> FilterDecision {
        let started = Instant::now();

        let shadow = self.shadow.as_ref().map(|engine| {
            let mut id = String::new();
            let allowed = engine.allowed(connection, headers, stream, Some(&mut id));
            let id = non_empty(id);
            self.record("shadow", allowed, id.as_deref());
            ShadowDecision {
                allowed,
                effective_policy_id: id,
            }
        });

        let (allowed, should_log, id) = match &self.engine {
            None => (true, LogDecision::Undecided, None),
            Some(engine) => {
                // Only one of these can write the slot: should_log evaluates
                // in log mode, allowed in the other two.
                let mut id = String::new();
                let should_log = engine.should_log(connection, headers, stream, Some(&mut id));
                let allowed = engine.allowed(connection, headers, stream, Some(&mut id));
                let id = non_empty(id);

                self.record("enforced", allowed, id.as_deref());
                match should_log {
                    LogDecision::Yes => self.metrics.log_decisions.inc(&[
                        ("verdict", "logged"),
                        ("policy", id.as_deref().unwrap_or(NO_POLICY)),
                    ]),
                    LogDecision::No => self
                        .metrics
                        .log_decisions
                        .inc(&[("verdict", "not_logged"), ("policy", NO_POLICY)]),
                    LogDecision::Undecided => {}
                }
                (allowed, should_log, id)
            }
        };

        self.metrics
            .decision_duration
            .observe(&[], started.elapsed());

        if !allowed {
            debug!(policy = id.as_deref().unwrap_or(NO_POLICY), "rbac denied request");
        }

        FilterDecision {
            allowed,
            effective_policy_id: id,
            should_log,
            shadow,
        }
    }

    /// [`decide`](Self::decide) with an empty header set.
    pub fn decide_without_headers(
        &self,
        connection: &ConnectionInfo,
        stream: &StreamInfo,
    ) -> FilterDecision {
        self.decide(connection, &RequestHeaders::default(), stream)
    }

    fn record(&self, engine: &str, allowed: bool, policy: Option<&str>) {
        let verdict = if allowed { "allowed" } else { "denied" };
        self.metrics.decisions.inc(&[
            ("engine", engine),
            ("verdict", verdict),
            ("policy", policy.unwrap_or(NO_POLICY)),
        ]);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn filter(yaml: &str) -> RbacFilter {
        let cfg = config::load_from_str(yaml).unwrap();
        RbacFilter::from_config(&cfg, Arc::new(RbacMetrics::default())).unwrap()
    }

    const CFG: &str = r#"
version: 1
rules:
  action: deny
  policies:
    block-prod:
      permissions: [ { header: { name: x-env, exact: prod } } ]
      principals: [ { any: true } ]
shadow_rules:
  action: allow
  policies:
    only-get:
      permissions: [ { method: { exact: GET } } ]
      principals: [ { any: true } ]
"#;

    #[test]
    fn shadow_is_reported_not_enforced() {
        let f = filter(CFG);
        let conn = ConnectionInfo::default();
        let stream = StreamInfo::default();

        let post = RequestHeaders::new()
            .with(":method", "POST")
            .with("x-env", "staging");
        let d = f.decide(&conn, &post, &stream);
        assert!(d.allowed);
        assert_eq!(d.effective_policy_id, None);
        assert_eq!(d.should_log, LogDecision::Undecided);
        assert_eq!(
            d.shadow,
            Some(ShadowDecision {
                allowed: false,
                effective_policy_id: None
            })
        );

        let prod_get = RequestHeaders::new()
            .with(":method", "GET")
            .with("x-env", "prod");
        let d = f.decide(&conn, &prod_get, &stream);
        assert!(!d.allowed);
        assert_eq!(d.effective_policy_id.as_deref(), Some("block-prod"));
        assert_eq!(
            d.shadow.and_then(|s| s.effective_policy_id).as_deref(),
            Some("only-get")
        );

        let m = f.metrics();
        assert_eq!(
            m.decisions.get(&[
                ("engine", "enforced"),
                ("verdict", "denied"),
                ("policy", "block-prod")
            ]),
            1
        );
        assert_eq!(
            m.decisions.get(&[
                ("engine", "shadow"),
                ("verdict", "denied"),
                ("policy", "none")
            ]),
            1
        );
    }

    #[test]
    fn log_mode_reports_policy_and_permits() {
        let f = filter(
            r#"
version: 1
rules:
  action: log
  policies:
    audit-admin:
      permissions: [ { url_path: { prefix: /admin } } ]
      principals: [ { any: true } ]
"#,
        );
        let conn = ConnectionInfo::default();
        let stream = StreamInfo::default();

        let d = f.decide(&conn, &RequestHeaders::new().with(":path", "/admin/x"), &stream);
        assert!(d.allowed);
        assert_eq!(d.should_log, LogDecision::Yes);
        assert_eq!(d.effective_policy_id.as_deref(), Some("audit-admin"));

        let d = f.decide_without_headers(&conn, &stream);
        assert!(d.allowed);
        assert_eq!(d.should_log, LogDecision::No);
        assert_eq!(d.effective_policy_id, None);

        assert_eq!(
            f.metrics()
                .log_decisions
                .get(&[("verdict", "logged"), ("policy", "audit-admin")]),
            1
        );
    }

    #[test]
    fn no_rules_permits_everything() {
        let f = filter("version: 1\n");
        let d = f.decide_without_headers(&ConnectionInfo::default(), &StreamInfo::default());
        assert!(d.allowed);
        assert_eq!(d.should_log, LogDecision::Undecided);
        assert!(d.shadow.is_none());
    }
}
