//! RBAC decision engine and service.
//!
//! The library half compiles YAML policy configuration into an immutable
//! [`RbacEngine`] and answers "is this request permitted, and which policy
//! said so". The service half (`app_state`, `router`, `service`, `ops`) exposes
//! the same decision over HTTP with hot reload and Prometheus metrics.

pub mod app_state;
pub mod condition;
pub mod config;
pub mod engine;
pub mod expr;
pub mod filter;
pub mod matcher;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod reload;
pub mod router;
pub mod service;

pub use engine::{LogDecision, RbacEngine};
pub use filter::{FilterDecision, RbacFilter, ShadowDecision};
pub use policy::Policy;
pub use reload::EngineHandle;
