//! Top-level facade crate for the RBAC decision engine.
//!
//! Re-exports the attribute/error primitives and the engine library so users can depend on a single crate.

pub mod core {
    pub use rbac_core::*;
}

pub mod authz {
    pub use rbac_authz::*;
}
