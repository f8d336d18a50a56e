//! RBAC core: attribute snapshot types and the shared error surface.
//!
//! This crate defines what a decision is computed over (connection, request
//! header and stream facts) and the error types shared by the engine and the
//! decision service. It carries no async runtime or transport dependencies,
//! so any transport that wants to feed the engine can embed it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Attribute accessors never fail: an absent fact is reported as `None`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod attributes;
pub mod error;

pub use attributes::{Attributes, ConnectionInfo, RequestHeaders, StreamInfo, TlsInfo};
pub use error::{ErrorCode, RbacError, Result};
