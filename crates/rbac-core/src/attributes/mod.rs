//! Attribute snapshot consumed by the decision engine.
//!
//! A decision is computed over three groups of facts:
//! - connection facts (addresses, SNI, TLS peer identity),
//! - request header facts (including the `:method`/`:path`/`:authority`
//!   pseudo-headers),
//! - stream facts (dynamic metadata written by earlier filters).
//!
//! The engine only ever borrows these through [`Attributes`]; it never mutates
//! them and never keeps them beyond a single call.

pub mod connection;
pub mod headers;
pub mod stream;

pub use connection::{ConnectionInfo, TlsInfo};
pub use headers::RequestHeaders;
pub use stream::StreamInfo;

/// Borrowed view over one request's facts, valid for a single evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Attributes<'a> {
    pub connection: &'a ConnectionInfo,
    pub headers: &'a RequestHeaders,
    pub stream: &'a StreamInfo,
}

impl<'a> Attributes<'a> {
    pub fn new(
        connection: &'a ConnectionInfo,
        headers: &'a RequestHeaders,
        stream: &'a StreamInfo,
    ) -> Self {
        Self {
            connection,
            headers,
            stream,
        }
    }
}
