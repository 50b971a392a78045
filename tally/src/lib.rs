//! The tally transaction statistics service.
//!
//! Tally ingests timestamped monetary amounts over HTTP and answers with
//! exact aggregate statistics over the trailing sixty seconds. The
//! aggregation core lives in the `tally-window` crate; this crate supplies
//! the thin request layer, configuration, and process plumbing around it.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod server;
pub mod signals;
pub(crate) mod wire;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};

/// Wrap bytes in a boxed response body whose error type lines up with the
/// connection's.
pub(crate) fn full<B: Into<Bytes>>(chunk: B) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}
