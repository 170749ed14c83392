//! svcrelay core: transport-agnostic wire types and the shared error surface.
//!
//! This crate defines the envelopes, the binary frame layout, the invocation
//! descriptor and the response body exchanged between the connection layer
//! and the dispatch relay. It carries no runtime dependencies.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here. Every fallible path
//! surfaces as `RelayError` so malformed traffic never takes a worker down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, RelayError};
