//! Session context types shared across layers.
//!
//! The connection layer owns a `SessionContext` per client connection; the
//! relay binds it as the ambient context for the duration of one invocation.

pub mod session;

pub use session::{SessionContext, SessionToken};
