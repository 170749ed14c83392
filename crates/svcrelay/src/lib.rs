//! Top-level facade crate for svcrelay.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use svcrelay_core::*;
}

pub mod gateway {
    pub use svcrelay_gateway::*;
}
