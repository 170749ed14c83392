//! Dispatch module exports.
//!
//! Re-exports the relay, the registry and the fault/deferred types so
//! services can depend on this module directly.

pub mod deferred;
pub mod fault;
pub mod registry;
pub mod relay;

pub use deferred::{Completer, Completion, Deferred};
pub use fault::{Fault, FaultClass, Rejected};
pub use registry::{arg, HandlerRegistration, ParamKind, Reply, ServiceRegistry};
pub use relay::{Outcome, Relay};
