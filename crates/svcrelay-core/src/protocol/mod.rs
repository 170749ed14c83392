//! Protocol modules.
//!
//! - `envelope`: correlation-keyed request/response envelopes.
//! - `frame`: binary framing of envelopes on a connection.
//! - `invocation`: JSON invocation descriptor and response body.
//!
//! Parsers are panic-free: malformed input is reported as `RelayError`.

pub mod envelope;
pub mod frame;
pub mod invocation;

pub use envelope::{CorrelationKey, Payload, RequestEnvelope, ResponseEnvelope};
pub use invocation::{ErrorHolder, InvocationDescriptor, ResponseBody};
