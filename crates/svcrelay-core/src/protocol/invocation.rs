//! Invocation descriptor and response body (JSON).
//!
//! The descriptor is the decoded form of a request payload. The response body
//! is what gets serialized (and possibly sealed) into a response payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RelayError};

/// Structured call: which target, which method, which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvocationDescriptor {
    /// Registered service name (e.g., "Echo").
    pub target: String,
    /// Method name on that service.
    pub method: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl InvocationDescriptor {
    pub fn new(target: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args,
        }
    }

    /// Decode from plaintext payload bytes. Must be exactly this shape.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::Decode(format!("invalid invocation descriptor: {e}")))
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| RelayError::Encoding(format!("invocation encode failed: {e}")))
    }
}

/// Serializable holder for a failure. Carries the full message chain; the
/// concrete error object stays on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorHolder {
    /// Short type name of the outermost error.
    pub type_name: String,
    /// Display form of the outermost error.
    pub message: String,
    /// Display forms of each `source()` below the outermost, in order.
    #[serde(default)]
    pub causes: Vec<String>,
}

/// Response contents before sealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    Success(Value),
    Failure(ErrorHolder),
}

impl ResponseBody {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseBody::Success(_))
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| RelayError::Encoding(format!("response encode failed: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::Decode(format!("invalid response body: {e}")))
    }
}
