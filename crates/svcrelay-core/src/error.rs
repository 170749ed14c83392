//! Shared error type across svcrelay crates.

use thiserror::Error;

/// Failure taxonomy. Every category except `Encoding` ends up on the wire as
/// an ordinary failure response; they differ only in how they are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or undecryptable payload.
    Decode,
    /// Unknown target, or no method accepting the arguments.
    Lookup,
    /// Handler raised, panicked, or abandoned its deferred result.
    Invocation,
    /// The outgoing response could not be serialized or sealed.
    Encoding,
    /// Startup configuration problem.
    Config,
}

impl ErrorCategory {
    /// Stable string form used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Decode => "DECODE",
            ErrorCategory::Lookup => "LOOKUP",
            ErrorCategory::Invocation => "INVOCATION",
            ErrorCategory::Encoding => "ENCODING",
            ErrorCategory::Config => "CONFIG",
        }
    }
}

/// Which side of the seal operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoOp {
    Seal,
    Unseal,
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("crypto failure ({op:?}): {reason}")]
    Crypto { op: CryptoOp, reason: String },
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("no method {target}.{method} accepts ({shape})")]
    NoSuchMethod {
        target: String,
        method: String,
        shape: String,
    },
    #[error("call to {target}.{method} with ({shape}) is ambiguous")]
    AmbiguousMethod {
        target: String,
        method: String,
        shape: String,
    },
    #[error("argument {index} of {method}: {reason}")]
    BadArgument {
        method: String,
        index: usize,
        reason: String,
    },
    #[error("handler panicked: {0}")]
    HandlerPanic(String),
    #[error("deferred result abandoned before completion")]
    Abandoned,
    #[error("runtime unavailable: {0}")]
    Runtime(String),
    #[error("no session context bound to this call")]
    SessionUnbound,
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error("invalid config: {0}")]
    Config(String),
}

impl RelayError {
    /// Map to the taxonomy category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::Decode(_) => ErrorCategory::Decode,
            RelayError::Crypto { op: CryptoOp::Unseal, .. } => ErrorCategory::Decode,
            RelayError::Crypto { op: CryptoOp::Seal, .. } => ErrorCategory::Encoding,
            RelayError::UnknownService(_)
            | RelayError::NoSuchMethod { .. }
            | RelayError::AmbiguousMethod { .. }
            | RelayError::BadArgument { .. } => ErrorCategory::Lookup,
            RelayError::HandlerPanic(_)
            | RelayError::Abandoned
            | RelayError::Runtime(_)
            | RelayError::SessionUnbound => ErrorCategory::Invocation,
            RelayError::Encoding(_) => ErrorCategory::Encoding,
            RelayError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Encoding failures cannot be reported back to the caller.
    pub fn is_fatal_for_exchange(&self) -> bool {
        self.category() == ErrorCategory::Encoding
    }
}
