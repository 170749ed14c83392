//! Failure classification and sanitization.
//!
//! A `Fault` is whatever ended an invocation unsuccessfully. Its class only
//! decides log severity: processing faults are expected rejections (warn),
//! system faults are everything else (error). The wire form is the same
//! `ErrorHolder` either way.

use std::error::Error as StdError;
use std::fmt;

use tracing::Level;

use svcrelay_core::error::RelayError;
use svcrelay_core::protocol::ErrorHolder;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Cause chains longer than this are truncated.
const MAX_CHAIN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Business-rule rejection (validation, permission, ...).
    Processing,
    /// Unexpected runtime fault.
    System,
}

impl FaultClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultClass::Processing => "processing",
            FaultClass::System => "system",
        }
    }

    pub fn level(self) -> Level {
        match self {
            FaultClass::Processing => Level::WARN,
            FaultClass::System => Level::ERROR,
        }
    }
}

pub struct Fault {
    class: FaultClass,
    type_name: &'static str,
    error: BoxError,
}

impl Fault {
    /// Expected rejection raised by a handler.
    pub fn processing<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::with_class(FaultClass::Processing, error)
    }

    /// Unexpected failure.
    pub fn system<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::with_class(FaultClass::System, error)
    }

    /// Processing fault from a plain message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::processing(Rejected(message.into()))
    }

    fn with_class<E>(class: FaultClass, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            class,
            type_name: short_type_name::<E>(),
            error: Box::new(error),
        }
    }

    pub fn class(&self) -> FaultClass {
        self.class
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn error(&self) -> &(dyn StdError + 'static) {
        self.error.as_ref()
    }

    /// Serializable wrapper sent to the client: outermost message plus every
    /// message down the source chain.
    pub fn to_holder(&self) -> ErrorHolder {
        let mut chain = cause_chain(self.error()).into_iter();
        let message = chain.next().map(ToString::to_string).unwrap_or_default();
        ErrorHolder {
            type_name: self.type_name.to_string(),
            message,
            causes: chain.map(ToString::to_string).collect(),
        }
    }

    /// Emit the classification log line(s) and return the severity used.
    pub fn log(&self, logging_context: &str, connection_id: &str) -> Level {
        match self.class {
            FaultClass::Processing => {
                let root = root_cause(self.error());
                tracing::debug!(
                    context = %logging_context,
                    conn = %connection_id,
                    error = ?self.error,
                    "processing exception for session"
                );
                tracing::warn!(
                    context = %logging_context,
                    conn = %connection_id,
                    kind = self.type_name,
                    root = %root,
                    "processing error: {}",
                    self.error
                );
            }
            FaultClass::System => {
                tracing::error!(
                    context = %logging_context,
                    conn = %connection_id,
                    kind = self.type_name,
                    error = %self.error,
                    "received exception processing request"
                );
            }
        }
        self.class.level()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("class", &self.class)
            .field("type_name", &self.type_name)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

/// Relay-level failures (decode, lookup, panics) are system faults.
impl From<RelayError> for Fault {
    fn from(e: RelayError) -> Self {
        Fault::system(e)
    }
}

/// Plain-message business rejection.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Rejected(pub String);

/// The error itself followed by its `source()` links. Stops at a terminal
/// node, at the first node already visited, or at `MAX_CHAIN`.
pub fn cause_chain<'a>(error: &'a (dyn StdError + 'static)) -> Vec<&'a (dyn StdError + 'static)> {
    let mut chain: Vec<&'a (dyn StdError + 'static)> = vec![error];
    let mut cur = error;
    while let Some(next) = cur.source() {
        if chain.len() >= MAX_CHAIN || chain.iter().any(|seen| same_error(*seen, next)) {
            break;
        }
        chain.push(next);
        cur = next;
    }
    chain
}

/// Deepest distinct cause of `error`.
pub fn root_cause<'a>(error: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    cause_chain(error).last().copied().unwrap_or(error)
}

/// Same object: same address and same concrete type. A wrapper and its
/// first field share an address, so the address alone is not enough.
#[allow(ambiguous_wide_pointer_comparisons)]
fn same_error(a: &(dyn StdError + 'static), b: &(dyn StdError + 'static)) -> bool {
    std::ptr::eq(a as *const dyn StdError, b as *const dyn StdError)
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
