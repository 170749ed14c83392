//! Dispatch relay: one request in, exactly one response out.
//!
//! `process` decodes the envelope, resolves the target, invokes it with the
//! connection's session context bound, and routes the outcome through a
//! single completion path shared by immediate and deferred results. Nothing
//! escapes: every failure becomes a failure response, except a response that
//! cannot be encoded, which is reported to the sink as an abort.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use svcrelay_core::error::{CryptoOp, RelayError};
use svcrelay_core::protocol::{CorrelationKey, InvocationDescriptor, Payload, RequestEnvelope, ResponseBody, ResponseEnvelope};

use crate::connection::ClientConnection;
use crate::context::session;
use crate::dispatch::deferred::{Completion, Deferred};
use crate::dispatch::fault::Fault;
use crate::dispatch::registry::{Reply, ServiceRegistry};
use crate::obs::metrics::RelayMetrics;

/// Logging context used until a registration supplies its own.
pub const DEFAULT_LOGGING_CONTEXT: &str = "transport";

/// Result of one invocation attempt.
#[derive(Debug)]
pub enum Outcome {
    Immediate(Value),
    Deferred(Deferred),
    Failed(Fault),
}

pub struct Relay {
    registry: Arc<ServiceRegistry>,
    metrics: Arc<RelayMetrics>,
    default_context: Arc<str>,
}

impl Relay {
    pub fn new(registry: Arc<ServiceRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry,
            metrics,
            default_context: Arc::from(DEFAULT_LOGGING_CONTEXT),
        }
    }

    pub fn with_default_context(mut self, ctx: impl Into<Arc<str>>) -> Self {
        self.default_context = ctx.into();
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Handle one inbound envelope. All results surface through the
    /// connection's sink.
    pub fn process(&self, conn: &Arc<ClientConnection>, envelope: RequestEnvelope) {
        let started = Instant::now();
        let sealed = envelope.payload.is_sealed();
        let exchange = Exchange {
            conn: Arc::clone(conn),
            key: envelope.key,
            sealed,
            logging_context: Arc::clone(&self.default_context),
            metrics: Arc::clone(&self.metrics),
            started,
        };

        let mut logging_context = None;
        let outcome = session::sync_scope(conn.context().clone(), || {
            self.invoke(conn, envelope.payload, &mut logging_context)
        });
        let exchange = match logging_context {
            Some(ctx) => Exchange {
                logging_context: ctx,
                ..exchange
            },
            None => exchange,
        };

        match outcome {
            Outcome::Immediate(value) => exchange.complete(Ok(value), Mode::Immediate),
            Outcome::Failed(fault) => exchange.complete(Err(fault), Mode::Immediate),
            Outcome::Deferred(deferred) => {
                tracing::trace!(key = %exchange.key, conn = %exchange.conn.connection_id(), "awaiting deferred result");
                deferred.on_completion(move |result| exchange.complete(result, Mode::Deferred));
            }
        }
    }

    /// Decode, resolve and call. Runs with the session context bound.
    fn invoke(&self, conn: &ClientConnection, payload: Payload, logging_context: &mut Option<Arc<str>>) -> Outcome {
        let call = match decode(conn, payload) {
            Ok(call) => call,
            Err(e) => return Outcome::Failed(e.into()),
        };

        let registration = match self.registry.lookup(&call.target) {
            Ok(r) => r,
            Err(e) => return Outcome::Failed(e.into()),
        };
        *logging_context = Some(Arc::from(registration.logging_context()));

        let callable = match registration.resolve(&call.method, &call.args) {
            Ok(c) => c,
            Err(e) => return Outcome::Failed(e.into()),
        };

        tracing::trace!(
            target_svc = %call.target,
            method = callable.name(),
            conn = %conn.connection_id(),
            "invoking"
        );

        match callable.invoke(&call.args) {
            Ok(Reply::Value(v)) => Outcome::Immediate(v),
            Ok(Reply::Deferred(d)) => Outcome::Deferred(d),
            Err(e) => Outcome::Failed(e.into_fault()),
        }
    }
}

fn decode(conn: &ClientConnection, payload: Payload) -> Result<InvocationDescriptor, RelayError> {
    let sealed = payload.is_sealed();
    let raw = payload.into_bytes();
    let plain = if sealed {
        conn.cryptor().unseal(&raw).map_err(|e| match e {
            RelayError::Crypto { reason, .. } => RelayError::Crypto {
                op: CryptoOp::Unseal,
                reason,
            },
            other => other,
        })?
    } else {
        raw
    };
    InvocationDescriptor::decode(&plain)
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Immediate,
    Deferred,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Immediate => "immediate",
            Mode::Deferred => "deferred",
        }
    }
}

/// Everything needed to answer one request, possibly from another thread.
struct Exchange {
    conn: Arc<ClientConnection>,
    key: CorrelationKey,
    sealed: bool,
    logging_context: Arc<str>,
    metrics: Arc<RelayMetrics>,
    started: Instant,
}

impl Exchange {
    /// Shared success/failure -> encode -> send path.
    fn complete(self, result: Completion, mode: Mode) {
        let body = match result {
            Ok(value) => ResponseBody::Success(value),
            Err(fault) => {
                fault.log(&self.logging_context, self.conn.connection_id());
                self.metrics.failures.inc(&[("class", fault.class().as_str())]);
                ResponseBody::Failure(fault.to_holder())
            }
        };
        let outcome = if body.is_success() { "success" } else { "failure" };

        match self.encode(&body) {
            Ok(payload) => {
                let response = ResponseEnvelope {
                    key: self.key.clone(),
                    payload,
                };
                self.metrics
                    .responses
                    .inc(&[("outcome", outcome), ("mode", mode.as_str())]);
                self.metrics
                    .dispatch_duration
                    .observe(&[("mode", mode.as_str())], self.started.elapsed());
                self.conn.sink().send(response, &self.key);
            }
            Err(e) => {
                tracing::error!(
                    context = %self.logging_context,
                    conn = %self.conn.connection_id(),
                    key = %self.key,
                    error = %e,
                    "response could not be encoded"
                );
                self.metrics.aborts.inc(&[("category", e.category().as_str())]);
                self.conn.sink().abort(&self.key, e);
            }
        }
    }

    /// Serialize, then seal iff the request was sealed.
    fn encode(&self, body: &ResponseBody) -> Result<Payload, RelayError> {
        let bytes = body.encode()?;
        if !self.sealed {
            return Ok(Payload::Plain(bytes));
        }
        self.conn
            .cryptor()
            .seal(&bytes)
            .map(Payload::Sealed)
            .map_err(|e| match e {
                RelayError::Crypto { reason, .. } => RelayError::Crypto {
                    op: CryptoOp::Seal,
                    reason,
                },
                other => RelayError::Encoding(other.to_string()),
            })
    }
}
