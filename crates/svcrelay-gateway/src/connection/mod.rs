//! Connection-side collaborators of the relay.
//!
//! A `ClientConnection` bundles what the relay needs from one client socket:
//! its session context, its cryptor, and the sink responses go out through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use svcrelay_core::error::RelayError;
use svcrelay_core::protocol::{CorrelationKey, ResponseEnvelope};

use crate::context::SessionContext;
use crate::crypto::Cryptor;

/// Outbound side of a connection, keyed by correlation token.
///
/// Called from relay workers and from deferred completions on arbitrary
/// threads, so implementations must accept concurrent submissions.
pub trait ResponseSink: Send + Sync {
    /// Deliver the single response for `key`.
    fn send(&self, response: ResponseEnvelope, key: &CorrelationKey);

    /// No response can be produced for `key`; the connection decides how to
    /// surface that (typically by closing).
    fn abort(&self, key: &CorrelationKey, error: RelayError);
}

/// What the transport writer drains from a `ChannelSink`.
#[derive(Debug)]
pub enum SinkEvent {
    Response(ResponseEnvelope),
    Abort { key: CorrelationKey, error: RelayError },
}

/// Unbounded queue sink; the transport writer owns the receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResponseSink for ChannelSink {
    fn send(&self, response: ResponseEnvelope, key: &CorrelationKey) {
        if self.tx.send(SinkEvent::Response(response)).is_err() {
            tracing::debug!(%key, "connection gone, response dropped");
        }
    }

    fn abort(&self, key: &CorrelationKey, error: RelayError) {
        let key = key.clone();
        if self.tx.send(SinkEvent::Abort { key, error }).is_err() {
            tracing::debug!("connection gone, abort dropped");
        }
    }
}

/// One client connection as seen by the relay.
pub struct ClientConnection {
    context: SessionContext,
    cryptor: Arc<dyn Cryptor>,
    sink: Arc<dyn ResponseSink>,
}

impl ClientConnection {
    pub fn new(context: SessionContext, cryptor: Arc<dyn Cryptor>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            context,
            cryptor,
            sink,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn connection_id(&self) -> &str {
        self.context.connection_id()
    }

    pub fn cryptor(&self) -> &dyn Cryptor {
        self.cryptor.as_ref()
    }

    pub fn sink(&self) -> &dyn ResponseSink {
        self.sink.as_ref()
    }
}

/// Monotonic connection id source.
#[derive(Debug)]
pub struct ConnectionIds {
    seq: AtomicU64,
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionIds {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        format!("conn-{}", self.seq.fetch_add(1, Ordering::Relaxed))
    }
}
