//! Shared application state for the svcrelay gateway.
//!
//! Builds the registry, registers built-in services, and wires the relay and
//! metrics so the transport can hand envelopes off per connection.

use std::sync::Arc;

use svcrelay_core::error::Result;

use crate::config::GatewayConfig;
use crate::connection::ConnectionIds;
use crate::crypto::{Cryptor, PassthroughCryptor, XChaChaCryptor};
use crate::dispatch::{Relay, ServiceRegistry};
use crate::obs::RelayMetrics;
use crate::services;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    relay: Arc<Relay>,
    metrics: Arc<RelayMetrics>,
    cryptor: Arc<dyn Cryptor>,
    connection_ids: ConnectionIds,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let registry = Arc::new(ServiceRegistry::new());
        services::register_builtin(&registry, &cfg.services);
        Self::with_registry(cfg, registry)
    }

    /// Build around an already-populated registry.
    pub fn with_registry(cfg: GatewayConfig, registry: Arc<ServiceRegistry>) -> Result<Self> {
        let cryptor: Arc<dyn Cryptor> = match &cfg.relay.seal_key_hex {
            Some(key) => Arc::new(XChaChaCryptor::from_hex(key)?),
            None => {
                tracing::warn!("relay.seal_key_hex not set; sealed payloads pass through unencrypted");
                Arc::new(PassthroughCryptor)
            }
        };

        let metrics = Arc::new(RelayMetrics::default());
        let relay = Relay::new(registry, Arc::clone(&metrics))
            .with_default_context(cfg.relay.default_logging_context.as_str());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                relay: Arc::new(relay),
                metrics,
                cryptor,
                connection_ids: ConnectionIds::new(),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.inner.relay)
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.inner.metrics
    }

    /// Cryptor for a new connection. Every connection shares the configured key.
    pub fn cryptor(&self) -> Arc<dyn Cryptor> {
        Arc::clone(&self.inner.cryptor)
    }

    pub fn next_connection_id(&self) -> String {
        self.inner.connection_ids.next()
    }
}
