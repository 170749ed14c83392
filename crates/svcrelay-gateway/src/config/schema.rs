use serde::Deserialize;
use svcrelay_core::error::{Result, RelayError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub services: ServicesSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.gateway.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(RelayError::Config(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(RelayError::Config(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(RelayError::Config(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    /// Logging context for failures raised before a service is resolved.
    #[serde(default = "default_logging_context")]
    pub default_logging_context: String,

    /// 32-byte XChaCha20-Poly1305 key, hex. Sealed frames pass through
    /// unchanged when unset.
    #[serde(default)]
    pub seal_key_hex: Option<String>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            default_logging_context: default_logging_context(),
            seal_key_hex: None,
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        if self.default_logging_context.trim().is_empty() {
            return Err(RelayError::Config(
                "relay.default_logging_context must not be empty".into(),
            ));
        }
        if let Some(key) = &self.seal_key_hex {
            crate::crypto::XChaChaCryptor::from_hex(key)?;
        }
        Ok(())
    }
}

fn default_logging_context() -> String {
    crate::dispatch::relay::DEFAULT_LOGGING_CONTEXT.into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesSection {
    #[serde(default = "enabled")]
    pub echo: bool,
    #[serde(default = "enabled")]
    pub timer: bool,
    #[serde(default = "enabled")]
    pub session: bool,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            echo: true,
            timer: true,
            session: true,
        }
    }
}

fn enabled() -> bool {
    true
}
