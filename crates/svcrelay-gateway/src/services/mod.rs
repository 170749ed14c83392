//! Built-in services.

pub mod echo;
pub mod session;
pub mod timer;

use std::sync::Arc;

pub use echo::EchoService;
pub use session::SessionService;
pub use timer::TimerService;

use crate::config::ServicesSection;
use crate::dispatch::{HandlerRegistration, ParamKind, ServiceRegistry};

/// Register the services enabled in config.
pub fn register_builtin(registry: &ServiceRegistry, enabled: &ServicesSection) {
    if enabled.echo {
        registry.register(
            HandlerRegistration::builder(EchoService::TARGET, Arc::new(EchoService::new()))
                .method("say", &[ParamKind::String], EchoService::say)
                .method("echo", &[ParamKind::Any], EchoService::echo)
                .build(),
        );
    }
    if enabled.timer {
        registry.register(
            HandlerRegistration::builder(TimerService::TARGET, Arc::new(TimerService::new()))
                .method("after", &[ParamKind::Integer, ParamKind::Any], TimerService::after)
                .method("fail_after", &[ParamKind::Integer, ParamKind::String], TimerService::fail_after)
                .build(),
        );
    }
    if enabled.session {
        registry.register(
            HandlerRegistration::builder(SessionService::TARGET, Arc::new(SessionService::new()))
                .logging_context("session")
                .method("whoami", &[], SessionService::whoami)
                .method("reject", &[ParamKind::String], SessionService::reject)
                .build(),
        );
    }
    tracing::info!(services = ?registry.registered_services(), "built-in services registered");
}
