use serde::Serialize;
use serde_json::Value;

use svcrelay_core::error::RelayError;

use crate::context::session;
use crate::dispatch::{arg, Fault, Rejected, Reply};

/// Introspection of the caller's own session.
#[derive(Debug, Default)]
pub struct SessionService;

#[derive(Debug, Serialize)]
struct WhoAmI<'a> {
    connection_id: &'a str,
    session_id: Option<&'a str>,
    user: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
#[error("request rejected: {reason}")]
pub struct RequestRejected {
    reason: String,
    #[source]
    source: Rejected,
}

impl SessionService {
    pub const TARGET: &'static str = "Session";

    pub fn new() -> Self {
        Self
    }

    /// `whoami()`: the session context bound for this call.
    pub fn whoami(&self, _args: &[Value]) -> Result<Reply, Fault> {
        let ctx = session::current().ok_or_else(|| Fault::system(RelayError::SessionUnbound))?;
        let token = ctx.session_token();
        Reply::json(WhoAmI {
            connection_id: ctx.connection_id(),
            session_id: token.map(|t| t.session_id.as_str()),
            user: token.map(|t| t.user.as_str()),
        })
    }

    /// `reject(string)`: always fails with a business-rule rejection.
    pub fn reject(&self, args: &[Value]) -> Result<Reply, Fault> {
        let reason: String = arg(args, "reject", 0)?;
        Err(Fault::processing(RequestRejected {
            source: Rejected(format!("caller asked to reject: {reason}")),
            reason,
        }))
    }
}
