//! Call-scoped ambient session context.
//!
//! The binding lives in task-local storage and is only reachable inside a
//! `sync_scope`/`scope` call. Leaving the scope (normally, by `?`, or by
//! unwinding) restores the previous value, so a worker never observes a
//! context left over from an earlier call.

use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static WORK_CONTEXT: SessionContext;
}

/// Authenticated session identity carried by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    pub user: String,
}

/// Per-connection context. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    connection_id: Arc<str>,
    session: Option<SessionToken>,
}

impl SessionContext {
    pub fn new(connection_id: impl Into<Arc<str>>, session: Option<SessionToken>) -> Self {
        Self {
            connection_id: connection_id.into(),
            session,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn session_token(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }
}

/// Run `f` with `ctx` bound as the ambient context on this thread.
pub fn sync_scope<R>(ctx: SessionContext, f: impl FnOnce() -> R) -> R {
    WORK_CONTEXT.sync_scope(ctx, f)
}

/// Bind `ctx` for the whole lifetime of `fut`, across await points.
///
/// Deferred work completing on another task uses this to establish its own
/// binding; it never inherits the caller's.
pub async fn scope<F: Future>(ctx: SessionContext, fut: F) -> F::Output {
    WORK_CONTEXT.scope(ctx, fut).await
}

/// Snapshot of the bound context, if any.
pub fn current() -> Option<SessionContext> {
    WORK_CONTEXT.try_with(SessionContext::clone).ok()
}

/// Connection id of the bound context, if any.
pub fn current_connection_id() -> Option<Arc<str>> {
    WORK_CONTEXT.try_with(|c| Arc::clone(&c.connection_id)).ok()
}
