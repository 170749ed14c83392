//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS
//! - Build the `ClientConnection` (session context, cryptor, sink)
//! - Lifecycle: ping/pong + idle timeout
//! - Decode-once, then hand each envelope to a relay worker
//! - Drain the sink: write responses, close on abort

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use svcrelay_core::error::Result;

use crate::app_state::AppState;
use crate::connection::{ChannelSink, ClientConnection, SinkEvent};
use crate::context::{SessionContext, SessionToken};
use crate::transport::codec::{decode, encode, Inbound};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name for the session. Identity is the connection layer's
    /// concern; the relay only carries it.
    #[serde(default)]
    pub user: Option<String>,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| {
        let conn_id = app.next_connection_id();
        let span = tracing::info_span!("conn", id = %conn_id);
        async move {
            if let Err(e) = run_session(app, q, socket, conn_id).await {
                tracing::warn!(error = %e, "session ended with error");
            }
        }
        .instrument(span)
    })
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket, conn_id: String) -> Result<()> {
    let token = SessionToken {
        session_id: conn_id.clone(),
        user: q.user.unwrap_or_else(|| "anonymous".to_string()),
    };
    let (sink, mut events) = ChannelSink::new();
    let conn = Arc::new(ClientConnection::new(
        SessionContext::new(conn_id.as_str(), Some(token)),
        app.cryptor(),
        Arc::new(sink),
    ));
    let relay = app.relay();

    let (mut ws_tx, mut ws_rx) = socket.split();

    let gw = &app.cfg().gateway;
    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    tracing::info!("connection opened");

    loop {
        tokio::select! {
            // outbound writer
            event = events.recv() => {
                let Some(event) = event else { break; };
                if !forward_event(&mut ws_tx, event).await? {
                    break;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };
                last_activity = Instant::now();

                match decode(msg) {
                    Ok(Inbound::Request(envelope)) => {
                        let relay = Arc::clone(&relay);
                        let conn = Arc::clone(&conn);
                        tokio::task::spawn_blocking(move || relay.process(&conn, envelope));
                    }
                    Ok(Inbound::Text { bytes_len }) => {
                        tracing::debug!(bytes_len, "text frame ignored");
                    }
                    Ok(Inbound::Ping(payload)) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Ok(Inbound::Pong(_)) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => {
                        // No key to answer under.
                        app.metrics().frame_errors.inc(&[("category", e.category().as_str())]);
                        tracing::warn!(error = %e, "undecodable frame dropped");
                    }
                }
            }

            _ = ping_tick.tick() => {
                let _ = ws_tx.send(Message::Ping(Vec::new())).await;
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    break;
                }
            }
        }
    }

    tracing::info!("connection closed");
    Ok(())
}

/// Write one sink event to the socket. Returns `false` once the connection
/// must stop: the peer is gone, or an exchange aborted and the socket was
/// closed.
async fn forward_event<S>(ws_tx: &mut S, event: SinkEvent) -> Result<bool>
where
    S: Sink<Message> + Unpin,
{
    match event {
        SinkEvent::Response(resp) => {
            let msg = encode(&resp)?;
            Ok(ws_tx.send(msg).await.is_ok())
        }
        SinkEvent::Abort { key, error } => {
            tracing::error!(%key, error = %error, "closing connection: response could not be produced");
            let _ = ws_tx.send(Message::Close(None)).await;
            Ok(false)
        }
    }
}
