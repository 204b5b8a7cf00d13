//! WebSocket handler for the live support chat transport.
//!
//! The `/ws/chat` endpoint upgrades an HTTP connection to a WebSocket.
//! The portal token is resolved *before* the upgrade, so unauthenticated
//! sockets are rejected with a plain 401 instead of a doomed connection.
//!
//! Once connected, the handler:
//!
//! - **Registers** the connection with the [`ConnectionRegistry`] and
//!   drains its per-connection queue into the WebSocket sink.
//! - **Dispatches** incoming text frames as [`ClientEvent`] envelopes
//!   through the [`MessageRouter`]. Validation errors go back to this
//!   connection only; the connection is never dropped for them.
//! - **Forwards** lifecycle notices from the [`EventBus`] to admin
//!   connections, so the queue view updates live. Events for the session
//!   this connection is attached to are skipped (they already arrived via
//!   the per-connection queue).
//!
//! Disconnecting never ends a session. The registry mappings are cleaned
//! up and the session stays open for resume until the idle sweeper
//! decides otherwise.
//!
//! [`ConnectionRegistry`]: hostdesk_core::chat::registry::ConnectionRegistry
//! [`MessageRouter`]: hostdesk_core::chat::router::MessageRouter
//! [`EventBus`]: hostdesk_core::event::EventBus

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use hostdesk_core::chat::registry::ConnectionHandle;
use hostdesk_types::event::{ClientEvent, ServerEvent};
use hostdesk_types::identity::Identity;
use tokio::sync::broadcast;

use crate::http::extractors::auth::Authenticated;
use crate::state::AppState;

/// Upgrade an HTTP request to a WebSocket chat connection.
///
/// This is mounted at `/ws/chat` in the router.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_connection(socket, state, identity))
}

/// Core WebSocket connection loop.
///
/// Uses `tokio::select!` to multiplex between the per-connection event
/// queue, the lifecycle bus (admins only), and incoming frames. Keeping
/// sender and receiver in one task preserves per-connection event order.
async fn handle_chat_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let is_admin = identity.is_admin();
    let (conn, mut rx) = state.registry.register(identity);
    let mut bus_rx = state.bus.subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    tracing::info!(connection_id = %conn.id, user_id = %conn.identity.user_id, role = %conn.identity.role, "chat connection opened");

    loop {
        tokio::select! {
            // --- Branch 1: drain the per-connection queue to the sink ---
            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        if !send_event(&mut ws_sender, &event).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // --- Branch 2: lifecycle notices for the admin queue view ---
            bus_event = bus_rx.recv(), if is_admin => {
                match bus_event {
                    Ok(event) => {
                        // Attached sessions already deliver directly.
                        if let ServerEvent::SessionUpdate { session_id, .. } = &event {
                            if conn.session_id() == Some(*session_id) {
                                continue;
                            }
                        }
                        if !send_event(&mut ws_sender, &event).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "admin bus subscriber lagged, skipping {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // --- Branch 3: inbound envelopes from the client ---
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        process_envelope(&text, &conn, &state).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %conn.id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.unregister(&conn.id);
    tracing::info!(connection_id = %conn.id, "chat connection closed");
}

/// Serialize and send one event; returns false when the client is gone.
async fn send_event(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            tracing::warn!("Failed to serialize server event: {err}");
            true
        }
    }
}

/// Parse and dispatch a single envelope from the client.
///
/// Failures are reported to the originating connection only -- never
/// broadcast, and the connection stays up.
async fn process_envelope(text: &str, conn: &Arc<ConnectionHandle>, state: &AppState) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(
                connection_id = %conn.id,
                error = %err,
                "Ignoring malformed chat envelope"
            );
            conn.send(ServerEvent::Error {
                code: "MALFORMED_ENVELOPE".to_string(),
                message: "Envelope could not be parsed".to_string(),
            });
            return;
        }
    };

    if let Err(err) = state.router.dispatch(conn, event).await {
        tracing::debug!(connection_id = %conn.id, code = err.code(), "chat envelope rejected: {err}");
        conn.send(ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}
