use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use roster_protocol::{
    parse_inbound_event, ChatSend, InboundEvent, InboundEventError, CHAT_MESSAGE_EVENT,
};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub(crate) mod connection_control;
pub(crate) mod connection_registry;
pub(crate) mod fanout;
pub(crate) mod presence;
pub(crate) mod relay;

use connection_control::signal_connections_close;
use connection_registry::{RegisterOutcome, RegistryError};
use fanout::dispatch_broadcast_payload;
use presence::build_presence_event;
use relay::plan_chat_broadcast;

use super::{
    auth::{authenticate, bearer_token, now_unix},
    core::{AppState, ConnectionControl, Identity},
    errors::AuthError,
    gateway_events,
    metrics::{
        record_gateway_event_dropped, record_gateway_event_emitted,
        record_gateway_event_parse_rejected, record_gateway_event_unknown_received,
        record_session_eviction, record_ws_disconnect,
    },
    types::GatewayAuthQuery,
};

const SLOW_CONSUMER_CLOSE_REASON: &str = "slow_consumer";
const PING_INTERVAL_SECS: u64 = 30;

pub(crate) async fn gateway_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayAuthQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let credential = query
        .access_token
        .or_else(|| bearer_token(&headers).map(ToOwned::to_owned));
    let identity = match authenticate(&state, credential.as_deref()).await {
        Ok(identity) => identity,
        Err(error) => {
            tracing::warn!(event = "gateway.handshake.rejected", reason = error.reason());
            return Err(error);
        }
    };

    Ok(ws.on_upgrade(move |socket| async move {
        handle_gateway_connection(state, socket, identity).await;
    }))
}

#[allow(clippy::too_many_lines)]
pub(crate) async fn handle_gateway_connection(
    state: AppState,
    socket: WebSocket,
    identity: Identity,
) {
    let connection_id = Uuid::new_v4();
    let user_id = identity.user_id;
    let display_name = identity.display_name.clone();
    let (mut sink, mut stream) = socket.split();

    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<String>(state.runtime.gateway_outbound_queue);
    let (control_tx, mut control_rx) = watch::channel(ConnectionControl::Open);

    if let Err(error) =
        register_connection(&state, connection_id, identity, outbound_tx.clone(), control_tx).await
    {
        record_ws_disconnect("duplicate_connection");
        tracing::error!(
            event = "gateway.connection.rejected",
            connection_id = %connection_id,
            error = %error
        );
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: 1011,
                reason: "duplicate_connection".into(),
            })))
            .await;
        return;
    }
    tracing::info!(
        event = "gateway.connection.open",
        connection_id = %connection_id,
        user_id = %user_id
    );

    let ready_event = gateway_events::ready(connection_id, user_id, &display_name);
    let _ = outbound_tx.send(ready_event.payload).await;
    record_gateway_event_emitted("connection", ready_event.event_type);

    let forced_close = Arc::new(AtomicBool::new(false));
    let forced_close_send = Arc::clone(&forced_close);
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if sink.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                control_change = control_rx.changed() => {
                    if control_change.is_err() {
                        break;
                    }
                    let control = *control_rx.borrow();
                    if let ConnectionControl::Close { reason } = control {
                        forced_close_send.store(true, Ordering::Relaxed);
                        record_ws_disconnect(reason);
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: 1008,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
                maybe_payload = outbound_rx.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            if sink.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let mut disconnect_reason = "connection_closed";
    while let Some(incoming) = stream.next().await {
        let Ok(message) = incoming else {
            disconnect_reason = "socket_error";
            break;
        };

        let payload: Vec<u8> = match message {
            Message::Text(text) => {
                if text.len() > state.runtime.max_gateway_event_bytes {
                    disconnect_reason = "event_too_large";
                    break;
                }
                text.as_bytes().to_vec()
            }
            Message::Binary(bytes) => {
                if bytes.len() > state.runtime.max_gateway_event_bytes {
                    disconnect_reason = "event_too_large";
                    break;
                }
                bytes.to_vec()
            }
            Message::Close(_) => {
                disconnect_reason = "client_close";
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match parse_inbound_event(&payload) {
            Ok(InboundEvent::ChatSend(chat)) => {
                relay_chat_message(&state, connection_id, chat).await;
            }
            Err(InboundEventError::Envelope(_)) => {
                record_gateway_event_parse_rejected("ingress", "invalid_envelope");
                disconnect_reason = "invalid_envelope";
                break;
            }
            Err(InboundEventError::InvalidPayload { .. }) => {
                record_gateway_event_parse_rejected("ingress", "invalid_chat_payload");
                disconnect_reason = "invalid_chat_payload";
                break;
            }
            Err(InboundEventError::UnknownEventType(event_type)) => {
                record_gateway_event_unknown_received(&event_type);
                disconnect_reason = "unknown_event";
                break;
            }
        }
    }

    if !forced_close.load(Ordering::Relaxed) {
        record_ws_disconnect(disconnect_reason);
    }
    unregister_connection(&state, connection_id).await;
    send_task.abort();
}

/// Atomically admit a connection (evicting any prior session for the same
/// user) and push the fresh presence snapshot to everyone. Dispatch happens
/// under the same registry guard as the mutation, so observers see presence
/// updates in mutation order.
pub(crate) async fn register_connection(
    state: &AppState,
    connection_id: Uuid,
    identity: Identity,
    sender: mpsc::Sender<String>,
    control: watch::Sender<ConnectionControl>,
) -> Result<RegisterOutcome, RegistryError> {
    let (outcome, event_type, slow_connections, delivered) = {
        let mut registry = state.registry.write().await;
        let outcome = registry.register(connection_id, identity, now_unix(), sender, control)?;
        let presence_event = build_presence_event(&registry);
        let mut slow_connections = Vec::new();
        let delivered = dispatch_broadcast_payload(
            &registry,
            &presence_event.payload,
            state.runtime.max_gateway_event_bytes,
            presence_event.event_type,
            &mut slow_connections,
        );
        (
            outcome,
            presence_event.event_type,
            slow_connections,
            delivered,
        )
    };

    if let Some(evicted_id) = outcome.evicted {
        record_session_eviction();
        tracing::info!(
            event = "gateway.session.evicted",
            evicted_connection_id = %evicted_id,
            connection_id = %connection_id
        );
    }
    close_slow_connections(state, slow_connections).await;
    emit_broadcast_metrics(event_type, delivered);
    Ok(outcome)
}

/// Drop a connection from the registry on disconnect. A miss is silent: the
/// record may already be gone because a newer session evicted it, and that
/// path has already broadcast the membership change.
pub(crate) async fn unregister_connection(state: &AppState, connection_id: Uuid) -> bool {
    let removed = {
        let mut registry = state.registry.write().await;
        registry.unregister(connection_id).map(|removed| {
            let presence_event = build_presence_event(&registry);
            let mut slow_connections = Vec::new();
            let delivered = dispatch_broadcast_payload(
                &registry,
                &presence_event.payload,
                state.runtime.max_gateway_event_bytes,
                presence_event.event_type,
                &mut slow_connections,
            );
            (
                removed.user_id,
                removed.connected_at_unix,
                presence_event.event_type,
                slow_connections,
                delivered,
            )
        })
    };

    let Some((user_id, connected_at_unix, event_type, slow_connections, delivered)) = removed
    else {
        return false;
    };
    close_slow_connections(state, slow_connections).await;
    emit_broadcast_metrics(event_type, delivered);
    tracing::info!(
        event = "gateway.connection.closed",
        connection_id = %connection_id,
        user_id = %user_id,
        connected_at_unix
    );
    true
}

/// Fan a chat event out to every live connection, the sender included. A
/// sender that vanished between send and relay drops the event silently.
pub(crate) async fn relay_chat_message(
    state: &AppState,
    sender_connection_id: Uuid,
    payload: ChatSend,
) {
    let planned = {
        let registry = state.registry.write().await;
        let Some(event) = plan_chat_broadcast(&registry, sender_connection_id, payload) else {
            record_gateway_event_dropped("broadcast", CHAT_MESSAGE_EVENT, "unknown_sender");
            tracing::debug!(
                event = "gateway.chat.stale_sender",
                connection_id = %sender_connection_id
            );
            return;
        };
        let mut slow_connections = Vec::new();
        let delivered = dispatch_broadcast_payload(
            &registry,
            &event.payload,
            state.runtime.max_gateway_event_bytes,
            event.event_type,
            &mut slow_connections,
        );
        (event.event_type, slow_connections, delivered)
    };

    let (event_type, slow_connections, delivered) = planned;
    close_slow_connections(state, slow_connections).await;
    emit_broadcast_metrics(event_type, delivered);
}

async fn close_slow_connections(state: &AppState, slow_connections: Vec<Uuid>) {
    if slow_connections.is_empty() {
        return;
    }

    let registry = state.registry.read().await;
    signal_connections_close(&registry, &slow_connections, SLOW_CONSUMER_CLOSE_REASON);
}

fn emit_broadcast_metrics(event_type: &'static str, delivered: usize) {
    if delivered == 0 {
        return;
    }
    tracing::debug!(
        event = "gateway.event.emit",
        scope = "broadcast",
        event_type,
        delivered
    );
    for _ in 0..delivered {
        record_gateway_event_emitted("broadcast", event_type);
    }
}
