use tokio::sync::mpsc;
use uuid::Uuid;

use super::connection_registry::RegistryState;
use crate::server::metrics::record_gateway_event_dropped;

/// Enqueue a payload on every live connection, the sender of the triggering
/// event included. Full queues mark the connection slow so the caller can
/// signal it closed once the registry guard is released; closed queues belong
/// to connections that are already tearing themselves down.
pub(crate) fn dispatch_broadcast_payload(
    registry: &RegistryState,
    payload: &str,
    max_payload_bytes: usize,
    event_type: &'static str,
    slow_connections: &mut Vec<Uuid>,
) -> usize {
    if payload.len() > max_payload_bytes {
        record_gateway_event_dropped("broadcast", event_type, "oversized_outbound");
        return 0;
    }

    let mut delivered = 0usize;
    for (connection_id, sender) in registry.senders() {
        match sender.try_send(payload.to_owned()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                record_gateway_event_dropped("broadcast", event_type, "closed");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                record_gateway_event_dropped("broadcast", event_type, "full_queue");
                slow_connections.push(connection_id);
            }
        }
    }

    delivered
}

#[cfg(test)]
mod tests {
    use roster_core::UserId;
    use tokio::sync::{mpsc, watch};
    use uuid::Uuid;

    use super::dispatch_broadcast_payload;
    use crate::server::core::{ConnectionControl, Identity};
    use crate::server::realtime::connection_registry::RegistryState;

    fn register_with_queue(
        registry: &mut RegistryState,
        queue: usize,
    ) -> (Uuid, mpsc::Receiver<String>) {
        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel::<String>(queue);
        let (control_tx, _control_rx) = watch::channel(ConnectionControl::Open);
        registry
            .register(
                connection_id,
                Identity {
                    user_id: UserId::new(),
                    display_name: String::from("Ana"),
                },
                0,
                sender,
                control_tx,
            )
            .expect("registration should succeed");
        (connection_id, receiver)
    }

    #[tokio::test]
    async fn delivers_to_every_live_connection() {
        let mut registry = RegistryState::default();
        let (_first, mut first_rx) = register_with_queue(&mut registry, 4);
        let (_second, mut second_rx) = register_with_queue(&mut registry, 4);

        let mut slow_connections = Vec::new();
        let delivered = dispatch_broadcast_payload(
            &registry,
            "payload",
            "payload".len(),
            "chat_message",
            &mut slow_connections,
        );

        assert_eq!(delivered, 2);
        assert!(slow_connections.is_empty());
        assert_eq!(first_rx.recv().await.as_deref(), Some("payload"));
        assert_eq!(second_rx.recv().await.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn collects_full_queues_as_slow_and_skips_closed_queues() {
        let mut registry = RegistryState::default();
        let (slow_id, mut slow_rx) = register_with_queue(&mut registry, 1);
        slow_rx
            .try_recv()
            .expect_err("queue should start empty before being filled");
        let (_ok_id, mut ok_rx) = register_with_queue(&mut registry, 2);
        let (_closed_id, closed_rx) = register_with_queue(&mut registry, 1);
        drop(closed_rx);

        let mut slow_connections = Vec::new();
        // First dispatch fills the slow connection's single-slot queue.
        dispatch_broadcast_payload(
            &registry,
            "first",
            "first".len(),
            "chat_message",
            &mut slow_connections,
        );
        let delivered = dispatch_broadcast_payload(
            &registry,
            "second",
            "second".len(),
            "chat_message",
            &mut slow_connections,
        );

        assert_eq!(delivered, 1);
        assert_eq!(slow_connections, vec![slow_id]);
        assert_eq!(slow_rx.recv().await.as_deref(), Some("first"));
        assert_eq!(ok_rx.recv().await.as_deref(), Some("first"));
        assert_eq!(ok_rx.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn rejects_oversized_outbound_payload_before_enqueue() {
        let mut registry = RegistryState::default();
        let (_id, mut receiver) = register_with_queue(&mut registry, 4);

        let mut slow_connections = Vec::new();
        let payload = "payload";
        let delivered = dispatch_broadcast_payload(
            &registry,
            payload,
            payload.len() - 1,
            "chat_message",
            &mut slow_connections,
        );

        assert_eq!(delivered, 0);
        assert!(slow_connections.is_empty());
        assert!(receiver.try_recv().is_err());
    }
}
