use roster_protocol::ChatSend;
use uuid::Uuid;

use super::connection_registry::RegistryState;
use crate::server::gateway_events::{self, GatewayEvent};

/// Substituted when a chat event arrives without usable text.
pub(crate) const EMPTY_MESSAGE_PLACEHOLDER: &str = "No message";

/// Resolve a chat event into the broadcast it should produce. `None` means
/// the sender is no longer registered (evicted or disconnected between send
/// and relay) and the event is dropped without telling anyone.
pub(crate) fn plan_chat_broadcast(
    registry: &RegistryState,
    sender_connection_id: Uuid,
    payload: ChatSend,
) -> Option<GatewayEvent> {
    let display_name = registry.display_name_of(sender_connection_id)?;
    let message = match payload.message {
        Some(message) if !message.is_empty() => message,
        _ => String::from(EMPTY_MESSAGE_PLACEHOLDER),
    };
    Some(gateway_events::chat_message(display_name, &message))
}
