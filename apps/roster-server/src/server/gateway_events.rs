use roster_core::UserId;
use roster_protocol::{
    ChatMessage, PresenceUpdate, Ready, CHAT_MESSAGE_EVENT, PRESENCE_UPDATE_EVENT, READY_EVENT,
};
use serde::Serialize;
use uuid::Uuid;

use super::auth::outbound_event;

pub(crate) struct GatewayEvent {
    pub(crate) event_type: &'static str,
    pub(crate) payload: String,
}

fn build_event<T: Serialize>(event_type: &'static str, payload: T) -> GatewayEvent {
    GatewayEvent {
        event_type,
        payload: outbound_event(event_type, payload),
    }
}

pub(crate) fn ready(connection_id: Uuid, user_id: UserId, display_name: &str) -> GatewayEvent {
    build_event(
        READY_EVENT,
        Ready {
            connection_id: connection_id.to_string(),
            user_id: user_id.to_string(),
            display_name: display_name.to_owned(),
        },
    )
}

pub(crate) fn presence_update(connection_ids: Vec<String>) -> GatewayEvent {
    build_event(PRESENCE_UPDATE_EVENT, PresenceUpdate { connection_ids })
}

pub(crate) fn chat_message(display_name: &str, message: &str) -> GatewayEvent {
    build_event(
        CHAT_MESSAGE_EVENT,
        ChatMessage {
            display_name: display_name.to_owned(),
            message: message.to_owned(),
        },
    )
}
