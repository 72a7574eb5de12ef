use serde::{Deserialize, Serialize};

use crate::{parse_envelope, ProtocolError};

/// Server-to-client: handshake acknowledgement for a freshly registered
/// connection.
pub const READY_EVENT: &str = "ready";
/// Server-to-client: full snapshot of live connection ids, pushed on every
/// membership change.
pub const PRESENCE_UPDATE_EVENT: &str = "presence_update";
/// Server-to-client: chat text with sender attribution.
pub const CHAT_MESSAGE_EVENT: &str = "chat_message";
/// Client-to-server: chat text to relay.
pub const CHAT_SEND_EVENT: &str = "chat_send";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    pub connection_id: String,
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub connection_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub display_name: String,
    pub message: String,
}

/// Inbound chat event body. The message is optional on purpose: the relay
/// substitutes placeholder text rather than rejecting bare events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Events a client is allowed to send to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    ChatSend(ChatSend),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InboundEventError {
    #[error(transparent)]
    Envelope(#[from] ProtocolError),
    #[error("unknown inbound event type {0:?}")]
    UnknownEventType(String),
    #[error("invalid payload for {event_type}")]
    InvalidPayload { event_type: &'static str },
}

/// Decode a client frame into a typed inbound event.
///
/// # Errors
/// Returns [`InboundEventError`] if the envelope is rejected, the event type
/// is not one a client may send, or the payload does not match the type.
pub fn parse_inbound_event(input: &[u8]) -> Result<InboundEvent, InboundEventError> {
    let envelope = parse_envelope(input)?;
    match envelope.t.as_str() {
        CHAT_SEND_EVENT => serde_json::from_value::<ChatSend>(envelope.d)
            .map(InboundEvent::ChatSend)
            .map_err(|_| InboundEventError::InvalidPayload {
                event_type: CHAT_SEND_EVENT,
            }),
        other => Err(InboundEventError::UnknownEventType(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_inbound_event, ChatSend, InboundEvent, InboundEventError};
    use crate::ProtocolError;

    #[test]
    fn chat_send_decodes_with_message() {
        let event = parse_inbound_event(br#"{"v":1,"t":"chat_send","d":{"message":"hola"}}"#)
            .expect("event should decode");
        assert_eq!(
            event,
            InboundEvent::ChatSend(ChatSend {
                message: Some(String::from("hola")),
            })
        );
    }

    #[test]
    fn chat_send_decodes_without_message() {
        let event = parse_inbound_event(br#"{"v":1,"t":"chat_send","d":{}}"#)
            .expect("event should decode");
        assert_eq!(event, InboundEvent::ChatSend(ChatSend { message: None }));
    }

    #[test]
    fn chat_send_rejects_non_string_message() {
        let error =
            parse_inbound_event(br#"{"v":1,"t":"chat_send","d":{"message":7}}"#).unwrap_err();
        assert_eq!(
            error,
            InboundEventError::InvalidPayload {
                event_type: "chat_send"
            }
        );
    }

    #[test]
    fn server_only_event_types_are_not_accepted_inbound() {
        let error =
            parse_inbound_event(br#"{"v":1,"t":"presence_update","d":{"connection_ids":[]}}"#)
                .unwrap_err();
        assert_eq!(
            error,
            InboundEventError::UnknownEventType(String::from("presence_update"))
        );
    }

    #[test]
    fn envelope_failures_pass_through() {
        let error = parse_inbound_event(br#"{"v":9,"t":"chat_send","d":{}}"#).unwrap_err();
        assert!(matches!(
            error,
            InboundEventError::Envelope(ProtocolError::UnsupportedVersion { .. })
        ));
    }
}
