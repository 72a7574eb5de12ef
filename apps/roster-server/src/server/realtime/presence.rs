use super::connection_registry::RegistryState;
use crate::server::gateway_events::{self, GatewayEvent};

/// Snapshot the set of live connection ids into a presence event. Sorting
/// keeps the payload stable for clients and tests; the registry itself makes
/// no ordering promise.
pub(crate) fn build_presence_event(registry: &RegistryState) -> GatewayEvent {
    let mut connection_ids: Vec<String> = registry
        .connection_ids()
        .into_iter()
        .map(|connection_id| connection_id.to_string())
        .collect();
    connection_ids.sort_unstable();
    gateway_events::presence_update(connection_ids)
}

#[cfg(test)]
mod tests {
    use roster_core::UserId;
    use serde_json::Value;
    use tokio::sync::{mpsc, watch};
    use uuid::Uuid;

    use super::build_presence_event;
    use crate::server::core::{ConnectionControl, Identity};
    use crate::server::realtime::connection_registry::RegistryState;

    fn register(registry: &mut RegistryState) -> Uuid {
        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel::<String>(1);
        std::mem::drop(receiver);
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
        connection_id
    }

    fn connection_ids_of(event_payload: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(event_payload).expect("payload should be json");
        value["d"]["connection_ids"]
            .as_array()
            .expect("connection ids should be an array")
            .iter()
            .map(|id| id.as_str().expect("id should be a string").to_owned())
            .collect()
    }

    #[test]
    fn carries_exactly_the_live_connections_sorted() {
        let mut registry = RegistryState::default();
        let first = register(&mut registry);
        let second = register(&mut registry);

        let event = build_presence_event(&registry);
        let mut expected = vec![first.to_string(), second.to_string()];
        expected.sort();
        assert_eq!(connection_ids_of(&event.payload), expected);

        registry.unregister(first);
        let event = build_presence_event(&registry);
        assert_eq!(connection_ids_of(&event.payload), vec![second.to_string()]);
    }

    #[test]
    fn empty_registry_yields_empty_list() {
        let registry = RegistryState::default();
        let event = build_presence_event(&registry);
        assert!(connection_ids_of(&event.payload).is_empty());
    }
}
