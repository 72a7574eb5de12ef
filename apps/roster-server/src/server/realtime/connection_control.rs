use uuid::Uuid;

use super::connection_registry::RegistryState;
use crate::server::core::ConnectionControl;

pub(crate) fn signal_connections_close(
    registry: &RegistryState,
    connection_ids: &[Uuid],
    reason: &'static str,
) {
    for connection_id in connection_ids {
        if let Some(control) = registry.control_of(*connection_id) {
            let _ = control.send(ConnectionControl::Close { reason });
        }
    }
}
